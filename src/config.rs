/// Application-level constants
pub const APP_NAME: &str = "CycleCare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend base URL used when none is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

pub const ENV_API_BASE_URL: &str = "CYCLECARE_API_BASE_URL";
pub const ENV_API_TIMEOUT_SECS: &str = "CYCLECARE_API_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Log filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "cyclecare_lib=info,warn"
}

/// Connection settings for the clinic backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicConfig {
    pub api_base_url: String,
    /// `None` keeps the HTTP client's own default.
    pub timeout_secs: Option<u64>,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl ClinicConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup; unset or blank keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup(ENV_API_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: ENV_API_TIMEOUT_SECS,
                    value: raw.clone(),
                })?;
            config.timeout_secs = Some(secs);
        }

        Ok(config)
    }
}
