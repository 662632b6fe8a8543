//! Prescription intake codes and their daily dose multipliers.

use std::sync::LazyLock;

use regex::Regex;

use super::ModelError;

/// `OTHER_<n>` where `<n>` is a positive numeric dosage.
static OTHER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^OTHER_(\d+(?:\.\d+)?)$").unwrap());

/// Intake frequency selected for a pharmacy line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeCode {
    Od,
    Bid,
    Tid,
    Qid,
    TwiceOd,
    TwiceBid,
    TwiceTid,
    TwiceQid,
    Hs,
    TwiceHs,
    Wo,
    Wt,
    /// Free-form dosage; the numeric text is kept verbatim.
    Other(String),
}

impl IntakeCode {
    pub fn parse(code: &str) -> Result<Self, ModelError> {
        let parsed = match code {
            "OD" => Self::Od,
            "BID" => Self::Bid,
            "TID" => Self::Tid,
            "QID" => Self::Qid,
            "2OD" => Self::TwiceOd,
            "2BID" => Self::TwiceBid,
            "2TID" => Self::TwiceTid,
            "2QID" => Self::TwiceQid,
            "HS" => Self::Hs,
            "2HS" => Self::TwiceHs,
            "WO" => Self::Wo,
            "WT" => Self::Wt,
            other => match OTHER_PATTERN.captures(other) {
                Some(caps) if caps[1].parse::<f64>().is_ok_and(|n| n > 0.0) => {
                    Self::Other(caps[1].to_string())
                }
                _ => {
                    return Err(ModelError::InvalidEnum {
                        field: "IntakeCode".into(),
                        value: code.into(),
                    })
                }
            },
        };
        Ok(parsed)
    }

    /// Units dispensed per prescribed day.
    pub fn multiplier(&self) -> u32 {
        match self {
            Self::Od | Self::Hs | Self::Wo | Self::Other(_) => 1,
            Self::Bid | Self::TwiceOd | Self::TwiceHs | Self::Wt => 2,
            Self::Tid => 3,
            Self::Qid | Self::TwiceBid => 4,
            Self::TwiceTid => 6,
            Self::TwiceQid => 8,
        }
    }

    /// Wire form stored in `prescriptionDetails`.
    pub fn as_code(&self) -> String {
        match self {
            Self::Od => "OD".into(),
            Self::Bid => "BID".into(),
            Self::Tid => "TID".into(),
            Self::Qid => "QID".into(),
            Self::TwiceOd => "2OD".into(),
            Self::TwiceBid => "2BID".into(),
            Self::TwiceTid => "2TID".into(),
            Self::TwiceQid => "2QID".into(),
            Self::Hs => "HS".into(),
            Self::TwiceHs => "2HS".into(),
            Self::Wo => "WO".into(),
            Self::Wt => "WT".into(),
            Self::Other(n) => format!("OTHER_{n}"),
        }
    }
}

impl std::str::FromStr for IntakeCode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
