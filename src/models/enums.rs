use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde uses the same wire strings as `as_str`.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Stage {
    Icsi => "ICSI",
    Iui => "IUI",
    Oiti => "OITI",
    Fet => "FET",
    Era => "ERA",
    Hysteroscopy => "HYSTEROSCOPY",
});

str_enum!(BillStatus {
    Unpaid => "UNPAID",
    Paid => "PAID",
});

str_enum!(VisitType {
    Treatment => "Treatment",
    Consultation => "Consultation",
});

str_enum!(UptResult {
    Positive => "UPT_POSITIVE",
    Negative => "UPT_NEGATIVE",
});

str_enum!(CloseVisitStatus {
    Completed => "Completed",
    Cancelled => "Cancelled",
});

str_enum!(EndReasonCode {
    Freeze => "FREEZE",
    UptPositive => "UPT_POSITIVE",
    UptNegative => "UPT_NEGATIVE",
    Cancel => "CANCEL",
});

/// Which prescription modal a line bill belongs to (`isSpouse` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Ownership {
    Patient,
    Spouse,
}

impl Ownership {
    pub fn is_spouse(&self) -> i64 {
        match self {
            Self::Patient => 0,
            Self::Spouse => 1,
        }
    }
}

impl TryFrom<i64> for Ownership {
    type Error = ModelError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Patient),
            1 => Ok(Self::Spouse),
            other => Err(ModelError::InvalidOwnership(other)),
        }
    }
}

impl From<Ownership> for i64 {
    fn from(value: Ownership) -> Self {
        value.is_spouse()
    }
}
