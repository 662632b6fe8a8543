pub mod billing;
pub mod enums;
pub mod intake;
pub mod treatment;

pub use billing::*;
pub use enums::*;
pub use intake::*;
pub use treatment::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid isSpouse value: {0}")]
    InvalidOwnership(i64),
}
