//! Type definitions for hive storage.

mod audit;
mod employees;
mod entity;
mod ids;
mod notifications;
mod remarks;
mod roles;
mod settings;
mod tasks;

pub use audit::*;
pub use employees::*;
pub use entity::*;
pub use ids::*;
pub use notifications::*;
pub use remarks::*;
pub use roles::*;
pub use settings::*;
pub use tasks::*;

/// A string that does not name a value of a closed enum.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseValueError {
    kind: &'static str,
    value: String,
}

impl ParseValueError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
