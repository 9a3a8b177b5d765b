pub mod parser;
pub mod store;

pub use parser::*;
pub use store::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybookParseError {
    #[error("Playbook source is empty")]
    EmptySource,

    #[error("Line {line}: {field} without a preceding PRINCIPLE")]
    OrphanField { line: usize, field: String },

    #[error("Line {line}: invalid PRIORITY value: {value}")]
    InvalidPriority { line: usize, value: String },

    #[error("Line {line}: invalid APPLIES TO kind: {value}")]
    InvalidKind { line: usize, value: String },

    #[error("Playbook not found: {0}")]
    NotFound(String),

    #[error("Contract type registry error: {0}")]
    Registry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
