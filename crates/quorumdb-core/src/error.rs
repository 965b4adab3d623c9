//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid cluster spec field '{field}': {message}")]
    InvalidSpec { field: String, message: String },

    #[error("Cluster has no {field}")]
    MissingField { field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
