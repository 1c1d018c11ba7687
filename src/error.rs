use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Unsupported,
    Io,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsetError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for FormsetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for FormsetError {}

impl From<std::io::Error> for FormsetError {
    fn from(err: std::io::Error) -> Self {
        FormsetError {
            code: ErrorCode::Io,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FormsetError {
    fn from(err: serde_json::Error) -> Self {
        FormsetError {
            code: ErrorCode::InvalidInput,
            message: err.to_string(),
        }
    }
}
