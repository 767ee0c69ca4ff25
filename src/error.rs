use std::error::Error;
use std::fmt;

use crate::codec::CodecError;

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Db(sea_orm::DbErr),
    Codec(CodecError),
    NotFound(String),
    InvalidInput(String),
}

impl AppError {
    pub fn habit_not_found(id: i64) -> Self {
        Self::NotFound(format!("habit id {id}"))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "io error: {err}"),
            AppError::Db(err) => write!(f, "database error: {err}"),
            AppError::Codec(err) => write!(f, "codec error: {err}"),
            AppError::NotFound(message) => write_multiline(f, "Not found", message),
            AppError::InvalidInput(message) => write_multiline(f, "Invalid input", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Db(err) => Some(err),
            AppError::Codec(err) => Some(err),
            AppError::NotFound(_) | AppError::InvalidInput(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(value: sea_orm::DbErr) -> Self {
        Self::Db(value)
    }
}

impl From<CodecError> for AppError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

fn write_multiline(f: &mut fmt::Formatter<'_>, label: &str, message: &str) -> fmt::Result {
    if message.contains('\n') {
        write!(f, "{label}:\n{message}")
    } else {
        write!(f, "{label}: {message}")
    }
}
