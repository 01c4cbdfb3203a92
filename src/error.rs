use thiserror::Error;

use crate::events::WriteOp;
use crate::models::{AppointmentStatus, UnknownLabel};

/// Postgres SQLSTATE for `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("access denied: {operation} on {path}")]
    PermissionDenied { path: String, operation: WriteOp },

    #[error("incident classification failed: {0}")]
    Classification(String),

    #[error("a wellness session has already been assigned for this incident")]
    AlreadyWellnessAssigned,

    #[error("incident data is incomplete for wellness assignment")]
    IncompleteIncident,

    #[error("appointment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("no data to export")]
    NoData,

    #[error("this action is already in progress")]
    Busy,

    #[error(transparent)]
    Label(#[from] UnknownLabel),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn denied(path: impl Into<String>, operation: WriteOp) -> Self {
        AppError::PermissionDenied {
            path: path.into(),
            operation,
        }
    }

    /// Network and database hiccups. The user is told to retry; nothing retries automatically.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Http(_) | AppError::Io(_)
        )
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AppError::PermissionDenied { .. })
    }

    /// Maps a failed write to `PermissionDenied` when the store refused it on privilege grounds.
    pub fn from_write(err: sqlx::Error, path: impl Into<String>, operation: WriteOp) -> Self {
        let denied = matches!(
            &err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE)
        );
        if denied {
            AppError::denied(path, operation)
        } else {
            AppError::Database(err)
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound { entity, id } => format!("No {entity} found with ID: {id}"),
            AppError::PermissionDenied { .. } => {
                "You do not have permission to perform this action.".to_string()
            }
            err if err.is_transient() => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            err => err.to_string(),
        }
    }
}
