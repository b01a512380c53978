use thiserror::Error;

/// Failures the core can observe. None of them unwind past the render
/// callback: each is absorbed by the component that detected it and turned
/// into a status event or a skipped draw.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArError {
    #[error("no AR engine is available on this device")]
    CapabilityAbsent,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    TransientDevice(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),
    #[error("session cancelled")]
    SessionCancelled,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    CapabilityAbsent,
    PermissionDenied,
    TransientDevice,
    ModelLoadFailure,
    NumericalDegeneracy,
    Cancelled,
    Configuration,
}

pub type Result<T> = std::result::Result<T, ArError>;

impl ArError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ArError::CapabilityAbsent => ErrorCategory::CapabilityAbsent,
            ArError::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            ArError::TransientDevice(_) => ErrorCategory::TransientDevice,
            ArError::ModelLoad(_) => ErrorCategory::ModelLoadFailure,
            ArError::Degenerate(_) => ErrorCategory::NumericalDegeneracy,
            ArError::SessionCancelled => ErrorCategory::Cancelled,
            ArError::InvalidConfig(_) => ErrorCategory::Configuration,
        }
    }

    /// Permission errors retry on a platform change notification, transient
    /// device errors retry through the constraint ladder.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArError::PermissionDenied(_) | ArError::TransientDevice(_)
        )
    }

    /// Classify a `DOMException` raised by a camera or sensor request.
    pub fn from_dom_exception(name: &str, message: &str) -> Self {
        let detail = if message.is_empty() {
            name.to_string()
        } else {
            format!("{name}: {message}")
        };
        match name {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                ArError::PermissionDenied(detail)
            }
            _ => ArError::TransientDevice(detail),
        }
    }
}
