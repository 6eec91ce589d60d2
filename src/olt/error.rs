//! Error taxonomy for OLT session automation.
//!
//! Every failure that reaches a caller is an [`OltError`] carrying the caller
//! id it occurred under. Parse problems never appear here: parsers recover
//! locally and report [`Diagnostic`](crate::olt::parser::Diagnostic) values
//! instead.
//!
//! # Kinds
//!
//! 1. **Transport**: the channel could not be established, authenticated, or a
//!    command did not see its prompt before the timeout. Connection
//!    establishment is retried by the pool up to its attempt cap.
//! 2. **Protocol**: the device answered, but not in the expected mode (for
//!    example a rejected interface entry). The session must be brought back
//!    with `ensure_global()` before further use.
//! 3. **DeviceSemantic**: the command went through but the reply itself
//!    reports a failure ("Error: invalid index").
//! 4. **Validation**: caller-supplied arguments were rejected before any
//!    device I/O took place.
//!
//! # Retry classification
//!
//! [`is_retryable_error`] decides whether a connection-establishment error is
//! worth another attempt. Authentication failures take precedence over
//! connection keywords so bad credentials never hammer the device.

use std::fmt;

use thiserror::Error;

/// Coarse classification of an [`OltError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    DeviceSemantic,
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::DeviceSemantic => write!(f, "device"),
            ErrorKind::Validation => write!(f, "validation"),
        }
    }
}

/// Failure surfaced to callers of the pool, sessions and workflows.
#[derive(Debug, Clone, Error)]
pub enum OltError {
    #[error("transport error for caller {caller_id}: {message}")]
    Transport { caller_id: String, message: String },

    #[error("protocol error for caller {caller_id}: {message}")]
    Protocol { caller_id: String, message: String },

    #[error("device rejected command for caller {caller_id}: {message}")]
    DeviceSemantic { caller_id: String, message: String },

    #[error("invalid input for caller {caller_id}: {message}")]
    Validation { caller_id: String, message: String },
}

impl OltError {
    pub fn transport(caller_id: impl Into<String>, message: impl Into<String>) -> Self {
        OltError::Transport {
            caller_id: caller_id.into(),
            message: message.into(),
        }
    }

    pub fn protocol(caller_id: impl Into<String>, message: impl Into<String>) -> Self {
        OltError::Protocol {
            caller_id: caller_id.into(),
            message: message.into(),
        }
    }

    pub fn device(caller_id: impl Into<String>, message: impl Into<String>) -> Self {
        OltError::DeviceSemantic {
            caller_id: caller_id.into(),
            message: message.into(),
        }
    }

    pub fn validation(caller_id: impl Into<String>, message: impl Into<String>) -> Self {
        OltError::Validation {
            caller_id: caller_id.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OltError::Transport { .. } => ErrorKind::Transport,
            OltError::Protocol { .. } => ErrorKind::Protocol,
            OltError::DeviceSemantic { .. } => ErrorKind::DeviceSemantic,
            OltError::Validation { .. } => ErrorKind::Validation,
        }
    }

    pub fn caller_id(&self) -> &str {
        match self {
            OltError::Transport { caller_id, .. }
            | OltError::Protocol { caller_id, .. }
            | OltError::DeviceSemantic { caller_id, .. }
            | OltError::Validation { caller_id, .. } => caller_id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            OltError::Transport { message, .. }
            | OltError::Protocol { message, .. }
            | OltError::DeviceSemantic { message, .. }
            | OltError::Validation { message, .. } => message,
        }
    }
}

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "key authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Determines if a connection-establishment error is retryable.
///
/// Authentication failures are checked first and are never retryable. Known
/// transient network conditions are retryable. Anything else is retried
/// unless it looks like an SSH protocol failure without a timeout/connect
/// hint.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if AUTH_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return false;
    }

    if RETRYABLE_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return true;
    }

    !error_lower.contains("ssh") || error_lower.contains("timeout") || error_lower.contains("connect")
}
