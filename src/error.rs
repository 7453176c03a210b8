//! Error types carried on command result streams.
//!
//! A command never propagates its action's failure to the invoking caller;
//! failures surface as [`CommandError`] values on the command's result stream
//! while the caller receives the configured default output. The variants
//! provide `as_label`/`as_message` helpers for logging.

use thiserror::Error;

/// # Errors produced by command execution.
///
/// These represent failures of the asynchronous action wrapped by a
/// [`Command`](crate::Command). They are cloneable so every result-stream
/// subscriber receives its own copy.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The action returned an error.
    #[error("action failed: {reason}")]
    Failed {
        /// The underlying error message.
        reason: String,
    },

    /// The action panicked; the panic was contained by the command.
    #[error("action panicked: {reason}")]
    Panicked {
        /// The panic payload rendered as text.
        reason: String,
    },

    /// The invocation was cancelled before the action completed.
    #[error("invocation cancelled")]
    Canceled,
}

impl CommandError {
    /// Creates a [`CommandError::Failed`] from any displayable reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        CommandError::Failed {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use statebus::CommandError;
    ///
    /// let err = CommandError::failed("boom");
    /// assert_eq!(err.as_label(), "command_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Failed { .. } => "command_failed",
            CommandError::Panicked { .. } => "command_panicked",
            CommandError::Canceled => "command_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CommandError::Failed { reason } => format!("error: {reason}"),
            CommandError::Panicked { reason } => format!("panic: {reason}"),
            CommandError::Canceled => "invocation cancelled".to_string(),
        }
    }
}

/// Renders a caught panic payload as text for logs and error values.
pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<opaque panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(CommandError::failed("x").as_label(), "command_failed");
        assert_eq!(
            CommandError::Panicked { reason: "x".into() }.as_label(),
            "command_panicked"
        );
        assert_eq!(CommandError::Canceled.as_label(), "command_canceled");
    }

    #[test]
    fn test_messages_include_reason() {
        let err = CommandError::failed("disk on fire");
        assert!(err.as_message().contains("disk on fire"));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_panic_reason_extracts_strings() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_reason(&*payload), "static message");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_reason(&*payload), "owned message");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_reason(&*payload), "<opaque panic payload>");
    }
}
