//! Logging sink used by the engine and, optionally, by application handlers.
//!
//! The engine itself emits its own diagnostics (accepted connections, parse
//! failures, handler panics) directly through [`tracing`] spans and events --
//! it does not go through this trait. [`Logger`] exists so a
//! [`Handler`](crate::Handler) can report *application-level* events through
//! whatever sink the embedding binary configures, without this crate
//! depending on a concrete logger type.

/// A minimal logging sink: three severities, a string message, and an
/// optional associated error. No format is assumed -- an implementation is
/// free to write plain text, JSON, or forward to any other facade.
pub trait Logger: Send + Sync {
    /// Logs an informational message.
    fn info(&self, message: &str);

    /// Logs a message about a recoverable or noteworthy condition.
    fn warning(&self, message: &str);

    /// Logs an error, optionally carrying the underlying cause.
    fn error(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>);
}

/// Default [`Logger`] implementation, forwarding to [`tracing`].
///
/// # Examples
/// ```
/// use maker_web::logging::{Logger, TracingLogger};
///
/// let logger = TracingLogger;
/// logger.info("worker started");
/// logger.warning("request queue above 80% capacity");
/// logger.error("failed to open upstream socket", None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    #[inline]
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    #[inline]
    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    #[inline]
    fn error(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>) {
        match cause {
            Some(err) => tracing::error!(error = %err, "{message}"),
            None => tracing::error!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_logger_does_not_panic_without_a_subscriber() {
        let logger = TracingLogger;
        logger.info("hello");
        logger.warning("careful");
        logger.error("broken", None);
    }
}
