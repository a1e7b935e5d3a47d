//! Logger sink contract (spec §6).
//!
//! Mirrors the teacher's choice of `tracing` for structured logging, but
//! the orchestrator only ever depends on this trait — never on `tracing`
//! directly — so a host application can redirect logs into its own sink
//! without pulling in a subscriber. `TracingLogger` is the process-global
//! default, the same role `tracing_subscriber::registry()` fills in the
//! teacher's `main.rs`, minus the subscriber installation itself (a
//! library must not install a global subscriber for its caller).

/// Optional `debug`, required `warn`/`error` (spec §6). The default method
/// for `debug` is a no-op so implementers only need to supply the two that
/// matter for production diagnosis.
pub trait Logger: Send + Sync {
    fn debug(&self, _message: &str) {}
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Process-global default: forwards to `tracing`'s macros at matching
/// levels. This is what the orchestrator uses when no logger is injected.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Discards everything. Useful for tests that don't want log noise and
/// don't care about sink behaviour.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn debug_default_is_a_no_op() {
        // Exercise the default method; nothing to assert beyond "doesn't panic".
        TracingLogger.debug("irrelevant");
    }

    #[test]
    fn custom_logger_can_capture_messages() {
        struct Capturing(Mutex<Vec<String>>);
        impl Logger for Capturing {
            fn warn(&self, message: &str) {
                self.0.lock().unwrap().push(format!("W:{message}"));
            }
            fn error(&self, message: &str) {
                self.0.lock().unwrap().push(format!("E:{message}"));
            }
        }
        let logger = Arc::new(Capturing(Mutex::new(Vec::new())));
        logger.warn("a");
        logger.error("b");
        assert_eq!(*logger.0.lock().unwrap(), vec!["W:a".to_string(), "E:b".to_string()]);
    }
}
