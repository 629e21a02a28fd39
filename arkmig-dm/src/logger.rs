//! Migration log sink
//!
//! Manipulators report counts (rows cleaned, deleted, added) through a
//! [`MigrationLogger`] rather than writing to tracing directly, so a run can
//! collect its own report.

use std::sync::Mutex;
use tracing::info;

/// Receives informational messages produced while manipulating data
pub trait MigrationLogger: Send + Sync {
    fn log_information(&self, message: &str);
}

/// Forwards messages to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl MigrationLogger for TracingLogger {
    fn log_information(&self, message: &str) {
        info!("{}", message);
    }
}

/// Keeps every message in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingLogger {
    messages: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the messages logged so far
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True if any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl MigrationLogger for RecordingLogger {
    fn log_information(&self, message: &str) {
        info!("{}", message);
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());
    }
}

/// "1 row" / "3 rows"
pub fn rows(count: usize) -> String {
    if count == 1 {
        "1 row".to_string()
    } else {
        format!("{} rows", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_logger_keeps_order() {
        let logger = RecordingLogger::new();
        logger.log_information("first");
        logger.log_information("second");
        assert_eq!(logger.messages(), vec!["first", "second"]);
        assert!(logger.contains("sec"));
        assert!(!logger.contains("third"));
    }

    #[test]
    fn test_row_count_wording() {
        assert_eq!(rows(0), "0 rows");
        assert_eq!(rows(1), "1 row");
        assert_eq!(rows(12), "12 rows");
    }
}
