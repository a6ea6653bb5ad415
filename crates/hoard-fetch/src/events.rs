//! Records delivered by a running fetch.

use hoard_core::{FailureKind, HoardError};
use serde::Serialize;

/// What the source answered for an asset's final attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    /// HTTP status code (local files report 200)
    Status(u16),
    /// The pool already held the bytes; nothing was transferred
    Skipped,
    /// No response was obtained
    Transport,
}

/// Why an asset failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&HoardError> for FetchFailure {
    fn from(error: &HoardError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Final result of one asset, sent once after its last attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEvent {
    /// Position in the collection
    pub index: usize,
    pub file_name: String,
    pub response_code: ResponseCode,
    /// Absent on success
    pub error: Option<FetchFailure>,
}

impl FileEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Transfer progress of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub index: usize,
    /// Number of assets in the collection
    pub total: usize,
    pub file_name: String,
    pub current_file_transferred: u64,
    pub current_file_total: Option<u64>,
}

impl ProgressEvent {
    pub fn percent(&self) -> Option<f64> {
        self.current_file_total.map(|total| {
            if total == 0 {
                100.0
            } else {
                self.current_file_transferred as f64 * 100.0 / total as f64
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FetchEvent {
    File(FileEvent),
    Progress(ProgressEvent),
}

/// Counts returned when a fetch finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl FetchSummary {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let mut event = ProgressEvent {
            index: 0,
            total: 1,
            file_name: "a".to_string(),
            current_file_transferred: 25,
            current_file_total: Some(200),
        };
        assert_eq!(event.percent(), Some(12.5));
        event.current_file_total = None;
        assert_eq!(event.percent(), None);
    }

    #[test]
    fn test_failure_from_error() {
        let error = HoardError::HttpStatus {
            link: "https://assets.example.com/a".to_string(),
            status: 503,
        };
        let failure = FetchFailure::from(&error);
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("503"));
    }

    #[test]
    fn test_file_event_json() {
        let event = FetchEvent::File(FileEvent {
            index: 2,
            file_name: "intro.mp4".to_string(),
            response_code: ResponseCode::Skipped,
            error: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "file");
        assert_eq!(json["response_code"], "skipped");
        assert_eq!(json["index"], 2);
    }
}
