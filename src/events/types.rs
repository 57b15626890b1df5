use serde::{Deserialize, Serialize};

/// Severity of a pipeline event, matching the log-bridge wire vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Status,
}

/// Structured message streamed to subscribers (web UI, log bridge).
///
/// Serializes with the `type`/`message`/`timestamp`/`level` field names the
/// downstream stream consumers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: EventLevel,
}

impl PipelineEvent {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, level: EventLevel) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            timestamp: chrono::Utc::now(),
            level,
        }
    }
}
