//! Per-domain preview entries for the accept-domains step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Confidence, MessageId};

/// The representative message shown for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSample {
    pub message_id: MessageId,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub date: DateTime<Utc>,
    pub score: i32,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

/// One sender domain seen during a preview run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPreview {
    /// Lowercase sender domain.
    pub domain: String,
    /// Highest-scoring candidate from this domain.
    pub sample: PreviewSample,
    /// Number of candidates that shared the domain.
    pub message_count: usize,
}
