//! Classifier output types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable trust level derived from a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score, confidence band and ordered explanation for one message.
///
/// Reasons follow the order in which checks ran and are shown to users, so
/// their wording is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Net score; may be negative.
    pub score: i32,
    /// Band the score falls into.
    pub confidence: Confidence,
    /// One entry per matched check.
    pub reasons: Vec<String>,
}

impl ClassificationResult {
    /// Reason reported for vetoed messages.
    pub const DISQUALIFIED: &'static str = "disqualified";

    /// Result for a message vetoed by the disqualification gate.
    pub fn disqualified() -> Self {
        Self {
            score: 0,
            confidence: Confidence::Low,
            reasons: vec![Self::DISQUALIFIED.to_string()],
        }
    }

    /// Returns true if the message was vetoed.
    pub fn is_disqualified(&self) -> bool {
        self.reasons.len() == 1 && self.reasons[0] == Self::DISQUALIFIED
    }

    /// Returns true if the score meets `threshold`.
    pub fn is_accepted(&self, threshold: i32) -> bool {
        !self.is_disqualified() && self.score >= threshold
    }
}
