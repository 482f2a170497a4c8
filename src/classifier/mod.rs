//! Heuristic newsletter classification.
//!
//! This module contains the rule tables ([`RuleSet`]) and the compiled
//! scorer ([`Classifier`]). Rules are plain data: the built-in tables can be
//! replaced wholesale or in part by a JSON file.
//!
//! # Example
//!
//! ```ignore
//! use letterbox::classifier::{Classifier, RuleSet};
//!
//! let classifier = Classifier::new(RuleSet::default())?;
//! let result = classifier.classify(&message);
//! println!("{} ({}): {:?}", result.score, result.confidence, result.reasons);
//! ```

mod engine;
mod rules;

pub use engine::Classifier;
pub use rules::{RuleSet, Thresholds, Weights};

/// Result type alias for rule loading and compilation.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Errors raised while loading or compiling a rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A pattern in one of the rule lists is not a valid regular expression.
    #[error("invalid pattern in {list}: {source}")]
    InvalidPattern {
        /// Name of the rule list holding the pattern.
        list: &'static str,
        #[source]
        source: regex::Error,
    },

    /// Rule file could not be read.
    #[error("failed to read rules: {0}")]
    Io(#[from] std::io::Error),

    /// Rule file is not valid JSON for a rule set.
    #[error("failed to parse rules: {0}")]
    Parse(#[source] serde_json::Error),
}
