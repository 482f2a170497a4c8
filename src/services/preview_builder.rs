//! Groups classified candidates by sender domain.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::domain::{
    extract_domain, CandidateMessage, ClassificationResult, DomainPreview, PreviewSample,
};

/// Collects classified candidates into one [`DomainPreview`] per sender domain.
///
/// Each domain keeps its highest-scoring candidate as the sample; on a tie
/// the first one pushed stays. Candidates whose sender has no domain are
/// dropped.
#[derive(Debug, Default)]
pub struct DomainPreviewBuilder {
    domains: HashMap<String, DomainPreview>,
}

impl DomainPreviewBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds previews from a batch of classified candidates.
    pub fn from_classified(
        classified: impl IntoIterator<Item = (CandidateMessage, ClassificationResult)>,
    ) -> Vec<DomainPreview> {
        let mut builder = Self::new();
        for (message, result) in classified {
            builder.push(&message, result);
        }
        builder.build()
    }

    /// Adds one classified candidate.
    pub fn push(&mut self, message: &CandidateMessage, result: ClassificationResult) {
        let Some(domain) = extract_domain(&message.from_address) else {
            tracing::debug!(
                message_id = %message.id,
                from = %message.from_address,
                "no sender domain, leaving out of preview"
            );
            return;
        };

        match self.domains.entry(domain) {
            Entry::Occupied(mut entry) => {
                let preview = entry.get_mut();
                preview.message_count += 1;
                if result.score > preview.sample.score {
                    preview.sample = sample(message, result);
                }
            }
            Entry::Vacant(entry) => {
                let domain = entry.key().clone();
                entry.insert(DomainPreview {
                    domain,
                    sample: sample(message, result),
                    message_count: 1,
                });
            }
        }
    }

    /// Number of distinct domains collected so far.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Returns the previews ordered by sample score, highest first, then by
    /// domain.
    pub fn build(self) -> Vec<DomainPreview> {
        let mut previews: Vec<DomainPreview> = self.domains.into_values().collect();
        previews.sort_by(|a, b| {
            b.sample
                .score
                .cmp(&a.sample.score)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        previews
    }
}

fn sample(message: &CandidateMessage, result: ClassificationResult) -> PreviewSample {
    PreviewSample {
        message_id: message.id.clone(),
        subject: message.subject.clone(),
        sender: message.sender_display().to_string(),
        sender_email: message.from_address.clone(),
        date: message.date,
        score: result.score,
        confidence: result.confidence,
        reasons: result.reasons,
    }
}
