//! Newsletter scoring engine.
//!
//! [`Classifier`] compiles a [`RuleSet`] once and then scores messages with
//! an additive point system:
//!
//! 1. **Disqualification gate** -- job alerts, social notifications, receipts
//!    and calendar invites are vetoed to score 0.
//! 2. **Additive checks** -- sender, subject, header and content signals.
//! 3. **Subtractive checks** -- personal webmail senders and near-empty bodies.
//! 4. **Banding** -- the net score maps onto a [`Confidence`].
//!
//! Whether a score is high enough to import is decided by the caller.

use regex::{Regex, RegexSet};

use super::{Result, RuleError, RuleSet};
use crate::domain::{CandidateMessage, ClassificationResult, Confidence};

/// Compiled newsletter classifier.
///
/// `classify` is pure: the same message and rule set always produce the
/// same score, confidence and reasons.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleSet,
    disqualifiers: RegexSet,
    issue_patterns: RegexSet,
    broadcast_senders: RegexSet,
    strong_indicators: RegexSet,
    structural_patterns: RegexSet,
    marketing_terms: RegexSet,
    automated_senders: RegexSet,
    plain_url: Regex,
    anchor_tag: Regex,
}

fn compile_set(list: &'static str, patterns: &[String]) -> Result<RegexSet> {
    let patterns: Vec<String> = patterns.iter().map(|p| format!("(?i){p}")).collect();
    RegexSet::new(&patterns).map_err(|source| RuleError::InvalidPattern { list, source })
}

fn compile(list: &'static str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidPattern { list, source })
}

/// True if `domain` equals `listed` or is a subdomain of it.
fn domain_matches(domain: &str, listed: &str) -> bool {
    let listed = listed.trim().to_lowercase();
    domain == listed
        || domain
            .strip_suffix(&listed)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl Classifier {
    /// Compiles `rules` into a classifier.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] naming the offending list if any
    /// pattern fails to compile.
    pub fn new(rules: RuleSet) -> Result<Self> {
        Ok(Self {
            disqualifiers: compile_set("disqualifiers", &rules.disqualifiers)?,
            issue_patterns: compile_set("issue_patterns", &rules.issue_patterns)?,
            broadcast_senders: compile_set("broadcast_senders", &rules.broadcast_senders)?,
            strong_indicators: compile_set("strong_indicators", &rules.strong_indicators)?,
            structural_patterns: compile_set("structural_patterns", &rules.structural_patterns)?,
            marketing_terms: compile_set("marketing_terms", &rules.marketing_terms)?,
            automated_senders: compile_set("automated_senders", &rules.automated_senders)?,
            plain_url: compile("plain_url", r"(?i)\bhttps?://[^\s<>\x22']+")?,
            anchor_tag: compile("anchor_tag", r"(?i)<a\s[^>]*\bhref\s*=")?,
            rules,
        })
    }

    /// Builds a classifier over the built-in rule tables.
    pub fn with_default_rules() -> Result<Self> {
        Self::new(RuleSet::default())
    }

    /// Returns the rule set this classifier was built from.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Maps a score onto its confidence band.
    pub fn confidence_for(&self, score: i32) -> Confidence {
        self.rules.confidence_for(score)
    }

    /// Scores a message.
    ///
    /// Never fails. Reasons are listed in the order the checks run.
    pub fn classify(&self, message: &CandidateMessage) -> ClassificationResult {
        if self.is_disqualified(message) {
            return ClassificationResult::disqualified();
        }

        let w = &self.rules.weights;
        let t = &self.rules.thresholds;
        let mut score = 0i32;
        let mut reasons = Vec::new();
        let mut add = |points: i32, reason: String| {
            score += points;
            reasons.push(reason);
        };

        let domain = message.sender_domain().unwrap_or_default();
        let local = message.sender_local_part().unwrap_or_default();
        let content = format!(
            "{}\n{}\n{}",
            message.subject, message.text_body, message.html_body
        );

        if let Some(platform) = self.find_domain(&domain, &self.rules.platform_domains) {
            add(w.platform_domain, format!("sent from newsletter platform {platform}"));
        }

        if self.issue_patterns.is_match(&message.subject) {
            add(w.issue_subject, "issue or digest numbering in subject".to_string());
        }

        if !local.is_empty() && self.broadcast_senders.is_match(&local) {
            add(w.broadcast_sender, format!("broadcast sender address {local}@"));
        }

        if self.strong_indicators.is_match(&content) {
            add(w.strong_indicator, "newsletter keywords in content".to_string());
        }

        if message.headers.contains("List-Unsubscribe") {
            add(w.list_unsubscribe, "List-Unsubscribe header".to_string());
        }

        let secondary = self
            .rules
            .secondary_headers
            .iter()
            .filter(|name| message.headers.contains(name))
            .count();
        if secondary > 0 {
            let points = (w.secondary_header * secondary as i32).min(w.secondary_header_cap);
            add(points, format!("{secondary} mailing-list header(s)"));
        }

        let bulk = self
            .find_domain(&domain, &self.rules.bulk_service_domains)
            .or_else(|| {
                message
                    .return_path_domain()
                    .and_then(|rp| self.find_domain(&rp, &self.rules.bulk_service_domains))
            });
        if let Some(service) = bulk {
            add(w.bulk_service_domain, format!("sent through bulk email service {service}"));
        }

        let structural = self.structural_patterns.matches(&content).iter().count();
        if structural > 0 {
            let points = (w.structural_pattern * structural as i32).min(w.structural_cap);
            add(points, format!("{structural} newsletter layout pattern(s)"));
        }

        if self.marketing_terms.is_match(&content) {
            add(w.marketing_language, "marketing language".to_string());
        }

        if !local.is_empty() && self.automated_senders.is_match(&local) {
            add(w.automated_sender, "automated sender address".to_string());
        }

        let links = self.link_count(message);
        if links > t.min_links {
            add(w.link_density, format!("{links} links"));
        }

        let text_len = message.text_body.chars().count();
        let html_len = message.html_body.chars().count();
        if html_len > text_len * t.html_to_text_ratio {
            add(w.html_heavy, "HTML-heavy body".to_string());
        }

        if self
            .rules
            .personal_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&domain))
        {
            add(w.personal_domain, format!("personal email domain {domain}"));
        }

        if text_len + html_len < t.min_content_chars {
            add(w.short_content, "very short content".to_string());
        }

        let confidence = self.rules.confidence_for(score);
        tracing::debug!(
            message_id = %message.id,
            score,
            confidence = %confidence,
            "classified message"
        );

        ClassificationResult {
            score,
            confidence,
            reasons,
        }
    }

    fn is_disqualified(&self, message: &CandidateMessage) -> bool {
        [&message.subject, &message.text_body, &message.html_body]
            .into_iter()
            .any(|part| self.disqualifiers.is_match(part.trim()))
    }

    fn find_domain<'a>(&self, domain: &str, list: &'a [String]) -> Option<&'a str> {
        if domain.is_empty() {
            return None;
        }
        list.iter()
            .find(|listed| domain_matches(domain, listed))
            .map(String::as_str)
    }

    /// Plain-text URLs or HTML anchors, whichever is greater.
    fn link_count(&self, message: &CandidateMessage) -> usize {
        let plain = self.plain_url.find_iter(&message.text_body).count();
        let anchors = self.anchor_tag.find_iter(&message.html_body).count();
        plain.max(anchors)
    }
}
