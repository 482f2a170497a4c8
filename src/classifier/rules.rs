//! Weighted rule tables for the newsletter classifier.
//!
//! Every weight, cap, threshold and pattern list lives in a [`RuleSet`], so
//! the heuristics can be tuned from a JSON file without touching code. The
//! built-in values are empirical starting points, not calibrated constants.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{Result, RuleError};
use crate::domain::Confidence;

/// Points awarded (or deducted) by each check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub platform_domain: i32,
    pub issue_subject: i32,
    pub broadcast_sender: i32,
    pub strong_indicator: i32,
    pub list_unsubscribe: i32,
    /// Per matching secondary header.
    pub secondary_header: i32,
    pub secondary_header_cap: i32,
    pub bulk_service_domain: i32,
    /// Per matching structural pattern.
    pub structural_pattern: i32,
    pub structural_cap: i32,
    pub marketing_language: i32,
    pub automated_sender: i32,
    pub link_density: i32,
    pub html_heavy: i32,
    pub personal_domain: i32,
    pub short_content: i32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            platform_domain: 50,
            issue_subject: 30,
            broadcast_sender: 35,
            strong_indicator: 40,
            list_unsubscribe: 30,
            secondary_header: 10,
            secondary_header_cap: 30,
            bulk_service_domain: 25,
            structural_pattern: 10,
            structural_cap: 25,
            marketing_language: 15,
            automated_sender: 10,
            link_density: 10,
            html_heavy: 8,
            personal_domain: -30,
            short_content: -20,
        }
    }
}

/// Numeric thresholds used by the structural checks and banding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Link count above which the link-density check fires.
    pub min_links: usize,
    /// HTML body must exceed this multiple of the text body length.
    pub html_to_text_ratio: usize,
    /// Combined text+HTML length below which content counts as short.
    pub min_content_chars: usize,
    /// Lowest score banded as high confidence.
    pub high_confidence: i32,
    /// Lowest score banded as medium confidence.
    pub medium_confidence: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_links: 5,
            html_to_text_ratio: 2,
            min_content_chars: 100,
            high_confidence: 60,
            medium_confidence: 40,
        }
    }
}

/// Complete, serializable classifier configuration.
///
/// Pattern lists are case-insensitive regular expressions. Domain lists
/// match the sender domain exactly or as a parent domain
/// (`mail.substack.com` matches `substack.com`), except personal domains
/// which must match exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub weights: Weights,
    pub thresholds: Thresholds,
    /// Subject/body patterns that veto a message outright.
    pub disqualifiers: Vec<String>,
    pub platform_domains: Vec<String>,
    pub issue_patterns: Vec<String>,
    /// Matched against the sender local part.
    pub broadcast_senders: Vec<String>,
    pub strong_indicators: Vec<String>,
    /// Header names worth `weights.secondary_header` each.
    pub secondary_headers: Vec<String>,
    pub bulk_service_domains: Vec<String>,
    /// Each matching pattern is worth `weights.structural_pattern`.
    pub structural_patterns: Vec<String>,
    pub marketing_terms: Vec<String>,
    /// Matched against the sender local part.
    pub automated_senders: Vec<String>,
    pub personal_domains: Vec<String>,
}

impl RuleSet {
    /// Loads a rule set from a JSON file.
    ///
    /// Fields missing from the file keep their built-in values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parses a rule set from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(RuleError::Parse)
    }

    /// Maps a score onto its confidence band.
    pub fn confidence_for(&self, score: i32) -> Confidence {
        if score >= self.thresholds.high_confidence {
            Confidence::High
        } else if score >= self.thresholds.medium_confidence {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            thresholds: Thresholds::default(),
            disqualifiers: strings(&[
                // Job boards
                r"\bjob alert",
                r"\bnew jobs? (for you|matching)",
                r"\bjobs? you may be interested in",
                r"\byour application (to|for|was)",
                // Professional and social networks
                r"\bwants to connect\b",
                r"\b(sent you|pending) (a )?connection requests?\b",
                r"\binvitation to connect",
                r"\baccepted your invitation",
                r"\b(commented on|liked|reacted to|replied to) your (post|photo|comment|story)",
                r"\b(mentioned|tagged) you in (a|an|the|their|his|her) (post|comment|photo|story|thread)",
                r"\byou have (a |\d+ )?new followers?\b",
                r"\bstarted following you\b",
                r"\bsent you a (message|friend request)",
                // Transactional: second-person or leading phrasing only, so
                // newsletter prose about orders and releases is not vetoed.
                r"^(your )?(order|shipping|booking) confirmation\b",
                r"\bthank you for your (order|purchase)\b",
                r"\byour order (#|number|has|is)",
                r"\byour (payment|purchase) (receipt|confirmation|was received|has been received)",
                r"^(payment|purchase) receipt\b",
                r"\breceipt (for|from) your",
                r"\byour (order|package|parcel|item|shipment)s? (has|have) (been )?shipped\b",
                r"\breset your password\b",
                r"\bpassword reset (request|link|code)\b",
                r"\bverify your (email|account)",
                r"\byour (security|verification|one-time|login) code (is|:)",
                // Calendar
                r"^(updated )?invitation: .+@",
                r"^(accepted|declined|tentative(ly accepted)?): ",
                r"\bhas invited you to (an? )?(event|meeting)\b",
            ]),
            platform_domains: strings(&[
                "substack.com",
                "beehiiv.com",
                "buttondown.email",
                "convertkit.com",
                "ck.page",
                "ghost.io",
                "getrevue.co",
                "tinyletter.com",
                "mailerlite.com",
                "letterdrop.com",
                "curated.co",
                "medium.com",
            ]),
            issue_patterns: strings(&[
                r"\b(issue|edition|volume|vol\.?|no\.?|episode)\s*#?\s*\d+",
                r"#\d+\b",
                r"\b(daily|weekly|monthly|morning|evening|sunday|friday)\s+(digest|roundup|briefing|brief|recap|edition|update|dispatch)\b",
                r"\bdigest\b",
                r"\bthis week in\b",
            ]),
            broadcast_senders: strings(&[
                r"^(hello|hi|hey|team|updates?|digest|news|newsletters?|editors?|editorial|weekly|daily|letters?|crew|community|info|contact|subscriptions?|insider|briefing|dispatch)$",
                r"^no-?reply$",
                r"^(news|newsletter|digest|updates?)[._-]",
            ]),
            strong_indicators: strings(&[
                r"\bnewsletters?\b",
                r"\bdigest\b",
                r"\bunsubscribe\b",
                r"\bsubscription\b",
                r"\bissue\s*#\s*\d+",
                r"\bmanage (your )?(email )?preferences\b",
                r"\byou('| a)re receiving this (email|because)\b",
            ]),
            secondary_headers: strings(&[
                "List-Help",
                "List-Archive",
                "List-Subscribe",
                "List-Owner",
                "List-Post",
                "Precedence",
                "X-Campaign",
                "X-Campaign-Id",
                "X-CampaignID",
                "X-Mailchimp-Campaign",
                "X-MC-User",
                "X-Mailgun-Tag",
                "X-SES-Outgoing",
                "Feedback-ID",
            ]),
            bulk_service_domains: strings(&[
                "mailchimp.com",
                "mcsv.net",
                "mcdlv.net",
                "rsgsv.net",
                "list-manage.com",
                "mandrillapp.com",
                "sendgrid.net",
                "sendgrid.com",
                "mailgun.org",
                "mailgun.net",
                "amazonses.com",
                "sparkpostmail.com",
                "constantcontact.com",
                "createsend.com",
                "cmail19.com",
                "cmail20.com",
                "klaviyomail.com",
                "hubspotemail.net",
                "postmarkapp.com",
                "sendinblue.com",
                "brevo.com",
                "mailjet.com",
                "exacttarget.com",
                "emarsys.net",
            ]),
            structural_patterns: strings(&[
                r"\b(click here to |to )?unsubscribe (from|here|at any time)|\bopt[ -]out\b|\bno longer wish to receive\b",
                r"\bview (this email |it )?(in|on) (your|a|the) (web )?browser\b|\bview (online|as a web ?page)\b",
                r"\bforward (this|it) to a friend\b|\bshare this (newsletter|email)\b",
            ]),
            marketing_terms: strings(&[
                r"\bpromotional\b",
                r"\bexclusive (offer|deal|discount)",
                r"\blimited[- ]time\b",
                r"\bspecial offer\b",
                r"\d+% off\b",
                r"\bpromo code\b",
                r"\bshop now\b",
                r"\bsale ends\b",
            ]),
            automated_senders: strings(&[
                r"no-?reply",
                r"do-?not-?reply",
                r"^system$",
                r"^notifications?$",
                r"^(alerts?|mailer|bounce|automated|auto)[._-]?",
            ]),
            personal_domains: strings(&[
                "gmail.com",
                "googlemail.com",
                "outlook.com",
                "hotmail.com",
                "live.com",
                "msn.com",
                "yahoo.com",
                "ymail.com",
                "icloud.com",
                "me.com",
                "mac.com",
                "aol.com",
                "protonmail.com",
                "proton.me",
                "gmx.com",
                "mail.com",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn default_bands() {
        let rules = RuleSet::default();
        assert_eq!(rules.confidence_for(60), Confidence::High);
        assert_eq!(rules.confidence_for(59), Confidence::Medium);
        assert_eq!(rules.confidence_for(40), Confidence::Medium);
        assert_eq!(rules.confidence_for(39), Confidence::Low);
        assert_eq!(rules.confidence_for(-50), Confidence::Low);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let rules = RuleSet::from_json(r#"{"weights": {"list_unsubscribe": 45}}"#).unwrap();
        assert_eq!(rules.weights.list_unsubscribe, 45);
        assert_eq!(rules.weights.platform_domain, 50);
        assert_eq!(rules.personal_domains, RuleSet::default().personal_domains);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"thresholds": {{"high_confidence": 80}}}}"#).unwrap();

        let rules = RuleSet::load(file.path()).unwrap();
        assert_eq!(rules.thresholds.high_confidence, 80);
        assert_eq!(rules.confidence_for(70), Confidence::Medium);
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = RuleSet::from_json("{not json").unwrap_err();
        assert!(matches!(err, RuleError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RuleSet::load(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, RuleError::Io(_)));
    }
}
