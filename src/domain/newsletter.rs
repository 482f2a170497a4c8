//! Persisted newsletter records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, CandidateMessage, MessageId, NewsletterId, UserId};

/// An imported newsletter.
///
/// At most one row exists per `(email_account_id, message_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: NewsletterId,
    pub user_id: UserId,
    pub email_account_id: AccountId,
    /// Provider message id; the dedup key within an account.
    pub message_id: MessageId,
    /// Sender display name, or the address when there is none.
    pub sender: String,
    pub sender_email: String,
    pub subject: String,
    /// Plain-text content.
    pub content: String,
    pub html_content: Option<String>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Newsletter {
    /// Builds a new record from an accepted candidate.
    pub fn from_candidate(
        user_id: &UserId,
        account_id: &AccountId,
        message: &CandidateMessage,
        now: DateTime<Utc>,
    ) -> Self {
        let html_content = if message.html_body.is_empty() {
            None
        } else {
            Some(message.html_body.clone())
        };

        Self {
            id: NewsletterId(format!("nl-{}", uuid::Uuid::new_v4())),
            user_id: user_id.clone(),
            email_account_id: account_id.clone(),
            message_id: message.id.clone(),
            sender: message.sender_display().to_string(),
            sender_email: message.from_address.clone(),
            subject: message.subject.clone(),
            content: message.text_body.clone(),
            html_content,
            received_at: message.date,
            created_at: now,
        }
    }
}
