//! Normalized candidate messages.
//!
//! Provider adapters turn Gmail and Graph payloads into a [`CandidateMessage`]
//! so the classifier never sees provider-specific shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{extract_domain, local_part, MessageId};

/// A single raw header as it appeared on the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name with its original casing.
    pub name: String,
    /// Raw header value.
    pub value: String,
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHeaders(Vec<Header>);

impl MessageHeaders {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping earlier values with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Returns the first value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns true if a header named `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over all headers in their original order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = MessageHeaders::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A fetched message awaiting classification.
///
/// Transient: produced by a provider fetch, consumed once by the classifier
/// and, when accepted, converted into a [`super::Newsletter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMessage {
    /// Provider message identifier.
    pub id: MessageId,
    /// Raw headers, including a synthetic `From` when the provider has none.
    #[serde(default)]
    pub headers: MessageHeaders,
    /// Plain-text body (may be empty).
    #[serde(default)]
    pub text_body: String,
    /// HTML body (may be empty).
    #[serde(default)]
    pub html_body: String,
    /// Bare sender address.
    pub from_address: String,
    /// Sender display name, if any.
    #[serde(default)]
    pub from_name: Option<String>,
    /// Subject line (empty when missing).
    #[serde(default)]
    pub subject: String,
    /// When the message was received.
    pub date: DateTime<Utc>,
}

impl CandidateMessage {
    /// Case-insensitive header accessor.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Lowercase domain of the sender address.
    pub fn sender_domain(&self) -> Option<String> {
        extract_domain(&self.from_address)
    }

    /// Lowercase local part of the sender address.
    pub fn sender_local_part(&self) -> Option<String> {
        local_part(&self.from_address)
    }

    /// Lowercase domain of the `Return-Path` header, if present.
    pub fn return_path_domain(&self) -> Option<String> {
        self.header("Return-Path").and_then(extract_domain)
    }

    /// Sender as shown to users: the display name, else the address.
    pub fn sender_display(&self) -> &str {
        self.from_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.from_address)
    }
}
