//! Gmail API adapter.
//!
//! This module provides a [`MailProvider`] implementation over the Gmail
//! REST API v1:
//! - `users.messages.list` for candidate search (Gmail search syntax)
//! - `users.messages.get?format=full` for message content
//! - `users.labels.list` / `users.labels.create` for the newsletter label
//! - `users.messages.modify` for relabelling
//!
//! Bodies arrive as base64url-encoded MIME parts nested to arbitrary depth;
//! they are flattened into a single [`CandidateMessage`] here.

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::http::ApiClient;
use super::{AdapterOptions, MailProvider, Result};
use crate::domain::{Address, CandidateMessage, MessageHeaders, MessageId, ProviderKind};

pub(crate) const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Largest page `users.messages.list` accepts.
const MAX_PAGE_SIZE: usize = 500;

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// Gmail API message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    payload: Option<GmailPart>,
    internal_date: Option<String>,
}

/// Gmail message part; the top-level payload has the same shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    headers: Option<Vec<GmailHeader>>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

/// Gmail API label.
#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LabelsListResponse {
    labels: Option<Vec<GmailLabel>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    label_list_visibility: &'a str,
    message_list_visibility: &'a str,
}

/// Gmail modify request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<String>,
}

/// Gmail REST adapter for one account.
pub struct GmailAdapter {
    api: ApiClient,
    options: AdapterOptions,
    /// Id of the newsletter label once looked up or created.
    label_id: Mutex<Option<String>>,
}

impl GmailAdapter {
    /// Creates an adapter authenticated with `access_token`.
    pub fn new(client: reqwest::Client, access_token: &str, options: AdapterOptions) -> Self {
        let base = options
            .base_url
            .clone()
            .unwrap_or_else(|| GMAIL_API_BASE.to_string());
        Self {
            api: ApiClient::new(client, base, access_token),
            options,
            label_id: Mutex::new(None),
        }
    }

    /// Returns the newsletter label id, creating the label if needed.
    async fn ensure_label(&self) -> Result<String> {
        let mut cached = self.label_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let name = self.options.label_name.as_str();
        let response: LabelsListResponse = self.api.get("/labels", &[]).await?;
        let existing = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name));

        let id = match existing {
            Some(label) => label.id,
            None => {
                let created: GmailLabel = self
                    .api
                    .post(
                        "/labels",
                        &CreateLabelRequest {
                            name,
                            label_list_visibility: "labelShow",
                            message_list_visibility: "show",
                        },
                    )
                    .await?;
                tracing::info!(label = %created.name, "created Gmail newsletter label");
                created.id
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

/// Appends the `after:` window to a Gmail search query.
fn windowed_query(query: &str, since: DateTime<Utc>) -> String {
    format!("{} after:{}", query.trim(), since.timestamp())
}

/// Decodes a Gmail body, tolerating padded and unpadded alphabets.
fn decode_body(data: &str) -> Option<String> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .or_else(|_| BASE64_URL_SAFE.decode(data))
        .or_else(|_| BASE64_STANDARD.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Recursively collects the first text/plain and text/html bodies.
fn collect_bodies(part: &GmailPart, text: &mut Option<String>, html: &mut Option<String>) {
    let mime = part
        .mime_type
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    let data = part.body.as_ref().and_then(|b| b.data.as_deref());

    if let Some(data) = data {
        if mime.starts_with("text/plain") && text.is_none() {
            *text = decode_body(data);
        } else if mime.starts_with("text/html") && html.is_none() {
            *html = decode_body(data);
        }
    }

    for nested in part.parts.iter().flatten() {
        collect_bodies(nested, text, html);
    }
}

/// Converts a Gmail message into the provider-neutral candidate shape.
fn normalize_message(msg: GmailMessage) -> CandidateMessage {
    let mut headers = MessageHeaders::new();
    let mut text = None;
    let mut html = None;

    if let Some(payload) = &msg.payload {
        for h in payload.headers.iter().flatten() {
            headers.insert(h.name.clone(), h.value.clone());
        }
        collect_bodies(payload, &mut text, &mut html);
    }

    let from = headers
        .get("From")
        .map(Address::parse)
        .unwrap_or_else(|| Address::new(""));
    let subject = headers.get("Subject").unwrap_or_default().to_string();

    let date = msg
        .internal_date
        .as_deref()
        .and_then(|d| d.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    CandidateMessage {
        id: MessageId::from(msg.id),
        headers,
        text_body: text.unwrap_or_default(),
        html_body: html.unwrap_or_default(),
        from_address: from.email,
        from_name: from.name,
        subject,
        date,
    }
}

#[async_trait]
impl MailProvider for GmailAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gmail
    }

    async fn search(&self, query: &str, since: DateTime<Utc>) -> Result<Vec<MessageId>> {
        let q = windowed_query(query, since);
        let limit = self.options.max_results_per_query;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let page_size = (limit - ids.len()).min(MAX_PAGE_SIZE);
            let mut params = vec![("q", q.clone()), ("maxResults", page_size.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response: MessageListResponse = self.api.get("/messages", &params).await?;
            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .map(|m| MessageId::from(m.id)),
            );

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(limit);
        Ok(ids)
    }

    async fn fetch(&self, id: &MessageId) -> Result<CandidateMessage> {
        let endpoint = format!("/messages/{}", id);
        let msg: GmailMessage = self
            .api
            .get(&endpoint, &[("format", "full".to_string())])
            .await?;
        Ok(normalize_message(msg))
    }

    async fn relabel(&self, id: &MessageId) -> Result<()> {
        let label_id = self.ensure_label().await?;
        let endpoint = format!("/messages/{}/modify", id);
        let request = ModifyRequest {
            add_label_ids: vec![label_id],
            remove_label_ids: vec!["INBOX".to_string()],
        };

        let _: serde_json::Value = self.api.post(&endpoint, &request).await?;
        tracing::debug!(message_id = %id, "relabelled Gmail message");
        Ok(())
    }
}
