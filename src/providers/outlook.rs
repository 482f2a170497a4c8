//! Microsoft Graph (Outlook) adapter.
//!
//! Uses Graph v1.0:
//! - `GET /me/messages?$filter=...` for candidate search (OData filters)
//! - `GET /me/messages/{id}` with `internetMessageHeaders` for content
//! - `GET/POST /me/mailFolders` for the newsletter folder
//! - `POST /me/messages/{id}/move` for relabelling
//!
//! Graph returns a single body in either text or HTML form. HTML bodies are
//! rendered to text with `html2text` so both classifier inputs are filled.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::http::ApiClient;
use super::{AdapterOptions, MailProvider, Result};
use crate::domain::{CandidateMessage, MessageHeaders, MessageId, ProviderKind};

pub(crate) const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const MESSAGE_SELECT_FIELDS: &str =
    "id,subject,from,body,receivedDateTime,internetMessageHeaders";

/// Largest `$top` Graph honours for message lists.
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct GraphIdPage {
    value: Vec<GraphIdOnly>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphIdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    body: Option<GraphBody>,
    received_date_time: Option<String>,
    internet_message_headers: Option<Vec<GraphHeader>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    name: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMailFolder {
    id: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct GraphMailFolderPage {
    value: Vec<GraphMailFolder>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderRequest<'a> {
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest<'a> {
    destination_id: &'a str,
}

/// Graph adapter for one Outlook / Microsoft 365 mailbox.
pub struct OutlookAdapter {
    api: ApiClient,
    options: AdapterOptions,
    folder_id: Mutex<Option<String>>,
}

impl OutlookAdapter {
    /// Creates an adapter authenticated with `access_token`.
    pub fn new(client: reqwest::Client, access_token: &str, options: AdapterOptions) -> Self {
        let base = options
            .base_url
            .clone()
            .unwrap_or_else(|| GRAPH_API_BASE.to_string());
        Self {
            api: ApiClient::new(client, base, access_token),
            options,
            folder_id: Mutex::new(None),
        }
    }

    /// Returns the newsletter folder id, creating the folder if needed.
    async fn ensure_folder(&self) -> Result<String> {
        let mut cached = self.folder_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let name = self.options.label_name.as_str();
        let filter = format!("displayName eq '{}'", odata_escape(name));
        let page: GraphMailFolderPage = self
            .api
            .get("/me/mailFolders", &[("$filter", filter)])
            .await?;

        let id = match page
            .value
            .into_iter()
            .find(|f| f.display_name.eq_ignore_ascii_case(name))
        {
            Some(folder) => folder.id,
            None => {
                let created: GraphMailFolder = self
                    .api
                    .post("/me/mailFolders", &CreateFolderRequest { display_name: name })
                    .await?;
                tracing::info!(folder = %created.display_name, "created Outlook newsletter folder");
                created.id
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

/// Doubles single quotes for use inside an OData string literal.
fn odata_escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Restricts an OData filter to messages received since `since`.
fn windowed_filter(filter: &str, since: DateTime<Utc>) -> String {
    let window = format!(
        "receivedDateTime ge {}",
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let filter = filter.trim();
    if filter.is_empty() {
        window
    } else {
        format!("{window} and ({filter})")
    }
}

/// Renders an HTML body to plain text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 120)
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Converts a Graph message into the provider-neutral candidate shape.
fn normalize_message(msg: GraphMessage) -> CandidateMessage {
    let mut headers: MessageHeaders = msg
        .internet_message_headers
        .unwrap_or_default()
        .into_iter()
        .map(|h| (h.name, h.value))
        .collect();

    let (from_address, from_name) = msg
        .from
        .and_then(|r| r.email_address)
        .map(|e| (e.address.unwrap_or_default(), e.name.filter(|n| !n.is_empty())))
        .unwrap_or_default();
    let subject = msg.subject.unwrap_or_default();

    // Graph omits headers for some items; rebuild the ones the classifier reads.
    if !headers.contains("From") && !from_address.is_empty() {
        let value = match &from_name {
            Some(name) => format!("\"{}\" <{}>", name, from_address),
            None => from_address.clone(),
        };
        headers.insert("From", value);
    }
    if !headers.contains("Subject") {
        headers.insert("Subject", subject.clone());
    }

    let (text_body, html_body) = match msg.body {
        Some(GraphBody {
            content_type,
            content: Some(content),
        }) => {
            let is_html = content_type
                .as_deref()
                .is_some_and(|kind| kind.eq_ignore_ascii_case("html"));
            if is_html {
                (html_to_text(&content), content)
            } else {
                (content, String::new())
            }
        }
        _ => (String::new(), String::new()),
    };

    let date = msg
        .received_date_time
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    CandidateMessage {
        id: MessageId::from(msg.id),
        headers,
        text_body,
        html_body,
        from_address,
        from_name,
        subject,
        date,
    }
}

#[async_trait]
impl MailProvider for OutlookAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Outlook
    }

    async fn search(&self, query: &str, since: DateTime<Utc>) -> Result<Vec<MessageId>> {
        let limit = self.options.max_results_per_query;
        let mut ids = Vec::new();

        let first_query = vec![
            ("$filter", windowed_filter(query, since)),
            ("$select", "id".to_string()),
            ("$top", limit.min(MAX_PAGE_SIZE).to_string()),
        ];
        let mut page: GraphIdPage = self.api.get("/me/messages", &first_query).await?;

        loop {
            ids.extend(page.value.into_iter().map(|m| MessageId::from(m.id)));
            if ids.len() >= limit {
                break;
            }
            match page.next_link {
                // nextLink already carries every query parameter.
                Some(next) => page = self.api.get(&next, &[]).await?,
                None => break,
            }
        }

        ids.truncate(limit);
        Ok(ids)
    }

    async fn fetch(&self, id: &MessageId) -> Result<CandidateMessage> {
        let endpoint = format!("/me/messages/{}", id);
        let msg: GraphMessage = self
            .api
            .get(&endpoint, &[("$select", MESSAGE_SELECT_FIELDS.to_string())])
            .await?;
        Ok(normalize_message(msg))
    }

    async fn relabel(&self, id: &MessageId) -> Result<()> {
        let folder_id = self.ensure_folder().await?;
        let endpoint = format!("/me/messages/{}/move", id);

        let _: serde_json::Value = self
            .api
            .post(&endpoint, &MoveRequest { destination_id: &folder_id })
            .await?;
        tracing::debug!(message_id = %id, "moved Outlook message to newsletter folder");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_server::{Recorded, Reply, TestServer};
    use pretty_assertions::assert_eq;

    fn adapter(server: &TestServer, max_results_per_query: usize) -> OutlookAdapter {
        let options = AdapterOptions {
            base_url: Some(server.base_url()),
            max_results_per_query,
            ..AdapterOptions::default()
        };
        OutlookAdapter::new(TestServer::client(), "graph-token", options)
    }

    /// Serves `/me/messages` as three pages linked by absolute nextLinks.
    fn paged_messages(req: &Recorded) -> Reply {
        let host = req.header("host").unwrap_or_default().to_string();
        let next = |token: u32| format!("http://{host}/me/messages?$skiptoken={token}");
        match req.query("$skiptoken").as_deref() {
            None => Reply::json(serde_json::json!({
                "value": [{"id": "a"}, {"id": "b"}],
                "@odata.nextLink": next(2)
            })),
            Some("2") => Reply::json(serde_json::json!({
                "value": [{"id": "c"}, {"id": "d"}],
                "@odata.nextLink": next(3)
            })),
            Some(_) => Reply::json(serde_json::json!({"value": [{"id": "e"}]})),
        }
    }

    fn ids(ids: &[&str]) -> Vec<MessageId> {
        ids.iter().map(|id| MessageId::from(*id)).collect()
    }

    #[test]
    fn normalizes_html_message_with_headers() {
        let json = serde_json::json!({
            "id": "AAMkAD1",
            "subject": "The Download: issue 88",
            "receivedDateTime": "2024-03-01T08:30:00Z",
            "from": {"emailAddress": {"name": "MIT Tech Review", "address": "newsletters@technologyreview.com"}},
            "body": {"contentType": "html", "content": "<html><body><p>Hello readers</p></body></html>"},
            "internetMessageHeaders": [
                {"name": "List-Unsubscribe", "value": "<mailto:u@technologyreview.com>"},
                {"name": "From", "value": "MIT Tech Review <newsletters@technologyreview.com>"}
            ]
        });
        let msg = normalize_message(serde_json::from_value(json).unwrap());

        assert_eq!(msg.id.as_str(), "AAMkAD1");
        assert_eq!(msg.from_address, "newsletters@technologyreview.com");
        assert_eq!(msg.from_name.as_deref(), Some("MIT Tech Review"));
        assert!(msg.text_body.contains("Hello readers"));
        assert!(msg.html_body.starts_with("<html>"));
        assert!(msg.header("list-unsubscribe").is_some());
        assert_eq!(msg.header("subject"), Some("The Download: issue 88"));
        assert_eq!(msg.date.to_rfc3339(), "2024-03-01T08:30:00+00:00");
    }

    #[test]
    fn synthesizes_from_header_when_missing() {
        let json = serde_json::json!({
            "id": "AAMkAD2",
            "from": {"emailAddress": {"name": "", "address": "alerts@example.com"}},
            "body": {"contentType": "text", "content": "plain content"}
        });
        let msg = normalize_message(serde_json::from_value(json).unwrap());

        assert_eq!(msg.header("From"), Some("alerts@example.com"));
        assert!(msg.from_name.is_none());
        assert_eq!(msg.text_body, "plain content");
        assert_eq!(msg.html_body, "");
        assert_eq!(msg.subject, "");
    }

    #[test]
    fn windowed_filter_wraps_user_filter() {
        let since = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            windowed_filter("contains(subject,'digest')", since),
            "receivedDateTime ge 2023-11-14T22:13:20Z and (contains(subject,'digest'))"
        );
        assert_eq!(
            windowed_filter("  ", since),
            "receivedDateTime ge 2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn odata_escape_doubles_quotes() {
        assert_eq!(odata_escape("Reader's Digest"), "Reader''s Digest");
    }

    #[test]
    fn parses_paged_id_list() {
        let json = serde_json::json!({
            "value": [{"id": "a"}, {"id": "b"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/messages?$skip=2"
        });
        let page: GraphIdPage = serde_json::from_value(json).unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(page.next_link.is_some());
    }

    // ========================================================================
    // Against a local server
    // ========================================================================

    #[tokio::test]
    async fn search_follows_next_links_up_to_limit() {
        let server = TestServer::start(paged_messages).await;
        let since = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let found = adapter(&server, 3).search("", since).await.unwrap();

        assert_eq!(found, ids(&["a", "b", "c"]));
        let requests = server.requests_to("GET", "/me/messages");
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].query("$filter").as_deref(),
            Some("receivedDateTime ge 2023-11-14T22:13:20Z")
        );
        assert_eq!(requests[0].query("$select").as_deref(), Some("id"));
        assert_eq!(requests[0].query("$top").as_deref(), Some("3"));
        assert_eq!(requests[1].query("$skiptoken").as_deref(), Some("2"));
        assert_eq!(requests[1].query("$filter"), None);
        assert_eq!(requests[1].header("authorization"), Some("Bearer graph-token"));
    }

    #[tokio::test]
    async fn search_reads_every_page_under_limit() {
        let server = TestServer::start(paged_messages).await;

        let found = adapter(&server, 100)
            .search("", DateTime::<Utc>::default())
            .await
            .unwrap();

        assert_eq!(found, ids(&["a", "b", "c", "d", "e"]));
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn search_does_not_follow_link_once_limit_is_met() {
        let server = TestServer::start(paged_messages).await;

        let found = adapter(&server, 2)
            .search("", DateTime::<Utc>::default())
            .await
            .unwrap();

        assert_eq!(found, ids(&["a", "b"]));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn relabel_creates_folder_once() {
        let server = TestServer::start(|req| {
            if req.is("GET", "/me/mailFolders") {
                Reply::json(serde_json::json!({"value": []}))
            } else if req.is("POST", "/me/mailFolders") {
                Reply::json(serde_json::json!({"id": "folder-1", "displayName": "Newsletters"}))
            } else {
                Reply::json(serde_json::json!({"id": "moved"}))
            }
        })
        .await;
        let outlook = adapter(&server, 10);

        outlook.relabel(&MessageId::from("m1")).await.unwrap();
        outlook.relabel(&MessageId::from("m2")).await.unwrap();

        let lookups = server.requests_to("GET", "/me/mailFolders");
        assert_eq!(lookups.len(), 1);
        assert_eq!(
            lookups[0].query("$filter").as_deref(),
            Some("displayName eq 'Newsletters'")
        );
        let created = server.requests_to("POST", "/me/mailFolders");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].json(), serde_json::json!({"displayName": "Newsletters"}));

        let moved = server.requests_to("POST", "/me/messages/m2/move");
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].json(), serde_json::json!({"destinationId": "folder-1"}));
    }

    #[tokio::test]
    async fn relabel_uses_existing_folder() {
        let server = TestServer::start(|req| {
            if req.is("GET", "/me/mailFolders") {
                Reply::json(serde_json::json!({
                    "value": [{"id": "folder-7", "displayName": "Newsletters"}]
                }))
            } else {
                Reply::json(serde_json::json!({}))
            }
        })
        .await;

        adapter(&server, 10)
            .relabel(&MessageId::from("m1"))
            .await
            .unwrap();

        assert!(server.requests_to("POST", "/me/mailFolders").is_empty());
        let moved = server.requests_to("POST", "/me/messages/m1/move");
        assert_eq!(moved[0].json(), serde_json::json!({"destinationId": "folder-7"}));
    }
}
