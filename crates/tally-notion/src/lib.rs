//! Notion API integration for tally.
//!
//! Each delivered work period becomes one page in a Notion database, with a
//! title property and a date-range property.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use tally_core::DeliveryRecord;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const NOTION_API_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion client errors.
#[derive(Debug, Error)]
pub enum NotionError {
    /// The provided token was invalid.
    #[error("invalid Notion token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("Notion API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Names of the database properties a page is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNames {
    pub title: String,
    pub date: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Name".to_string(),
            date: "Date".to_string(),
        }
    }
}

/// A work period as it is written to Notion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodPage {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&DeliveryRecord> for PeriodPage {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            title: record.title.clone(),
            start: record.start,
            end: record.end,
        }
    }
}

/// Notion API client.
///
/// Clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given integration token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(token: impl Into<String>) -> Result<Self, NotionError> {
        let token = token.into();

        if token.is_empty() {
            return Err(NotionError::InvalidToken {
                reason: "token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(NotionError::InvalidToken {
                reason: "token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(NotionError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            base_url: NOTION_API_URL.to_string(),
        })
    }

    /// Points the client at another API host (used for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Creates a page for `page` in the given database, returning the page id.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: &PropertyNames,
        page: &PeriodPage,
    ) -> Result<String, NotionError> {
        let body = build_page_body(database_id, properties, page);

        let response = self
            .http
            .post(format!("{}/v1/pages", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(NotionError::Api {
                status: status.as_u16(),
                message: parse_api_error(&text).unwrap_or(text),
            });
        }

        let created: CreatedPage = serde_json::from_str(&text)
            .map_err(|err| NotionError::InvalidResponse(err.to_string()))?;
        tracing::debug!(page_id = %created.id, "created Notion page");
        Ok(created.id)
    }
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

fn parse_api_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.message)
}

fn build_page_body(database_id: &str, properties: &PropertyNames, page: &PeriodPage) -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        properties.title.clone(),
        json!({ "title": [{ "text": { "content": page.title } }] }),
    );
    props.insert(
        properties.date.clone(),
        json!({
            "date": {
                "start": page.start.to_rfc3339_opts(SecondsFormat::Millis, true),
                "end": page.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            }
        }),
    );

    json!({
        "parent": { "database_id": database_id },
        "properties": props,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::Matcher;

    fn page() -> PeriodPage {
        let start = DateTime::parse_from_rfc3339("2025-01-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        PeriodPage {
            title: "⏳ 25".to_string(),
            start,
            end: start + chrono::Duration::minutes(25),
        }
    }

    #[test]
    fn client_rejects_empty_token() {
        assert!(matches!(
            Client::new(""),
            Err(NotionError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_rejects_whitespace_token() {
        assert!(matches!(
            Client::new("   "),
            Err(NotionError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_debug_redacts_token() {
        let client = Client::new("secret_abc").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret_abc"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn page_body_uses_configured_properties() {
        let properties = PropertyNames {
            title: "Task".to_string(),
            date: "When".to_string(),
        };
        let body = build_page_body("db-1", &properties, &page());

        assert_eq!(body["parent"]["database_id"], "db-1");
        assert_eq!(
            body["properties"]["Task"]["title"][0]["text"]["content"],
            "⏳ 25"
        );
        assert_eq!(
            body["properties"]["When"]["date"]["start"],
            "2025-01-29T12:00:00.000Z"
        );
        assert_eq!(
            body["properties"]["When"]["date"]["end"],
            "2025-01-29T12:25:00.000Z"
        );
    }

    #[test]
    fn page_from_delivery_record() {
        let record = DeliveryRecord {
            title: "⏳ 7".to_string(),
            start: page().start,
            end: page().start + chrono::Duration::minutes(7),
        };
        let converted = PeriodPage::from(&record);
        assert_eq!(converted.title, "⏳ 7");
        assert_eq!(converted.end - converted.start, chrono::Duration::minutes(7));
    }

    #[tokio::test]
    async fn create_page_posts_to_pages_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/pages")
            .match_header("authorization", "Bearer secret_abc")
            .match_header("notion-version", NOTION_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "parent": { "database_id": "db-1" },
                "properties": { "Date": { "date": { "start": "2025-01-29T12:00:00.000Z" } } }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"object":"page","id":"page-123"}"#)
            .create_async()
            .await;

        let client = Client::new("secret_abc").unwrap().with_base_url(server.url());
        let id = client
            .create_page("db-1", &PropertyNames::default(), &page())
            .await
            .unwrap();

        assert_eq!(id, "page-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_page_surfaces_api_error_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/pages")
            .with_status(400)
            .with_body(
                r#"{"object":"error","status":400,"code":"validation_error","message":"Date is not a property that exists."}"#,
            )
            .create_async()
            .await;

        let client = Client::new("secret_abc").unwrap().with_base_url(server.url());
        let err = client
            .create_page("db-1", &PropertyNames::default(), &page())
            .await
            .unwrap_err();

        match err {
            NotionError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Date is not a property that exists.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_page_rejects_unexpected_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/pages")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = Client::new("secret_abc").unwrap().with_base_url(server.url());
        let err = client
            .create_page("db-1", &PropertyNames::default(), &page())
            .await
            .unwrap_err();

        assert!(matches!(err, NotionError::InvalidResponse(_)));
    }
}
