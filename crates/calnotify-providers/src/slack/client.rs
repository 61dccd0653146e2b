//! Slack Web API client.

use std::time::Duration;

use calnotify_core::{ReminderBatch, ReminderMessage};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;
use crate::sink::{ChannelDirectory, NotificationSink};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Channels fetched per `conversations.list` page.
const PAGE_LIMIT: &str = "1000";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts messages and lists channels with a bot token.
#[derive(Clone)]
pub struct SlackClient {
    http_client: reqwest::Client,
    token: String,
    base_url: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(format!("calnotify/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                slack_error(ProviderError::configuration(format!(
                    "failed to create HTTP client: {}",
                    e
                )))
            })?;

        Ok(Self {
            http_client,
            token: token.into(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Lists every public and private channel visible to the bot.
    pub async fn load_directory(&self) -> ProviderResult<ChannelDirectory> {
        let mut directory = ChannelDirectory::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("types", "public_channel,private_channel"),
                ("limit", PAGE_LIMIT),
            ];
            if let Some(ref cursor) = cursor {
                query.push(("cursor", cursor.as_str()));
            }

            let request = self
                .http_client
                .get(format!("{}/conversations.list", self.base_url))
                .bearer_auth(&self.token)
                .query(&query);
            let page: ConversationsList = self.call(request).await?;

            for channel in page.channels {
                directory.insert(channel.name, channel.id);
            }

            match page
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty())
            {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(channels = directory.len(), "loaded channel directory");
        Ok(directory)
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        blocks: Vec<Value>,
    ) -> ProviderResult<()> {
        let mut body = json!({
            "channel": channel_id,
            "text": text,
        });
        if !blocks.is_empty() {
            body["blocks"] = Value::Array(blocks);
        }

        let request = self
            .http_client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&body);
        let _: PostMessage = self.call(request).await?;
        Ok(())
    }

    /// Sends a request and unwraps Slack's `{ok, error}` envelope.
    async fn call<T>(&self, request: reqwest::RequestBuilder) -> ProviderResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = request.send().await.map_err(|e| {
            slack_error(ProviderError::network(format!("request failed: {}", e)))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            slack_error(ProviderError::network(format!("failed to read response: {}", e)))
        })?;

        if !status.is_success() {
            return Err(slack_error(ProviderError::http_status(status.as_u16(), body)));
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            slack_error(ProviderError::invalid_response(format!(
                "failed to parse response: {}",
                e
            )))
        })?;
        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
            return Err(slack_error(api_error(&error)));
        }

        serde_json::from_str(&body).map_err(|e| {
            slack_error(ProviderError::invalid_response(format!(
                "failed to parse response: {}",
                e
            )))
        })
    }
}

impl NotificationSink for SlackClient {
    fn post_reminder<'a>(
        &'a self,
        channel_id: &'a str,
        batch: &'a ReminderBatch,
        emphasize: bool,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let message = ReminderMessage::render(batch, emphasize, Utc::now());
            self.post_message(channel_id, &message.header, reminder_blocks(&message))
                .await
        })
    }

    fn post_text<'a>(
        &'a self,
        channel_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move { self.post_message(channel_id, text, Vec::new()).await })
    }
}

fn slack_error(err: ProviderError) -> ProviderError {
    err.with_provider("slack")
}

/// Maps a Slack `error` code to a provider error.
fn api_error(code: &str) -> ProviderError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" | "token_expired" => {
            ProviderError::authentication(code)
        }
        "missing_scope" | "not_in_channel" | "is_archived" | "restricted_action" => {
            ProviderError::authorization(code)
        }
        "channel_not_found" => ProviderError::not_found(code),
        "ratelimited" => ProviderError::rate_limited(code),
        _ => ProviderError::server(code),
    }
}

/// One `mrkdwn` section for the header and one per event line.
fn reminder_blocks(message: &ReminderMessage) -> Vec<Value> {
    std::iter::once(&message.header)
        .chain(message.lines.iter())
        .map(|text| {
            json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": text },
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsList {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessage {}

#[cfg(test)]
mod tests {
    use calnotify_core::CalendarEvent;
    use chrono::Duration as ChronoDuration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ProviderErrorCode;

    fn client(server: &MockServer) -> SlackClient {
        SlackClient::new("xoxb-test").unwrap().with_base_url(server.uri())
    }

    #[tokio::test]
    async fn directory_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "C002", "name": "ops" }],
                "response_metadata": { "next_cursor": "" }
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("types", "public_channel,private_channel"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "C001", "name": "eng" }],
                "response_metadata": { "next_cursor": "page2" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let directory = client(&server).load_directory().await.unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.resolve("eng"), Some("C001"));
        assert_eq!(directory.resolve("ops"), Some("C002"));
    }

    #[tokio::test]
    async fn api_error_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "invalid_auth" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).load_directory().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(err.provider(), Some("slack"));
    }

    #[tokio::test]
    async fn reminder_is_posted_as_sections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_partial_json(json!({ "channel": "C001" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let start = Utc::now() + ChronoDuration::minutes(15);
        let batch = ReminderBatch {
            channel: "eng".to_string(),
            start_time: start,
            events: vec![
                CalendarEvent::new("e1", start)
                    .with_title("Standup")
                    .with_display_link("https://calendar.example/e1"),
            ],
        };

        client(&server)
            .post_reminder("C001", &batch, true)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("<!here> The following event is starting in"));

        let blocks = body["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "section");
        assert_eq!(blocks[0]["text"]["type"], "mrkdwn");
        assert_eq!(blocks[0]["text"]["text"], body["text"]);
        assert_eq!(
            blocks[1]["text"]["text"],
            ":calendar: <https://calendar.example/e1|Standup>"
        );
    }

    #[tokio::test]
    async fn rejected_post_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "channel_not_found" })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .post_text("C404", "Initializing Bot")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NotFound);
    }

    #[tokio::test]
    async fn http_error_status_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server).post_text("C001", "hi").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), ProviderErrorCode::RateLimited);
    }

    #[test]
    fn api_error_codes() {
        assert_eq!(
            api_error("missing_scope").code(),
            ProviderErrorCode::AuthorizationFailed
        );
        assert_eq!(api_error("ratelimited").code(), ProviderErrorCode::RateLimited);
        assert_eq!(api_error("fatal_error").code(), ProviderErrorCode::ServerError);
    }
}
