//! HTTP endpoint receiving the authorization redirect.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::auth::{AuthBroker, SubmitOutcome};
use crate::error::ServerResult;

/// Query parameters of the authorization redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// Builds the callback router.
pub fn router(broker: Arc<AuthBroker>) -> Router {
    Router::new()
        .route("/callback", get(handle_callback))
        .route("/health", get(handle_health))
        .with_state(broker)
}

/// Serves the callback router until `shutdown` completes.
pub async fn serve<F>(
    listener: TcpListener,
    broker: Arc<AuthBroker>,
    shutdown: F,
) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "callback listener started");
    }
    axum::serve(listener, router(broker))
        .with_graceful_shutdown(shutdown)
        .await?;
    debug!("callback listener stopped");
    Ok(())
}

async fn handle_callback(
    State(broker): State<Arc<AuthBroker>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let (Some(state), Some(code)) = (params.state, params.code) else {
        return match broker.pending_request().await {
            None => rejected("No active auth request"),
            Some(_) => rejected("Invalid authorization request"),
        };
    };

    match broker.submit_code(&state, &code).await {
        SubmitOutcome::Accepted => (StatusCode::OK, "Successfully Authenticated".to_string()),
        SubmitOutcome::NoActiveRequest => rejected("No active auth request"),
        SubmitOutcome::KeyMismatch => rejected("Invalid authorization request"),
        SubmitOutcome::ExchangeFailed { authorization_url } => rejected(format!(
            "Invalid code, please try again: {}",
            authorization_url
        )),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn rejected(body: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, body.into())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use calnotify_providers::MemoryCredentialStore;
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{FakeIdentity, RecordingPrompter, settle};

    fn broker() -> Arc<AuthBroker> {
        Arc::new(AuthBroker::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(FakeIdentity::default()),
            Arc::new(RecordingPrompter::default()),
        ))
    }

    /// Opens an authorization request and returns its key.
    async fn pending(broker: &Arc<AuthBroker>) -> String {
        let waiting = broker.clone();
        tokio::spawn(async move { waiting.ensure_credential().await });
        settle().await;
        broker.pending_request().await.unwrap().request_key
    }

    async fn get(broker: &Arc<AuthBroker>, uri: &str) -> (StatusCode, String) {
        let response = router(broker.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health() {
        let (status, body) = get(&broker(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn no_active_request() {
        let broker = broker();
        let (status, body) = get(&broker, "/callback?state=abc&code=good").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "No active auth request");

        let (status, body) = get(&broker, "/callback").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "No active auth request");
    }

    #[tokio::test]
    async fn mismatched_or_missing_parameters() {
        let broker = broker();
        let key = pending(&broker).await;

        let (status, body) = get(&broker, "/callback?state=wrong&code=good").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Invalid authorization request");

        let (status, body) = get(&broker, &format!("/callback?state={}", key)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Invalid authorization request");

        assert_eq!(broker.pending_request().await.unwrap().request_key, key);
    }

    #[tokio::test]
    async fn rejected_code_offers_retry() {
        let broker = broker();
        let key = pending(&broker).await;
        let url = broker.pending_request().await.unwrap().authorization_url;

        let (status, body) = get(&broker, &format!("/callback?state={}&code=bad", key)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, format!("Invalid code, please try again: {}", url));

        let (status, body) = get(&broker, &format!("/callback?state={}&code=good", key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Successfully Authenticated");
        assert!(broker.pending_request().await.is_none());
    }
}
