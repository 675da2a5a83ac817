use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use std::borrow::Cow;
use novel_app::domain::GenerateRequest;
use novel_app::infrastructure::openai::TextStream;
use novel_app::AppContext;
use novel_errors::AppError;
use tower_http::trace::TraceLayer;

const FORWARDED_FOR: &str = "x-forwarded-for";

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    ctx.quota_gate.check(&caller_identifier(&headers)).await?;

    let request: GenerateRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        AppError::InvalidRequest(e.to_string())
    })?;

    let stream = ctx.generate_completion.execute(&request.prompt).await?;
    Ok(relay(stream))
}

/// Forwarded address used verbatim as the quota bucket; callers without one share `""`.
fn caller_identifier(headers: &HeaderMap) -> Cow<'_, str> {
    headers
        .get(FORWARDED_FOR)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .unwrap_or(Cow::Borrowed(""))
}

/// Streams completion text to the client chunk by chunk.
///
/// The body pulls the next chunk only after the previous one was written. If
/// the client goes away the body is dropped together with the upstream
/// response. An upstream error ends the body early.
fn relay(stream: TextStream) -> Response {
    let body = stream.map(|chunk| {
        chunk.map(Bytes::from).inspect_err(|e| {
            tracing::warn!("Completion stream aborted: {}", e);
        })
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use novel_app::application::GenerateCompletion;
    use novel_app::config::OpenAiConfig;
    use novel_app::infrastructure::kv::{CounterStore, MemoryStore};
    use novel_app::infrastructure::openai::OpenAiClient;
    use novel_app::infrastructure::security::{QuotaGate, SlidingWindowLimiter};
    use serde_json::Value;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const DAY: Duration = Duration::from_secs(86_400);

    fn sse_chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": text } }] })
        )
    }

    /// Completion API double that streams `events` and counts calls.
    async fn spawn_upstream(events: Vec<String>, calls: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/chat/completions",
            post(move |body: Bytes| {
                let events = events.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let request: Value = serde_json::from_slice(&body).unwrap();
                    if request["messages"][0]["role"] != "system" {
                        return StatusCode::BAD_REQUEST.into_response();
                    }
                    let parts = events.into_iter().map(Ok::<_, std::io::Error>);
                    Response::builder()
                        .header("content-type", "text/event-stream")
                        .body(Body::from_stream(futures::stream::iter(parts)))
                        .unwrap()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    /// Flips its flag when the upstream response body is dropped.
    struct ReleaseFlag(Arc<AtomicBool>);

    impl Drop for ReleaseFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Completion API double that sends one chunk and then never finishes.
    async fn spawn_endless_upstream(released: Arc<AtomicBool>) -> String {
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let released = released.clone();
                async move {
                    let state = (ReleaseFlag(released), Some(sse_chunk("tick")));
                    let events = futures::stream::unfold(state, |(flag, next)| async move {
                        match next {
                            Some(event) => Some((Ok::<_, std::io::Error>(event), (flag, None))),
                            None => {
                                let _held = flag;
                                futures::future::pending::<()>().await;
                                None
                            }
                        }
                    });
                    Response::builder()
                        .header("content-type", "text/event-stream")
                        .body(Body::from_stream(events))
                        .unwrap()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    fn app(base_url: String, gate: QuotaGate) -> Router {
        let client = OpenAiClient::new(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url,
            model: "gpt-3.5-turbo-16k".to_string(),
        })
        .unwrap();
        router(AppContext::new(GenerateCompletion::new(client), gate))
    }

    fn limited_gate(tokens: u64) -> QuotaGate {
        QuotaGate::Enforced(SlidingWindowLimiter::new(
            CounterStore::Memory(MemoryStore::new()),
            tokens,
            DAY,
        ))
    }

    fn generate_request(prompt_body: &str, forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/api/generate").header("content-type", "application/json");
        if let Some(ip) = forwarded_for {
            builder = builder.header(FORWARDED_FOR, ip);
        }
        builder.body(Body::from(prompt_body.to_string())).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_streams_chunks_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = spawn_upstream(
            vec![
                sse_chunk("Once"),
                sse_chunk(" upon"),
                sse_chunk(" a time"),
                "data: [DONE]\n\n".to_string(),
            ],
            calls.clone(),
        )
        .await;

        let response = app(url, QuotaGate::Disabled)
            .oneshot(generate_request(r#"{"prompt": "Hello\nworld/"}"#, Some("1.2.3.4")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let chunks: Vec<Bytes> = response
            .into_body()
            .into_data_stream()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["Once", " upon", " a time"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = spawn_upstream(vec![sse_chunk("hi")], calls.clone()).await;
        let app = app(url, limited_gate(2));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(generate_request(r#"{"prompt": "hi"}"#, Some("9.9.9.9")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, "hi");
        }

        let response = app
            .clone()
            .oneshot(generate_request(r#"{"prompt": "hi"}"#, Some("9.9.9.9")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["X-RateLimit-Limit"], "2");
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
        assert!(response.headers()["X-RateLimit-Reset"]
            .to_str()
            .unwrap()
            .parse::<i64>()
            .is_ok());
        assert_eq!(
            body_text(response).await,
            "You have reached your request limit for the day."
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let other = app
            .oneshot(generate_request(r#"{"prompt": "hi"}"#, Some("8.8.8.8")))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_callers_without_forwarded_header_share_bucket() {
        let url = spawn_upstream(vec![sse_chunk("hi")], Arc::new(AtomicUsize::new(0))).await;
        let app = app(url, limited_gate(1));

        let first = app
            .clone()
            .oneshot(generate_request(r#"{"prompt": "a"}"#, None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(generate_request(r#"{"prompt": "b"}"#, None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_disabled_gate_never_limits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = spawn_upstream(vec![sse_chunk("ok")], calls.clone()).await;
        let app = app(url, QuotaGate::Disabled);

        for _ in 0..60 {
            let response = app
                .clone()
                .oneshot(generate_request(r#"{"prompt": "again"}"#, Some("1.1.1.1")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 60);
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = spawn_upstream(vec![], calls.clone()).await;
        let app = app(url, QuotaGate::Disabled);

        for body in [r#"{}"#, r#"{"prompt": 5}"#, "not json", ""] {
            let response = app
                .clone()
                .oneshot(generate_request(body, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_forwarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = spawn_upstream(vec!["data: [DONE]\n\n".to_string()], calls.clone()).await;

        let response = app(url, QuotaGate::Disabled)
            .oneshot(generate_request(r#"{"prompt": ""}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_unavailable() {
        let response = app("http://127.0.0.1:1".to_string(), QuotaGate::Disabled)
            .oneshot(generate_request(r#"{"prompt": "hi"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_truncates_body() {
        let url = spawn_upstream(
            vec![sse_chunk("partial"), "data: {broken\n\n".to_string()],
            Arc::new(AtomicUsize::new(0)),
        )
        .await;

        let response = app(url, QuotaGate::Disabled)
            .oneshot(generate_request(r#"{"prompt": "hi"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let frames: Vec<_> = response.into_body().into_data_stream().collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), "partial");
        assert!(frames[1].is_err());
    }

    #[tokio::test]
    async fn test_upstream_released_when_client_disconnects() {
        let released = Arc::new(AtomicBool::new(false));
        let url = spawn_endless_upstream(released.clone()).await;

        let response = app(url, QuotaGate::Disabled)
            .oneshot(generate_request(r#"{"prompt": "hi"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut frames = response.into_body().into_data_stream();
        assert_eq!(frames.next().await.unwrap().unwrap(), "tick");
        assert!(!released.load(Ordering::SeqCst));

        drop(frames);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !released.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("upstream body still open after the client went away");
    }

    #[tokio::test]
    async fn test_health() {
        let response = app("http://127.0.0.1:1".to_string(), QuotaGate::Disabled)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[test]
    fn test_caller_identifier_verbatim() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_identifier(&headers), "");
        headers.insert(FORWARDED_FOR, "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(caller_identifier(&headers), "203.0.113.7, 10.0.0.1");
    }

    #[test]
    fn test_caller_identifier_keeps_non_ascii_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_bytes(b"203.0.113.7 \xe9").unwrap(),
        );
        let caller = caller_identifier(&headers);
        assert_ne!(caller, "");
        assert!(caller.starts_with("203.0.113.7 "));
    }
}
