//! End-to-end tests: the proxy router in front of fake providers, and the
//! native client session in front of the proxy.  Nothing leaves localhost.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::{StatusCode, Uri, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use futures::stream::{self, StreamExt};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use duochat::chat::{
        ChatConfig, ChatSession, IMAGE_FAILURE_NOTICE, ImageFailurePolicy, PlainTextRenderer,
    };
    use duochat::server::{self, AppState, IMAGE_ERROR_MESSAGE, ServerConfig};
    use duochat::{
        ChatBackend, ChatMessage, HttpBackend, ImageResult, MessageRole, Result, SYSTEM_PROMPT,
        TokenStream,
    };

    const PNG_BASE64: &str = "iVBORw0KGgo=";

    async fn spawn(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn spawn_proxy(backend: Arc<dyn ChatBackend>, max_duration: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(backend, max_duration);
        tokio::spawn(async move {
            server::serve(listener, state).await.unwrap();
        });
        addr
    }

    #[derive(Clone, Default)]
    struct Recorded {
        bodies: Arc<Mutex<Vec<Value>>>,
        paths: Arc<Mutex<Vec<String>>>,
    }

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::from(": keep-alive\n\n");
        for (i, fragment) in fragments.iter().enumerate() {
            let chunk = json!({
                "id": format!("chatcmpl-{i}"),
                "model": "llama-3.3-70b-versatile",
                "choices": [{"index": 0, "delta": {"content": fragment}}]
            });
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn fake_groq(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Response {
        recorded.bodies.lock().unwrap().push(body);
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            sse_body(&["Olá", ", ", "**mundo**", "!"]),
        )
            .into_response()
    }

    async fn failing_groq() -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"type": "rate_limit_exceeded", "message": "slow down"}})),
        )
            .into_response()
    }

    async fn fake_cloudflare(
        State(recorded): State<Recorded>,
        uri: Uri,
        Json(body): Json<Value>,
    ) -> Response {
        recorded.paths.lock().unwrap().push(uri.path().to_string());
        recorded.bodies.lock().unwrap().push(body);
        Json(json!({"result": {"image": PNG_BASE64}, "success": true})).into_response()
    }

    async fn failing_cloudflare() -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"errors": [{"message": "secret upstream detail"}], "success": false})),
        )
            .into_response()
    }

    async fn proxy_over_fakes(
        groq: Router<Recorded>,
        cloudflare: Router<Recorded>,
        max_duration: Duration,
    ) -> (SocketAddr, Recorded, Recorded) {
        let text_recorded = Recorded::default();
        let image_recorded = Recorded::default();
        let groq_addr = spawn(groq.with_state(text_recorded.clone())).await;
        let cloudflare_addr = spawn(cloudflare.with_state(image_recorded.clone())).await;
        let config = ServerConfig::new()
            .with_groq_api_key("gsk_test")
            .with_cloudflare("acct", "cf_test")
            .with_max_duration(max_duration)
            .with_text_base_url(format!("http://{groq_addr}/openai/v1/"))
            .with_image_base_url(format!("http://{cloudflare_addr}/client/v4/"));
        let upstream = config.upstream().unwrap();
        let addr = spawn_proxy(Arc::new(upstream), config.max_duration).await;
        (addr, text_recorded, image_recorded)
    }

    fn working_groq() -> Router<Recorded> {
        Router::new().route("/openai/v1/chat/completions", post(fake_groq))
    }

    fn working_cloudflare() -> Router<Recorded> {
        Router::new().fallback(fake_cloudflare)
    }

    #[tokio::test]
    async fn chat_streams_fragments_in_order() {
        let (addr, text, _) =
            proxy_over_fakes(working_groq(), working_cloudflare(), Duration::from_secs(5)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/chat"))
            .json(&json!({"messages": [
                {"role": "user", "content": "oi"},
                {"role": "assistant", "content": "Olá!"},
                {"role": "user", "content": "tudo bem?"}
            ]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let content_type = response.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));
        assert_eq!(response.text().await.unwrap(), "Olá, **mundo**!");

        let bodies = text.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let sent = &bodies[0];
        assert_eq!(sent["stream"], json!(true));
        assert_eq!(sent["model"], json!("llama-3.3-70b-versatile"));
        let messages = sent["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], json!("system"));
        assert_eq!(messages[0]["content"], json!(SYSTEM_PROMPT));
        assert_eq!(
            messages
                .iter()
                .filter(|message| message["role"] == json!("system"))
                .count(),
            1
        );
        assert_eq!(messages[3]["content"], json!("tudo bem?"));
    }

    #[tokio::test]
    async fn chat_rejects_malformed_bodies() {
        let (addr, text, _) =
            proxy_over_fakes(working_groq(), working_cloudflare(), Duration::from_secs(5)).await;
        let client = reqwest::Client::new();

        for body in [
            "not json",
            r#"{"messages": "nope"}"#,
            r#"{"messages": [{"role": "system", "content": "x"}]}"#,
        ] {
            let response = client
                .post(format!("http://{addr}/api/chat"))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400, "{body}");
            let json: Value = response.json().await.unwrap();
            assert!(json["error"].is_string());
        }
        assert!(text.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_upstream_failure_is_a_gateway_error() {
        let groq = Router::new().route("/openai/v1/chat/completions", post(failing_groq));
        let (addr, _, _) =
            proxy_over_fakes(groq, working_cloudflare(), Duration::from_secs(5)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/chat"))
            .json(&json!({"messages": [{"role": "user", "content": "oi"}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
        let json: Value = response.json().await.unwrap();
        assert!(json["error"].as_str().unwrap().contains("slow down"));
    }

    #[tokio::test]
    async fn image_returns_a_data_uri() {
        let (addr, _, image) =
            proxy_over_fakes(working_groq(), working_cloudflare(), Duration::from_secs(5)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/image"))
            .json(&json!({"prompt": "a red fox"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let json: Value = response.json().await.unwrap();
        assert_eq!(
            json,
            json!({"image": format!("data:image/png;base64,{PNG_BASE64}")})
        );

        assert_eq!(
            image.paths.lock().unwrap().as_slice(),
            ["/client/v4/accounts/acct/ai/run/@cf/bytedance/stable-diffusion-xl-lightning-1-0"]
        );
        assert_eq!(
            image.bodies.lock().unwrap().as_slice(),
            [json!({"prompt": "a red fox"})]
        );
    }

    #[tokio::test]
    async fn image_failure_hides_upstream_detail() {
        let cloudflare = Router::new().fallback(failing_cloudflare);
        let (addr, _, _) = proxy_over_fakes(working_groq(), cloudflare, Duration::from_secs(5)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/image"))
            .json(&json!({"prompt": "a red fox"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        let text = response.text().await.unwrap();
        assert!(!text.contains("secret upstream detail"));
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json, json!({"error": IMAGE_ERROR_MESSAGE}));
    }

    #[tokio::test]
    async fn index_serves_the_page() {
        let (addr, _, _) =
            proxy_over_fakes(working_groq(), working_cloudflare(), Duration::from_secs(5)).await;
        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(response.status(), 200);
        let page = response.text().await.unwrap();
        assert!(page.contains("<!DOCTYPE html>"));
        assert!(page.contains("/api/chat"));
        assert!(page.contains("/api/image"));
    }

    /// A backend whose text stream yields `tokens` and then, if `stall` is
    /// set, never finishes.
    struct ScriptedBackend {
        tokens: Vec<&'static str>,
        stall: bool,
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn stream_chat(&self, _messages: Vec<ChatMessage>) -> Result<TokenStream> {
            let tokens = stream::iter(self.tokens.clone())
                .map(|token| Ok(token.to_string()))
                .boxed();
            if self.stall {
                Ok(tokens.chain(stream::pending()).boxed())
            } else {
                Ok(tokens)
            }
        }

        async fn generate_image(&self, _prompt: &str) -> Result<ImageResult> {
            Ok(ImageResult::from_base64(PNG_BASE64))
        }
    }

    #[tokio::test]
    async fn stalled_stream_times_out_before_first_byte() {
        let backend = ScriptedBackend {
            tokens: vec![],
            stall: true,
        };
        let addr = spawn_proxy(Arc::new(backend), Duration::from_millis(200)).await;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/chat"))
            .json(&json!({"messages": [{"role": "user", "content": "oi"}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 504);
        let json: Value = response.json().await.unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn stalled_stream_is_aborted_after_first_byte() {
        let backend = ScriptedBackend {
            tokens: vec!["partial"],
            stall: true,
        };
        let addr = spawn_proxy(Arc::new(backend), Duration::from_millis(200)).await;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/chat"))
            .json(&json!({"messages": [{"role": "user", "content": "oi"}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.is_err());
    }

    #[tokio::test]
    async fn session_talks_to_the_proxy() {
        let (addr, text, _) =
            proxy_over_fakes(working_groq(), working_cloudflare(), Duration::from_secs(5)).await;
        let backend = HttpBackend::new(&format!("http://{addr}")).unwrap();
        let mut session = ChatSession::new(backend, &ChatConfig::new().without_color());
        let mut renderer = PlainTextRenderer::with_color(false);

        session.send("oi", &mut renderer).await.unwrap();
        session
            .send("/IMG   a red fox", &mut renderer)
            .await
            .unwrap();

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role(), MessageRole::User);
        assert_eq!(messages[0].content(), "oi");
        assert_eq!(messages[1].role(), MessageRole::Assistant);
        assert_eq!(messages[1].content(), "Olá, **mundo**!");
        assert_eq!(messages[2].content(), "/IMG   a red fox");
        assert_eq!(
            messages[3].content(),
            format!("![Gerada: a red fox](data:image/png;base64,{PNG_BASE64})")
        );
        assert!(messages.windows(2).all(|w| w[0].id().get() < w[1].id().get()));

        let stats = session.stats();
        assert_eq!(stats.text_turns, 1);
        assert_eq!(stats.images_generated, 1);
        assert_eq!(text.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn session_surfaces_image_failures() {
        let cloudflare = Router::new().fallback(failing_cloudflare);
        let (addr, _, _) = proxy_over_fakes(working_groq(), cloudflare, Duration::from_secs(5)).await;
        let backend = HttpBackend::new(&format!("http://{addr}")).unwrap();

        let mut surface = ChatSession::new(backend.clone(), &ChatConfig::new().without_color());
        let mut renderer = PlainTextRenderer::with_color(false);
        surface.send("/img a red fox", &mut renderer).await.unwrap();
        let messages = surface.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content(), IMAGE_FAILURE_NOTICE);
        assert_eq!(surface.stats().image_failures, 1);

        let config = ChatConfig::new()
            .without_color()
            .with_image_failure_policy(ImageFailurePolicy::Drop);
        let mut drop = ChatSession::new(backend, &config);
        drop.send("/img a red fox", &mut renderer).await.unwrap();
        assert_eq!(drop.conversation().len(), 1);
        assert_eq!(drop.stats().image_failures, 1);
    }
}
