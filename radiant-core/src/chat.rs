//! Chat service — one user turn end to end
//!
//! load history → assemble prompt → invoke candidates → record turn.
//! Every model or storage failure becomes a configured apology string; the
//! turn is only recorded after the model answered.

use std::sync::Arc;

use crate::config::{RadiantConfig, ReplyConfig};
use crate::error::{RadiantError, StorageError};
use crate::llm::{ChatBackend, InvokeError, ModelInvoker, OpenRouterClient};
use crate::models::{Turn, TurnInput};
use crate::prompt::PromptAssembler;
use crate::recorder::TurnRecorder;
use crate::store::TurnStore;

/// What the caller sends back to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    /// Whether the exchange made it into the store.
    pub recorded: bool,
}

pub struct ChatService {
    store: TurnStore,
    assembler: PromptAssembler,
    invoker: ModelInvoker,
    recorder: TurnRecorder,
    replies: ReplyConfig,
}

impl ChatService {
    pub fn new(config: &RadiantConfig, store: TurnStore, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            store,
            assembler: PromptAssembler::new(&config.persona, &config.history),
            invoker: ModelInvoker::new(backend, &config.model),
            recorder: TurnRecorder::new(&config.persona),
            replies: config.replies.clone(),
        }
    }

    /// Build the service against the configured OpenRouter endpoint.
    pub fn from_config(config: &RadiantConfig, store: TurnStore) -> Result<Self, RadiantError> {
        let backend = OpenRouterClient::new(&config.model)?;
        Ok(Self::new(config, store, Arc::new(backend)))
    }

    pub fn store(&self) -> &TurnStore {
        &self.store
    }

    pub async fn history(&self) -> Result<Vec<Turn>, StorageError> {
        self.store.load_all().await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.clear().await
    }

    pub async fn submit(&self, input: TurnInput) -> ChatReply {
        let history = match self.store.load_all().await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, error_kind = "storage", "Failed to load history");
                return self.apology(&self.replies.storage);
            }
        };

        let messages = self.assembler.assemble(&history, &input);

        let invocation = match self.invoker.invoke(&messages, input.has_image()).await {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(
                    error_kind = e.kind(),
                    root_kind = e.root().kind(),
                    error = %e,
                    "Chat turn not answered"
                );
                return self.apology(self.apology_for(&e));
            }
        };

        if let Err(e) = self.recorder.record(&self.store, &input, &invocation.reply).await {
            tracing::error!(
                model = %invocation.model,
                error = %e,
                error_kind = "storage",
                "Failed to record turn"
            );
            return self.apology(&self.replies.storage);
        }

        tracing::info!(
            model = %invocation.model,
            replayed_turns = history.len(),
            has_image = input.has_image(),
            "Chat turn recorded"
        );

        ChatReply {
            response: invocation.reply,
            recorded: true,
        }
    }

    /// Apology shown for a failed invocation. Vision refusal first; otherwise
    /// the last candidate's failure picks `timeout` or `auth` over the generic
    /// `exhausted` reply.
    pub fn apology_for(&self, err: &InvokeError) -> &str {
        match err {
            InvokeError::VisionDisabled => &self.replies.vision_refused,
            e if e.is_timeout() => &self.replies.timeout,
            e if e.is_auth() => &self.replies.auth,
            _ => &self.replies.exhausted,
        }
    }

    fn apology(&self, text: &str) -> ChatReply {
        ChatReply {
            response: text.to_string(),
            recorded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::{ConnectOptions, Connection};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] })
    }

    fn test_config(candidates: &[&str]) -> RadiantConfig {
        let mut config = RadiantConfig::default();
        config.model.api_key = "test-api-key".to_string();
        config.model.text_candidates = candidates.iter().map(|c| c.to_string()).collect();
        config
    }

    async fn service(
        server: &MockServer,
        config: &RadiantConfig,
    ) -> (tempfile::TempDir, ChatService) {
        let dir = tempfile::tempdir().unwrap();
        let store = TurnStore::open(dir.path().join("chat_history.db")).await.unwrap();
        let backend = OpenRouterClient::with_base_url(&config.model, server.uri()).unwrap();
        (dir, ChatService::new(config, store, Arc::new(backend)))
    }

    async fn execute_raw(store: &TurnStore, statement: &str) {
        let mut conn = SqliteConnectOptions::new()
            .filename(store.path())
            .connect()
            .await
            .unwrap();
        sqlx::query(statement).execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_quiz_scenario_records_one_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Q1...Q2...Q3...")))
            .mount(&server)
            .await;
        let (_dir, chat) = service(&server, &test_config(&["m"])).await;

        let reply = chat.submit(TurnInput::new(Some("quiz".into()), None)).await;
        assert_eq!(reply.response, "Q1...Q2...Q3...");
        assert!(reply.recorded);

        let turns = chat.history().await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user_text, "quiz");
        assert_eq!(turns[0].ai_text, "Q1...Q2...Q3...");
    }

    #[tokio::test]
    async fn test_submissions_are_replayed_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;
        let (_dir, chat) = service(&server, &test_config(&["m"])).await;

        for i in 0..4 {
            chat.submit(TurnInput::new(Some(format!("message {i}")), None)).await;
        }

        let turns = chat.history().await.unwrap();
        assert_eq!(turns.len(), 4);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.user_text, format!("message {i}"));
        }
        assert!(turns.windows(2).all(|w| w[0].sequence < w[1].sequence));

        // the last request replayed the three earlier turns
        let requests = server.received_requests().await.unwrap();
        let last: serde_json::Value = serde_json::from_slice(&requests[3].body).unwrap();
        assert_eq!(last["messages"].as_array().unwrap().len(), 1 + 2 * 3 + 1);
        assert_eq!(last["messages"][1]["content"], "message 0");
    }

    #[tokio::test]
    async fn test_fallback_records_exactly_one_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "model": "first" })))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "model": "second" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("second wins")))
            .mount(&server)
            .await;
        let (_dir, chat) = service(&server, &test_config(&["first", "second"])).await;

        let reply = chat.submit(TurnInput::new(Some("hello".into()), None)).await;
        assert_eq!(reply.response, "second wins");
        assert_eq!(chat.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_candidates_record_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let config = test_config(&["first", "second"]);
        let (_dir, chat) = service(&server, &config).await;

        let reply = chat.submit(TurnInput::new(Some("hello".into()), None)).await;
        assert_eq!(reply.response, config.replies.exhausted);
        assert!(!reply.recorded);
        assert!(chat.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refused_vision_records_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("never")))
            .expect(0)
            .mount(&server)
            .await;
        let mut config = test_config(&["m"]);
        config.model.vision_enabled = false;
        let (_dir, chat) = service(&server, &config).await;

        let reply = chat.submit(TurnInput::new(None, Some("AAAA".into()))).await;
        assert_eq!(reply.response, config.replies.vision_refused);
        assert!(chat.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_image_turn_is_stored_with_marker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("An AP view.")))
            .mount(&server)
            .await;
        let (_dir, chat) = service(&server, &test_config(&["m"])).await;

        chat.submit(TurnInput::new(None, Some("data:image/png;base64,AAAA".into())))
            .await;

        let turns = chat.history().await.unwrap();
        assert_eq!(turns[0].user_text, "[Image Uploaded] Image Analysis Request");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = &body["messages"][1]["content"];
        assert_eq!(parts[0]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(parts[1]["text"], "An image was uploaded for analysis.");
    }

    #[tokio::test]
    async fn test_apology_distinguishes_timeout_and_auth() {
        let server = MockServer::start().await;
        let config = test_config(&["m"]);
        let (_dir, chat) = service(&server, &config).await;

        let timeout = InvokeError::AllCandidatesExhausted {
            attempts: 1,
            last: Some(Box::new(InvokeError::Timeout { model: "m".into() })),
        };
        assert_eq!(chat.apology_for(&timeout), config.replies.timeout);

        let auth = InvokeError::Transport {
            model: "m".into(),
            status: Some(403),
            message: "forbidden".into(),
        };
        assert_eq!(chat.apology_for(&auth), config.replies.auth);

        let malformed = InvokeError::AllCandidatesExhausted {
            attempts: 1,
            last: Some(Box::new(InvokeError::MalformedResponse {
                model: "m".into(),
                reason: "no choices".into(),
            })),
        };
        assert_eq!(chat.apology_for(&malformed), config.replies.exhausted);
    }

    #[tokio::test]
    async fn test_failed_append_is_not_reported_as_remembered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Q1...Q2...Q3...")))
            .expect(1)
            .mount(&server)
            .await;
        let config = test_config(&["m"]);
        let (_dir, chat) = service(&server, &config).await;
        execute_raw(
            chat.store(),
            "CREATE TRIGGER reject_insert BEFORE INSERT ON history \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .await;

        let reply = chat.submit(TurnInput::new(Some("quiz".into()), None)).await;
        assert_eq!(reply.response, config.replies.storage);
        assert!(!reply.recorded);
        assert!(chat.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_history_skips_the_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("never")))
            .expect(0)
            .mount(&server)
            .await;
        let config = test_config(&["m"]);
        let (_dir, chat) = service(&server, &config).await;
        execute_raw(chat.store(), "DROP TABLE history").await;

        let reply = chat.submit(TurnInput::new(Some("quiz".into()), None)).await;
        assert_eq!(reply.response, config.replies.storage);
        assert!(!reply.recorded);
        assert!(chat.history().await.is_err());
    }
}
