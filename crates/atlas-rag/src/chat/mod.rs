//! Streaming chat orchestration
//!
//! Retrieval results are bound into a system message, history is loaded from
//! the progress store, and the LLM stream is forwarded to the session as
//! `{"chunk":"..."}` envelopes. Cancellation is cooperative: once the
//! session's flag flips, fragments are dropped but the upstream is drained,
//! and whatever was already forwarded is persisted as the partial answer.

use async_trait::async_trait;
use chrono::{Local, Utc};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;

use crate::config::{LlmConfig, PromptConfig};
use crate::error::Result;
use crate::providers::chat_model::{ChatModel, GenerationParams, PromptMessage};
use crate::providers::ProgressStore;
use crate::retrieval::Retriever;
use crate::types::{ChatMessage, SearchHit, User};

/// Longest snippet embedded in the context block, in code points
const SNIPPET_CAP: usize = 1000;

/// Outbound channel for session messages
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one serialized frame to the client
    async fn send(&mut self, payload: String) -> Result<()>;
}

/// Binds retrieval results to a streaming LLM request and appends history
pub struct ChatOrchestrator {
    retriever: Arc<Retriever>,
    llm: Arc<dyn ChatModel>,
    progress: Arc<dyn ProgressStore>,
    prompt: PromptConfig,
    generation: GenerationParams,
    top_k: usize,
}

impl ChatOrchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        llm: Arc<dyn ChatModel>,
        progress: Arc<dyn ProgressStore>,
        prompt: PromptConfig,
        llm_config: &LlmConfig,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            llm,
            progress,
            prompt,
            generation: GenerationParams {
                temperature: llm_config.temperature,
                top_p: llm_config.top_p,
                max_tokens: llm_config.max_tokens,
            },
            top_k,
        }
    }

    /// Answer one query over the session. Errors before or during the stream
    /// bubble up; the session layer turns them into error envelopes.
    pub async fn stream_response(
        &self,
        query: &str,
        user: &User,
        sink: &mut dyn EventSink,
        cancelled: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<()> {
        let hits = self.retriever.hybrid_search(query, self.top_k, user).await?;
        tracing::info!(user = %user.name, hits = hits.len(), "context retrieved");

        let context = build_context(&hits);
        let system = self.build_system_message(&context);

        let history = match self.load_history(user.id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load conversation history");
                Vec::new()
            }
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::new("system", system));
        for msg in &history {
            messages.push(PromptMessage::new(msg.role.clone(), msg.content.clone()));
        }
        messages.push(PromptMessage::new("user", query));

        let mut stream = self.llm.stream_chat(&messages, &self.generation).await?;

        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if cancelled() {
                // Dropped, not buffered: the partial answer is exactly what
                // the client saw. Keep draining for upstream bookkeeping.
                continue;
            }
            answer.push_str(&fragment);
            sink.send(json!({ "chunk": fragment }).to_string()).await?;
        }

        sink.send(completion_envelope()).await?;

        if !answer.is_empty() {
            if let Err(e) = self.append_history(user.id, query, &answer).await {
                tracing::error!(error = %e, "failed to save conversation history");
            }
        }
        Ok(())
    }

    fn build_system_message(&self, context: &str) -> String {
        let mut system = String::new();
        if !self.prompt.rules.is_empty() {
            system.push_str(&self.prompt.rules);
            system.push_str("\n\n");
        }
        system.push_str(&self.prompt.ref_start);
        system.push('\n');
        if context.is_empty() {
            system.push_str(&self.prompt.no_result_text);
            system.push('\n');
        } else {
            system.push_str(context);
        }
        system.push_str(&self.prompt.ref_end);
        system
    }

    async fn load_history(&self, user_id: u64) -> Result<Vec<ChatMessage>> {
        let conversation_id = self.progress.get_or_create_conversation(user_id).await?;
        self.progress.history(&conversation_id).await
    }

    async fn append_history(&self, user_id: u64, question: &str, answer: &str) -> Result<()> {
        let conversation_id = self.progress.get_or_create_conversation(user_id).await?;
        let mut history = self.progress.history(&conversation_id).await?;
        history.push(ChatMessage::new("user", question));
        history.push(ChatMessage::new("assistant", answer));
        self.progress.put_history(&conversation_id, &history).await
    }
}

/// Context block: one line per hit, `[i] (<filename>) <snippet>`
pub fn build_context(hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let snippet: String = if hit.text.chars().count() > SNIPPET_CAP {
            let mut truncated: String = hit.text.chars().take(SNIPPET_CAP).collect();
            truncated.push('…');
            truncated
        } else {
            hit.text.clone()
        };
        let label = if hit.file_name.is_empty() {
            "unknown"
        } else {
            hit.file_name.as_str()
        };
        context.push_str(&format!("[{}] ({}) {}\n", i + 1, label, snippet));
    }
    context
}

/// Terminal frame emitted when a response finishes, successfully or not
pub fn completion_envelope() -> String {
    json!({
        "type": "completion",
        "status": "finished",
        "message": "response complete",
        "timestamp": Utc::now().timestamp_millis(),
        "date": Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    })
    .to_string()
}

/// Error frame; the connection stays open so the client can read both this
/// and the completion that follows
pub fn error_envelope(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Acknowledgment for a valid stop frame
pub fn stop_ack_envelope() -> String {
    json!({
        "type": "stop",
        "message": "response stopped",
        "timestamp": Utc::now().timestamp_millis(),
        "date": Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::providers::memory::{MemoryProgressStore, MemorySearchIndex};
    use crate::storage::MetaStore;
    use crate::test_support::{CollectingSink, HashEmbedder, ScriptedChatModel};
    use crate::types::UserRole;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user() -> User {
        User {
            id: 1,
            name: "alice".to_string(),
            role: UserRole::User,
            org_tags: vec!["t".to_string()],
            primary_org: Some("t".to_string()),
        }
    }

    fn orchestrator(llm: ScriptedChatModel, progress: Arc<MemoryProgressStore>) -> ChatOrchestrator {
        let meta = Arc::new(MetaStore::in_memory().unwrap());
        let retriever = Arc::new(Retriever::new(
            meta,
            Arc::new(HashEmbedder::new(4)),
            Arc::new(MemorySearchIndex::new()),
            RetrievalConfig::default(),
        ));
        ChatOrchestrator::new(
            retriever,
            Arc::new(llm),
            progress,
            PromptConfig::default(),
            &LlmConfig::default(),
            10,
        )
    }

    #[tokio::test]
    async fn streams_chunks_then_completion_and_saves_history() {
        let progress = Arc::new(MemoryProgressStore::new());
        let orchestrator = orchestrator(ScriptedChatModel::new(&["Hel", "lo"]), progress.clone());
        let mut sink = CollectingSink::new();

        orchestrator
            .stream_response("hi", &user(), &mut sink, &|| false)
            .await
            .unwrap();

        let frames = sink.json_payloads();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["chunk"], "Hel");
        assert_eq!(frames[1]["chunk"], "lo");
        assert_eq!(frames[2]["type"], "completion");
        assert_eq!(frames[2]["status"], "finished");

        let conversation = progress.get_or_create_conversation(1).await.unwrap();
        let history = progress.history(&conversation).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[1].content, "Hello");
    }

    #[tokio::test]
    async fn cancellation_stops_forwarding_but_keeps_partial_answer() {
        let progress = Arc::new(MemoryProgressStore::new());
        let fragments: Vec<String> = (0..10).map(|i| format!("f{}", i)).collect();
        let fragment_refs: Vec<&str> = fragments.iter().map(|s| s.as_str()).collect();
        let orchestrator = orchestrator(ScriptedChatModel::new(&fragment_refs), progress.clone());
        let mut sink = CollectingSink::new();

        // flag flips after the fifth fragment check
        let calls = AtomicUsize::new(0);
        let cancelled = move || calls.fetch_add(1, Ordering::SeqCst) >= 5;

        orchestrator
            .stream_response("question", &user(), &mut sink, &cancelled)
            .await
            .unwrap();

        let frames = sink.json_payloads();
        // five chunks forwarded, then only the completion envelope
        assert_eq!(frames.len(), 6);
        for (i, frame) in frames.iter().take(5).enumerate() {
            assert_eq!(frame["chunk"], format!("f{}", i));
        }
        assert_eq!(frames[5]["type"], "completion");

        // the partial answer is persisted
        let conversation = progress.get_or_create_conversation(1).await.unwrap();
        let history = progress.history(&conversation).await.unwrap();
        assert_eq!(history[1].content, "f0f1f2f3f4");
    }

    #[tokio::test]
    async fn cancelled_before_first_fragment_writes_no_history() {
        let progress = Arc::new(MemoryProgressStore::new());
        let orchestrator = orchestrator(ScriptedChatModel::new(&["a", "b"]), progress.clone());
        let mut sink = CollectingSink::new();

        orchestrator
            .stream_response("question", &user(), &mut sink, &|| true)
            .await
            .unwrap();

        let frames = sink.json_payloads();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "completion");

        let conversation = progress.get_or_create_conversation(1).await.unwrap();
        assert!(progress.history(&conversation).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn llm_failure_bubbles_up() {
        let progress = Arc::new(MemoryProgressStore::new());
        let orchestrator = orchestrator(ScriptedChatModel::failing(), progress);
        let mut sink = CollectingSink::new();

        let err = orchestrator
            .stream_response("question", &user(), &mut sink, &|| false)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Unavailable(_)));
        assert!(sink.payloads.is_empty());
    }

    #[tokio::test]
    async fn history_is_capped_at_twenty_messages() {
        let progress = Arc::new(MemoryProgressStore::new());
        let orchestrator = orchestrator(ScriptedChatModel::new(&["ok"]), progress.clone());

        for i in 0..15 {
            let mut sink = CollectingSink::new();
            orchestrator
                .stream_response(&format!("q{}", i), &user(), &mut sink, &|| false)
                .await
                .unwrap();
        }

        let conversation = progress.get_or_create_conversation(1).await.unwrap();
        let history = progress.history(&conversation).await.unwrap();
        assert_eq!(history.len(), 20);
        // oldest turns were evicted
        assert_eq!(history[0].content, "q5");
    }

    #[test]
    fn context_lines_number_and_truncate() {
        let hits = vec![
            SearchHit {
                file_md5: "m".repeat(32),
                file_name: "guide.pdf".to_string(),
                chunk_id: 0,
                text: "短文本".to_string(),
                score: 1.0,
                user_id: 1,
                org_tag: "t".to_string(),
                is_public: false,
            },
            SearchHit {
                file_md5: "m".repeat(32),
                file_name: String::new(),
                chunk_id: 1,
                text: "长".repeat(1200),
                score: 0.5,
                user_id: 1,
                org_tag: "t".to_string(),
                is_public: false,
            },
        ];
        let context = build_context(&hits);
        let lines: Vec<&str> = context.lines().collect();

        assert!(lines[0].starts_with("[1] (guide.pdf) 短文本"));
        assert!(lines[1].starts_with("[2] (unknown) "));
        // 1000 code points plus the ellipsis
        let snippet = lines[1].trim_start_matches("[2] (unknown) ");
        assert_eq!(snippet.chars().count(), 1001);
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn system_message_wraps_context_or_placeholder() {
        let progress = Arc::new(MemoryProgressStore::new());
        let orchestrator = orchestrator(ScriptedChatModel::new(&[]), progress);

        let with_context = orchestrator.build_system_message("[1] (a.pdf) text\n");
        assert!(with_context.contains("<<REF>>\n[1] (a.pdf) text\n<<END>>"));

        let without = orchestrator.build_system_message("");
        assert!(without.contains("(no retrieval results this turn)"));
    }
}
