//! The orchestration loop - one utterance in, one logged reply out.
//!
//! Per turn: gate empty input, write a draft exchange, build the prompt
//! context, consult the model once with the tool schema attached, dispatch
//! any requested tools in order, consult the model a second time only if a
//! tool fired, then store and return the final text. The loop is capped at
//! two model round-trips so a turn can never chain tools indefinitely.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AssistantConfig;
use crate::error::StoreError;
use crate::llm::{
    AssistantTurn, ChatApi, ChatMessage, ChatRequest, FunctionCall, HttpChatClient, LlmError,
    ToolCallRequest,
};
use crate::prompts::{EMPTY_INPUT_REPLY, ERROR_PREFIX, SYSTEM_INSTRUCTIONS};
use crate::store::{ConversationStore, Exchange, ExportFormat};
use crate::tools::ToolRegistry;

pub struct Assistant {
    config: AssistantConfig,
    client: Arc<dyn ChatApi>,
    store: ConversationStore,
    tools: ToolRegistry,
}

impl Assistant {
    /// Wire up an assistant from explicit parts. Tests hand in a fake
    /// client and an in-memory store here.
    pub fn new(
        config: AssistantConfig,
        client: Arc<dyn ChatApi>,
        store: ConversationStore,
    ) -> Result<Self> {
        let tools = ToolRegistry::new(&config, Arc::clone(&client))?;
        Ok(Self {
            config,
            client,
            store,
            tools,
        })
    }

    /// Production constructor: real HTTP client, on-disk store.
    pub async fn from_config(config: AssistantConfig) -> Result<Self> {
        let client = Arc::new(HttpChatClient::new(&config.llm)?);
        let store = ConversationStore::open(&config.storage.db_path).await?;
        Self::new(config, client, store)
    }

    /// Process one user utterance and return the reply.
    ///
    /// Only a failure to create the draft exchange escapes as an error;
    /// every other fault becomes the stored and returned reply text.
    pub async fn process_message(&self, utterance: &str) -> Result<String> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Ok(EMPTY_INPUT_REPLY.to_string());
        }

        let exchange_id = self
            .store
            .append(utterance)
            .await
            .context("failed to record the exchange")?;

        let reply = match self.run_round(utterance).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Orchestration round failed: {:#}", e);
                format!("{}: {:#}", ERROR_PREFIX, e)
            }
        };

        if let Err(e) = self.store.complete(exchange_id, &reply).await {
            error!("Failed to store reply for exchange {}: {}", exchange_id, e);
        }

        Ok(reply)
    }

    /// Search the conversation log, newest-first.
    pub async fn search_messages(&self, keyword: &str) -> Result<Vec<Exchange>, StoreError> {
        self.store.search(keyword).await
    }

    /// Export the conversation log in the given format and date range.
    pub async fn export_history(
        &self,
        format: ExportFormat,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<String, StoreError> {
        self.store.export(format, start_date, end_date).await
    }

    async fn run_round(&self, utterance: &str) -> Result<String> {
        let mut messages = self.build_context(utterance).await?;

        let first = self
            .client
            .chat(self.request(messages.clone(), true))
            .await
            .context("model call failed")?;

        if !first.has_tool_calls() {
            return extract_text(&first);
        }

        let requested: Vec<ToolCallRequest> = first
            .tool_calls
            .iter()
            .map(|call| ToolCallRequest {
                id: call.id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect();
        messages.push(ChatMessage::assistant_tool_calls(
            first.text.clone(),
            requested,
        ));

        // Dispatch in the order the model returned; all results are folded
        // into the prompt before the follow-up call.
        for call in &first.tool_calls {
            let result = self.tools.dispatch(&call.name, &call.arguments).await;
            info!("Tool {} -> {}", call.name, result);
            messages.push(ChatMessage::tool_result(&call.id, result));
        }

        // Tools are exhausted for this turn; no schema on the second call.
        let second = self
            .client
            .chat(self.request(messages, false))
            .await
            .context("follow-up model call failed")?;
        extract_text(&second)
    }

    /// Rebuild the model-facing message sequence from scratch. No session
    /// state survives between turns except what the store holds.
    async fn build_context(&self, utterance: &str) -> Result<Vec<ChatMessage>> {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_INSTRUCTIONS),
            ChatMessage::system(time_info_message(Local::now())),
        ];

        let history = self
            .store
            .recent_history(self.config.history.window)
            .await
            .context("failed to load history")?;
        for exchange in &history {
            messages.push(ChatMessage::user(exchange.user_text.clone()));
            if let Some(reply) = &exchange.assistant_text {
                messages.push(ChatMessage::assistant(reply.clone()));
            }
        }

        messages.push(ChatMessage::user(utterance));
        Ok(messages)
    }

    fn request(&self, messages: Vec<ChatMessage>, with_tools: bool) -> ChatRequest {
        let llm = &self.config.llm;
        ChatRequest {
            model: llm.model.clone(),
            messages,
            tools: with_tools.then(|| self.tools.describe()),
            tool_choice: with_tools.then(|| "auto".to_string()),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            top_p: llm.top_p,
        }
    }
}

fn extract_text(turn: &AssistantTurn) -> Result<String> {
    match turn.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::EmptyResponse.into()),
    }
}

/// System message carrying the current wall clock.
fn time_info_message<Tz: chrono::TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "Current time info: day {}, date {}, month {}, year {}, time {}",
        now.format("%A"),
        now.format("%d"),
        now.format("%B"),
        now.format("%Y"),
        now.format("%H:%M:%S")
    )
}
