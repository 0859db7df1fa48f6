//! Content generation adapter.
//!
//! One model call with a writer persona; the result lands in a markdown
//! file named after the topic.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{ContentConfig, LlmConfig};
use crate::llm::{ChatApi, ChatMessage, ChatRequest};
use crate::prompts::WRITER_INSTRUCTIONS;

const CONTENT_MAX_TOKENS: u32 = 4096;
const MAX_SLUG_LEN: usize = 60;

pub struct ContentWriter {
    config: ContentConfig,
    client: Arc<dyn ChatApi>,
    llm: LlmConfig,
}

impl ContentWriter {
    pub fn new(config: ContentConfig, client: Arc<dyn ChatApi>, llm: LlmConfig) -> Self {
        Self {
            config,
            client,
            llm,
        }
    }

    /// Generate content for `topic` and save it under the output dir.
    pub async fn run(&self, topic: &str) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            bail!("empty topic");
        }

        let request = ChatRequest {
            model: self.llm.model.clone(),
            messages: vec![
                ChatMessage::system(WRITER_INSTRUCTIONS),
                ChatMessage::user(topic),
            ],
            tools: None,
            tool_choice: None,
            max_tokens: CONTENT_MAX_TOKENS,
            temperature: self.llm.temperature,
            top_p: self.llm.top_p,
        };

        let turn = self
            .client
            .chat(request)
            .await
            .context("writer call failed")?;
        let body = match turn.text.as_deref() {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => bail!("writer returned no content"),
        };

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .context("failed to create content directory")?;

        let path = self.output_path(topic);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("failed to save content to {}", path.display()))?;

        info!("Saved generated content to {}", path.display());
        Ok(format!(
            "Content generated successfully and saved to {}.",
            path.display()
        ))
    }

    fn output_path(&self, topic: &str) -> PathBuf {
        self.config.output_dir.join(format!("{}.md", slugify(topic)))
    }
}

/// Turn a topic into a safe filename stem.
fn slugify(topic: &str) -> String {
    // Keep word characters, spaces, and dashes; collapse spaces to underscores.
    let keep = Regex::new(r"[^\w\s-]").unwrap();
    let cleaned = keep.replace_all(topic, "");
    let slug: String = cleaned
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_SLUG_LEN)
        .collect();

    if slug.is_empty() {
        "content".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AssistantTurn, FakeChatClient, LlmError};

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("a story about rust"), "a_story_about_rust");
        assert_eq!(slugify("what?! why?!"), "what_why");
        assert_eq!(slugify("!!!"), "content");
    }

    #[tokio::test]
    async fn test_content_saved_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ContentWriter::new(
            ContentConfig {
                output_dir: dir.path().to_path_buf(),
            },
            Arc::new(FakeChatClient::always_text("Once upon a time.")),
            LlmConfig::default(),
        );

        let status = writer.run("a short story").await.unwrap();
        assert!(status.contains("a_short_story.md"));

        let saved = std::fs::read_to_string(dir.path().join("a_short_story.md")).unwrap();
        assert_eq!(saved, "Once upon a time.");
    }

    #[tokio::test]
    async fn test_writer_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ContentWriter::new(
            ContentConfig {
                output_dir: dir.path().to_path_buf(),
            },
            Arc::new(FakeChatClient::always_error(LlmError::EmptyResponse)),
            LlmConfig::default(),
        );

        assert!(writer.run("anything").await.is_err());
    }
}
