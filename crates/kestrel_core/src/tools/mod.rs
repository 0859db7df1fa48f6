//! Tool registry - the closed set of capabilities the model may invoke.
//!
//! Dispatch never raises: every fault (unknown tool, malformed arguments,
//! adapter failure) comes back as a status string so the orchestration loop
//! has a uniform continuation path.

mod automation;
mod content;
mod image;

pub use automation::{parse_action, AutomationAction, TaskRunner};
pub use content::ContentWriter;
pub use image::ImageGenerator;

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AssistantConfig;
use crate::llm::ChatApi;

/// The closed set of tools. Adding a variant forces every match below to be
/// revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    SystemTask,
    GenerateImage,
    WriteContent,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::SystemTask,
        ToolKind::GenerateImage,
        ToolKind::WriteContent,
    ];

    /// Wire name the model selects by.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::SystemTask => "execute_system_task",
            ToolKind::GenerateImage => "generate_image",
            ToolKind::WriteContent => "write_content",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// The single required string parameter.
    pub fn parameter(&self) -> &'static str {
        match self {
            ToolKind::SystemTask => "task_description",
            ToolKind::GenerateImage => "prompt",
            ToolKind::WriteContent => "topic",
        }
    }

    /// Capability label used in failure strings.
    fn label(&self) -> &'static str {
        match self {
            ToolKind::SystemTask => "Task execution",
            ToolKind::GenerateImage => "Image generation",
            ToolKind::WriteContent => "Content generation",
        }
    }

    /// Model-facing function schema.
    pub fn schema(&self) -> serde_json::Value {
        let (description, param_description) = match self {
            ToolKind::SystemTask => (
                "Execute system tasks like opening/closing applications, \
                 playing music, opening websites, desktop operations, etc.",
                "Description of the task to execute (e.g., 'open Chrome', \
                 'play music', 'close application')",
            ),
            ToolKind::GenerateImage => (
                "Generate images based on text prompts using AI image generation",
                "Detailed description of the image to generate",
            ),
            ToolKind::WriteContent => (
                "Generate and write content like articles, stories, code, reports, etc.",
                "Topic or type of content to generate",
            ),
        };

        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": {
                        self.parameter(): {
                            "type": "string",
                            "description": param_description,
                        }
                    },
                    "required": [self.parameter()],
                }
            }
        })
    }
}

/// Static registry wiring the three tool kinds to their adapters.
pub struct ToolRegistry {
    automation: TaskRunner,
    image: ImageGenerator,
    content: ContentWriter,
}

impl ToolRegistry {
    pub fn new(config: &AssistantConfig, client: Arc<dyn ChatApi>) -> Result<Self> {
        Ok(Self {
            automation: TaskRunner::new(
                config.automation.clone(),
                Arc::clone(&client),
                config.llm.clone(),
            ),
            image: ImageGenerator::new(config.image.clone())?,
            content: ContentWriter::new(
                config.content.clone(),
                client,
                config.llm.clone(),
            ),
        })
    }

    /// Schemas for every registered tool, in declaration order.
    pub fn describe(&self) -> Vec<serde_json::Value> {
        ToolKind::ALL.iter().map(|k| k.schema()).collect()
    }

    /// Run one tool invocation. `arguments` is the JSON-encoded argument
    /// object as returned by the model. Always returns text.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> String {
        let Some(kind) = ToolKind::from_name(name) else {
            warn!("Model requested unknown tool: {}", name);
            return format!("No tool named '{}' is available.", name);
        };

        let args: serde_json::Value = match serde_json::from_str(arguments) {
            Ok(value) => value,
            Err(e) => return failure(kind, &format!("invalid arguments: {}", e)),
        };

        let Some(input) = args.get(kind.parameter()).and_then(|v| v.as_str()) else {
            return failure(kind, &format!("missing '{}' argument", kind.parameter()));
        };

        debug!("Dispatching {} with input: {}", kind.name(), input);

        let result = match kind {
            ToolKind::SystemTask => self.automation.run(input).await,
            ToolKind::GenerateImage => self.image.run(input).await,
            ToolKind::WriteContent => self.content.run(input).await,
        };

        match result {
            Ok(status) => status,
            Err(e) => {
                warn!("{} failed: {:#}", kind.name(), e);
                failure(kind, &format!("{:#}", e))
            }
        }
    }
}

fn failure(kind: ToolKind, reason: &str) -> String {
    format!("{} failed: {}", kind.label(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeChatClient;

    fn test_registry() -> ToolRegistry {
        let config = AssistantConfig::default();
        let client = Arc::new(FakeChatClient::always_text("unused"));
        ToolRegistry::new(&config, client).unwrap()
    }

    #[test]
    fn test_tool_names_roundtrip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("nonexistent_tool"), None);
    }

    #[test]
    fn test_schema_shape() {
        let schema = ToolKind::GenerateImage.schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "generate_image");
        assert_eq!(
            schema["function"]["parameters"]["required"][0],
            "prompt"
        );
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_returns_text() {
        let registry = test_registry();
        let reply = registry.dispatch("nonexistent_tool", "{}").await;
        assert!(reply.contains("nonexistent_tool"));
    }

    #[tokio::test]
    async fn test_dispatch_malformed_arguments() {
        let registry = test_registry();
        let reply = registry.dispatch("generate_image", "not json").await;
        assert!(reply.starts_with("Image generation failed:"));
    }

    #[tokio::test]
    async fn test_dispatch_missing_parameter() {
        let registry = test_registry();
        let reply = registry
            .dispatch("execute_system_task", r#"{"wrong": "key"}"#)
            .await;
        assert!(reply.starts_with("Task execution failed:"));
        assert!(reply.contains("task_description"));
    }
}
