//! System automation - the allow-listed capability adapter.
//!
//! Free-text task descriptions resolve to one of a closed set of actions.
//! A deterministic verb parser runs first; when it cannot decide, one
//! strict-JSON model call resolves the task, and the result is validated
//! against the same closed set. The action enum is the hard boundary: the
//! model can pick an action and a target, never a command line.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;
use tracing::info;

use crate::config::{AutomationConfig, LlmConfig};
use crate::llm::{ChatApi, ChatMessage, ChatRequest};
use crate::prompts::AUTOMATION_RESOLVER_INSTRUCTIONS;

const RESOLVER_MAX_TOKENS: u32 = 256;
const MAX_TARGET_LEN: usize = 200;

/// The closed set of automation actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationAction {
    OpenApp(String),
    CloseApp(String),
    OpenUrl(String),
    PlayMedia(String),
    WebSearch(String),
}

impl AutomationAction {
    pub fn describe(&self) -> String {
        match self {
            AutomationAction::OpenApp(app) => format!("open {}", app),
            AutomationAction::CloseApp(app) => format!("close {}", app),
            AutomationAction::OpenUrl(url) => format!("open {}", url),
            AutomationAction::PlayMedia(query) => format!("play {}", query),
            AutomationAction::WebSearch(query) => format!("search the web for {}", query),
        }
    }

    fn target(&self) -> &str {
        match self {
            AutomationAction::OpenApp(t)
            | AutomationAction::CloseApp(t)
            | AutomationAction::OpenUrl(t)
            | AutomationAction::PlayMedia(t)
            | AutomationAction::WebSearch(t) => t,
        }
    }
}

/// Map a task description onto an action without consulting the model.
pub fn parse_action(task: &str) -> Option<AutomationAction> {
    let lower = task.trim().to_lowercase();

    for verb in ["open ", "launch ", "start "] {
        if let Some(rest) = lower.strip_prefix(verb) {
            let target = rest.trim();
            if looks_like_url(target) {
                return Some(AutomationAction::OpenUrl(target.to_string()));
            }
            return Some(AutomationAction::OpenApp(target.to_string()));
        }
    }

    for verb in ["close ", "quit ", "stop "] {
        if let Some(rest) = lower.strip_prefix(verb) {
            return Some(AutomationAction::CloseApp(rest.trim().to_string()));
        }
    }

    if let Some(rest) = lower.strip_prefix("play ") {
        return Some(AutomationAction::PlayMedia(rest.trim().to_string()));
    }

    for verb in ["search for ", "google ", "look up "] {
        if let Some(rest) = lower.strip_prefix(verb) {
            return Some(AutomationAction::WebSearch(rest.trim().to_string()));
        }
    }

    None
}

fn looks_like_url(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || (target.contains('.') && !target.contains(' '))
}

/// Parse the resolver model's strict-JSON answer into an action.
pub fn parse_resolved(text: &str) -> Result<AutomationAction> {
    // Models occasionally wrap JSON in a code fence despite instructions.
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: serde_json::Value =
        serde_json::from_str(trimmed).context("resolver did not return JSON")?;

    let action = value
        .get("action")
        .and_then(|v| v.as_str())
        .context("resolver JSON has no 'action'")?;
    let target = value
        .get("target")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    match action {
        "open_app" => Ok(AutomationAction::OpenApp(target)),
        "close_app" => Ok(AutomationAction::CloseApp(target)),
        "open_url" => Ok(AutomationAction::OpenUrl(target)),
        "play_media" => Ok(AutomationAction::PlayMedia(target)),
        "web_search" => Ok(AutomationAction::WebSearch(target)),
        "none" => bail!("the task does not map to a supported action"),
        other => bail!("resolver proposed unsupported action '{}'", other),
    }
}

/// Reject targets that could smuggle shell syntax.
fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        bail!("empty target");
    }
    if target.len() > MAX_TARGET_LEN {
        bail!("target too long");
    }
    if target
        .chars()
        .any(|c| matches!(c, ';' | '|' | '&' | '$' | '<' | '>' | '`' | '\\' | '\'' | '"' | '\n'))
    {
        bail!("target contains forbidden characters");
    }
    Ok(())
}

/// Launch-name aliases for applications whose binary is not their spoken
/// name. Unknown single-word names launch as-is; anything else is refused.
fn known_apps() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("chrome", "google-chrome"),
        ("google chrome", "google-chrome"),
        ("vs code", "code"),
        ("visual studio code", "code"),
        ("file manager", "nautilus"),
        ("files", "nautilus"),
        ("terminal", "x-terminal-emulator"),
        ("text editor", "gedit"),
    ])
}

/// Runs automation tasks through the action allow-list.
pub struct TaskRunner {
    config: AutomationConfig,
    client: Arc<dyn ChatApi>,
    llm: LlmConfig,
}

impl TaskRunner {
    pub fn new(config: AutomationConfig, client: Arc<dyn ChatApi>, llm: LlmConfig) -> Self {
        Self {
            config,
            client,
            llm,
        }
    }

    /// Resolve and execute one task. Errors are contained by the registry.
    pub async fn run(&self, task: &str) -> Result<String> {
        let task = task.trim();
        if task.is_empty() {
            bail!("empty task description");
        }

        let action = match parse_action(task) {
            Some(action) => action,
            None => self.resolve_with_model(task).await?,
        };
        validate_target(action.target())?;

        if self.config.dry_run {
            return Ok(format!("Resolved task but did not run it: would {}.", action.describe()));
        }

        info!("Executing automation action: {}", action.describe());
        execute(&action)?;
        Ok(format!("Task executed successfully: {}.", action.describe()))
    }

    /// One strict-JSON model call to map an unparsed task onto an action.
    async fn resolve_with_model(&self, task: &str) -> Result<AutomationAction> {
        let request = ChatRequest {
            model: self.llm.model.clone(),
            messages: vec![
                ChatMessage::system(AUTOMATION_RESOLVER_INSTRUCTIONS),
                ChatMessage::user(task),
            ],
            tools: None,
            tool_choice: None,
            max_tokens: RESOLVER_MAX_TOKENS,
            temperature: 0.0,
            top_p: 1.0,
        };

        let turn = self
            .client
            .chat(request)
            .await
            .context("task resolver call failed")?;
        let text = turn.text.as_deref().unwrap_or("");
        parse_resolved(text)
    }
}

fn execute(action: &AutomationAction) -> Result<()> {
    match action {
        AutomationAction::OpenApp(app) => open_app(app),
        AutomationAction::CloseApp(app) => close_app(app),
        AutomationAction::OpenUrl(url) => {
            let url = if url.starts_with("http://") || url.starts_with("https://") {
                url.clone()
            } else {
                format!("https://{}", url)
            };
            open_url(&url)
        }
        AutomationAction::PlayMedia(query) => open_url(&format!(
            "https://www.youtube.com/results?search_query={}",
            urlencoding::encode(query)
        )),
        AutomationAction::WebSearch(query) => open_url(&format!(
            "https://www.google.com/search?q={}",
            urlencoding::encode(query)
        )),
    }
}

fn open_app(app: &str) -> Result<()> {
    let aliases = known_apps();
    let binary = match aliases.get(app) {
        Some(binary) => *binary,
        None if app.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') => app,
        None => bail!("'{}' is not a known application", app),
    };

    Command::new(binary)
        .spawn()
        .with_context(|| format!("failed to launch '{}'", binary))?;
    Ok(())
}

#[cfg(unix)]
fn close_app(app: &str) -> Result<()> {
    let status = Command::new("pkill")
        .args(["-f", app])
        .status()
        .context("failed to run pkill")?;
    if !status.success() {
        bail!("no running process matched '{}'", app);
    }
    Ok(())
}

#[cfg(windows)]
fn close_app(app: &str) -> Result<()> {
    let status = Command::new("taskkill")
        .args(["/im", &format!("{}.exe", app), "/f"])
        .status()
        .context("failed to run taskkill")?;
    if !status.success() {
        bail!("no running process matched '{}'", app);
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_url(url: &str) -> Result<()> {
    Command::new("xdg-open")
        .arg(url)
        .spawn()
        .context("failed to run xdg-open")?;
    Ok(())
}

#[cfg(target_os = "macos")]
fn open_url(url: &str) -> Result<()> {
    Command::new("open")
        .arg(url)
        .spawn()
        .context("failed to run open")?;
    Ok(())
}

#[cfg(windows)]
fn open_url(url: &str) -> Result<()> {
    Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn()
        .context("failed to run start")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AssistantTurn, FakeChatClient};

    #[test]
    fn test_parse_open_app() {
        assert_eq!(
            parse_action("open Chrome"),
            Some(AutomationAction::OpenApp("chrome".to_string()))
        );
        assert_eq!(
            parse_action("launch spotify"),
            Some(AutomationAction::OpenApp("spotify".to_string()))
        );
    }

    #[test]
    fn test_parse_open_url() {
        assert_eq!(
            parse_action("open https://example.com"),
            Some(AutomationAction::OpenUrl("https://example.com".to_string()))
        );
        assert_eq!(
            parse_action("open example.com"),
            Some(AutomationAction::OpenUrl("example.com".to_string()))
        );
    }

    #[test]
    fn test_parse_close_play_search() {
        assert_eq!(
            parse_action("close spotify"),
            Some(AutomationAction::CloseApp("spotify".to_string()))
        );
        assert_eq!(
            parse_action("play some jazz"),
            Some(AutomationAction::PlayMedia("some jazz".to_string()))
        );
        assert_eq!(
            parse_action("look up rust lifetimes"),
            Some(AutomationAction::WebSearch("rust lifetimes".to_string()))
        );
    }

    #[test]
    fn test_parse_unknown_task() {
        assert_eq!(parse_action("make me a sandwich"), None);
    }

    #[test]
    fn test_validate_target_rejects_shell_syntax() {
        assert!(validate_target("chrome").is_ok());
        assert!(validate_target("chrome; rm -rf /").is_err());
        assert!(validate_target("$(evil)").is_err());
        assert!(validate_target("").is_err());
    }

    #[test]
    fn test_parse_resolved_json() {
        let action =
            parse_resolved(r#"{"action": "open_app", "target": "firefox"}"#).unwrap();
        assert_eq!(action, AutomationAction::OpenApp("firefox".to_string()));
    }

    #[test]
    fn test_parse_resolved_fenced_json() {
        let action = parse_resolved("```json\n{\"action\": \"web_search\", \"target\": \"rust\"}\n```")
            .unwrap();
        assert_eq!(action, AutomationAction::WebSearch("rust".to_string()));
    }

    #[test]
    fn test_parse_resolved_none_action() {
        assert!(parse_resolved(r#"{"action": "none", "target": ""}"#).is_err());
        assert!(parse_resolved("not json at all").is_err());
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_executing() {
        let runner = TaskRunner::new(
            AutomationConfig { dry_run: true },
            Arc::new(FakeChatClient::always_text("unused")),
            LlmConfig::default(),
        );

        let status = runner.run("open chrome").await.unwrap();
        assert!(status.contains("would open chrome"));
    }

    #[tokio::test]
    async fn test_model_resolution_feeds_allow_list() {
        let client = FakeChatClient::new(vec![Ok(AssistantTurn::text(
            r#"{"action": "close_app", "target": "spotify"}"#,
        ))]);
        let runner = TaskRunner::new(
            AutomationConfig { dry_run: true },
            Arc::new(client),
            LlmConfig::default(),
        );

        let status = runner.run("I'm done listening to music").await.unwrap();
        assert!(status.contains("would close spotify"));
    }

    #[tokio::test]
    async fn test_resolver_refusal_is_an_error() {
        let client = FakeChatClient::new(vec![Ok(AssistantTurn::text(
            r#"{"action": "none", "target": ""}"#,
        ))]);
        let runner = TaskRunner::new(
            AutomationConfig { dry_run: true },
            Arc::new(client),
            LlmConfig::default(),
        );

        assert!(runner.run("fold my laundry").await.is_err());
    }
}
