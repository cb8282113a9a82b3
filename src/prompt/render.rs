//! Prompt Renderer - Render the iteration prompt using Handlebars

use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;

use crate::config::Config;
use crate::error::{RelayrError, Result};

const STANDARD_NAME: &str = "standard";

/// Instructions given to the agent at the start of every iteration.
pub const STANDARD_TEMPLATE: &str = r#"# Iteration {{iteration}}

You are an autonomous development agent. Your memory does not survive between
iterations: everything you know must come from the files below.

## First, read the state files
1. `{{task_file}}` - the task and its success criteria checklist
2. `{{state_dir}}/guardrails.md` - lessons learned so far; follow every one
3. `{{state_dir}}/session.log` - what previous iterations did
4. `{{state_dir}}/errors.log` - recent failures

## Work protocol
- Pick the first unchecked criterion (`[ ]`) and work only on it.
- When it is verifiably done, change its marker to `[x]` in `{{task_file}}`.
- Commit after every completed criterion so the next iteration starts clean.
- Never remove or add criteria.

## When something fails
Record the lesson in `{{state_dir}}/guardrails.md` before retrying, so the
next iteration does not repeat the mistake.

## Context budget
Your token budget is limited ({{rotate_threshold}} tokens). When it runs out
you will be stopped and a fresh iteration will continue from the files.
Keep the checklist current so no work is lost.

When every criterion is `[x]`, stop.
"#;

/// Values substituted into the standard template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub iteration: u64,
    pub task_file: String,
    pub state_dir: String,
    pub rotate_threshold: u64,
}

impl PromptContext {
    pub fn new(config: &Config, iteration: u64) -> Self {
        Self {
            iteration,
            task_file: display(&config.paths.task_file),
            state_dir: display(&config.paths.state_dir),
            rotate_threshold: config.monitor.rotate_threshold,
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Renders prompt templates using Handlebars templating
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl PromptRenderer {
    /// Create a renderer with the standard template registered.
    pub fn new() -> Result<Self> {
        Self::with_template(STANDARD_TEMPLATE)
    }

    /// Create a renderer around a custom template.
    pub fn with_template(template: &str) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Prompts are plain text; never HTML-escape
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(STANDARD_NAME, template)
            .map_err(|e| RelayrError::Prompt(format!("Failed to register template: {}", e)))?;
        Ok(Self { handlebars })
    }

    /// Render the prompt for one iteration.
    pub fn render(&self, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render(STANDARD_NAME, context)
            .map_err(|e| RelayrError::Prompt(format!("Failed to render template: {}", e)))
    }

    /// Render any serializable context through an ad-hoc template.
    pub fn render_with<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map_err(|e| RelayrError::Prompt(format!("Failed to render template: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(iteration: u64) -> PromptContext {
        PromptContext::new(&Config::default(), iteration)
    }

    #[test]
    fn test_standard_prompt_mentions_iteration_and_files() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer.render(&context(4)).unwrap();

        assert!(prompt.starts_with("# Iteration 4"));
        assert!(prompt.contains("`RALPH_TASK.md`"));
        assert!(prompt.contains("`.ralph/guardrails.md`"));
        assert!(prompt.contains("80000 tokens"));
    }

    #[test]
    fn test_prompt_is_not_html_escaped() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer.render(&context(1)).unwrap();
        assert!(prompt.contains("`[ ]`"));
        assert!(!prompt.contains("&#x60;"));
    }

    #[test]
    fn test_custom_template() {
        let renderer = PromptRenderer::with_template("iter={{iteration}} task={{task_file}}").unwrap();
        assert_eq!(renderer.render(&context(2)).unwrap(), "iter=2 task=RALPH_TASK.md");
    }

    #[test]
    fn test_strict_mode_rejects_unknown_variable() {
        let renderer = PromptRenderer::with_template("{{nonexistent}}").unwrap();
        assert!(renderer.render(&context(1)).is_err());
    }

    #[test]
    fn test_invalid_template_rejected() {
        assert!(PromptRenderer::with_template("{{#if}}").is_err());
    }

    #[test]
    fn test_render_with() {
        let renderer = PromptRenderer::new().unwrap();
        let out = renderer
            .render_with("{{a}}-{{b}}", &serde_json::json!({"a": 1, "b": "two"}))
            .unwrap();
        assert_eq!(out, "1-two");
    }
}
