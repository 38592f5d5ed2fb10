//! Recording agent shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use script_player::catalogue::*;
use script_player::{
    ActionContext, ActionDescriptor, Agent, AssertOutcome, FlowItem, PlayerConfig, UserPrompt,
};

/// Ordered log of everything the agent was asked to do.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.contains(needle))
    }
}

fn logged<P>(
    log: &CallLog,
    name: &'static str,
) -> impl Fn(P, ActionContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static
where
    P: Serialize + Send + 'static,
{
    let log = log.clone();
    move |param: P, _ctx: ActionContext| {
        let log = log.clone();
        async move {
            let param = serde_json::to_value(&param)?;
            log.push(format!("{name} {param}"));
            Ok::<Value, anyhow::Error>(json!(format!("{name} done")))
        }
        .boxed()
    }
}

/// The standard catalogue, every call written to `log`.
pub fn recording_actions(log: &CallLog) -> Vec<ActionDescriptor> {
    vec![
        define_action_tap(logged(log, "Tap")),
        define_action_right_click(logged(log, "RightClick")),
        define_action_double_click(logged(log, "DoubleClick")),
        define_action_hover(logged(log, "Hover")),
        define_action_input(logged(log, "Input")),
        define_action_keyboard_press(logged(log, "KeyboardPress")),
        define_action_scroll(logged(log, "Scroll")),
        define_action_drag_and_drop(logged(log, "DragAndDrop")),
        define_action_long_press(logged(log, "LongPress")),
        define_action_swipe(logged(log, "Swipe")),
        define_action_clear_input(logged(log, "ClearInput")),
        define_action_cursor_move(logged(log, "CursorMove")),
        define_action_sleep(logged(log, "Sleep")),
    ]
}

pub struct MockAgent {
    pub log: CallLog,
    pub actions: Vec<ActionDescriptor>,
    /// `aiAct` prompts that fail
    pub failing_prompts: Vec<String>,
    pub assert_pass: bool,
    pub destroyed: AtomicBool,
}

impl MockAgent {
    pub fn new() -> Self {
        let log = CallLog::default();
        Self {
            actions: recording_actions(&log),
            log,
            failing_prompts: Vec::new(),
            assert_pass: true,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn failing_on(mut self, prompt: &str) -> Self {
        self.failing_prompts.push(prompt.to_string());
        self
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_failed_assertions(mut self) -> Self {
        self.assert_pass = false;
        self
    }

    pub fn was_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn get_action_space(&self) -> Vec<ActionDescriptor> {
        self.actions.clone()
    }

    async fn ai_act(&self, prompt: &str, options: Map<String, Value>) -> anyhow::Result<Value> {
        self.log.push(format!("aiAct {prompt} {}", Value::Object(options)));
        if self.failing_prompts.iter().any(|p| p == prompt) {
            anyhow::bail!("could not {prompt}");
        }
        Ok(Value::Null)
    }

    async fn ai_assert(
        &self,
        prompt: &UserPrompt,
        error_message: Option<&str>,
        _options: Map<String, Value>,
    ) -> anyhow::Result<AssertOutcome> {
        self.log.push(format!("aiAssert {prompt}"));
        Ok(AssertOutcome {
            pass: self.assert_pass,
            thought: Some(format!("checked {prompt}")),
            message: (!self.assert_pass)
                .then(|| error_message.unwrap_or("assertion failed").to_string()),
        })
    }

    async fn ai_wait_for(&self, prompt: &UserPrompt, options: Map<String, Value>) -> anyhow::Result<()> {
        self.log.push(format!("aiWaitFor {prompt} {}", Value::Object(options)));
        Ok(())
    }

    async fn ai_query(&self, prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        self.log.push(format!("aiQuery {prompt}"));
        Ok(json!({ "query": prompt }))
    }

    async fn ai_number(&self, prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        self.log.push(format!("aiNumber {prompt}"));
        Ok(json!(42))
    }

    async fn ai_string(&self, prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        self.log.push(format!("aiString {prompt}"));
        Ok(json!("text"))
    }

    async fn ai_boolean(&self, prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        self.log.push(format!("aiBoolean {prompt}"));
        Ok(json!(true))
    }

    async fn evaluate_javascript(&self, script: &str) -> anyhow::Result<Value> {
        self.log.push(format!("javascript {script}"));
        Ok(json!(2))
    }

    async fn record_to_report(&self, title: &str, content: &str) -> anyhow::Result<()> {
        self.log.push(format!("recordToReport {title} {content}"));
        anyhow::bail!("report is read-only")
    }

    fn report_file(&self) -> Option<String> {
        Some("script_player_run/report/run.html".to_string())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn item(value: Value) -> FlowItem {
    value.as_object().cloned().unwrap()
}

/// Configuration keeping results in memory.
pub fn in_memory() -> PlayerConfig {
    PlayerConfig {
        persist_results: false,
        ..PlayerConfig::default()
    }
}
