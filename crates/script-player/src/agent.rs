//! The external agent driving a device, and the session handed to the player.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::{ActionContext, ActionDescriptor};
use crate::errors::ScriptError;
use crate::locate::UserPrompt;

/// Callback receiving a short human-readable tip whenever the agent starts a sub-task.
pub type TaskStartTip = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome of an `aiAssert` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertOutcome {
    pub pass: bool,
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn unsupported(operation: &str) -> anyhow::Error {
    anyhow::anyhow!("{operation} is not supported by this agent")
}

/// A device agent. Only the action space is mandatory; every AI operation defaults to an
/// "unsupported" error so partial agents (a pure device driver, a test double) stay small.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The actions this agent exposes for its platform.
    fn get_action_space(&self) -> Vec<ActionDescriptor>;

    /// Context passed to every action call.
    fn action_context(&self) -> ActionContext {
        ActionContext::default()
    }

    /// Invoke an action of the action space with already-normalized parameters.
    async fn call_action_in_action_space(&self, name: &str, param: Value) -> anyhow::Result<Value> {
        let action = self
            .get_action_space()
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| ScriptError::ActionNotFound(name.to_string()))?;
        action.call(param, self.action_context()).await
    }

    async fn ai_act(&self, _prompt: &str, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiAct"))
    }

    async fn ai_assert(
        &self,
        _prompt: &UserPrompt,
        _error_message: Option<&str>,
        _options: Map<String, Value>,
    ) -> anyhow::Result<AssertOutcome> {
        Err(unsupported("aiAssert"))
    }

    async fn ai_wait_for(
        &self,
        _prompt: &UserPrompt,
        _options: Map<String, Value>,
    ) -> anyhow::Result<()> {
        Err(unsupported("aiWaitFor"))
    }

    async fn ai_query(&self, _prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiQuery"))
    }

    async fn ai_number(&self, _prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiNumber"))
    }

    async fn ai_string(&self, _prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiString"))
    }

    async fn ai_boolean(&self, _prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiBoolean"))
    }

    async fn ai_ask(&self, _prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiAsk"))
    }

    async fn ai_locate(&self, _prompt: Value, _options: Map<String, Value>) -> anyhow::Result<Value> {
        Err(unsupported("aiLocate"))
    }

    async fn evaluate_javascript(&self, _script: &str) -> anyhow::Result<Value> {
        Err(unsupported("javascript"))
    }

    async fn record_to_report(&self, _title: &str, _content: &str) -> anyhow::Result<()> {
        Err(unsupported("recordToReport"))
    }

    fn task_start_tip(&self) -> Option<TaskStartTip> {
        None
    }

    fn set_task_start_tip(&self, _tip: Option<TaskStartTip>) {}

    /// Path of the report the agent writes, if any.
    fn report_file(&self) -> Option<String> {
        None
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The data-extraction operations that map one-to-one onto an agent method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleAiOp {
    Query,
    Number,
    String,
    Boolean,
    Ask,
    Locate,
}

impl SimpleAiOp {
    pub const ALL: [SimpleAiOp; 6] = [
        Self::Query,
        Self::Number,
        Self::String,
        Self::Boolean,
        Self::Ask,
        Self::Locate,
    ];

    /// The flow-item key selecting this operation.
    pub fn key(self) -> &'static str {
        match self {
            Self::Query => "aiQuery",
            Self::Number => "aiNumber",
            Self::String => "aiString",
            Self::Boolean => "aiBoolean",
            Self::Ask => "aiAsk",
            Self::Locate => "aiLocate",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.key() == key)
    }

    pub async fn invoke(
        self,
        agent: &dyn Agent,
        prompt: Value,
        options: Map<String, Value>,
    ) -> anyhow::Result<Value> {
        match self {
            Self::Query => agent.ai_query(prompt, options).await,
            Self::Number => agent.ai_number(prompt, options).await,
            Self::String => agent.ai_string(prompt, options).await,
            Self::Boolean => agent.ai_boolean(prompt, options).await,
            Self::Ask => agent.ai_ask(prompt, options).await,
            Self::Locate => agent.ai_locate(prompt, options).await,
        }
    }
}

/// A named cleanup callback run once the script finishes.
pub struct FreeFn {
    pub name: String,
    run: Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>,
}

impl FreeFn {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move || f().boxed()),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        (self.run)().await
    }
}

impl fmt::Debug for FreeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeFn").field("name", &self.name).finish_non_exhaustive()
    }
}

/// What a setup closure produces: the agent plus its cleanup callbacks.
pub struct AgentSession {
    pub agent: Arc<dyn Agent>,
    pub free_fns: Vec<FreeFn>,
}

impl AgentSession {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            free_fns: Vec::new(),
        }
    }

    pub fn with_free_fn(mut self, free_fn: FreeFn) -> Self {
        self.free_fns.push(free_fn);
        self
    }
}
