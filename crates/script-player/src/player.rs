//! The script interpreter.
//!
//! A [`ScriptPlayer`] owns one run: it sets the agent up, walks tasks and their flow
//! items strictly in order, records results as they arrive and tracks the status of
//! every task. Nothing runs concurrently; each step is awaited before the next starts.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::action::ActionRegistry;
use crate::agent::{Agent, AgentSession, FreeFn, TaskStartTip};
use crate::config::PlayerConfig;
use crate::errors::{ScriptError, ScriptResult};
use crate::flow::{resolve_flow_item, FlowItem, ResultPolicy};
use crate::results::ResultStore;
use crate::script::{Script, ScriptTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Init,
    Running,
    Done,
    Error,
}

fn serialize_error<S: Serializer>(
    error: &Option<Arc<ScriptError>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Runtime state of one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub index: usize,
    pub name: String,
    pub flow: Vec<FlowItem>,
    pub continue_on_error: bool,
    pub status: Status,
    /// Index of the step being played, `None` before the first one
    pub current_step: Option<usize>,
    pub total_steps: usize,
    #[serde(
        serialize_with = "serialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<Arc<ScriptError>>,
}

/// Called synchronously on every task status transition.
pub type TaskStatusObserver = Box<dyn Fn(&TaskStatus) + Send + Sync>;

type SetupFn = Box<dyn FnOnce(Option<ScriptTarget>) -> BoxFuture<'static, anyhow::Result<AgentSession>> + Send>;

/// Latest agent tip, recorded only while the player is running.
#[derive(Default)]
struct TipRecorder {
    running: AtomicBool,
    tip: Mutex<Option<String>>,
}

impl TipRecorder {
    fn record(&self, tip: &str) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.tip.lock() {
            *slot = Some(tip.to_string());
        }
    }

    fn current(&self) -> Option<String> {
        self.tip.lock().ok().and_then(|slot| slot.clone())
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.tip.lock() {
            *slot = None;
        }
    }
}

pub struct ScriptPlayer {
    script: Script,
    setup: Option<SetupFn>,
    config: PlayerConfig,
    script_path: Option<PathBuf>,
    observer: Option<TaskStatusObserver>,
    output: PathBuf,
    results: ResultStore,
    status: Status,
    current_task_index: Option<usize>,
    task_status_list: Vec<TaskStatus>,
    error_in_setup: Option<Arc<ScriptError>>,
    agent: Option<Arc<dyn Agent>>,
    registry: ActionRegistry,
    tips: Arc<TipRecorder>,
    report_file: Option<String>,
}

impl fmt::Debug for ScriptPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptPlayer")
            .field("status", &self.status)
            .field("current_task_index", &self.current_task_index)
            .field("output", &self.output)
            .field("task_status_list", &self.task_status_list)
            .finish_non_exhaustive()
    }
}

impl ScriptPlayer {
    /// Create a player for `script`. `setup` receives the script's target section and
    /// returns the agent to drive along with its cleanup callbacks.
    pub fn new<F, Fut>(script: Script, setup: F) -> Self
    where
        F: FnOnce(Option<ScriptTarget>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<AgentSession>> + Send + 'static,
    {
        let task_status_list = script
            .tasks
            .iter()
            .enumerate()
            .map(|(index, task)| TaskStatus {
                index,
                name: task.name.clone(),
                flow: task.flow.clone(),
                continue_on_error: task.continue_on_error,
                status: Status::Init,
                current_step: None,
                total_steps: task.flow.len(),
                error: None,
            })
            .collect();

        let mut player = Self {
            script,
            setup: Some(Box::new(move |target| setup(target).boxed())),
            config: PlayerConfig::default(),
            script_path: None,
            observer: None,
            output: PathBuf::new(),
            results: ResultStore::default(),
            status: Status::Init,
            current_task_index: None,
            task_status_list,
            error_in_setup: None,
            agent: None,
            registry: ActionRegistry::default(),
            tips: Arc::new(TipRecorder::default()),
            report_file: None,
        };
        player.resolve_output();
        player
    }

    pub fn with_config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self.resolve_output();
        self
    }

    /// Path of the script file, used to name the default results file.
    pub fn with_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = Some(path.into());
        self.resolve_output();
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TaskStatus) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    fn resolve_output(&mut self) {
        let explicit = self.script.target.as_ref().and_then(ScriptTarget::output);
        self.output = self
            .config
            .resolve_output_path(explicit, self.script_path.as_deref());
        let sink = self.config.persist_results.then(|| self.output.clone());
        self.results = ResultStore::new(sink);
        debug!(output = %self.output.display(), "results output resolved");
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn current_task_index(&self) -> Option<usize> {
        self.current_task_index
    }

    pub fn task_status_list(&self) -> &[TaskStatus] {
        &self.task_status_list
    }

    pub fn error_in_setup(&self) -> Option<&ScriptError> {
        self.error_in_setup.as_deref()
    }

    pub fn result(&self) -> &ResultStore {
        &self.results
    }

    /// Where results are written.
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn report_file(&self) -> Option<&str> {
        self.report_file.as_deref()
    }

    /// The agent's latest task tip while a run is in progress.
    pub fn agent_status_tip(&self) -> Option<String> {
        self.tips.current()
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    fn set_player_status(&mut self, status: Status) {
        self.status = status;
        self.tips
            .running
            .store(status == Status::Running, Ordering::SeqCst);
    }

    fn set_task_status(&mut self, index: usize, status: Status, error: Option<ScriptError>) {
        let task = &mut self.task_status_list[index];
        task.status = status;
        if let Some(error) = error {
            task.error = Some(Arc::new(error));
        }
        if let Some(observer) = &self.observer {
            observer(&self.task_status_list[index]);
        }
    }

    /// Play the whole script. Returns the final player status.
    pub async fn run(&mut self) -> Status {
        self.set_player_status(Status::Running);

        let (agent, free_fns) = match self.setup_agent().await {
            Ok(ready) => ready,
            Err(e) => {
                error!(error = %e, "failed to set up agent");
                self.error_in_setup = Some(Arc::new(e));
                self.set_player_status(Status::Error);
                return self.status;
            }
        };
        info!(tasks = self.task_status_list.len(), "script started");

        let mut error_flag = false;
        for index in 0..self.task_status_list.len() {
            self.set_task_status(index, Status::Running, None);
            self.current_task_index = Some(index);

            match self.play_task(index, agent.as_ref()).await {
                Ok(()) => {
                    info!(task = %self.task_status_list[index].name, "task done");
                    self.set_task_status(index, Status::Done, None);
                }
                Err(e) => {
                    let continue_on_error = self.task_status_list[index].continue_on_error;
                    error!(
                        task = %self.task_status_list[index].name,
                        error = %e,
                        continue_on_error,
                        "task failed"
                    );
                    self.set_task_status(index, Status::Error, Some(e));
                    if !continue_on_error {
                        self.report_file = agent.report_file();
                        error_flag = true;
                        break;
                    }
                }
            }
            self.report_file = agent.report_file();
        }

        self.set_player_status(if error_flag { Status::Error } else { Status::Done });
        self.tips.clear();

        for free_fn in free_fns {
            let name = free_fn.name.clone();
            match std::panic::AssertUnwindSafe(free_fn.run()).catch_unwind().await {
                Ok(Ok(())) => debug!(name = %name, "cleanup done"),
                Ok(Err(e)) => warn!(name = %name, error = %e, "cleanup failed"),
                Err(_) => warn!(name = %name, "cleanup panicked"),
            }
        }

        info!(status = ?self.status, "script finished");
        self.status
    }

    /// Run the setup closure, build the action registry and hook the tip slot.
    async fn setup_agent(&mut self) -> ScriptResult<(Arc<dyn Agent>, Vec<FreeFn>)> {
        let setup = self
            .setup
            .take()
            .ok_or_else(|| ScriptError::InvalidScript("script player has already run".to_string()))?;
        let AgentSession {
            agent,
            mut free_fns,
        } = setup(self.script.target.clone()).await?;
        self.registry = ActionRegistry::new(agent.get_action_space())?;

        let original_tip = agent.task_start_tip();
        let chained = original_tip.clone();
        let tips = Arc::clone(&self.tips);
        let wrapped: TaskStartTip = Arc::new(move |tip: &str| {
            tips.record(tip);
            if let Some(original) = &chained {
                original(tip);
            }
        });
        agent.set_task_start_tip(Some(wrapped));

        let restore_target = Arc::clone(&agent);
        free_fns.push(FreeFn::new("restore-agent-onTaskStartTip", move || async move {
            restore_target.set_task_start_tip(original_tip);
            Ok(())
        }));

        self.agent = Some(Arc::clone(&agent));
        Ok((agent, free_fns))
    }

    async fn play_task(&mut self, index: usize, agent: &dyn Agent) -> ScriptResult<()> {
        let flow = self.task_status_list[index].flow.clone();
        for (step, item) in flow.iter().enumerate() {
            self.task_status_list[index].current_step = Some(step);
            let item_json = Value::Object(item.clone());
            debug!(task = index, step, item = %item_json, "playing step");

            let resolved = resolve_flow_item(item, &self.registry)?;
            let policy = resolved.command.result_policy();
            let output = resolved.command.execute(agent).await?;

            if let Some(value) = output.value {
                match (policy, resolved.name.as_deref()) {
                    (ResultPolicy::Always, name) => {
                        self.results.set(name, value).await?;
                    }
                    (ResultPolicy::WhenNamed, Some(name)) => {
                        self.results.set(Some(name), value).await?;
                    }
                    _ => {}
                }
            }
            if let Some(failure) = output.failure {
                return Err(failure);
            }
        }
        Ok(())
    }

    /// Destroy the agent of the last run, if any.
    pub async fn destroy_agent(&mut self) -> ScriptResult<()> {
        if let Some(agent) = self.agent.take() {
            agent.destroy().await?;
        }
        Ok(())
    }
}
