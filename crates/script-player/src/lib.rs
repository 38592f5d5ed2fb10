//! Declarative automation-script interpreter
//!
//! A script is an ordered list of tasks, each an ordered list of flow items. The
//! [`ScriptPlayer`] resolves every flow item either to an intrinsic AI operation of the
//! [`Agent`] or to an action of the agent's action space, validates its parameters
//! through the action's [`Schema`], runs it and records the results.

pub mod action;
pub mod agent;
pub mod catalogue;
pub mod config;
pub mod errors;
pub mod flow;
pub mod locate;
pub mod logging;
pub mod player;
pub mod results;
pub mod schema;
pub mod script;
pub mod swipe;

pub use action::{
    action_call, define_action, ActionCall, ActionConfig, ActionContext, ActionDescriptor,
    ActionRegistry, ActionSummary,
};
pub use agent::{Agent, AgentSession, AssertOutcome, FreeFn, SimpleAiOp, TaskStartTip};
pub use config::PlayerConfig;
pub use errors::{ScriptError, ScriptResult};
pub use flow::{resolve_flow_item, FlowCommand, FlowItem, ResolvedStep, FLOW_RULES};
pub use locate::{
    build_detailed_locate_param, build_detailed_locate_param_and_rest_params, LocateParam,
    UserPrompt,
};
pub use player::{ScriptPlayer, Status, TaskStatus, TaskStatusObserver};
pub use results::ResultStore;
pub use schema::{Field, Schema};
pub use script::{parse_yaml_script, Script, ScriptTarget, Task, TargetKind};
pub use swipe::{normalize_mobile_swipe_param, NormalizedSwipe, Point, ScreenSize, SwipeGesture};
