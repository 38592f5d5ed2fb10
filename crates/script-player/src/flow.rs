//! Classification of flow items and the commands they resolve to.
//!
//! A flow item is an untyped mapping whose keys select its meaning. Several historical
//! shapes of the same step must keep working, so resolution walks [`FLOW_RULES`] top to
//! bottom and the first rule whose predicate holds builds the command. Everything that
//! can be checked without touching the device (prompts, sleep durations, action
//! parameters) is validated while building, so a malformed step never has side effects.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::action::ActionRegistry;
use crate::agent::{Agent, SimpleAiOp};
use crate::errors::{ScriptError, ScriptResult};
use crate::locate::{
    build_detailed_locate_param, build_detailed_locate_param_and_rest_params, UserPrompt,
};
use crate::schema::stringify_scalar;

/// One step of a task: keys decide the semantics.
pub type FlowItem = Map<String, Value>;

/// Reserved key labelling the result of a step.
pub const RESULT_NAME_KEY: &str = "name";

const AI_ACT_KEYS: [&str; 3] = ["aiAct", "aiAction", "ai"];
const RECORD_KEYS: [&str; 2] = ["recordToReport", "logScreenshot"];

/// How a step's return value reaches the results map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPolicy {
    /// Stored under the step name, or the next auto index.
    Always,
    /// Stored only when the step carries a name.
    WhenNamed,
    Never,
}

/// A fully resolved, validated step ready to run against an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowCommand {
    AiAct {
        prompt: String,
        options: Map<String, Value>,
    },
    AiAssert {
        prompt: UserPrompt,
        error_message: Option<String>,
        options: Map<String, Value>,
    },
    SimpleAi {
        op: SimpleAiOp,
        prompt: Value,
        options: Map<String, Value>,
    },
    AiWaitFor {
        prompt: UserPrompt,
        options: Map<String, Value>,
    },
    Sleep {
        duration: Duration,
    },
    EvaluateJavaScript {
        script: String,
    },
    RecordToReport {
        title: String,
        content: String,
    },
    CallAction {
        action: String,
        param: Value,
    },
}

/// What a command produced. An assertion records its outcome and still fails the step.
#[derive(Debug)]
pub struct StepOutput {
    pub value: Option<Value>,
    pub failure: Option<ScriptError>,
}

impl StepOutput {
    fn value(value: Value) -> Self {
        Self {
            value: Some(value),
            failure: None,
        }
    }

    fn empty() -> Self {
        Self {
            value: None,
            failure: None,
        }
    }
}

impl FlowCommand {
    pub fn result_policy(&self) -> ResultPolicy {
        match self {
            Self::AiAssert { .. } | Self::SimpleAi { .. } | Self::EvaluateJavaScript { .. } => {
                ResultPolicy::Always
            }
            Self::AiAct { .. } | Self::CallAction { .. } => ResultPolicy::WhenNamed,
            Self::AiWaitFor { .. } | Self::Sleep { .. } | Self::RecordToReport { .. } => {
                ResultPolicy::Never
            }
        }
    }

    /// Run the command. Agent failures are returned as errors; annotations never fail.
    pub async fn execute(&self, agent: &dyn Agent) -> ScriptResult<StepOutput> {
        match self {
            Self::AiAct { prompt, options } => {
                let value = agent.ai_act(prompt, options.clone()).await?;
                Ok(StepOutput::value(value))
            }
            Self::AiAssert {
                prompt,
                error_message,
                options,
            } => {
                let outcome = agent
                    .ai_assert(prompt, error_message.as_deref(), options.clone())
                    .await?;
                let failure = (!outcome.pass).then(|| {
                    let message = outcome
                        .message
                        .clone()
                        .or_else(|| error_message.clone())
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| format!("assertion failed: {prompt}"));
                    ScriptError::AssertionFailed(message)
                });
                Ok(StepOutput {
                    value: Some(serde_json::to_value(&outcome)?),
                    failure,
                })
            }
            Self::SimpleAi {
                op,
                prompt,
                options,
            } => {
                let value = op.invoke(agent, prompt.clone(), options.clone()).await?;
                Ok(StepOutput::value(value))
            }
            Self::AiWaitFor { prompt, options } => {
                agent.ai_wait_for(prompt, options.clone()).await?;
                Ok(StepOutput::empty())
            }
            Self::Sleep { duration } => {
                tokio::time::sleep(*duration).await;
                Ok(StepOutput::empty())
            }
            Self::EvaluateJavaScript { script } => {
                let value = agent.evaluate_javascript(script).await?;
                Ok(StepOutput::value(value))
            }
            Self::RecordToReport { title, content } => {
                if let Err(e) = agent.record_to_report(title, content).await {
                    warn!(title = %title, error = %e, "failed to record to report");
                }
                Ok(StepOutput::empty())
            }
            Self::CallAction { action, param } => {
                let value = agent
                    .call_action_in_action_space(action, param.clone())
                    .await?;
                Ok(StepOutput::value(value))
            }
        }
    }
}

/// A flow item after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    /// Name of the rule that matched.
    pub rule: &'static str,
    /// Result label from the reserved `name` key.
    pub name: Option<String>,
    pub command: FlowCommand,
}

type Matcher = fn(&FlowItem, &ActionRegistry) -> bool;
type Builder = fn(&FlowItem, &ActionRegistry) -> ScriptResult<FlowCommand>;

/// One entry of the dispatch table.
pub struct FlowRule {
    pub name: &'static str,
    pub matches: Matcher,
    pub build: Builder,
}

/// Dispatch table, highest priority first.
pub static FLOW_RULES: [FlowRule; 11] = [
    FlowRule {
        name: "aiAct",
        matches: |item, _| has_any(item, &AI_ACT_KEYS),
        build: build_ai_act,
    },
    FlowRule {
        name: "aiAssert",
        matches: |item, _| item.contains_key("aiAssert"),
        build: build_ai_assert,
    },
    FlowRule {
        name: "simpleAi",
        matches: |item, _| first_simple_op(item).is_some(),
        build: build_simple_ai,
    },
    FlowRule {
        name: "aiWaitFor",
        matches: |item, _| item.contains_key("aiWaitFor"),
        build: build_ai_wait_for,
    },
    FlowRule {
        name: "sleep",
        matches: |item, _| item.contains_key("sleep"),
        build: build_sleep,
    },
    FlowRule {
        name: "javascript",
        matches: |item, _| item.contains_key("javascript"),
        build: build_javascript,
    },
    FlowRule {
        name: "recordToReport",
        matches: |item, _| has_any(item, &RECORD_KEYS),
        build: build_record_to_report,
    },
    FlowRule {
        name: "aiInput",
        matches: |item, _| item.contains_key("aiInput"),
        build: build_ai_input,
    },
    FlowRule {
        name: "aiKeyboardPress",
        matches: |item, _| item.contains_key("aiKeyboardPress"),
        build: build_ai_keyboard_press,
    },
    FlowRule {
        name: "aiScroll",
        matches: |item, _| item.contains_key("aiScroll"),
        build: build_ai_scroll,
    },
    FlowRule {
        name: "action",
        matches: |item, registry| !registry.matching(item).is_empty(),
        build: build_generic_action,
    },
];

/// Classify `item` and build its command.
pub fn resolve_flow_item(item: &FlowItem, registry: &ActionRegistry) -> ScriptResult<ResolvedStep> {
    let rule = FLOW_RULES
        .iter()
        .find(|rule| (rule.matches)(item, registry))
        .ok_or_else(|| ScriptError::UnknownFlowItem(Value::Object(item.clone()).to_string()))?;
    debug!(rule = rule.name, "flow item classified");

    let command = (rule.build)(item, registry)?;
    Ok(ResolvedStep {
        rule: rule.name,
        name: result_name(item),
        command,
    })
}

fn result_name(item: &FlowItem) -> Option<String> {
    match item.get(RESULT_NAME_KEY)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_any(item: &FlowItem, keys: &[&str]) -> bool {
    keys.iter().any(|k| item.contains_key(*k))
}

fn first_simple_op(item: &FlowItem) -> Option<SimpleAiOp> {
    item.keys().find_map(|k| SimpleAiOp::from_key(k))
}

/// JavaScript-style truthiness of an optional value.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// The item without the given keys and without the result name.
fn options_without(item: &FlowItem, keys: &[&str]) -> Map<String, Value> {
    item.iter()
        .filter(|(k, _)| k.as_str() != RESULT_NAME_KEY && !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn required_text(item: &FlowItem, key: &str, operation: &str) -> ScriptResult<String> {
    match item.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ScriptError::InvalidFlowItem(format!(
            "missing prompt for {operation}"
        ))),
    }
}

/// Text or structured prompt under `key`, as the assertion-style operations accept.
fn required_prompt(item: &FlowItem, key: &str) -> ScriptResult<UserPrompt> {
    item.get(key)
        .and_then(UserPrompt::from_value)
        .ok_or_else(|| ScriptError::InvalidFlowItem(format!("missing prompt for {key}")))
}

fn build_ai_act(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let prompt = AI_ACT_KEYS
        .iter()
        .find_map(|k| required_text(item, k, "ai (aiAct)").ok())
        .ok_or_else(|| ScriptError::InvalidFlowItem("missing prompt for ai (aiAct)".to_string()))?;
    Ok(FlowCommand::AiAct {
        prompt,
        options: options_without(item, &AI_ACT_KEYS),
    })
}

fn build_ai_assert(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let prompt = required_prompt(item, "aiAssert")?;
    let error_message = item
        .get("errorMessage")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(FlowCommand::AiAssert {
        prompt,
        error_message,
        options: options_without(item, &["aiAssert", "errorMessage"]),
    })
}

fn build_simple_ai(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let op = first_simple_op(item)
        .ok_or_else(|| ScriptError::InvalidFlowItem("no data extraction key".to_string()))?;
    let prompt = item.get(op.key()).cloned().unwrap_or(Value::Null);
    if !truthy(Some(&prompt)) {
        return Err(ScriptError::InvalidFlowItem(format!(
            "missing prompt for {}",
            op.key()
        )));
    }
    Ok(FlowCommand::SimpleAi {
        op,
        prompt,
        options: options_without(item, &[op.key()]),
    })
}

fn build_ai_wait_for(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let prompt = required_prompt(item, "aiWaitFor")?;
    let mut options = options_without(item, &["aiWaitFor"]);
    if let Some(timeout) = item.get("timeout").filter(|v| !v.is_null()) {
        options.insert("timeoutMs".to_string(), timeout.clone());
    }
    Ok(FlowCommand::AiWaitFor { prompt, options })
}

/// Integer prefix of a string, the way script authors write `"500"` or `"500ms"`.
fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn build_sleep(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let raw = item.get("sleep").cloned().unwrap_or(Value::Null);
    let ms = match &raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_int_prefix(s).map(|n| n as f64),
        _ => None,
    };
    let invalid = || {
        let shown = match &raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ScriptError::InvalidSleep(shown)
    };
    match ms {
        Some(ms) if ms > 0.0 && ms.is_finite() => Ok(FlowCommand::Sleep {
            duration: Duration::from_micros((ms * 1000.0).round() as u64),
        }),
        _ => Err(invalid()),
    }
}

fn build_javascript(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let script = required_text(item, "javascript", "javascript")?;
    Ok(FlowCommand::EvaluateJavaScript { script })
}

fn build_record_to_report(item: &FlowItem, _: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let title = RECORD_KEYS
        .iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or("untitled")
        .to_string();
    let content = item
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(FlowCommand::RecordToReport { title, content })
}

/// Validate `param` through the registry's descriptor for `action` and wrap it.
fn call_action(
    registry: &ActionRegistry,
    action: &str,
    param: Map<String, Value>,
) -> ScriptResult<FlowCommand> {
    let descriptor = registry.require(action)?;
    let param = descriptor.normalize_param(&Value::Object(param))?;
    Ok(FlowCommand::CallAction {
        action: descriptor.name.clone(),
        param,
    })
}

/// Put a detailed locate param for `prompt` under `locate`, when one resolves.
fn insert_locate(param: &mut Map<String, Value>, prompt: Option<&Value>, opts: &FlowItem) {
    let Some(prompt) = prompt.and_then(UserPrompt::from_value) else {
        return;
    };
    if let Some(locate) = build_detailed_locate_param(Some(&prompt), Some(opts)) {
        param.insert("locate".to_string(), locate.to_value());
    }
}

fn build_ai_input(item: &FlowItem, registry: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let ai_input = item.get("aiInput");
    let raw_value = item.get("value");
    let rest = options_without(item, &["aiInput", "value"]);

    // legacy: `aiInput` is the text and `locate` the target; otherwise `aiInput` is the target
    let (locate_prompt, value) = if truthy(rest.get("locate")) {
        let value = if truthy(ai_input) { ai_input } else { raw_value };
        (rest.get("locate"), value)
    } else {
        (ai_input.filter(|v| truthy(Some(v))), raw_value)
    };

    let mut param = rest.clone();
    if let Some(value) = value.filter(|v| !v.is_null()) {
        param.insert("value".to_string(), stringify_scalar(value.clone()));
    }
    insert_locate(&mut param, locate_prompt, &rest);
    call_action(registry, "Input", param)
}

fn build_ai_keyboard_press(
    item: &FlowItem,
    registry: &ActionRegistry,
) -> ScriptResult<FlowCommand> {
    let own = item.get("aiKeyboardPress");
    let rest = options_without(item, &["aiKeyboardPress"]);

    let (locate_prompt, key_name) = if truthy(rest.get("locate")) {
        (rest.get("locate"), own)
    } else if truthy(rest.get("keyName")) {
        (own, rest.get("keyName"))
    } else {
        (None, own)
    };

    let mut param = rest.clone();
    if let Some(key_name) = key_name.filter(|v| truthy(Some(v))) {
        param.insert("keyName".to_string(), key_name.clone());
    }
    insert_locate(&mut param, locate_prompt, &rest);
    call_action(registry, "KeyboardPress", param)
}

fn build_ai_scroll(item: &FlowItem, registry: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let rest = options_without(item, &["aiScroll"]);
    let locate_prompt = if truthy(rest.get("locate")) {
        rest.get("locate")
    } else {
        item.get("aiScroll")
    };

    let mut param = rest.clone();
    insert_locate(&mut param, locate_prompt, &rest);
    call_action(registry, "Scroll", param)
}

fn build_generic_action(item: &FlowItem, registry: &ActionRegistry) -> ScriptResult<FlowCommand> {
    let matched = registry.matching(item);
    let (action, key) = match matched.as_slice() {
        [] => {
            return Err(ScriptError::UnknownFlowItem(
                Value::Object(item.clone()).to_string(),
            ))
        }
        [single] => single,
        _ => {
            return Err(ScriptError::AmbiguousFlowItem {
                actions: matched.iter().map(|(a, _)| a.name.clone()).collect(),
                item: Value::Object(item.clone()).to_string(),
            })
        }
    };
    let shortcut = item.get(key.as_str()).cloned().unwrap_or(Value::Null);

    if let Value::String(s) = &shortcut {
        if action.accepts_bare_string() {
            let param = action.normalize_param(&Value::String(s.clone()))?;
            return Ok(FlowCommand::CallAction {
                action: action.name.clone(),
                param,
            });
        }
    }

    // an object under the action key carries the parameters themselves
    let mut opts = item.clone();
    let locate_prompt = match shortcut {
        Value::Object(fields) => {
            opts.extend(fields);
            None
        }
        other => UserPrompt::from_value(&other),
    };
    if let Some(prompt) = &locate_prompt {
        opts.insert("prompt".to_string(), prompt.to_value());
    }

    let mut excluded = vec![action.name.as_str(), RESULT_NAME_KEY];
    excluded.extend(action.interface_alias.as_deref());
    let split = build_detailed_locate_param_and_rest_params(locate_prompt.as_ref(), Some(&opts), &excluded);

    let mut param = split.rest_params;
    if let Some(schema) = &action.param_schema {
        for field in schema.locator_fields() {
            if field == "locate" {
                continue;
            }
            if let Some(target) = param.get_mut(field) {
                if let Some(canonical) = canonical_locate(target) {
                    *target = canonical;
                }
            }
        }
    }
    if let Some(locate) = split.locate_param {
        param.insert("locate".to_string(), locate.to_value());
    }

    debug!(action = %action.name, key = %key, "flow item matched action");
    let param = action.normalize_param(&Value::Object(param))?;
    Ok(FlowCommand::CallAction {
        action: action.name.clone(),
        param,
    })
}

/// Expand a locator given as text or as `{prompt, deepThink, ...}` into a locate param.
fn canonical_locate(target: &Value) -> Option<Value> {
    let locate = match target {
        Value::Object(obj) if obj.contains_key("prompt") => build_detailed_locate_param(None, Some(obj)),
        other => {
            let prompt = UserPrompt::from_value(other)?;
            build_detailed_locate_param(Some(&prompt), None)
        }
    }?;
    Some(locate.to_value())
}
