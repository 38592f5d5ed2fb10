//! Script model and YAML loading.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::{ScriptError, ScriptResult};
use crate::flow::FlowItem;

/// One named sequence of flow items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    pub flow: Vec<FlowItem>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Task {
    pub fn new(name: impl Into<String>, flow: Vec<FlowItem>) -> Self {
        Self {
            name: name.into(),
            flow,
            continue_on_error: false,
        }
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Web,
    Android,
    Ios,
    /// Given under `config`, for custom interfaces
    Generic,
}

/// The environment section of a script, kept as a mapping for the setup closure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptTarget {
    pub kind: TargetKind,
    pub env: Map<String, Value>,
}

impl ScriptTarget {
    /// Explicit path for the results file.
    pub fn output(&self) -> Option<&str> {
        self.env.get("output").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    pub target: Option<ScriptTarget>,
    pub tasks: Vec<Task>,
}

impl Script {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            target: None,
            tasks,
        }
    }

    pub fn with_target(mut self, target: ScriptTarget) -> Self {
        self.target = Some(target);
        self
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var regex must compile"))
}

fn device_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"deviceId:\s*(\d+)").expect("device id regex must compile"))
}

/// Replace every `${NAME}` with the value of environment variable `NAME`.
pub fn interpolate_env_vars(content: &str) -> ScriptResult<String> {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for caps in env_var_pattern().captures_iter(content) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().trim();
        let value =
            std::env::var(name).map_err(|_| ScriptError::MissingEnvVar(name.to_string()))?;
        out.push_str(&content[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&content[last..]);
    Ok(out)
}

/// Quote numeric android device ids so they stay strings.
fn quote_device_ids(content: &str) -> String {
    if !content.contains("android") || !device_id_pattern().is_match(content) {
        return content.to_string();
    }
    let mut last_id = String::new();
    let quoted = device_id_pattern().replace_all(content, |caps: &Captures| {
        last_id = caps[1].to_string();
        format!("deviceId: '{}'", &caps[1])
    });
    warn!(
        device_id = %last_id,
        "please use string-style deviceId in yaml script, for example: deviceId: \"{last_id}\""
    );
    quoted.into_owned()
}

/// A present section becomes a mapping; `null` counts as an empty one.
fn section(doc: &Map<String, Value>, key: &str) -> Option<Value> {
    doc.get(key).map(|v| match v {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    })
}

/// Parse a YAML automation script.
///
/// Environment placeholders are expanded first. Unless `ignore_checking_target` is set,
/// exactly one of `target`/`web`, `android` and `ios` must be present.
pub fn parse_yaml_script(
    content: &str,
    file_path: Option<&str>,
    ignore_checking_target: bool,
) -> ScriptResult<Script> {
    let content = interpolate_env_vars(&quote_device_ids(content))?;
    let doc: Value = serde_yaml::from_str(&content)?;
    let path_tip = file_path
        .map(|p| format!(", failed to load {p}"))
        .unwrap_or_default();
    let Value::Object(doc) = doc else {
        return Err(ScriptError::InvalidScript(format!(
            "yaml script must be a mapping{path_tip}"
        )));
    };

    // a null `web` falls through to `target`
    let web = doc
        .get("web")
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| section(&doc, "target"));
    let platforms = [
        (TargetKind::Web, web),
        (TargetKind::Android, section(&doc, "android")),
        (TargetKind::Ios, section(&doc, "ios")),
    ];
    let present: Vec<_> = platforms
        .into_iter()
        .filter_map(|(kind, env)| env.map(|env| (kind, env)))
        .collect();

    if !ignore_checking_target {
        if present.is_empty() {
            return Err(ScriptError::InvalidScript(format!(
                "at least one of \"target\", \"web\", \"android\", or \"ios\" properties is required in yaml script{path_tip}"
            )));
        }
        if present.len() > 1 {
            return Err(ScriptError::InvalidScript(format!(
                "only one of \"target\", \"web\", \"android\", or \"ios\" properties is allowed in yaml script{path_tip}"
            )));
        }
        if !present.iter().all(|(_, env)| env.is_object()) {
            return Err(ScriptError::InvalidScript(format!(
                "property \"target/web/android/ios\" must be an object{path_tip}"
            )));
        }
    }

    let target = present
        .into_iter()
        .find_map(|(kind, env)| match env {
            Value::Object(env) => Some(ScriptTarget { kind, env }),
            _ => None,
        })
        .or_else(|| match doc.get("config") {
            Some(Value::Object(env)) => Some(ScriptTarget {
                kind: TargetKind::Generic,
                env: env.clone(),
            }),
            _ => None,
        });

    let tasks = match doc.get("tasks") {
        None | Some(Value::Null) => {
            return Err(ScriptError::InvalidScript(format!(
                "property \"tasks\" is required in yaml script{path_tip}"
            )))
        }
        Some(Value::Array(tasks)) => tasks.clone(),
        Some(other) => {
            return Err(ScriptError::InvalidScript(format!(
                "property \"tasks\" must be an array in yaml script, but got {other}"
            )))
        }
    };
    let tasks = tasks
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Task>, _>>()?;

    Ok(Script { target, tasks })
}
