//! Normalization of "where" descriptions into [`LocateParam`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys of a flow item that belong to the locate parameter.
pub const LOCATE_PARAM_KEYS: [&str; 4] = ["prompt", "deepThink", "cacheable", "xpath"];

/// A user-supplied description of a target: plain text, or a structured prompt
/// object (for example a prompt with reference images).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserPrompt {
    Text(String),
    Structured(Map<String, Value>),
}

impl UserPrompt {
    /// Interpret a script value as a prompt. Empty or null values yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(Self::Text(n.to_string())),
            Value::Object(obj) => Some(Self::Structured(obj.clone())),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(obj) => obj.get("prompt").and_then(Value::as_str),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Structured(obj) => Value::Object(obj.clone()),
        }
    }
}

impl fmt::Display for UserPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => write!(f, "{}", self.to_value()),
        }
    }
}

impl From<&str> for UserPrompt {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// XPath hint: an explicit path, or a flag asking the driver to compute one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum XPath {
    Path(String),
    Flag(bool),
}

impl XPath {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Path(s.clone())),
            Value::Bool(b) => Some(Self::Flag(*b)),
            _ => None,
        }
    }
}

/// Canonical description of a target element plus resolution hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateParam {
    pub prompt: UserPrompt,
    #[serde(default)]
    pub deep_think: bool,
    #[serde(default = "default_cacheable")]
    pub cacheable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<XPath>,
}

fn default_cacheable() -> bool {
    true
}

impl LocateParam {
    pub fn new(prompt: impl Into<UserPrompt>) -> Self {
        Self {
            prompt: prompt.into(),
            deep_think: false,
            cacheable: true,
            xpath: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Build a [`LocateParam`] from an explicit prompt and caller options.
///
/// The prompt is taken from `locate_prompt`, then `opts.prompt`, then the legacy
/// `opts.locate` shortcut. Returns `None` when no source yields a prompt: that means
/// "no target", not a failure.
pub fn build_detailed_locate_param(
    locate_prompt: Option<&UserPrompt>,
    opts: Option<&Map<String, Value>>,
) -> Option<LocateParam> {
    let opt_prompt = opts
        .and_then(|o| o.get("prompt"))
        .and_then(UserPrompt::from_value);
    let legacy_locate = opts
        .and_then(|o| o.get("locate"))
        .and_then(UserPrompt::from_value);

    if let (Some(explicit), Some(from_opts)) = (locate_prompt, &opt_prompt) {
        if explicit != from_opts {
            warn!(
                prompt = ?explicit,
                option_prompt = ?from_opts,
                "conflict prompt for item, maybe you put the prompt in the wrong place"
            );
        }
    }

    let Some(prompt) = locate_prompt.cloned().or(opt_prompt).or(legacy_locate) else {
        debug!("no prompt resolved, locate param is undefined");
        return None;
    };

    let deep_think = opts
        .and_then(|o| o.get("deepThink"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let cacheable = opts
        .and_then(|o| o.get("cacheable"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let xpath = opts.and_then(|o| o.get("xpath")).and_then(XPath::from_value);

    Some(LocateParam {
        prompt,
        deep_think,
        cacheable,
        xpath,
    })
}

/// A locate parameter together with the caller options that do not belong to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocateAndRest {
    pub locate_param: Option<LocateParam>,
    pub rest_params: Map<String, Value>,
}

/// Like [`build_detailed_locate_param`], additionally partitioning `opts`.
///
/// `rest_params` holds every key of `opts` that is not a locate-param key, not listed
/// in `exclude_keys` and not `locate`. Locate-param keys are only withheld when a
/// locate param was actually produced.
pub fn build_detailed_locate_param_and_rest_params(
    locate_prompt: Option<&UserPrompt>,
    opts: Option<&Map<String, Value>>,
    exclude_keys: &[&str],
) -> LocateAndRest {
    let locate_param = build_detailed_locate_param(locate_prompt, opts);

    let mut rest_params = Map::new();
    if let Some(opts) = opts {
        for (key, value) in opts {
            let consumed_by_locate =
                locate_param.is_some() && LOCATE_PARAM_KEYS.contains(&key.as_str());
            if !consumed_by_locate && !exclude_keys.contains(&key.as_str()) && key != "locate" {
                rest_params.insert(key.clone(), value.clone());
            }
        }
    }

    LocateAndRest {
        locate_param,
        rest_params,
    }
}
