use thiserror::Error;

/// Errors raised while loading, dispatching or playing an automation script.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid parameter at '{path}': {message}")]
    Validation { path: String, message: String },

    #[error("unknown flow item: {0}")]
    UnknownFlowItem(String),

    #[error("ambiguous flow item, it matches actions {actions:?}: {item}")]
    AmbiguousFlowItem { actions: Vec<String>, item: String },

    #[error("Invalid flow item: {0}")]
    InvalidFlowItem(String),

    #[error("ms for sleep must be greater than 0, but got {0}")]
    InvalidSleep(String),

    #[error("Invalid swipe gesture: {0}")]
    InvalidSwipe(String),

    #[error("Duplicate action key '{key}' registered by '{first}' and '{second}'")]
    DuplicateAction {
        key: String,
        first: String,
        second: String,
    },

    #[error("Invalid action definition: {0}")]
    InvalidAction(String),

    #[error("Action not found in action space: {0}")]
    ActionNotFound(String),

    #[error("{0}")]
    AssertionFailed(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Environment variable \"{0}\" is not defined")]
    MissingEnvVar(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failure surfaced by the external agent or a setup callback
    #[error(transparent)]
    Agent(#[from] anyhow::Error),
}

impl ScriptError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before any external call was made.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::UnknownFlowItem(_)
                | Self::AmbiguousFlowItem { .. }
                | Self::InvalidFlowItem(_)
                | Self::InvalidSleep(_)
                | Self::InvalidSwipe(_)
                | Self::ActionNotFound(_)
        )
    }
}

impl serde::Serialize for ScriptError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
