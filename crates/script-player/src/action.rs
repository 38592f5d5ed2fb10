//! Action descriptors and the per-run action registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::{ScriptError, ScriptResult};
use crate::schema::{normalize_params, Schema};
use crate::swipe::ScreenSize;

/// Invocation function of an action.
pub type ActionCall = Arc<dyn Fn(Value, ActionContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Ambient information handed to an action alongside its parameters.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    /// Size of the controlled screen, when the device knows it
    pub screen_size: Option<ScreenSize>,
}

/// Box an async closure into an [`ActionCall`].
pub fn action_call<F, Fut>(f: F) -> ActionCall
where
    F: Fn(Value, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |param, ctx| f(param, ctx).boxed())
}

/// Declarative metadata for one invocable operation.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub name: String,
    pub interface_alias: Option<String>,
    pub description: String,
    pub param_schema: Option<Schema>,
    call: ActionCall,
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("interface_alias", &self.interface_alias)
            .field("description", &self.description)
            .field("param_schema", &self.param_schema)
            .finish_non_exhaustive()
    }
}

/// Input for [`define_action`].
#[derive(Default)]
pub struct ActionConfig {
    pub name: String,
    pub description: String,
    pub interface_alias: Option<String>,
    pub param_schema: Option<Schema>,
    pub call: Option<ActionCall>,
}

/// Validate an [`ActionConfig`] and turn it into a descriptor.
pub fn define_action(config: ActionConfig) -> ScriptResult<ActionDescriptor> {
    if config.name.trim().is_empty() {
        return Err(ScriptError::InvalidAction("action name is required".to_string()));
    }
    if config.description.trim().is_empty() {
        return Err(ScriptError::InvalidAction(format!(
            "description is required for action '{}'",
            config.name
        )));
    }
    let call = config.call.ok_or_else(|| {
        ScriptError::InvalidAction(format!("call is required for action '{}'", config.name))
    })?;
    if config.interface_alias.as_deref() == Some("") {
        return Err(ScriptError::InvalidAction(format!(
            "interface alias of action '{}' must not be empty",
            config.name
        )));
    }

    Ok(ActionDescriptor::from_parts(
        config.name,
        config.interface_alias,
        config.description,
        config.param_schema,
        call,
    ))
}

impl ActionDescriptor {
    pub(crate) fn from_parts(
        name: impl Into<String>,
        interface_alias: Option<String>,
        description: impl Into<String>,
        param_schema: Option<Schema>,
        call: ActionCall,
    ) -> Self {
        Self {
            name: name.into(),
            interface_alias,
            description: description.into(),
            param_schema,
            call,
        }
    }

    /// Invoke the action with already-normalized parameters.
    pub async fn call(&self, param: Value, ctx: ActionContext) -> anyhow::Result<Value> {
        (self.call)(param, ctx).await
    }

    /// Validate and default `param` against the schema, leaving locator fields as given.
    pub fn normalize_param(&self, param: &Value) -> ScriptResult<Value> {
        match &self.param_schema {
            Some(schema) => normalize_params(schema, param).map_err(|e| match e {
                ScriptError::Validation { path, message } => ScriptError::Validation {
                    path: format!("{}.{}", self.name, path),
                    message,
                },
                other => other,
            }),
            None => Ok(param.clone()),
        }
    }

    /// Whether the action may be invoked with a bare string instead of an object.
    pub fn accepts_bare_string(&self) -> bool {
        self.param_schema
            .as_ref()
            .is_some_and(Schema::accepts_bare_string)
    }

    /// Keys under which a flow item may reference this action, alias first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.interface_alias
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.name.as_str()))
    }
}

/// Summary of one action for tool listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_alias: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param_schema: Option<Value>,
}

/// The set of actions available for one run, addressable by name and by alias.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<Arc<ActionDescriptor>>,
    by_key: HashMap<String, usize>,
}

impl ActionRegistry {
    /// Build the registry, rejecting any name or alias claimed by two actions.
    pub fn new(actions: Vec<ActionDescriptor>) -> ScriptResult<Self> {
        let mut registry = Self::default();
        for action in actions {
            let index = registry.actions.len();
            for key in action.keys() {
                if let Some(&existing) = registry.by_key.get(key) {
                    if existing != index {
                        return Err(ScriptError::DuplicateAction {
                            key: key.to_string(),
                            first: registry.actions[existing].name.clone(),
                            second: action.name.clone(),
                        });
                    }
                }
                registry.by_key.insert(key.to_string(), index);
            }
            registry.actions.push(Arc::new(action));
        }
        debug!(count = registry.actions.len(), "action registry built");
        Ok(registry)
    }

    /// Look an action up by primary name or alias.
    pub fn get(&self, key: &str) -> Option<&ActionDescriptor> {
        self.by_key.get(key).map(|&i| self.actions[i].as_ref())
    }

    pub fn require(&self, key: &str) -> ScriptResult<&ActionDescriptor> {
        self.get(key)
            .ok_or_else(|| ScriptError::ActionNotFound(key.to_string()))
    }

    /// Actions referenced by keys of `item`, in registration order, each with the
    /// matching key (the alias wins when both are present).
    pub fn matching(&self, item: &Map<String, Value>) -> Vec<(&ActionDescriptor, String)> {
        self.actions
            .iter()
            .filter_map(|action| {
                action
                    .keys()
                    .find(|key| item.contains_key(*key))
                    .map(|key| (action.as_ref(), key.to_string()))
            })
            .collect()
    }

    /// Validate `param` against the named action's schema and invoke it.
    pub async fn invoke(&self, key: &str, param: Value, ctx: ActionContext) -> ScriptResult<Value> {
        let action = self.require(key)?;
        let normalized = action.normalize_param(&param)?;
        debug!(action = %action.name, param = %normalized, "invoking action");
        Ok(action.call(normalized, ctx).await?)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.iter().map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn describe(&self) -> Vec<ActionSummary> {
        self.actions()
            .map(|a| ActionSummary {
                name: a.name.clone(),
                interface_alias: a.interface_alias.clone(),
                description: a.description.clone(),
                param_schema: a.param_schema.as_ref().map(Schema::to_json_schema),
            })
            .collect()
    }

    /// [`describe`](Self::describe) rendered as a JSON array.
    pub fn describe_json(&self) -> Value {
        json!(self.describe())
    }
}
