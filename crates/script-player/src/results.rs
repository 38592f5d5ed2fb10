//! The results map of a run, persisted after every write.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::ScriptResult;

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    values: Map<String, Value>,
    next_index: usize,
    output: Option<PathBuf>,
}

impl ResultStore {
    /// A store flushing to `output` after every write, or kept in memory when `None`.
    pub fn new(output: Option<PathBuf>) -> Self {
        Self {
            values: Map::new(),
            next_index: 0,
            output,
        }
    }

    /// Record `value` under `name`, or under the next unused auto index.
    ///
    /// Returns the key used. Overwriting an existing key is allowed but logged.
    pub async fn set(&mut self, name: Option<&str>, value: Value) -> ScriptResult<String> {
        let key = match name {
            Some(name) => name.to_string(),
            None => {
                let index = self.next_index;
                self.next_index += 1;
                index.to_string()
            }
        };
        if self.values.contains_key(&key) {
            warn!(key = %key, "result key already exists, will overwrite");
        }
        self.values.insert(key.clone(), value);
        self.flush().await?;
        Ok(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    async fn flush(&self) -> ScriptResult<()> {
        let Some(output) = &self.output else {
            return Ok(());
        };
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(output, serde_json::to_string_pretty(&self.values)?).await?;
        debug!(path = %output.display(), "results flushed");
        Ok(())
    }
}
