//! Player configuration and output path resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the base directory for generated files.
pub const RUN_DIR_ENV: &str = "SCRIPT_PLAYER_RUN_DIR";
const DEFAULT_RUN_DIR: &str = "script_player_run";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Base directory for generated artifacts such as default result files
    pub run_dir: PathBuf,
    /// Write results to disk after every change
    pub persist_results: bool,
    /// Base for relative output paths
    pub cwd: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let run_dir = std::env::var(RUN_DIR_ENV)
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUN_DIR));
        Self {
            run_dir,
            persist_results: true,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl PlayerConfig {
    /// Where results of a run go.
    ///
    /// An explicit `output` is resolved against `cwd`. Otherwise a fresh file
    /// `<run_dir>/output/<script stem>-<unix millis>.json` is used.
    pub fn resolve_output_path(&self, output: Option<&str>, script_path: Option<&Path>) -> PathBuf {
        if let Some(output) = output.filter(|o| !o.is_empty()) {
            return self.cwd.join(output);
        }
        let stem = script_path
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|name| {
                name.strip_suffix(".yaml")
                    .or_else(|| name.strip_suffix(".yml"))
                    .unwrap_or(name)
                    .to_string()
            })
            .unwrap_or_else(|| "script".to_string());
        let millis = chrono::Utc::now().timestamp_millis();
        self.run_dir
            .join("output")
            .join(format!("{stem}-{millis}.json"))
    }
}
