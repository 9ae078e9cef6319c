use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Canvas,
    Overview,
}

/// Per-project editor view state. Loaded once when an editor opens and
/// written back explicitly; nothing reads it from ambient storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorPreferences {
    pub show_grid: bool,
    pub animate_connections: bool,
    pub move_tool: bool,
    pub view_mode: ViewMode,
    pub expanded_categories: BTreeSet<String>,
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            show_grid: true,
            animate_connections: true,
            move_tool: false,
            view_mode: ViewMode::Canvas,
            expanded_categories: BTreeSet::new(),
        }
    }
}

impl EditorPreferences {
    /// Reads preferences from `path`. A missing file yields the defaults and
    /// an unreadable one is replaced by them with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no editor preferences at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read preferences '{}'", path.display()));
            }
        };

        match serde_json::from_str(&contents) {
            Ok(preferences) => Ok(preferences),
            Err(err) => {
                warn!(
                    "ignoring malformed editor preferences at {}: {err}",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create preferences directory '{}'", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write preferences '{}'", path.display()))
    }

    /// Location of a project's preferences inside the user config directory.
    pub fn default_path(project_id: &str) -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "loreboard")
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        let file_name: String = project_id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        Ok(project_dirs
            .config_dir()
            .join("preferences")
            .join(format!("{file_name}.json")))
    }

    /// Flips a sidebar category between expanded and collapsed. Returns the
    /// new expanded state.
    pub fn toggle_category(&mut self, category: &str) -> bool {
        if self.expanded_categories.remove(category) {
            false
        } else {
            self.expanded_categories.insert(category.to_string());
            true
        }
    }

    pub fn is_expanded(&self, category: &str) -> bool {
        self.expanded_categories.contains(category)
    }
}
