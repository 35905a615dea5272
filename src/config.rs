//! Project configuration loaded from `wsk.toml`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::command::shell_in;
use crate::core::operation::Operation;
use crate::core::sequence::SequenceSpec;
use crate::orchestration::{DesktopSink, LogSink, NotificationSink, NullSink};
use crate::registry::{Composite, MethodEntry, MethodSet, NameMap, TaskRegistry};
use crate::{wlog_debug, Result};

/// Project configuration file name, looked up in the working directory.
pub const FILE_NAME: &str = "wsk.toml";

/// Where failure notifications go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Desktop,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskConfig {
    /// Shell command; absent for aggregate tasks.
    pub run: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    pub error_title: Option<String>,
    /// Working directory for `run`, relative to the project root.
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositeConfig {
    #[serde(default)]
    pub deps: Vec<String>,
    pub sequence: SequenceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    pub paths: Vec<String>,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub notifier: NotifierKind,
    pub log_level: Option<String>,
    /// Expose `a_b` identifiers as `a:b`.
    #[serde(default = "default_true")]
    pub rename_separators: bool,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskConfig>,
    #[serde(default)]
    pub composites: IndexMap<String, CompositeConfig>,
    /// Explicit internal identifier to public name table.
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notifier: NotifierKind::default(),
            log_level: None,
            rename_separators: true,
            tasks: IndexMap::new(),
            composites: IndexMap::new(),
            aliases: IndexMap::new(),
            watch: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        wlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            wlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config = Self::from_str(&fs::read_to_string(path)?)?;
        wlog_debug!(
            "Config loaded: notifier={:?}, tasks={}, composites={}, watch rules={}",
            config.notifier,
            config.tasks.len(),
            config.composites.len(),
            config.watch.len()
        );
        Ok(config)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build a registry from the declared tasks and composites.
    ///
    /// `root` is the project directory: commands run there, or in their
    /// `cwd` below it.
    pub fn build_registry(&self, root: &Path) -> Result<TaskRegistry> {
        let mut methods = MethodSet::new();
        for (ident, task) in &self.tasks {
            let body = match (&task.run, &task.cwd) {
                (Some(run), Some(cwd)) => shell_in(run.clone(), root.join(cwd)),
                (Some(run), None) => shell_in(run.clone(), root),
                (None, _) => Operation::noop(),
            };
            let mut entry = MethodEntry::new(ident.clone(), body).with_dependencies(task.deps.clone());
            if let Some(title) = &task.error_title {
                entry = entry.with_error_title(title.clone());
            }
            methods.push(entry);
        }

        let conventional = if self.rename_separators {
            NameMap::conventional(methods.idents())
        } else {
            NameMap::new()
        };
        let explicit = self
            .aliases
            .iter()
            .fold(NameMap::new(), |map, (ident, public)| map.rename(ident.clone(), public.clone()));
        let names = conventional.merge(explicit);

        let mut registry = TaskRegistry::new();
        let registered = registry.discover(methods, &names)?;
        wlog_debug!("Registered {} task(s) from config", registered.len());

        for (name, composite) in &self.composites {
            registry.register_composite(
                Composite::new(name.clone(), composite.sequence.clone())
                    .with_prerequisites(composite.deps.clone()),
            )?;
        }
        Ok(registry)
    }

    pub fn notifier_sink(&self) -> Arc<dyn NotificationSink> {
        match self.notifier {
            NotifierKind::Log => Arc::new(LogSink),
            NotifierKind::Desktop => Arc::new(DesktopSink),
            NotifierKind::None => Arc::new(NullSink),
        }
    }
}
