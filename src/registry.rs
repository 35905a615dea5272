//! Task registration and lookup.
//!
//! The registry owns every [`Task`] and composite definition for the
//! process lifetime. It is built once at startup, then shared read-only
//! (`Arc<TaskRegistry>`) with the scheduler and sequencer.
//!
//! Dependency references are resolved lazily: tasks may be registered in
//! any order, and unknown or cyclic references surface the first time the
//! graph is built (on [`TaskRegistry::graph`], [`TaskRegistry::validate`] or
//! at the start of a run).

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::dag::TaskGraph;
use crate::core::operation::Operation;
use crate::core::sequence::SequenceSpec;
use crate::core::task::Task;
use crate::error::{Error, Result};
use crate::wlog_debug;

/// Identifiers starting with this prefix are never exposed as tasks.
pub const RESERVED_PREFIX: &str = "_";

/// Separator used in internal identifiers for sub-tasks (`lint_noemit`).
pub const INTERNAL_SEPARATOR: char = '_';

/// Separator shown in public sub-task names (`lint:noemit`).
pub const DISPLAY_SEPARATOR: char = ':';

/// A task that runs prerequisites through the dependency graph, then an
/// explicit sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub name: String,
    /// Tasks planned and run by the dependency scheduler first.
    pub prerequisites: Vec<String>,
    /// Steps run by the sequencer afterwards.
    pub sequence: SequenceSpec,
}

impl Composite {
    pub fn new(name: impl Into<String>, sequence: SequenceSpec) -> Self {
        Self {
            name: name.into(),
            prerequisites: Vec::new(),
            sequence,
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }
}

/// One invocable member of a method set: an internal identifier plus body.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub ident: String,
    pub body: Operation,
    pub dependencies: Vec<String>,
    pub error_title: Option<String>,
}

impl MethodEntry {
    pub fn new(ident: impl Into<String>, body: Operation) -> Self {
        Self {
            ident: ident.into(),
            body,
            dependencies: Vec::new(),
            error_title: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_error_title(mut self, title: impl Into<String>) -> Self {
        self.error_title = Some(title.into());
        self
    }
}

/// Explicit declarative table of task bodies, keyed by internal identifier.
///
/// Dependencies are declared on the entry itself, never inferred from the
/// body.
#[derive(Debug, Clone, Default)]
pub struct MethodSet {
    entries: Vec<MethodEntry>,
}

impl MethodSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, entry: MethodEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: MethodEntry) {
        self.entries.push(entry);
    }

    pub fn idents(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.ident.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Auditable mapping from internal identifiers to public task names.
///
/// Identifiers without an entry keep their name unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMap {
    renames: IndexMap<String, String>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build explicit entries for every identifier containing the internal
    /// separator, rewriting its first occurrence to the display separator.
    pub fn conventional<'a, I>(idents: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut map = Self::new();
        for ident in idents {
            if ident.starts_with(RESERVED_PREFIX) {
                continue;
            }
            if ident.contains(INTERNAL_SEPARATOR) {
                let public = ident.replacen(INTERNAL_SEPARATOR, &DISPLAY_SEPARATOR.to_string(), 1);
                map.renames.insert(ident.to_string(), public);
            }
        }
        map
    }

    pub fn rename(mut self, ident: impl Into<String>, public: impl Into<String>) -> Self {
        self.renames.insert(ident.into(), public.into());
        self
    }

    /// Explicit entries override conventional ones.
    pub fn merge(mut self, other: NameMap) -> Self {
        self.renames.extend(other.renames);
        self
    }

    pub fn public_name<'a>(&'a self, ident: &'a str) -> &'a str {
        self.renames.get(ident).map(String::as_str).unwrap_or(ident)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renames.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

/// Collects task definitions and exposes lookup by name.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Arc<Task>>,
    composites: IndexMap<String, Composite>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task built from its parts.
    pub fn register<I, S>(&mut self, name: &str, body: Operation, dependencies: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register_task(Task::new(name, body).with_dependencies(dependencies))
    }

    /// Register a fully built task.
    ///
    /// # Errors
    /// [`Error::DuplicateTask`] if the name is taken by a task or composite.
    pub fn register_task(&mut self, task: Task) -> Result<()> {
        self.ensure_free(&task.name)?;
        wlog_debug!(
            "Registered task {} (body={}, deps={:?})",
            task.name,
            task.body.kind(),
            task.dependencies
        );
        self.tasks.insert(task.name.clone(), Arc::new(task));
        Ok(())
    }

    /// Register a composite task.
    pub fn register_composite(&mut self, composite: Composite) -> Result<()> {
        self.ensure_free(&composite.name)?;
        wlog_debug!(
            "Registered composite {} (prerequisites={:?}, sequence={})",
            composite.name,
            composite.prerequisites,
            composite.sequence
        );
        self.composites.insert(composite.name.clone(), composite);
        Ok(())
    }

    /// Register every member of `methods` not starting with the reserved
    /// prefix, under the public name given by `names`.
    ///
    /// Returns the public names registered, in table order.
    pub fn discover(&mut self, methods: MethodSet, names: &NameMap) -> Result<Vec<String>> {
        let mut registered = Vec::new();
        for entry in methods.entries {
            if entry.ident.starts_with(RESERVED_PREFIX) {
                wlog_debug!("Skipping reserved identifier {}", entry.ident);
                continue;
            }
            let public = names.public_name(&entry.ident).to_string();
            let mut task = Task::new(public.clone(), entry.body).with_dependencies(entry.dependencies);
            task.error_title = entry.error_title;
            self.register_task(task)?;
            registered.push(public);
        }
        Ok(registered)
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.tasks.contains_key(name) || self.composites.contains_key(name) {
            return Err(Error::DuplicateTask(name.to_string()));
        }
        Ok(())
    }

    /// Look up a task by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<Task>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTask(name.to_string()))
    }

    pub fn composite(&self, name: &str) -> Option<&Composite> {
        self.composites.get(name)
    }

    pub fn is_composite(&self, name: &str) -> bool {
        self.composites.contains_key(name)
    }

    /// Whether `name` is a task or a composite.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name) || self.composites.contains_key(name)
    }

    /// Task names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn composites(&self) -> impl Iterator<Item = &Composite> {
        self.composites.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.composites.is_empty()
    }

    /// Build the dependency graph over all registered tasks.
    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::build(
            self.tasks
                .values()
                .map(|t| (t.name.as_str(), t.dependencies.as_slice())),
        )
    }

    /// Check every structural invariant without running anything.
    pub fn validate(&self) -> Result<()> {
        let graph = self.graph()?;
        for composite in self.composites.values() {
            self.check_composite(&graph, composite, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Check a sequence against the registry, following nested composites.
    pub fn check_sequence(&self, graph: &TaskGraph, spec: &SequenceSpec) -> Result<()> {
        self.check_sequence_inner(graph, spec, &mut Vec::new())
    }

    fn check_sequence_inner(
        &self,
        graph: &TaskGraph,
        spec: &SequenceSpec,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        spec.check_shape()?;
        for name in spec.names() {
            if let Some(composite) = self.composites.get(name) {
                self.check_composite(graph, composite, stack)?;
            } else if !self.tasks.contains_key(name) {
                return Err(Error::UnknownTask(name.to_string()));
            }
        }
        Ok(())
    }

    fn check_composite(
        &self,
        graph: &TaskGraph,
        composite: &Composite,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        if stack.contains(&composite.name) {
            let mut path = stack.clone();
            path.push(composite.name.clone());
            return Err(Error::CyclicDependency(path.join(" -> ")));
        }

        let known: HashSet<&str> = self.names().collect();
        for prerequisite in &composite.prerequisites {
            if !known.contains(prerequisite.as_str()) {
                return Err(Error::UnknownDependency {
                    task: composite.name.clone(),
                    dependency: prerequisite.clone(),
                });
            }
        }
        if !composite.prerequisites.is_empty() {
            graph.plan_many(composite.prerequisites.as_slice())?;
        }

        stack.push(composite.name.clone());
        let result = self.check_sequence_inner(graph, &composite.sequence, stack);
        stack.pop();
        result
    }
}
