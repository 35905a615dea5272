//! Task dependency graph and stage planning.
//!
//! The graph is derived on demand from the registered tasks' dependency
//! lists. Edges point from a dependency to its dependent, so a task's
//! incoming neighbours are its prerequisites.

use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Ordered stages of a graph-based run.
///
/// Every stage holds tasks with no dependency relationship to each other,
/// whose prerequisites all sit in earlier stages. Names inside a stage are
/// sorted so plans are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    stages: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of tasks across all stages.
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().flatten().any(|n| n == name)
    }

    /// Index of the stage containing `name`.
    pub fn stage_of(&self, name: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.iter().any(|n| n == name))
    }

    /// All task names in execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().flatten().map(String::as_str)
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            writeln!(f, "stage {}: {}", i + 1, stage.join(", "))?;
        }
        Ok(())
    }
}

/// The task dependency graph.
pub struct TaskGraph {
    /// Nodes are task names; edges run dependency -> dependent.
    graph: DiGraph<String, ()>,
    /// Index mapping from task name to NodeIndex for fast lookups.
    index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Build the graph from `(name, dependencies)` pairs.
    ///
    /// # Errors
    /// - [`Error::DuplicateTask`] if a name appears twice
    /// - [`Error::UnknownDependency`] if a dependency names no task
    /// - [`Error::CyclicDependency`] if the edges form a cycle
    pub fn build<'a, I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let tasks: Vec<(&str, &[String])> = tasks.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for (name, _) in &tasks {
            if index.contains_key(*name) {
                return Err(Error::DuplicateTask(name.to_string()));
            }
            let node = graph.add_node(name.to_string());
            index.insert(name.to_string(), node);
        }

        for (name, dependencies) in &tasks {
            let to = index[*name];
            for dependency in dependencies.iter() {
                let from = *index.get(dependency).ok_or_else(|| Error::UnknownDependency {
                    task: name.to_string(),
                    dependency: dependency.clone(),
                })?;
                if graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let dag = Self { graph, index };
        if is_cyclic_directed(&dag.graph) {
            return Err(Error::CyclicDependency(dag.describe_cycle()));
        }
        Ok(dag)
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Direct prerequisites of `name`, sorted.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Tasks that directly depend on `name`, sorted.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&node) = self.index.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Transitive prerequisites of `roots`, including the roots themselves.
    pub fn closure<S: AsRef<str>>(&self, roots: &[S]) -> Result<BTreeSet<String>> {
        let reversed = Reversed(&self.graph);
        let mut seen = BTreeSet::new();
        for root in roots {
            let root = root.as_ref();
            let start = *self
                .index
                .get(root)
                .ok_or_else(|| Error::UnknownTask(root.to_string()))?;
            let mut dfs = Dfs::new(reversed, start);
            while let Some(node) = dfs.next(reversed) {
                seen.insert(self.graph[node].clone());
            }
        }
        Ok(seen)
    }

    /// Plan the run of `root` and everything it transitively depends on.
    pub fn plan(&self, root: &str) -> Result<ExecutionPlan> {
        self.plan_many(&[root])
    }

    /// Plan the union of several roots' closures.
    ///
    /// Stages come from Kahn's algorithm restricted to the closure: each
    /// stage is every remaining task whose in-edges are all satisfied.
    pub fn plan_many<S: AsRef<str>>(&self, roots: &[S]) -> Result<ExecutionPlan> {
        let members = self.closure(roots)?;

        let mut in_degree: HashMap<&str, usize> = members
            .iter()
            .map(|name| (name.as_str(), self.dependencies(name).len()))
            .collect();

        let mut stages = Vec::new();
        let mut placed: HashSet<&str> = HashSet::new();
        while placed.len() < members.len() {
            // BTreeSet iteration keeps each stage sorted.
            let stage: Vec<&str> = members
                .iter()
                .map(String::as_str)
                .filter(|name| !placed.contains(name) && in_degree[name] == 0)
                .collect();
            if stage.is_empty() {
                // Unreachable for graphs accepted by `build`.
                return Err(Error::CyclicDependency(self.describe_cycle()));
            }
            for name in &stage {
                placed.insert(*name);
                for dependent in self.dependents(name) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                    }
                }
            }
            stages.push(stage.into_iter().map(str::to_string).collect());
        }

        Ok(ExecutionPlan { stages })
    }

    /// Render one cycle as `a -> b -> a`, following dependency -> dependent.
    fn describe_cycle(&self) -> String {
        let component = tarjan_scc(&self.graph).into_iter().find(|scc| {
            scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
        });
        let Some(component) = component else {
            return "unknown cycle".to_string();
        };

        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let mut start = component[0];
        for &node in &component {
            if self.graph[node] < self.graph[start] {
                start = node;
            }
        }

        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .filter(|n| members.contains(n))
                .min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            let Some(next) = next else { break };
            if let Some(pos) = path.iter().position(|n| *n == next) {
                path.push(next);
                path.drain(..pos);
                break;
            }
            path.push(next);
            current = next;
        }

        path.iter()
            .map(|n| self.graph[*n].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
