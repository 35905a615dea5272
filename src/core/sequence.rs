//! Author-supplied explicit orderings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One element of a sequence: a single task, or a group run concurrently.
///
/// In TOML a step is either a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Task(String),
    Group(Vec<String>),
}

impl Step {
    pub fn task(name: impl Into<String>) -> Self {
        Step::Task(name.into())
    }

    pub fn group<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Step::Group(names.into_iter().map(Into::into).collect())
    }

    /// Names referenced by this step, in declaration order.
    pub fn names(&self) -> &[String] {
        match self {
            Step::Task(name) => std::slice::from_ref(name),
            Step::Group(names) => names,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Task(name) => write!(f, "{}", name),
            Step::Group(names) => write!(f, "{{{}}}", names.join(", ")),
        }
    }
}

impl From<&str> for Step {
    fn from(name: &str) -> Self {
        Step::task(name)
    }
}

impl From<Vec<&str>> for Step {
    fn from(names: Vec<&str>) -> Self {
        Step::group(names)
    }
}

/// An ordered list of steps, authoritative over graph-derived order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceSpec {
    steps: Vec<Step>,
}

impl SequenceSpec {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Append a single-task step.
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::task(name));
        self
    }

    /// Append a concurrent group step.
    pub fn then_group<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::group(names));
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every name referenced by the sequence, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().flat_map(|s| s.names().iter().map(String::as_str))
    }

    /// Reject sequences that can never run anything meaningful.
    pub fn check_shape(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::InvalidSequence("sequence has no steps".to_string()));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let Step::Group(names) = step {
                if names.is_empty() {
                    return Err(Error::InvalidSequence(format!("step {} is an empty group", i)));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for SequenceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(" -> "))
    }
}

impl<S: Into<Step>> FromIterator<S> for SequenceSpec {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}
