use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid watch pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("Task {task} failed: {cause}")]
    TaskExecutionFailed { task: String, cause: String },

    #[error("Invalid state transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Structural errors are raised before any task body runs.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTask(_)
                | Error::UnknownTask(_)
                | Error::UnknownDependency { .. }
                | Error::CyclicDependency(_)
                | Error::InvalidSequence(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
