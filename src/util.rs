//! Shared utility functions.

use tokio::task::spawn_blocking;

use crate::{Error, Result};

/// Run a synchronous closure on the blocking pool.
///
/// A panic inside `f` surfaces as [`Error::TaskJoin`].
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))
}
