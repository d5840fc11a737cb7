use std::{future::Future, time::Duration};

/// Await `fut` for at most `limit`, mapping an elapsed deadline through `on_timeout`.
pub async fn with_deadline<F, T, E>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
