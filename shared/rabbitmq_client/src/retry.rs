use std::{fmt::Display, future::Future, time::Duration};

///
/// Run async function in a loop until it returns Ok.
/// `retry_interval` is awaited between failed attempts.
///
pub async fn retry<F, Fut, T, E>(retry_interval: Duration, operation: &'static str, async_fn: F) -> T
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        tracing::info!(attempt, operation, "attempting");
        match async_fn().await {
            Ok(output) => return output,
            Err(err) => tracing::warn!(attempt, operation, %err, "attempt failed"),
        }

        tokio::time::sleep(retry_interval).await;
    }
}
