//! Bounded, order-preserving concurrent map.
//!
//! Inputs run concurrently up to a limit, every outcome is awaited, and results come back in
//! input order no matter which finished first.

use std::future::Future;

use futures::{StreamExt, stream};

/// Run `f` over `inputs` with at most `limit` futures in flight, returning every outcome in
/// input order.
pub async fn join_all_ordered<I, F, Fut>(inputs: I, limit: usize, f: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future,
{
    stream::iter(inputs)
        .map(f)
        .buffered(limit.max(1))
        .collect()
        .await
}

/// Like [`join_all_ordered`] for fallible work. All inputs are awaited before returning; the
/// first failure in input order is reported and partial results are discarded.
pub async fn try_join_ordered<I, F, Fut, T, E>(inputs: I, limit: usize, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    join_all_ordered(inputs, limit, f)
        .await
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn output_follows_input_order_when_later_items_finish_first() {
        let delays = [40_u64, 5, 25, 0, 10];
        let out = join_all_ordered(delays.iter().copied().enumerate(), 8, |(idx, delay)| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            idx
        })
        .await;

        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failure_reported_after_every_input_completes() {
        let finished = Arc::new(AtomicUsize::new(0));
        let result: Result<Vec<u32>, String> = try_join_ordered(0..6_u32, 3, |n| {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(u64::from(6 - n))).await;
                finished.fetch_add(1, Ordering::SeqCst);
                if n == 2 || n == 4 {
                    Err(format!("boom {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Err("boom 2".to_string()));
        assert_eq!(finished.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let out = join_all_ordered(0..12, 4, |n| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                n
            }
        })
        .await;

        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let out: Result<Vec<u8>, ()> = try_join_ordered(Vec::<u8>::new(), 4, |n| async move { Ok(n) }).await;
        assert_eq!(out, Ok(Vec::new()));
    }
}
