//! Sequential batches of concurrent tasks.
//!
//! Every per-host stage goes through `run_batches`: items are split into
//! batches of at most `batch_size`, the tasks of one batch run concurrently on
//! a `JoinSet`, and the next batch starts only after all of them returned.
//! Task errors and panics are logged and dropped so one bad host cannot take
//! the batch down. Dropping the returned future aborts the in-flight batch.

use std::fmt::Display;
use std::future::Future;
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Items whose task has finished (successfully or not).
    pub done: usize,
    pub total: usize,
}

impl BatchProgress {
    /// Linear interpolation of `done / total` into `[from, to]`.
    pub fn scaled(&self, from: u8, to: u8) -> u8 {
        if self.total == 0 {
            return to;
        }
        let span = to.saturating_sub(from) as usize;
        from + (span * self.done.min(self.total) / self.total) as u8
    }
}

pub async fn run_batches<T, R, E, F, Fut, P>(
    items: Vec<T>,
    batch_size: usize,
    task: F,
    mut on_batch: P,
) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: FnMut(BatchProgress, &[R]),
{
    let size = batch_size.max(1);
    let total = items.len();
    let mut out = Vec::with_capacity(total);
    let mut done = 0usize;
    let mut pending = items.into_iter().peekable();

    while pending.peek().is_some() {
        let mut set = JoinSet::new();
        for item in pending.by_ref().take(size) {
            set.spawn(task(item));
        }
        let launched = set.len();
        let mut batch = Vec::with_capacity(launched);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(r)) => batch.push(r),
                Ok(Err(e)) => warn!("task failed: {}", e),
                Err(e) => warn!("task did not complete: {}", e),
            }
        }
        done += launched;
        on_batch(BatchProgress { done, total }, &batch);
        out.extend(batch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn batches_never_exceed_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut seen = Vec::new();
        let out = run_batches(
            (0..10).collect::<Vec<u32>>(),
            3,
            |i| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(i * 2)
                }
            },
            |p, batch| seen.push((p.done, batch.len())),
        )
        .await;

        assert_eq!(out.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(seen, vec![(3, 3), (6, 3), (9, 3), (10, 1)]);
    }

    #[tokio::test]
    async fn errors_and_panics_are_isolated() {
        let out = run_batches(
            vec![1u32, 2, 3, 4],
            4,
            |i| async move {
                match i {
                    2 => Err(format!("host {i} failed")),
                    3 => panic!("host {i} exploded"),
                    _ => Ok(i),
                }
            },
            |_, _| {},
        )
        .await;
        let mut out = out;
        out.sort();
        assert_eq!(out, vec![1, 4]);
    }

    #[tokio::test]
    async fn empty_input_runs_nothing() {
        let mut calls = 0;
        let out: Vec<u32> = run_batches(Vec::<u32>::new(), 5, |i| async move { Ok::<_, Infallible>(i) }, |_, _| calls += 1).await;
        assert!(out.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn progress_scales_into_range() {
        assert_eq!(BatchProgress { done: 0, total: 10 }.scaled(45, 90), 45);
        assert_eq!(BatchProgress { done: 5, total: 10 }.scaled(45, 90), 67);
        assert_eq!(BatchProgress { done: 10, total: 10 }.scaled(45, 90), 90);
        assert_eq!(BatchProgress { done: 0, total: 0 }.scaled(45, 90), 90);
    }
}
