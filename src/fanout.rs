use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Run `op` once per item concurrently and return the results in input order.
///
/// - Item-local failures belong in `R`; an `Err` from `op` is treated as
///   fatal for the whole batch: remaining tasks are aborted and partial
///   results are dropped.
/// - A panicking task surfaces as `E::from(JoinError)`.
/// - `concurrency` caps simultaneously running operations (`None` = unbounded).
pub async fn fan_out<T, R, E, F, Fut>(
    items: Vec<T>,
    concurrency: Option<usize>,
    op: F,
) -> Result<Vec<R>, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: From<JoinError> + Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = items.len();
    let sem = concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let fut = op(item);
        let sem = sem.clone();
        set.spawn(async move {
            // Semaphore is never closed, so acquire only fails if it was.
            let _permit = match &sem {
                Some(s) => s.clone().acquire_owned().await.ok(),
                None => None,
            };
            (index, fut.await)
        });
    }

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = set.join_next().await {
        let (index, outcome) = joined?;
        match outcome {
            Ok(r) => slots[index] = Some(r),
            Err(e) => {
                set.abort_all();
                return Err(e);
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}
