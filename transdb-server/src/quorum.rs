use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

/// Returned when fewer than `k` of the fanned-out futures succeeded and it
/// has become impossible to reach `k` (`n - failed < k`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientReplicas;

/// Generic "collect at least `k` successes out of `n`, short-circuit on `k`"
/// primitive. Each future is spawned onto its own task so that, once this
/// function returns, stragglers keep running to completion rather than
/// being forcibly cancelled — dropping their `JoinHandle` only detaches
/// them, it does not abort them.
///
/// A future's `Err(())` counts as a failed replica; `Ok(T)` counts as
/// success regardless of what `T` represents (a peer returning a parseable
/// protocol response is "successful" even if it encodes a 404).
pub async fn collect<T, F>(futures: Vec<F>, k: usize) -> Result<Vec<T>, InsufficientReplicas>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ()>> + Send + 'static,
{
    let n = futures.len();
    if k == 0 {
        return Ok(Vec::new());
    }
    if n < k {
        return Err(InsufficientReplicas);
    }

    let mut pending: FuturesUnordered<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut successes = Vec::with_capacity(k);
    let mut failed = 0usize;

    while let Some(joined) = pending.next().await {
        match joined {
            Ok(Ok(value)) => {
                successes.push(value);
                if successes.len() >= k {
                    return Ok(successes);
                }
            }
            _ => {
                failed += 1;
                if n - failed < k {
                    return Err(InsufficientReplicas);
                }
            }
        }
    }

    if successes.len() >= k {
        Ok(successes)
    } else {
        Err(InsufficientReplicas)
    }
}
