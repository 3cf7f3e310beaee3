//! Bounded fan-out over scoped worker threads.

use crate::error::{ReleaseError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Runs `task` over `items` on at most `workers` threads.
///
/// Results come back in input order. After the first failure no further
/// items are started; tasks already running finish, and the first error
/// recorded is returned.
pub(crate) fn try_map<T, R, F>(items: &[T], workers: usize, task: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    fan_out(items, workers, true, task)
}

/// Runs `task` over every item on at most `workers` threads, even after a
/// failure, and returns the first error recorded.
pub(crate) fn try_each<T, F>(items: &[T], workers: usize, task: F) -> Result<()>
where
    T: Sync,
    F: Fn(&T) -> Result<()> + Sync,
{
    fan_out(items, workers, false, task).map(drop)
}

fn fan_out<T, R, F>(items: &[T], workers: usize, fail_fast: bool, task: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    let pool_size = workers.clamp(1, items.len().max(1));
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<ReleaseError>> = Mutex::new(None);
    let results: Mutex<Vec<Option<R>>> = Mutex::new(items.iter().map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..pool_size {
            scope.spawn(|| {
                while !failed.load(Ordering::SeqCst) {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = items.get(index) else {
                        break;
                    };
                    match task(item) {
                        Ok(value) => {
                            let mut slots = results.lock().unwrap_or_else(PoisonError::into_inner);
                            if let Some(slot) = slots.get_mut(index) {
                                *slot = Some(value);
                            }
                        }
                        Err(err) => {
                            failed.store(fail_fast, Ordering::SeqCst);
                            let mut slot =
                                first_error.lock().unwrap_or_else(PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                        }
                    }
                }
            });
        }
    });

    if let Some(err) = first_error
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
    {
        return Err(err);
    }
    Ok(results
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .flatten()
        .collect())
}
