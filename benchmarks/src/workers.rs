//! Static-partition helpers for the data-parallel CPU backend.
//!
//! Work is cut into `threads` contiguous chunks of equal length (the last
//! may be short) and each chunk gets its own scoped OS thread, the way a
//! statically scheduled parallel loop would split it.

use std::thread::ScopedJoinHandle;

use harness::{Error, Result};

/// Length of each chunk when `len` items are split across `threads` workers.
pub fn chunk_len(len: usize, threads: usize) -> usize {
    len.div_ceil(threads.max(1)).max(1)
}

/// Runs `work` on each chunk of `items` in its own thread and returns the
/// per-chunk results in chunk order.
pub fn map_chunks<T, R, F>(items: &[T], threads: usize, work: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &[T]) -> R + Sync,
{
    let chunk = chunk_len(items.len(), threads);
    let work = &work;
    std::thread::scope(|s| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .enumerate()
            .map(|(index, part)| s.spawn(move || work(index * chunk, part)))
            .collect();
        join_all(handles)
    })
}

/// Runs `work` on index ranges `[start, end)` covering `0..len`.
pub fn map_ranges<R, F>(len: usize, threads: usize, work: F) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(usize, usize) -> R + Sync,
{
    let chunk = chunk_len(len, threads);
    let work = &work;
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..len)
            .step_by(chunk)
            .map(|start| {
                let end = (start + chunk).min(len);
                s.spawn(move || work(start, end))
            })
            .collect();
        join_all(handles)
    })
}

/// Fills `output` in place, giving each thread a contiguous run of
/// `unit`-sized records (matrix rows, for instance).
pub fn fill_chunks<T, F>(output: &mut [T], unit: usize, threads: usize, work: F) -> Result<()>
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    let records = output.len() / unit.max(1);
    let chunk = chunk_len(records, threads) * unit.max(1);
    let work = &work;
    std::thread::scope(|s| {
        let handles: Vec<_> = output
            .chunks_mut(chunk)
            .enumerate()
            .map(|(index, part)| s.spawn(move || work(index * chunk, part)))
            .collect();
        join_all(handles).map(|_| ())
    })
}

// Joins every handle before reporting, so no panicked thread is left for
// the scope to re-raise.
fn join_all<R>(handles: Vec<ScopedJoinHandle<'_, R>>) -> Result<Vec<R>> {
    let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
    joined
        .into_iter()
        .map(|r| r.map_err(|_| Error::Backend("worker thread panicked".into())))
        .collect()
}
