//! Blocking-acquisition polling loop.
//!
//! The store offers no push notification, so a blocking acquire polls the
//! conditional update on a background thread with damped backoff. The
//! calling thread waits on a channel with an optional deadline; past the
//! deadline it signals the poller to stop. The poller is always joined
//! before the call returns, whether acquisition succeeded or not.

use crate::error::LockResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Upper bound on a single sleep slice, so a stop signal is observed
/// promptly and the final join stays cheap.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Delay before the next polling attempt.
///
/// tanh-shaped growth: roughly linear (~50 ms per attempt) early on,
/// saturating just under one second.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64((0.05 * f64::from(attempt)).tanh())
}

/// Runs `attempt` on a background poller until it reports success, fails,
/// or `timeout` elapses.
///
/// Timeout is reported as `Ok(false)`, never as an error.
pub(crate) fn poll_until<F>(attempt: F, timeout: Option<Duration>) -> LockResult<bool>
where
    F: Fn() -> LockResult<bool> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let (outcome_tx, outcome_rx) = mpsc::channel();

    let poller = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut tries: u32 = 0;
            loop {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                match attempt() {
                    Ok(true) => {
                        let _ = outcome_tx.send(Ok(()));
                        return;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        let _ = outcome_tx.send(Err(err));
                        return;
                    }
                }
                tries += 1;
                sleep_sliced(backoff_delay(tries), &stop);
            }
        })
    };

    let outcome = match timeout {
        Some(limit) => outcome_rx.recv_timeout(limit),
        None => outcome_rx
            .recv()
            .map_err(|_| RecvTimeoutError::Disconnected),
    };

    stop.store(true, Ordering::Relaxed);
    if let Err(payload) = poller.join() {
        std::panic::resume_unwind(payload);
    }

    match outcome {
        Ok(Ok(())) => Ok(true),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(false),
    }
}

/// Sleeps for `total`, waking early if the stop flag is raised.
fn sleep_sliced(total: Duration, stop: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn backoff_grows_and_saturates() {
        assert!(backoff_delay(1) < backoff_delay(5));
        assert!(backoff_delay(5) < backoff_delay(50));
        assert!(backoff_delay(1000) <= Duration::from_secs(1));
    }

    #[test]
    fn poll_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let acquired = poll_until(
            move || Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2),
            Some(Duration::from_secs(5)),
        )
        .unwrap();

        assert!(acquired);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn poll_times_out_without_error() {
        let acquired = poll_until(|| Ok(false), Some(Duration::from_millis(100))).unwrap();
        assert!(!acquired);
    }

    #[test]
    fn poll_propagates_attempt_errors() {
        let result = poll_until(
            || {
                Err(crate::LockError::Store(
                    syncdoc_store::StoreError::corrupted("boom"),
                ))
            },
            Some(Duration::from_secs(1)),
        );
        assert!(result.is_err());
    }
}
