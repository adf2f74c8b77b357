//! Utility module
//!
//! Holds the bounded-time polling primitive that receive-with-timeout is
//! built on.

use std::time::Duration;

use tokio::time::Instant;

/// Repeatedly invokes a non-blocking `probe` until it yields a value or more
/// than `timeout` has elapsed since the call began.
///
/// The probe always runs at least once. Between polls the task sleeps for
/// `poll_interval`, or just yields to the scheduler when it is zero, which
/// gives a pure busy-poll. Returns `None` on timeout.
pub async fn wait_until<T, F>(timeout: Duration, poll_interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let start = Instant::now();

    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if start.elapsed() > timeout {
            return None;
        }
        if poll_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(poll_interval).await;
        }
    }
}
