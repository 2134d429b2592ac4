//! Repeating-task scheduler.
//!
//! Every periodic behavior in the mesh (gossip polls, resync, heartbeat
//! publishing, TTL sweeps, watch refreshes) runs through [`repeat`]: the task
//! body runs immediately, then again a fixed delay after each completion.
//! Because the next run is only scheduled once the previous one resolves, no
//! two runs of the same task ever overlap.

use std::future::Future;
use std::time::Duration;

use crate::common::Error;

/// What a scheduled task wants to happen next.
#[derive(Debug)]
pub enum RunOutcome {
    /// Run again after the configured delay.
    Continue,
    /// Stop silently. Tasks use this to cancel themselves when their owner
    /// has shut down or their peer has been dropped.
    Stop,
    /// Stop and log the reason.
    Fail(Error),
}

/// Run `task` immediately, then repeatedly with `delay` between the end of
/// one run and the start of the next, until it returns [`RunOutcome::Stop`]
/// or [`RunOutcome::Fail`].
///
/// `name` is cosmetic, used for logging.
pub fn repeat<F, Fut>(name: impl Into<String>, mut task: F, delay: Duration) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = RunOutcome> + Send,
{
    let name = name.into();
    tokio::spawn(async move {
        loop {
            match task().await {
                RunOutcome::Continue => tokio::time::sleep(delay).await,
                RunOutcome::Stop => break,
                RunOutcome::Fail(err) => {
                    tracing::info!("task [{}] stopping because of error: {}", name, err);
                    break;
                }
            }
        }
    })
}
