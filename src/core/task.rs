//! Self-rescheduling background tasks with cancellation.

use std::time::Duration;

use log::{debug, error};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Work run on every tick of a [`RepeatingTask`]
#[async_trait::async_trait]
pub trait Tick: Send + 'static {
    async fn tick(&mut self);
}

/// Runs a [`Tick`] job every `interval` until stopped.
///
/// The job is handed back by [`RepeatingTask::stop`] so any resources it owns
/// (such as an open radio) can be reused.
pub struct RepeatingTask<T> {
    name: &'static str,
    cancel_token: CancellationToken,
    handle: JoinHandle<T>,
}

impl<T: Tick> RepeatingTask<T> {
    /// Spawns the task. Cancelling `parent` also stops it.
    pub fn spawn(name: &'static str, interval: Duration, mut job: T, parent: &CancellationToken) -> Self {
        let cancel_token = parent.child_token();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(interval) => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = job.tick() => {}
                }
            }
            debug!("{} task stopped", name);
            job
        });

        debug!("{} task started with interval {:?}", name, interval);
        Self {
            name,
            cancel_token,
            handle,
        }
    }

    /// Cancels the task and waits for it, returning the job
    pub async fn stop(self) -> Option<T> {
        self.cancel_token.cancel();
        match self.handle.await {
            Ok(job) => Some(job),
            Err(e) => {
                error!("{} task finished with an unexpected join error: {:?}", self.name, e);
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Sends `event` on `events` after `delay` unless `cancel_token` fires first
pub fn spawn_delayed<E: Send + 'static>(
    delay: Duration,
    events: tokio::sync::mpsc::UnboundedSender<E>,
    event: E,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {}
            _ = sleep(delay) => {
                let _ = events.send(event);
            }
        }
    })
}
