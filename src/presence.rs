//! Presence loop: liveness pings and participant-list refreshes.
//!
//! Two independent fixed-interval timers run for the lifetime of an open
//! session view. Both are fire-and-forget sends through the command sink;
//! neither waits on the other.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::timer_period;
use crate::net::codec::Command;
use crate::net::connection::CommandSink;

/// Running presence timers. Dropping the guard aborts them.
#[derive(Debug)]
pub struct PresenceLoop {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PresenceLoop {
    /// Start both timers. The first ping and refresh fire one period after
    /// start, since the view requests the participant list when it opens.
    #[must_use]
    pub fn spawn(sink: Arc<dyn CommandSink>, ping_every: Duration, roster_every: Duration) -> Self {
        let (ping_every, roster_every) = (timer_period(ping_every), timer_period(roster_every));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let now = Instant::now();
            let mut ping = tokio::time::interval_at(now + ping_every, ping_every);
            ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut roster = tokio::time::interval_at(now + roster_every, roster_every);
            roster.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ping.tick() => sink.send(Command::UserActive),
                    _ = roster.tick() => sink.send(Command::GetUsers),
                }
            }
            debug!("presence loop stopped");
        });
        Self { shutdown: Some(shutdown_tx), task: Some(task) }
    }

    /// Stop both timers and wait for the task to exit.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            if shutdown.send(()).is_err() {
                debug!("presence task already gone");
            }
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "presence task ended abnormally");
            }
        }
    }
}

impl Drop for PresenceLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
