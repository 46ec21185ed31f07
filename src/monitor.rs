//! Client-side heartbeat monitor.
//!
//! Runs as an independent background task: on every tick it proves liveness
//! through a [`HeartbeatClient`], retrying a bounded number of times with a
//! fixed delay. When a whole tick's attempts are exhausted it fires the kill
//! switch - an irreversible, immediate process termination - because a
//! server-declared revocation must stop the protected application even if
//! the application ignores every error we could return to it.
//!
//! # Lifecycle
//!
//! `Idle -> Running` via [`HeartbeatMonitor::start`], which returns
//! immediately. `Running -> Stopped` via [`MonitorHandle::stop`]; the stop
//! flag is observed at tick boundaries, so a tick already in progress
//! completes but no heartbeat starts after `stop()` returns between ticks.
//! `Running -> Terminated` via the kill switch; no further ticks occur and
//! no cleanup is guaranteed to run.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::ClientError;

/// The heartbeat call the monitor drives.
///
/// A trait seam rather than a concrete client so the retry/kill-switch
/// policy can be tested against scripted failures.
pub trait HeartbeatClient {
    fn heartbeat(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Replaceable termination action. The default exits the process with a
/// non-zero status; tests inject a counter instead.
pub type KillSwitch = Box<dyn Fn(&str) + Send + Sync>;

/// Optional callback invoked with the final error before the kill switch.
pub type ErrorCallback = Box<dyn Fn(&ClientError) + Send + Sync>;

/// Heartbeat monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between heartbeat ticks
    pub interval: Duration,

    /// Total attempts per tick before the kill switch fires (minimum 1)
    pub max_retries: u32,

    /// Fixed delay between attempts within a tick (no backoff growth)
    pub retry_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Periodic heartbeat scheduler with bounded retry and a kill switch.
pub struct HeartbeatMonitor<C> {
    client: C,
    config: MonitorConfig,
    kill_switch: KillSwitch,
    on_error: Option<ErrorCallback>,
}

/// Handle to a running monitor.
///
/// Dropping the handle also stops the monitor (the stop channel closes);
/// keep it alive for as long as heartbeats should continue.
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Request a cooperative stop.
    ///
    /// The flag is set before this returns, and the run loop re-checks it
    /// when a tick fires: called between ticks, no heartbeat happens
    /// afterwards. A tick already mid-retry completes first.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait for the monitor task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Whether the monitor task has exited (stopped or terminated).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<C> HeartbeatMonitor<C>
where
    C: HeartbeatClient + Send + Sync + 'static,
{
    pub fn new(client: C, config: MonitorConfig) -> Self {
        let config = MonitorConfig {
            // A tick with zero attempts could never succeed
            max_retries: config.max_retries.max(1),
            ..config
        };

        Self {
            client,
            config,
            kill_switch: Box::new(exit_process),
            on_error: None,
        }
    }

    /// Replace the termination action (used by tests, or by embedders that
    /// need to flush something before dying - though nothing is guaranteed
    /// to run after the default switch).
    pub fn with_kill_switch(mut self, kill: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.kill_switch = Box::new(kill);
        self
    }

    /// Install a callback invoked with the final error before termination.
    pub fn with_error_callback(mut self, callback: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Transition Idle -> Running and return immediately.
    pub fn start(self) -> MonitorHandle {
        tracing::info!(
            interval = ?self.config.interval,
            max_retries = self.config.max_retries,
            "heartbeat monitor started"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));

        MonitorHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; consume that so the first heartbeat
        // happens one full interval after start
        ticker.tick().await;

        loop {
            tokio::select! {
                // Also resolves when the handle is dropped (channel closed)
                _ = stop.changed() => {
                    tracing::info!("heartbeat monitor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    // stop() may have won a race with this tick
                    if *stop.borrow() {
                        tracing::info!("heartbeat monitor stopped");
                        return;
                    }

                    if let Err(err) = self.beat_with_retry().await {
                        tracing::error!(error = %err, "all heartbeat attempts failed");

                        if let Some(callback) = &self.on_error {
                            callback(&err);
                        }

                        (self.kill_switch)(&format!("heartbeat validation failed: {err}"));
                        return;
                    }
                }
            }
        }
    }

    /// One tick: attempt immediately, then retry with a fixed delay until
    /// success or `max_retries` total attempts.
    async fn beat_with_retry(&self) -> Result<(), ClientError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.client.heartbeat().await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "heartbeat recovered");
                    } else {
                        tracing::debug!("heartbeat ok");
                    }
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %err,
                        "heartbeat attempt failed"
                    );

                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}

/// Default kill switch: immediate abnormal process exit.
///
/// Bypasses the normal shutdown path entirely; destructors and other
/// cleanup do not run.
fn exit_process(reason: &str) {
    tracing::error!(reason, "kill switch triggered, terminating now");
    std::process::exit(1);
}
