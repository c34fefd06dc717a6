//! Broker connection liveness supervision.
//!
//! The supervisor only observes the connection. When pings have been failing
//! for longer than the tolerance window it raises a [`ReconnectSignal`]; the
//! task that owns the connection performs the reconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::backoff::FailureTracker;
use crate::broker::MessageBroker;
use crate::config::BrokerConfig;

/// Reconnect request. `generation` increases by one per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectSignal {
    pub generation: u64,
}

/// Periodic liveness check for a broker connection.
pub struct LivenessSupervisor {
    broker: Arc<dyn MessageBroker>,
    period: Duration,
    tolerance: Duration,
}

impl LivenessSupervisor {
    /// Check every `liveness_period`, tolerate failures for `heartbeat`.
    pub fn new(broker: Arc<dyn MessageBroker>, config: &BrokerConfig) -> Self {
        Self::with_timing(broker, config.liveness_period, config.heartbeat)
    }

    pub fn with_timing(broker: Arc<dyn MessageBroker>, period: Duration, tolerance: Duration) -> Self {
        Self {
            broker,
            period,
            tolerance,
        }
    }

    /// Start the check loop. It stops when `shutdown` flips to `true` or its
    /// sender is dropped.
    pub fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> (JoinHandle<()>, watch::Receiver<ReconnectSignal>) {
        let (tx, rx) = watch::channel(ReconnectSignal::default());
        let handle = tokio::spawn(self.run(tx, shutdown));
        (handle, rx)
    }

    async fn run(self, tx: watch::Sender<ReconnectSignal>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tracker = FailureTracker::new(3);
        let mut failing_since: Option<Instant> = None;
        let mut armed = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Liveness supervisor stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    let ping = match tokio::time::timeout(self.period, self.broker.ping()).await {
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(_) => Err(format!("no reply within {:?}", self.period)),
                    };

                    match ping {
                        Ok(()) => {
                            tracker.record_success();
                            if failing_since.take().is_some() {
                                info!("Broker connection healthy again");
                            }
                            armed = true;
                        }
                        Err(reason) => {
                            let since = *failing_since.get_or_insert_with(Instant::now);
                            if tracker.record_failure() {
                                warn!("Broker liveness check failed: {}", reason);
                            }
                            // One request per outage; re-armed by the next
                            // successful ping.
                            if armed && since.elapsed() >= self.tolerance {
                                armed = false;
                                tx.send_modify(|s| s.generation += 1);
                                error!(
                                    "Broker unresponsive for {:?}, requesting reconnect",
                                    since.elapsed()
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}
