//! Periodic driver: the sole detector of timer expiry and stale votes when no
//! inbound traffic arrives.

use crate::registry::MatchRegistry;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Background thread sweeping the registry every tick.
pub struct PeriodicDriver {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicDriver {
    pub fn spawn(registry: Arc<MatchRegistry>) -> std::io::Result<Self> {
        let tick = registry.settings().tick();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("bout-driver".to_string())
            .spawn(move || {
                info!(tick_ms = tick.as_millis() as u64, "periodic driver started");
                loop {
                    let started = Instant::now();
                    let report = registry.sweep();
                    if report.faults > 0 {
                        warn!(faults = report.faults, "sweep completed with faults");
                    }
                    if !report.evicted.is_empty() {
                        debug!(evicted = ?report.evicted, "sweep evicted matches");
                    }
                    // Sleep out the rest of the tick, waking early on stop.
                    match stop_rx.recv_timeout(tick.saturating_sub(started.elapsed())) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("periodic driver stopped");
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for the in-flight sweep to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("periodic driver thread panicked");
            }
        }
    }
}

impl Drop for PeriodicDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::protocol::Outbound;
    use crate::broadcast::{Delivery, RecordingBroadcaster};
    use crate::clock::SystemClock;
    use crate::config::{EngineSettings, MatchConfig};
    use std::time::Duration;

    #[test]
    fn driver_publishes_timer_snapshots_until_shutdown() {
        let recorder = Arc::new(RecordingBroadcaster::new());
        let settings = EngineSettings {
            tick_ms: 10,
            stopped_timer_emit_ms: 20,
            ..EngineSettings::default()
        };
        let registry = Arc::new(MatchRegistry::new(
            settings,
            Arc::new(SystemClock),
            recorder.clone(),
        ));
        registry
            .create_with_code("DRIVE1", MatchConfig::default())
            .unwrap();

        let mut driver = PeriodicDriver::spawn(registry.clone()).unwrap();
        assert!(driver.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut timer_msgs = 0;
        while timer_msgs < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
            timer_msgs += recorder
                .take()
                .into_iter()
                .filter(|(to, msg)| {
                    *to == Delivery::Group("DRIVE1".into()) && matches!(msg, Outbound::Timer(_))
                })
                .count();
        }
        assert!(timer_msgs >= 2, "driver should keep emitting stopped-timer snapshots");

        driver.shutdown();
        assert!(!driver.is_running());
        recorder.take();
        thread::sleep(Duration::from_millis(50));
        assert!(recorder.take().is_empty());
    }
}
