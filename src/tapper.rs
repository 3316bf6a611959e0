//! Blind periodic tapper.
//!
//! Repeatedly taps a fixed clickmap point without looking at the screen,
//! used to collect floating pickups whose exact position is irrelevant.
//! Taps go through the shared [`InputDispatcher`] so they interleave
//! FIFO with whatever the orchestrator submits. Stopping is cooperative:
//! a cancellation flag polled at sub-second granularity.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::control::CancelToken;
use crate::dispatch::InputDispatcher;

pub struct BlindTapperConfig {
    pub x: u32,
    pub y: u32,
    pub label: String,
    pub interval: Duration,
    /// Stop on its own after this long; `None` runs until stopped.
    pub duration: Option<Duration>,
}

/// Handle to a running blind tapper thread.
pub struct BlindTapper {
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl BlindTapper {
    /// Spawn the tapper thread; the first tap fires immediately.
    pub fn start(config: BlindTapperConfig, dispatcher: Arc<InputDispatcher>) -> Self {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let worker = std::thread::Builder::new()
            .name("blind-tapper".to_string())
            .spawn(move || {
                log::info!(
                    "[TAPPER] Blind tapping '{}' at ({},{}) every {:?}",
                    config.label,
                    config.x,
                    config.y,
                    config.interval
                );
                let deadline = config.duration.map(|d| Instant::now() + d);
                let mut taps: u64 = 0;
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    if let Some(deadline) = deadline
                        && Instant::now() >= deadline
                    {
                        break;
                    }
                    dispatcher.submit(config.x, config.y, Some(&config.label));
                    taps += 1;
                    if !sleep_unless_cancelled(&token, config.interval) {
                        break;
                    }
                }
                log::info!("[TAPPER] Stopped after {taps} taps");
            })
            .expect("failed to spawn blind-tapper thread");
        Self {
            cancel,
            worker: Some(worker),
        }
    }

    /// Signal the thread to stop and wait for it to exit. Observed
    /// within 250ms of the call even mid-interval.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.join()
        {
            log::error!("[TAPPER] thread panicked: {e:?}");
        }
    }
}

impl Drop for BlindTapper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sleep_unless_cancelled(token: &CancelToken, duration: Duration) -> bool {
    let end_by = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= end_by {
            return true;
        }
        std::thread::sleep((end_by - now).min(Duration::from_millis(100)));
    }
}
