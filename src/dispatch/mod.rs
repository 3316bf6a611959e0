//! Ordered, decoupled input injection.
//!
//! Callers submit tap requests and return immediately; a single consumer
//! thread services the queue in strict FIFO order so multiple logical
//! callers (the orchestrator, the blind tapper) interleave
//! deterministically and device-I/O latency stays off their critical
//! path. Device errors inside the consumer are logged and swallowed: one
//! bad tap must never kill a thread that lives for the whole process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::device::DeviceControl;

#[derive(Debug, Clone)]
struct TapRequest {
    x: u32,
    y: u32,
    label: Option<String>,
}

/// Queue plus consumer thread with an explicit start/stop lifecycle; no
/// work happens until [`InputDispatcher::start`] and tests can construct
/// isolated instances freely.
pub struct InputDispatcher {
    tx: Mutex<Option<Sender<TapRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
}

impl InputDispatcher {
    /// Spawn the consumer thread and return the dispatcher handle.
    pub fn start(device: Arc<dyn DeviceControl>) -> Self {
        let (tx, rx) = mpsc::channel::<TapRequest>();
        let stopping = Arc::new(AtomicBool::new(false));
        let stop_flag = stopping.clone();

        let worker = std::thread::Builder::new()
            .name("input-dispatcher".to_string())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(Duration::from_millis(250)) {
                        Ok(request) => match device.tap(request.x, request.y) {
                            Ok(()) => log::info!(
                                "TAP {} at ({},{})",
                                request.label.as_deref().unwrap_or(""),
                                request.x,
                                request.y
                            ),
                            Err(e) => log::warn!(
                                "[DISPATCH] tap at ({},{}) failed: {e}",
                                request.x,
                                request.y
                            ),
                        },
                        Err(RecvTimeoutError::Timeout) => {
                            if stop_flag.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                        // sender dropped: drain finished, exit
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("[DISPATCH] consumer thread exiting");
            })
            .expect("failed to spawn input-dispatcher thread");

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            stopping,
        }
    }

    /// Enqueue a tap and return immediately. Best-effort: after `stop` the
    /// request is dropped with a warning.
    pub fn submit(&self, x: u32, y: u32, label: Option<&str>) {
        let guard = self.tx.lock().expect("dispatcher sender poisoned");
        match guard.as_ref() {
            Some(tx) => {
                let _ = tx.send(TapRequest {
                    x,
                    y,
                    label: label.map(str::to_string),
                });
            }
            None => log::warn!("[DISPATCH] submit after stop; tap ({x},{y}) dropped"),
        }
    }

    /// Drain outstanding requests and join the consumer thread.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // Dropping the sender lets the consumer finish the queue and exit
        // on disconnect without waiting out the idle timeout.
        self.tx.lock().expect("dispatcher sender poisoned").take();
        if let Some(worker) = self.worker.lock().expect("dispatcher worker poisoned").take()
            && let Err(e) = worker.join()
        {
            log::error!("[DISPATCH] consumer thread panicked: {e:?}");
        }
    }
}

impl Drop for InputDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::MockDevice;

    #[test]
    fn taps_execute_in_submission_order() {
        let device = Arc::new(MockDevice::default());
        let dispatcher = InputDispatcher::start(device.clone());
        dispatcher.submit(1, 1, Some("first"));
        dispatcher.submit(2, 2, None);
        dispatcher.submit(3, 3, Some("third"));
        dispatcher.stop();
        assert_eq!(device.taps(), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn device_errors_do_not_kill_the_consumer() {
        let device = Arc::new(MockDevice::default());
        device.fail_next_taps(1);
        let dispatcher = InputDispatcher::start(device.clone());
        dispatcher.submit(5, 5, None);
        dispatcher.submit(6, 6, None);
        dispatcher.stop();
        // first tap failed, second still executed
        assert_eq!(device.taps(), vec![(6, 6)]);
    }

    #[test]
    fn submit_after_stop_is_dropped_not_panicking() {
        let device = Arc::new(MockDevice::default());
        let dispatcher = InputDispatcher::start(device.clone());
        dispatcher.stop();
        dispatcher.submit(9, 9, None);
        assert!(device.taps().is_empty());
    }
}
