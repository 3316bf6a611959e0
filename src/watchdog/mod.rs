//! Supervisory watchdog for the game process.
//!
//! A background thread periodically verifies that the game process is
//! alive and foregrounded, restarting or re-foregrounding it when not.
//! Every check cycle catches its own errors so a flaky device never
//! kills supervision.

use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::control::{CancelToken, RunState, SharedControl};
use crate::device::DeviceControl;
use crate::error::PilotResult;

/// Tunables for one supervision loop.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Package name of the supervised app.
    pub package: String,
    pub check_interval: Duration,
    /// Settle time after a cold relaunch (surface creation).
    pub post_launch_wait: Duration,
    /// Settle time after re-foregrounding an already running process.
    pub post_foreground_wait: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            package: "com.TechTreeGames.TheTower".to_string(),
            check_interval: Duration::from_secs(30),
            post_launch_wait: Duration::from_secs(6),
            post_foreground_wait: Duration::from_secs(5),
        }
    }
}

/// Extract the foreground package from raw `dumpsys` output.
///
/// Several textual formats exist across Android releases and emulators,
/// so the patterns are tried in order of how commonly they appear.
pub fn parse_foreground_package(text: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            // window mCurrentFocus (emulators and older devices)
            r"mCurrentFocus=Window\{.*?\s+(\S+)/\S+\}",
            // topResumedActivity (newer AOSP)
            r"topResumedActivity.*?\s+(\S+)/\S+",
            // mResumedActivity (older/newer mixes)
            r"mResumedActivity.*?\s+(\S+)/\S+",
            // focused app (very old fallback)
            r"mFocusedApp=.*\s+(\S+)/\S+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid foreground pattern"))
        .collect()
    });

    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .map(|caps| caps[1].to_string())
}

/// Whether a process with exactly this name appears in the process
/// list. Matches the final column of each line to avoid substring false
/// positives against paths or arguments.
pub fn process_running(process_list: &str, package: &str) -> bool {
    process_list
        .lines()
        .filter_map(|line| line.split_whitespace().next_back())
        .any(|name| name == package)
}

/// One supervision loop over a device. Owns its change-detection state;
/// run it on a dedicated thread via [`Watchdog::spawn`].
pub struct Watchdog {
    config: WatchdogConfig,
    device: Arc<dyn DeviceControl>,
    control: Arc<SharedControl>,
    cancel: CancelToken,
    /// Last observed foreground package, kept only to log transitions.
    last_foreground: Option<String>,
}

/// Stop handle for a spawned watchdog thread.
pub struct WatchdogHandle {
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl WatchdogHandle {
    pub fn stop(mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.join()
        {
            log::error!("[WATCHDOG] thread panicked: {e:?}");
        }
    }
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        device: Arc<dyn DeviceControl>,
        control: Arc<SharedControl>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            device,
            control,
            cancel,
            last_foreground: None,
        }
    }

    /// Spawn the supervision thread.
    pub fn spawn(self) -> WatchdogHandle {
        let cancel = self.cancel.clone();
        let worker = std::thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn watchdog thread");
        WatchdogHandle {
            cancel,
            worker: Some(worker),
        }
    }

    /// Loop until cancelled; each cycle's errors are logged, never
    /// propagated.
    pub fn run(mut self) {
        log::info!(
            "[WATCHDOG] Supervising {} every {}s",
            self.config.package,
            self.config.check_interval.as_secs()
        );
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.check_once() {
                log::error!("[WATCHDOG] check failed: {e}");
            }
            if !self.sleep_unless_cancelled(self.config.check_interval) {
                break;
            }
        }
        log::debug!("[WATCHDOG] thread exiting");
    }

    /// One supervision cycle: running check, then foreground check.
    pub fn check_once(&mut self) -> PilotResult<()> {
        let process_list = self.device.query_process_list()?;
        if !process_running(&process_list, &self.config.package) {
            log::warn!("[WATCHDOG] Game process not running. Restarting.");
            self.restart_game()?;
            return Ok(());
        }

        if !self.game_foregrounded()? {
            log::warn!("[WATCHDOG] Game is backgrounded. Bringing to foreground.");
            self.bring_to_foreground()?;
        }
        Ok(())
    }

    /// Whether the supervised package currently holds the foreground.
    /// Logs the foreground package only when it changes.
    fn game_foregrounded(&mut self) -> PilotResult<bool> {
        let text = self.device.query_foreground_text()?;
        match parse_foreground_package(&text) {
            Some(package) => {
                if self.last_foreground.as_deref() != Some(package.as_str()) {
                    match &self.last_foreground {
                        None => log::debug!(
                            "[WATCHDOG] Started; current foreground app: {package}"
                        ),
                        Some(_) => log::debug!("[WATCHDOG] Foreground changed: {package}"),
                    }
                    self.last_foreground = Some(package.clone());
                }
                Ok(package.eq_ignore_ascii_case(&self.config.package))
            }
            None => {
                log::warn!("[WATCHDOG] Could not determine foreground app");
                Ok(false)
            }
        }
    }

    /// Hard-stop then relaunch, and reset the shared run state so the
    /// main loop re-detects the screen from scratch.
    fn restart_game(&mut self) -> PilotResult<()> {
        log::info!("[WATCHDOG] Restarting game");
        self.device.force_stop(&self.config.package)?;
        self.device.launch(&self.config.package)?;
        self.sleep_unless_cancelled(self.config.post_launch_wait);
        self.control.set_state(RunState::Unknown);
        log::info!("[WATCHDOG] Game launched; deferring to main loop for state detection");
        Ok(())
    }

    fn bring_to_foreground(&mut self) -> PilotResult<()> {
        self.device.launch(&self.config.package)?;
        log::info!("[WATCHDOG] Sent launch intent to foreground game");
        self.sleep_unless_cancelled(self.config.post_foreground_wait);
        Ok(())
    }

    fn sleep_unless_cancelled(&self, duration: Duration) -> bool {
        let end_by = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= end_by {
                return true;
            }
            std::thread::sleep((end_by - now).min(Duration::from_millis(100)));
        }
    }
}
