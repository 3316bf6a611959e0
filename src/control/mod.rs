//! Shared run/mode state and cooperative cancellation.
//!
//! One `SharedControl` instance is created at startup and handed to every
//! component that needs it (constructor injection); there is no hidden
//! global. The watchdog resets the run state after a restart and mission
//! handlers flip the execution mode, all through the same mutex.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PilotError, PilotResult};

/// Coarse run state of the automated game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
    /// Set by the watchdog after a restart; the main loop re-detects.
    Unknown,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Stopped => "STOPPED",
            RunState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

impl FromStr for RunState {
    type Err = PilotError;

    fn from_str(s: &str) -> PilotResult<Self> {
        match s {
            "RUNNING" => Ok(RunState::Running),
            "PAUSED" => Ok(RunState::Paused),
            "STOPPED" => Ok(RunState::Stopped),
            "UNKNOWN" => Ok(RunState::Unknown),
            other => Err(PilotError::InvalidRunState {
                value: other.to_string(),
            }),
        }
    }
}

/// How mission handlers should behave at decision points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Default auto-progression behavior.
    Retry,
    /// Hold on terminal screens until the operator flips the mode.
    Wait,
    /// Navigate to / idle on the home screen.
    Home,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecMode::Retry => "RETRY",
            ExecMode::Wait => "WAIT",
            ExecMode::Home => "HOME",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecMode {
    type Err = PilotError;

    fn from_str(s: &str) -> PilotResult<Self> {
        match s {
            "RETRY" => Ok(ExecMode::Retry),
            "WAIT" => Ok(ExecMode::Wait),
            "HOME" => Ok(ExecMode::Home),
            other => Err(PilotError::InvalidExecMode {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
struct ControlInner {
    state: RunState,
    mode: ExecMode,
}

/// Mutex-guarded holder of the run state and execution mode.
///
/// Reads and writes from different threads never interleave; the holder
/// keeps no history and always reflects the latest write.
#[derive(Debug)]
pub struct SharedControl {
    inner: Mutex<ControlInner>,
}

impl SharedControl {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlInner {
                state: RunState::Running,
                mode: ExecMode::Retry,
            }),
        }
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().expect("control mutex poisoned").state
    }

    pub fn set_state(&self, state: RunState) {
        self.inner.lock().expect("control mutex poisoned").state = state;
    }

    pub fn mode(&self) -> ExecMode {
        self.inner.lock().expect("control mutex poisoned").mode
    }

    pub fn set_mode(&self, mode: ExecMode) {
        self.inner.lock().expect("control mutex poisoned").mode = mode;
    }

    /// String-typed setter for operator input; rejects values outside the
    /// enumeration with a validation error.
    pub fn set_state_str(&self, value: &str) -> PilotResult<()> {
        self.set_state(value.parse()?);
        Ok(())
    }

    pub fn set_mode_str(&self, value: &str) -> PilotResult<()> {
        self.set_mode(value.parse()?);
        Ok(())
    }
}

impl Default for SharedControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Clonable cooperative cancellation flag.
///
/// Long-running helpers check this at sub-second granularity; cancellation
/// is never preemptive.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_running_retry() {
        let control = SharedControl::new();
        assert_eq!(control.state(), RunState::Running);
        assert_eq!(control.mode(), ExecMode::Retry);
    }

    #[test]
    fn latest_write_wins() {
        let control = SharedControl::new();
        control.set_state(RunState::Paused);
        control.set_state(RunState::Unknown);
        assert_eq!(control.state(), RunState::Unknown);
    }

    #[test]
    fn string_setters_validate() {
        let control = SharedControl::new();
        control.set_state_str("STOPPED").unwrap();
        assert_eq!(control.state(), RunState::Stopped);
        assert!(matches!(
            control.set_state_str("stopped"),
            Err(PilotError::InvalidRunState { .. })
        ));
        assert!(matches!(
            control.set_mode_str("SLEEP"),
            Err(PilotError::InvalidExecMode { .. })
        ));
        // a rejected write leaves the previous value intact
        assert_eq!(control.mode(), ExecMode::Retry);
    }

    #[test]
    fn cancel_token_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
