//! Unattended automation core for an idle tower-defense game over ADB.
//!
//! The pipeline: a JSON clickmap describes UI elements and their match
//! templates ([`clickmap`]), grayscale template matching locates them on
//! screen ([`matching`]), declarative rules classify each frame into a
//! primary state plus overlays ([`state`]), a FIFO queue injects taps
//! ([`dispatch`]), a phased orchestrator runs rounds and campaigns
//! ([`mission`]), and a watchdog keeps the game alive ([`watchdog`]).

pub mod args;
pub mod clickmap;
pub mod control;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod matching;
pub mod mission;
pub mod state;
pub mod tapper;
pub mod watchdog;

pub use clickmap::Clickmap;
pub use control::{CancelToken, ExecMode, RunState, SharedControl};
pub use device::{AdbShellDevice, DeviceControl};
pub use dispatch::InputDispatcher;
pub use error::{PilotError, PilotResult};
pub use matching::{DetectorRegistry, RegionMatcher};
pub use mission::{CampaignConfig, MissionConfig, MissionOrchestrator, MissionOutcome};
pub use state::{Detector, StateClassifier};
