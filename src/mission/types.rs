//! Mission and campaign result/configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Why a mission round ended. Mission-level failures are values, not
/// errors, so callers can branch without parsing error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOutcome {
    Success,
    TimeoutWaitingForRunning,
    TimeoutWaitingForButton,
    UiFlowFailure,
    AbortedByUser,
}

/// Produced once per mission round.
#[derive(Debug, Clone)]
pub struct MissionResult {
    pub outcome: MissionOutcome,
    pub details: String,
    pub elapsed: Duration,
    /// Wall-clock duration per executed phase, in execution order.
    pub phases: Vec<(String, Duration)>,
    /// Non-fatal errors collected along the way (end-sequence steps,
    /// capture hiccups).
    pub errors: Vec<String>,
}

impl MissionResult {
    pub fn phase_duration(&self, name: &str) -> Option<Duration> {
        self.phases
            .iter()
            .find(|(phase, _)| phase == name)
            .map(|(_, d)| *d)
    }
}

/// Immutable tunables for one mission round.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    // Poll intervals
    pub poll_running_interval: Duration,
    pub poll_button_interval: Duration,

    /// Fixed countdown after the trigger button fires (buff duration).
    pub post_trigger_wait: Duration,

    // Per-phase timeouts plus one overall per-round deadline.
    pub timeout_running: Duration,
    pub timeout_button: Duration,
    pub overall_deadline: Duration,

    /// Verify tap success by re-detection, with bounded retries.
    pub verify_tap: bool,
    pub max_tap_retries: u32,

    /// Pause between end-sequence taps so the UI can settle.
    pub post_tap_settle: Duration,

    /// Primary state that means the game is playable.
    pub running_state: String,
    /// Clickmap dot-path of the floating trigger control.
    pub trigger_button: String,
    /// Overlay name reported while the in-game menu is open.
    pub menu_overlay: String,

    // End-sequence clickmap keys: open menu, end the round, confirm, retry.
    pub toggle_menu_key: String,
    pub end_round_key: String,
    pub confirm_key: String,
    pub retry_key: String,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            poll_running_interval: Duration::from_secs(2),
            poll_button_interval: Duration::from_secs(1),
            post_trigger_wait: Duration::from_secs(75),
            timeout_running: Duration::from_secs(60),
            timeout_button: Duration::from_secs(45),
            overall_deadline: Duration::from_secs(240),
            verify_tap: true,
            max_tap_retries: 2,
            post_tap_settle: Duration::from_secs(1),
            running_state: "RUNNING".to_string(),
            trigger_button: "floating_buttons.nuke".to_string(),
            menu_overlay: "MENU_OPEN".to_string(),
            toggle_menu_key: "overlays.toggle_menu".to_string(),
            end_round_key: "overlays.end_round".to_string(),
            confirm_key: "buttons.yes_end_round".to_string(),
            retry_key: "buttons.retry_game_over".to_string(),
        }
    }
}

/// Stop conditions for a campaign of repeated rounds.
#[derive(Debug, Clone, Default)]
pub struct CampaignConfig {
    pub max_runs: Option<u32>,
    pub max_duration: Option<Duration>,
    pub sleep_between_runs: Duration,
    /// Presence of this file stops the campaign; checked before each
    /// round and again after the inter-round pause.
    pub stopfile: Option<PathBuf>,
}

/// Aggregated campaign outcome.
#[derive(Debug, Clone, Default)]
pub struct CampaignResult {
    pub runs: u32,
    pub successes: u32,
    pub timeouts_running: u32,
    pub timeouts_button: u32,
    pub ui_failures: u32,
    pub aborted: bool,
    pub total_elapsed: Duration,
    pub last_result: Option<MissionResult>,
    /// Last snapshot from the optional progress probe.
    pub progress: Option<serde_json::Value>,
}
