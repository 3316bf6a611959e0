//! Phased mission rounds and campaigns.
//!
//! One round runs four phases in order, each under its own timeout and
//! all bounded by an overall deadline:
//! `WAIT_RUNNING` → `WAIT_TRIGGER` → `TIMED_WAIT` → `END_SEQUENCE`.
//! Mission-level failures come back as typed outcomes; configuration and
//! contract errors still propagate as `Err` because they must be fixed,
//! not retried.

pub mod types;

use std::time::{Duration, Instant};

use std::sync::Arc;

use image::GrayImage;

use crate::clickmap::Clickmap;
use crate::control::{CancelToken, ExecMode, SharedControl};
use crate::device::DeviceControl;
use crate::dispatch::InputDispatcher;
use crate::error::PilotResult;
use crate::state::Detector;
pub use types::{CampaignConfig, CampaignResult, MissionConfig, MissionOutcome, MissionResult};

/// Optional per-round progress probe; receives the latest screenshot when
/// one could be captured.
pub type ProgressProbe = dyn Fn(Option<&GrayImage>) -> PilotResult<serde_json::Value> + Sync;
/// Campaign termination predicate over the latest progress snapshot.
pub type UntilPredicate = dyn Fn(&serde_json::Value) -> bool + Sync;

const PHASE_WAIT_RUNNING: &str = "WAIT_RUNNING";
const PHASE_WAIT_TRIGGER: &str = "WAIT_TRIGGER";
const PHASE_TIMED_WAIT: &str = "TIMED_WAIT";
const PHASE_END_SEQUENCE: &str = "END_SEQUENCE";

/// Drives one scripted mission against the live game.
pub struct MissionOrchestrator {
    config: MissionConfig,
    device: Arc<dyn DeviceControl>,
    detector: Arc<dyn Detector>,
    clickmap: Arc<Clickmap>,
    dispatcher: Arc<InputDispatcher>,
    control: Arc<SharedControl>,
    abort: CancelToken,
}

impl MissionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MissionConfig,
        device: Arc<dyn DeviceControl>,
        detector: Arc<dyn Detector>,
        clickmap: Arc<Clickmap>,
        dispatcher: Arc<InputDispatcher>,
        control: Arc<SharedControl>,
        abort: CancelToken,
    ) -> Self {
        Self {
            config,
            device,
            detector,
            clickmap,
            dispatcher,
            control,
            abort,
        }
    }

    pub fn abort_token(&self) -> CancelToken {
        self.abort.clone()
    }

    /// Run one bounded round and report how it ended. An interrupted
    /// round parks the session in [`ExecMode::Wait`] so nothing keeps
    /// tapping while the operator takes over.
    pub fn run_round(&self) -> PilotResult<MissionResult> {
        let result = self.run_round_inner()?;
        if result.outcome == MissionOutcome::AbortedByUser {
            self.control.set_mode(ExecMode::Wait);
        }
        Ok(result)
    }

    fn run_round_inner(&self) -> PilotResult<MissionResult> {
        let cfg = &self.config;
        let started = Instant::now();
        let deadline = started + cfg.overall_deadline;
        let mut phases: Vec<(String, Duration)> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        log::info!("[MISSION] Starting round (trigger: {})", cfg.trigger_button);

        let finish = |outcome: MissionOutcome,
                      details: &str,
                      phases: Vec<(String, Duration)>,
                      errors: Vec<String>| {
            MissionResult {
                outcome,
                details: details.to_string(),
                elapsed: started.elapsed(),
                phases,
                errors,
            }
        };

        // Phase: WAIT_RUNNING
        let phase_start = Instant::now();
        let outcome = self.wait_for_running(deadline, &mut errors)?;
        phases.push((PHASE_WAIT_RUNNING.to_string(), phase_start.elapsed()));
        match outcome {
            None => {}
            Some(MissionOutcome::AbortedByUser) => {
                return Ok(finish(
                    MissionOutcome::AbortedByUser,
                    "User interrupted",
                    phases,
                    errors,
                ));
            }
            Some(outcome) => {
                return Ok(finish(
                    outcome,
                    "RUNNING state not reached within timeout",
                    phases,
                    errors,
                ));
            }
        }

        // Phase: WAIT_TRIGGER (+ verified tap)
        let phase_start = Instant::now();
        let outcome = self.wait_for_trigger(deadline, &mut errors)?;
        phases.push((PHASE_WAIT_TRIGGER.to_string(), phase_start.elapsed()));
        match outcome {
            None => {}
            Some(MissionOutcome::AbortedByUser) => {
                return Ok(finish(
                    MissionOutcome::AbortedByUser,
                    "User interrupted",
                    phases,
                    errors,
                ));
            }
            Some(outcome) => {
                return Ok(finish(
                    outcome,
                    "Trigger button not available (or verify failed)",
                    phases,
                    errors,
                ));
            }
        }

        // Phase: TIMED_WAIT (fixed countdown, not polled)
        let phase_start = Instant::now();
        log::info!(
            "[MISSION] Trigger fired. Waiting {}s...",
            cfg.post_trigger_wait.as_secs()
        );
        let completed = self.sleep_unless_aborted(cfg.post_trigger_wait);
        phases.push((PHASE_TIMED_WAIT.to_string(), phase_start.elapsed()));
        if !completed {
            return Ok(finish(
                MissionOutcome::AbortedByUser,
                "User interrupted",
                phases,
                errors,
            ));
        }

        // Phase: END_SEQUENCE (best-effort teardown)
        let phase_start = Instant::now();
        self.end_sequence(&mut errors);
        phases.push((PHASE_END_SEQUENCE.to_string(), phase_start.elapsed()));
        if self.abort.is_cancelled() {
            return Ok(finish(
                MissionOutcome::AbortedByUser,
                "User interrupted",
                phases,
                errors,
            ));
        }

        log::info!("[MISSION] Round complete");
        Ok(finish(
            MissionOutcome::Success,
            "Round completed",
            phases,
            errors,
        ))
    }

    /// Poll the classifier until the primary state is the configured
    /// running state. `None` means proceed to the next phase.
    fn wait_for_running(
        &self,
        deadline: Instant,
        errors: &mut Vec<String>,
    ) -> PilotResult<Option<MissionOutcome>> {
        let cfg = &self.config;
        let end_by = Instant::now() + cfg.timeout_running;
        while Instant::now() < end_by && Instant::now() < deadline {
            if self.abort.is_cancelled() {
                return Ok(Some(MissionOutcome::AbortedByUser));
            }
            if let Some(screen) = self.capture(errors) {
                let frame = self.detector.classify_frame(&screen)?;
                if frame.is_state(&cfg.running_state) {
                    log::info!("[MISSION] Game is in {} state", cfg.running_state);
                    return Ok(None);
                }
                log::debug!(
                    "[MISSION] Waiting for {} (saw {})",
                    cfg.running_state,
                    frame.state
                );
            }
            if !self.sleep_unless_aborted(cfg.poll_running_interval) {
                return Ok(Some(MissionOutcome::AbortedByUser));
            }
        }
        Ok(Some(MissionOutcome::TimeoutWaitingForRunning))
    }

    /// Poll for the floating trigger control, then tap it with
    /// verification.
    fn wait_for_trigger(
        &self,
        deadline: Instant,
        errors: &mut Vec<String>,
    ) -> PilotResult<Option<MissionOutcome>> {
        let cfg = &self.config;
        let end_by = Instant::now() + cfg.timeout_button;
        while Instant::now() < end_by && Instant::now() < deadline {
            if self.abort.is_cancelled() {
                return Ok(Some(MissionOutcome::AbortedByUser));
            }
            if let Some(screen) = self.capture(errors) {
                let buttons = self.detector.detect_floating_buttons(&screen)?;
                if buttons.iter().any(|b| b.name == cfg.trigger_button) {
                    log::info!("[MISSION] {} detected", cfg.trigger_button);
                    if self.tap_trigger_verified(errors)? {
                        return Ok(None);
                    }
                    // an interrupt mid-retry is an abort, not a UI failure
                    if self.abort.is_cancelled() {
                        return Ok(Some(MissionOutcome::AbortedByUser));
                    }
                    errors.push(format!("Verify failed for {}", cfg.trigger_button));
                    return Ok(Some(MissionOutcome::UiFlowFailure));
                }
                log::debug!("[MISSION] Waiting for {}...", cfg.trigger_button);
            }
            if !self.sleep_unless_aborted(cfg.poll_button_interval) {
                return Ok(Some(MissionOutcome::AbortedByUser));
            }
        }
        Ok(Some(MissionOutcome::TimeoutWaitingForButton))
    }

    /// Tap the trigger button and verify it disappeared, retrying up to
    /// the configured count. The tap goes straight to the device (not the
    /// queue) because verification re-captures immediately afterwards.
    fn tap_trigger_verified(&self, errors: &mut Vec<String>) -> PilotResult<bool> {
        let cfg = &self.config;
        for attempt in 0..=cfg.max_tap_retries {
            if let Some(screen) = self.capture(errors) {
                let buttons = self.detector.detect_floating_buttons(&screen)?;
                match buttons.iter().find(|b| b.name == cfg.trigger_button) {
                    Some(button) => {
                        if let Err(e) = self.device.tap(button.point.0, button.point.1) {
                            log::warn!("[MISSION] tap failed: {e}");
                            errors.push(format!("Tap failed for {}: {e}", cfg.trigger_button));
                        } else {
                            log::info!(
                                "TAP_FLOATING: {} at ({},{})",
                                cfg.trigger_button,
                                button.point.0,
                                button.point.1
                            );
                        }
                    }
                    // already gone before we tapped
                    None if !cfg.verify_tap => return Ok(true),
                    None => {}
                }
            }
            if !cfg.verify_tap {
                return Ok(true);
            }

            // Verify disappearance by re-detecting.
            if let Some(screen) = self.capture(errors) {
                let buttons = self.detector.detect_floating_buttons(&screen)?;
                if !buttons.iter().any(|b| b.name == cfg.trigger_button) {
                    return Ok(true);
                }
            }
            if attempt < cfg.max_tap_retries {
                log::warn!(
                    "[MISSION] '{}' still visible, retrying tap ({}/{})",
                    cfg.trigger_button,
                    attempt + 1,
                    cfg.max_tap_retries
                );
                if !self.sleep_unless_aborted(cfg.poll_button_interval) {
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }

    /// Best-effort UI teardown: open the menu if it is closed, then end
    /// the round, confirm, and retry. Every step's failure is caught and
    /// recorded; the round still counts as a success.
    fn end_sequence(&self, errors: &mut Vec<String>) {
        let cfg = &self.config;

        if let Some(screen) = self.capture(errors) {
            match self.detector.classify_frame(&screen) {
                Ok(frame) if !frame.has_overlay(&cfg.menu_overlay) => {
                    log::debug!("[MISSION] Menu is closed, opening it");
                    match self.clickmap.click_point(&cfg.toggle_menu_key) {
                        Some((x, y)) => self.dispatcher.submit(x, y, Some(&cfg.toggle_menu_key)),
                        None => {
                            let msg =
                                format!("No coordinates for '{}'", cfg.toggle_menu_key);
                            log::warn!("[MISSION] {msg}");
                            errors.push(msg);
                        }
                    }
                    self.sleep_unless_aborted(cfg.post_tap_settle);
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("[MISSION] classification failed in teardown: {e}");
                    errors.push(format!("Teardown classification failed: {e}"));
                }
            }
        }

        let errors_before = errors.len();
        for key in [&cfg.end_round_key, &cfg.confirm_key] {
            self.tap_label_best_effort(key, errors);
            if !self.sleep_unless_aborted(cfg.post_tap_settle) {
                return;
            }
        }

        // A teardown that could not complete leaves the UI in an unknown
        // place; park the session for the operator instead of tapping on.
        if errors.len() > errors_before {
            log::warn!("[MISSION] Teardown incomplete; switching exec mode to WAIT");
            self.control.set_mode(ExecMode::Wait);
        }

        // The exec mode decides what happens on the game-over screen: in
        // retry mode the next round is started, otherwise the session
        // parks there for the operator.
        match self.control.mode() {
            ExecMode::Retry => self.tap_label_best_effort(&cfg.retry_key, errors),
            mode => log::info!("[MISSION] exec mode {mode}; leaving game-over screen untouched"),
        }
    }

    fn tap_label_best_effort(&self, key: &str, errors: &mut Vec<String>) {
        let Some(screen) = self.capture(errors) else {
            errors.push(format!("No screenshot for '{key}'"));
            return;
        };
        match self.detector.locate(&screen, key) {
            Ok(Some((x, y))) => {
                log::info!("TAP_LABEL: {key} at ({x},{y})");
                if let Err(e) = self.device.tap(x, y) {
                    let msg = format!("Failed to tap {key}: {e}");
                    log::warn!("[MISSION] {msg}");
                    errors.push(msg);
                }
            }
            Ok(None) => {
                let msg = format!("'{key}' not visible");
                log::warn!("[MISSION] {msg}");
                errors.push(msg);
            }
            Err(e) => {
                let msg = format!("Failed to locate {key}: {e}");
                log::warn!("[MISSION] {msg}");
                errors.push(msg);
            }
        }
    }

    /// Capture a frame; transient capture failures are recorded as
    /// non-fatal errors and the caller polls again.
    fn capture(&self, errors: &mut Vec<String>) -> Option<GrayImage> {
        match self.device.capture_screenshot() {
            Ok(screen) => Some(screen),
            Err(e) => {
                log::warn!("[MISSION] screenshot failed: {e}");
                if errors.len() < 32 {
                    errors.push(format!("Screenshot failed: {e}"));
                }
                None
            }
        }
    }

    /// Sleep in short slices, checking the abort token. Returns false if
    /// aborted before the full duration elapsed.
    fn sleep_unless_aborted(&self, duration: Duration) -> bool {
        let end_by = Instant::now() + duration;
        loop {
            if self.abort.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= end_by {
                return true;
            }
            std::thread::sleep((end_by - now).min(Duration::from_millis(100)));
        }
    }

    /// Repeat rounds until a stop condition holds, aggregating outcomes.
    pub fn run_campaign(
        &self,
        campaign: &CampaignConfig,
        progress_probe: Option<&ProgressProbe>,
        until: Option<&UntilPredicate>,
    ) -> PilotResult<CampaignResult> {
        let started = Instant::now();
        let mut result = CampaignResult::default();

        let stopfile_present = || -> bool {
            campaign
                .stopfile
                .as_deref()
                .is_some_and(|path| path.exists())
        };

        loop {
            if let Some(max) = campaign.max_duration
                && started.elapsed() >= max
            {
                log::info!("[CAMPAIGN] Max duration reached");
                break;
            }
            if let Some(max) = campaign.max_runs
                && result.runs >= max
            {
                log::info!("[CAMPAIGN] Max runs reached");
                break;
            }
            if stopfile_present() {
                log::info!("[CAMPAIGN] Stopfile detected");
                break;
            }
            if self.abort.is_cancelled() {
                result.aborted = true;
                break;
            }

            let round = self.run_round()?;
            result.runs += 1;
            match round.outcome {
                MissionOutcome::Success => result.successes += 1,
                MissionOutcome::TimeoutWaitingForRunning => result.timeouts_running += 1,
                MissionOutcome::TimeoutWaitingForButton => result.timeouts_button += 1,
                MissionOutcome::UiFlowFailure => result.ui_failures += 1,
                MissionOutcome::AbortedByUser => {
                    result.aborted = true;
                    result.last_result = Some(round);
                    break;
                }
            }
            log::info!(
                "[CAMPAIGN] Round {} ended: {:?} in {:.1}s",
                result.runs,
                round.outcome,
                round.elapsed.as_secs_f64()
            );
            result.last_result = Some(round);

            if let Some(probe) = progress_probe {
                let screen = self.device.capture_screenshot().ok();
                match probe(screen.as_ref()) {
                    Ok(progress) => {
                        let done = until.is_some_and(|until| until(&progress));
                        result.progress = Some(progress);
                        if done {
                            log::info!("[CAMPAIGN] Until-condition satisfied");
                            break;
                        }
                    }
                    Err(e) => log::warn!("[CAMPAIGN] progress probe error: {e}"),
                }
            }

            if !campaign.sleep_between_runs.is_zero()
                && !self.sleep_unless_aborted(campaign.sleep_between_runs)
            {
                result.aborted = true;
                break;
            }
            if stopfile_present() {
                log::info!("[CAMPAIGN] Stopfile detected");
                break;
            }
        }

        result.total_elapsed = started.elapsed();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::MockDevice;
    use crate::state::{FloatingButton, FrameClassification};
    use serde_json::json;
    use std::sync::Mutex;

    /// Scriptable perception stub: fixed primary state, a queue of
    /// floating-button responses (last one repeats).
    struct StubDetector {
        state: String,
        overlays: Vec<String>,
        button_script: Mutex<Vec<Vec<FloatingButton>>>,
    }

    impl StubDetector {
        fn with_state(state: &str) -> Self {
            Self {
                state: state.to_string(),
                overlays: Vec::new(),
                button_script: Mutex::new(vec![Vec::new()]),
            }
        }

        fn with_buttons(state: &str, script: Vec<Vec<FloatingButton>>) -> Self {
            Self {
                state: state.to_string(),
                overlays: Vec::new(),
                button_script: Mutex::new(script),
            }
        }
    }

    impl Detector for StubDetector {
        fn classify_frame(&self, _screen: &GrayImage) -> PilotResult<FrameClassification> {
            let mut frame = FrameClassification::unknown();
            frame.state = self.state.clone();
            frame.overlays = self.overlays.iter().cloned().collect();
            Ok(frame)
        }

        fn detect_floating_buttons(&self, _screen: &GrayImage) -> PilotResult<Vec<FloatingButton>> {
            let mut script = self.button_script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }

        fn locate(&self, _screen: &GrayImage, _key: &str) -> PilotResult<Option<(u32, u32)>> {
            Ok(None)
        }
    }

    fn trigger() -> FloatingButton {
        FloatingButton {
            name: "floating_buttons.nuke".to_string(),
            point: (500, 900),
            confidence: 0.97,
        }
    }

    fn fast_config() -> MissionConfig {
        MissionConfig {
            poll_running_interval: Duration::from_millis(10),
            poll_button_interval: Duration::from_millis(10),
            post_trigger_wait: Duration::from_millis(30),
            timeout_running: Duration::from_millis(150),
            timeout_button: Duration::from_millis(150),
            overall_deadline: Duration::from_secs(5),
            max_tap_retries: 2,
            post_tap_settle: Duration::from_millis(1),
            ..MissionConfig::default()
        }
    }

    fn orchestrator(
        detector: StubDetector,
        config: MissionConfig,
    ) -> (MissionOrchestrator, Arc<MockDevice>, Arc<SharedControl>) {
        let device = Arc::new(MockDevice::default());
        device.set_screenshot(GrayImage::from_pixel(4, 4, image::Luma([100])));
        let clickmap = Arc::new(Clickmap::from_value(json!({
            "overlays": {"toggle_menu": {"tap": {"x": 50, "y": 60}}}
        })));
        let dispatcher = Arc::new(InputDispatcher::start(device.clone()));
        let control = Arc::new(SharedControl::new());
        let orchestrator = MissionOrchestrator::new(
            config,
            device.clone(),
            Arc::new(detector),
            clickmap,
            dispatcher,
            control.clone(),
            CancelToken::new(),
        );
        (orchestrator, device, control)
    }

    #[test]
    fn never_running_times_out_without_later_phases() {
        let config = fast_config();
        let timeout = config.timeout_running;
        let (orchestrator, _device, _control) = orchestrator(StubDetector::with_state("HOME_SCREEN"), config);

        let started = Instant::now();
        let result = orchestrator.run_round().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.outcome, MissionOutcome::TimeoutWaitingForRunning);
        assert!(
            elapsed < timeout + Duration::from_millis(150),
            "took {elapsed:?}"
        );
        assert!(result.phase_duration(PHASE_WAIT_RUNNING).is_some());
        assert!(result.phase_duration(PHASE_WAIT_TRIGGER).is_none());
        assert!(result.phase_duration(PHASE_TIMED_WAIT).is_none());
        assert!(result.phase_duration(PHASE_END_SEQUENCE).is_none());
    }

    #[test]
    fn trigger_never_appearing_times_out_with_button_outcome() {
        let (orchestrator, _device, _control) =
            orchestrator(StubDetector::with_state("RUNNING"), fast_config());
        let result = orchestrator.run_round().unwrap();
        assert_eq!(result.outcome, MissionOutcome::TimeoutWaitingForButton);
    }

    #[test]
    fn trigger_that_never_disappears_exhausts_retries() {
        let detector =
            StubDetector::with_buttons("RUNNING", vec![vec![trigger()]]);
        let (orchestrator, device, _control) = orchestrator(detector, fast_config());
        let result = orchestrator.run_round().unwrap();

        assert_eq!(result.outcome, MissionOutcome::UiFlowFailure);
        assert!(!result.errors.is_empty());
        // initial attempt + max_tap_retries retries, all at the match point
        assert_eq!(device.taps(), vec![(500, 900); 3]);
    }

    #[test]
    fn verified_tap_success_reaches_end_sequence() {
        // visible for the poll and the tap attempt, then gone
        let detector = StubDetector::with_buttons(
            "RUNNING",
            vec![vec![trigger()], vec![trigger()], Vec::new()],
        );
        let (orchestrator, device, _control) = orchestrator(detector, fast_config());
        let result = orchestrator.run_round().unwrap();

        assert_eq!(result.outcome, MissionOutcome::Success);
        assert!(result.phase_duration(PHASE_TIMED_WAIT).is_some());
        assert!(result.phase_duration(PHASE_END_SEQUENCE).is_some());
        // teardown labels were not visible; recorded as non-fatal errors
        assert!(!result.errors.is_empty());
        // the verified trigger tap went straight to the device
        assert!(device.taps().contains(&(500, 900)));
    }

    #[test]
    fn abort_token_short_circuits_with_aborted_outcome() {
        let config = fast_config();
        let (orchestrator, _device, _control) = orchestrator(StubDetector::with_state("HOME_SCREEN"), config);
        orchestrator.abort_token().cancel();
        let result = orchestrator.run_round().unwrap();
        assert_eq!(result.outcome, MissionOutcome::AbortedByUser);
    }

    #[test]
    fn abort_during_tap_verification_reports_user_abort() {
        // trigger stays visible forever; the interrupt lands during the
        // verification retry pause, not between polls
        let detector = StubDetector::with_buttons("RUNNING", vec![vec![trigger()]]);
        let mut config = fast_config();
        config.poll_button_interval = Duration::from_millis(500);
        config.timeout_button = Duration::from_secs(5);
        let (orchestrator, _device, control) = orchestrator(detector, config);

        let token = orchestrator.abort_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            token.cancel();
        });
        let result = orchestrator.run_round().unwrap();
        canceller.join().unwrap();

        assert_eq!(result.outcome, MissionOutcome::AbortedByUser);
        // an interrupted round parks the session for the operator
        assert_eq!(control.mode(), ExecMode::Wait);
    }

    #[test]
    fn failed_teardown_parks_session_in_wait_mode() {
        let detector = StubDetector::with_buttons(
            "RUNNING",
            vec![vec![trigger()], vec![trigger()], Vec::new()],
        );
        let (orchestrator, _device, control) = orchestrator(detector, fast_config());
        assert_eq!(control.mode(), ExecMode::Retry);

        let result = orchestrator.run_round().unwrap();

        assert_eq!(result.outcome, MissionOutcome::Success);
        // the teardown labels were never found; the session must hold
        // instead of tapping the retry button
        assert!(!result.errors.is_empty());
        assert_eq!(control.mode(), ExecMode::Wait);
    }

    #[test]
    fn campaign_runs_exactly_max_runs() {
        let (orchestrator, _device, _control) =
            orchestrator(StubDetector::with_state("HOME_SCREEN"), fast_config());
        let campaign = CampaignConfig {
            max_runs: Some(3),
            sleep_between_runs: Duration::from_millis(1),
            ..CampaignConfig::default()
        };
        let result = orchestrator.run_campaign(&campaign, None, None).unwrap();
        assert_eq!(result.runs, 3);
        assert_eq!(result.successes, 0);
        assert_eq!(result.timeouts_running, 3);
        assert!(!result.aborted);
        assert!(result.last_result.is_some());
    }

    #[test]
    fn campaign_stops_before_first_round_when_stopfile_exists() {
        let dir = tempfile::tempdir().unwrap();
        let stopfile = dir.path().join("stop");
        std::fs::write(&stopfile, b"").unwrap();

        let (orchestrator, _device, _control) =
            orchestrator(StubDetector::with_state("HOME_SCREEN"), fast_config());
        let campaign = CampaignConfig {
            stopfile: Some(stopfile),
            ..CampaignConfig::default()
        };
        let result = orchestrator.run_campaign(&campaign, None, None).unwrap();
        assert_eq!(result.runs, 0);
        assert!(result.last_result.is_none());
    }

    #[test]
    fn campaign_until_predicate_stops_after_progress() {
        let detector = StubDetector::with_buttons(
            "RUNNING",
            vec![vec![trigger()], vec![trigger()], Vec::new()],
        );
        let mut config = fast_config();
        config.post_trigger_wait = Duration::from_millis(1);
        let (orchestrator, _device, _control) = orchestrator(detector, config);

        let probe = |_screen: Option<&GrayImage>| -> PilotResult<serde_json::Value> {
            Ok(json!({"wave": 42}))
        };
        let until = |progress: &serde_json::Value| progress["wave"] == 42;
        let campaign = CampaignConfig {
            max_runs: Some(10),
            ..CampaignConfig::default()
        };
        let result = orchestrator
            .run_campaign(&campaign, Some(&probe), Some(&until))
            .unwrap();
        assert_eq!(result.runs, 1);
        assert_eq!(result.progress, Some(json!({"wave": 42})));
    }
}
