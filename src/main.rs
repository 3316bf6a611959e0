use std::sync::Arc;
use std::time::Duration;

use tower_pilot::args::Args;
use tower_pilot::state::Detector;
use tower_pilot::watchdog::{Watchdog, WatchdogConfig};
use tower_pilot::{
    AdbShellDevice, CampaignConfig, CancelToken, Clickmap, DetectorRegistry, DeviceControl,
    InputDispatcher, MissionConfig, MissionOrchestrator, PilotResult, RegionMatcher,
    SharedControl, StateClassifier,
};

fn main() {
    let Some(args) = Args::parse() else {
        return;
    };

    let level = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> PilotResult<()> {
    let clickmap = Arc::new(Clickmap::load(&args.clickmap_path)?);
    let definitions = StateClassifier::load_definitions(&args.states_path)?;
    let matcher = RegionMatcher::new(&args.assets_dir);
    let detector: Arc<dyn Detector> = Arc::new(StateClassifier::new(
        definitions,
        clickmap.clone(),
        matcher,
        DetectorRegistry::new(),
    )?);

    let device: Arc<dyn DeviceControl> = Arc::new(AdbShellDevice::new(args.serial.clone()));
    let dispatcher = Arc::new(InputDispatcher::start(device.clone()));
    let control = Arc::new(SharedControl::new());

    let watchdog = if args.watchdog {
        let mut config = WatchdogConfig::default();
        if let Some(package) = &args.package {
            config.package = package.clone();
        }
        log::info!("🐶 Watchdog enabled for {}", config.package);
        Some(Watchdog::new(config, device.clone(), control.clone(), CancelToken::new()).spawn())
    } else {
        None
    };

    let mut mission = MissionConfig::default();
    if let Some(trigger) = &args.trigger {
        mission.trigger_button = trigger.clone();
    }

    let orchestrator = MissionOrchestrator::new(
        mission,
        device,
        detector,
        clickmap,
        dispatcher.clone(),
        control,
        CancelToken::new(),
    );

    let campaign = CampaignConfig {
        max_runs: args.max_runs,
        max_duration: args.max_minutes.map(|m| Duration::from_secs(m * 60)),
        sleep_between_runs: Duration::from_secs(5),
        stopfile: args.stopfile.clone(),
    };

    let result = orchestrator.run_campaign(&campaign, None, None)?;

    println!("🏁 Campaign finished in {:.1} minutes", result.total_elapsed.as_secs_f64() / 60.0);
    println!(
        "   {} rounds: {} ok, {} running-timeouts, {} button-timeouts, {} ui-failures{}",
        result.runs,
        result.successes,
        result.timeouts_running,
        result.timeouts_button,
        result.ui_failures,
        if result.aborted { " (aborted)" } else { "" },
    );
    if let Some(last) = &result.last_result {
        log::info!("Last round: {:?} ({})", last.outcome, last.details);
    }

    if let Some(watchdog) = watchdog {
        watchdog.stop();
    }
    dispatcher.stop();
    Ok(())
}
