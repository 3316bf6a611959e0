use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Args {
    pub clickmap_path: PathBuf,
    pub states_path: PathBuf,
    pub assets_dir: PathBuf,
    pub serial: Option<String>,
    pub package: Option<String>,
    pub max_runs: Option<u32>,
    pub max_minutes: Option<u64>,
    pub stopfile: Option<PathBuf>,
    pub trigger: Option<String>,
    pub watchdog: bool,
    pub debug_mode: bool,
}

impl Args {
    pub fn parse() -> Option<Self> {
        let args: Vec<String> = env::args().collect();

        let mut clickmap_path = PathBuf::from("clickmap.json");
        let mut states_path = PathBuf::from("states.json");
        let mut assets_dir = PathBuf::from("assets/match_templates");
        let mut serial: Option<String> = None;
        let mut package: Option<String> = None;
        let mut max_runs: Option<u32> = None;
        let mut max_minutes: Option<u64> = None;
        let mut stopfile: Option<PathBuf> = None;
        let mut trigger: Option<String> = None;
        let mut watchdog = true;
        let mut debug_mode = false;

        for arg in args.iter().skip(1) {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "tower-pilot v{} (build {})",
                    env!("PILOT_VERSION_DISPLAY"),
                    env!("PILOT_BUILD_YEAR")
                );
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--no-watchdog" {
                watchdog = false;
            } else if let Some(val) = arg.strip_prefix("--config=") {
                clickmap_path = PathBuf::from(val);
            } else if let Some(val) = arg.strip_prefix("--states=") {
                states_path = PathBuf::from(val);
            } else if let Some(val) = arg.strip_prefix("--assets=") {
                assets_dir = PathBuf::from(val);
            } else if let Some(val) = arg.strip_prefix("--serial=") {
                serial = Some(val.to_string());
            } else if let Some(val) = arg.strip_prefix("--package=") {
                package = Some(val.to_string());
            } else if let Some(val) = arg.strip_prefix("--runs=") {
                match val.parse::<u32>() {
                    Ok(n) => max_runs = Some(n),
                    Err(_) => {
                        eprintln!("❌ Invalid runs value: {}", val);
                        return None;
                    }
                }
            } else if let Some(val) = arg.strip_prefix("--max-minutes=") {
                match val.parse::<u64>() {
                    Ok(n) => max_minutes = Some(n),
                    Err(_) => {
                        eprintln!("❌ Invalid max-minutes value: {}", val);
                        return None;
                    }
                }
            } else if let Some(val) = arg.strip_prefix("--stopfile=") {
                stopfile = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--trigger=") {
                trigger = Some(val.to_string());
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        Some(Args {
            clickmap_path,
            states_path,
            assets_dir,
            serial,
            package,
            max_runs,
            max_minutes,
            stopfile,
            trigger,
            watchdog,
            debug_mode,
        })
    }
}

fn print_help() {
    println!("🗼 Tower Pilot: unattended game automation over ADB");
    println!();
    println!("USAGE:");
    println!("    tower-pilot [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    --config=PATH       Clickmap JSON file (default: clickmap.json)");
    println!("    --states=PATH       State definitions JSON file (default: states.json)");
    println!("    --assets=DIR        Template image directory (default: assets/match_templates)");
    println!("    --serial=SERIAL     ADB device serial for multi-device setups");
    println!("    --package=PKG       Game package name supervised by the watchdog");
    println!("    --runs=N            Stop the campaign after N rounds");
    println!("    --max-minutes=N     Stop the campaign after N minutes");
    println!("    --stopfile=PATH     Stop the campaign once this file exists");
    println!("    --trigger=KEY       Clickmap key of the floating trigger button");
    println!("    --no-watchdog       Do not supervise/restart the game process");
    println!("    --debug             Enable debug logging");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    tower-pilot --runs=10");
    println!("    tower-pilot --config=my-map.json --max-minutes=120 --stopfile=/tmp/stop");
    println!("    tower-pilot --serial=emulator-5554 --no-watchdog --debug");
}
