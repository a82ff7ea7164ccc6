use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Args {
    pub config_path: PathBuf,
    pub state_dir: Option<PathBuf>,
    pub debug_mode: bool,
    pub dry_run: bool,
}

impl Args {
    /// Parse the process arguments. `None` means the process should exit
    /// (help or version was printed, or an argument was rejected).
    pub fn parse() -> Option<Self> {
        Self::parse_from(env::args().skip(1))
    }

    pub fn parse_from(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut config_path = PathBuf::from("config.json");
        let mut state_dir = None;
        let mut debug_mode = false;
        let mut dry_run = false;

        for arg in args {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!("Android ADB Scheduler {}", env!("APP_VERSION_DISPLAY"));
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--dry-run" {
                dry_run = true;
            } else if let Some(val) = arg.strip_prefix("--config=") {
                if val.is_empty() {
                    eprintln!("❌ --config needs a path");
                    return None;
                }
                config_path = PathBuf::from(val);
            } else if let Some(val) = arg.strip_prefix("--state-dir=") {
                if val.is_empty() {
                    eprintln!("❌ --state-dir needs a directory");
                    return None;
                }
                state_dir = Some(PathBuf::from(val));
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        Some(Args {
            config_path,
            state_dir,
            debug_mode,
            dry_run,
        })
    }
}

fn print_help() {
    println!("🤖 Android ADB Scheduler");
    println!();
    println!("USAGE:");
    println!("    android-adb-scheduler [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    --config=<path>     Configuration file (default: config.json)");
    println!("    --state-dir=<dir>   Directory for the task queue and timer files");
    println!("    --debug             Enable debug logging");
    println!("    --dry-run           Log actions instead of driving a device");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    android-adb-scheduler --config=game.json");
    println!("    android-adb-scheduler --dry-run --debug");
}
