mod args;

use android_adb_scheduler::app::App;
use android_adb_scheduler::config::AppConfig;
use android_adb_scheduler::error::AppError;
use android_adb_scheduler::screen::{AdbScreen, DryRunScreen, GameScreen};
use android_adb_scheduler::tasks::SystemClock;
use args::Args;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let Some(args) = Args::parse() else {
        return ExitCode::SUCCESS;
    };

    let default_level = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    log::info!("🚀 Android ADB Scheduler {}", env!("APP_VERSION_DISPLAY"));

    match run(args).await {
        Ok(()) => {
            log::info!("👋 Stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("❌ {}", e);
            log::logger().flush();
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let mut config = AppConfig::load(&args.config_path)?;
    if let Some(dir) = &args.state_dir {
        config.state = config.state.in_dir(dir);
    }

    if args.dry_run {
        log::info!("🧪 Dry run: no device actions are performed");
        return serve(config, Arc::new(DryRunScreen)).await;
    }
    let screen = AdbScreen::connect(&config.device, &config.ocr).await?;
    serve(config, Arc::new(screen)).await
}

async fn serve<S: GameScreen + 'static>(config: AppConfig, screen: Arc<S>) -> Result<(), AppError> {
    let app = App::build(config, screen, Arc::new(SystemClock))?;
    app.seed()?;
    app.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("❌ Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}
