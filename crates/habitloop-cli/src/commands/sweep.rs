//! Freeze sweep commands for CLI.

use clap::Subcommand;
use habitloop_core::notify::{LogNotifier, Notifier, TelegramNotifier};
use habitloop_core::storage::{Config, HabitDb};
use habitloop_core::sweep::{FreezeScheduler, FreezeSweeper};
use habitloop_core::SystemClock;

#[derive(Subcommand)]
pub enum SweepAction {
    /// Run a single sweep tick now and print the report
    Run,
    /// Run the minute-beat sweep loop until Ctrl-C
    Start,
}

pub fn run(action: SweepAction) -> Result<(), Box<dyn std::error::Error>> {
    let sweeper = build_sweeper()?;
    let rt = tokio::runtime::Runtime::new()?;

    match action {
        SweepAction::Run => {
            let report =
                rt.block_on(async move { tokio::task::spawn_blocking(move || sweeper.tick()).await })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SweepAction::Start => {
            rt.block_on(async {
                let scheduler = FreezeScheduler::start(sweeper);
                println!("Sweep running, Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                scheduler.stop().await;
                Ok::<_, std::io::Error>(())
            })?;
            println!("Sweep stopped");
        }
    }
    Ok(())
}

fn build_sweeper() -> Result<FreezeSweeper<SystemClock, Box<dyn Notifier>>, Box<dyn std::error::Error>> {
    let db = HabitDb::open()?;
    let config = Config::load()?;
    let notifier: Box<dyn Notifier> = match config.telegram.resolved_token() {
        Some(token) if config.notifications_enabled => Box::new(TelegramNotifier::new(token)),
        _ => Box::new(LogNotifier),
    };
    Ok(FreezeSweeper::new(db, SystemClock, notifier))
}
