//! Freeze quota commands for CLI.

use chrono::Utc;
use clap::Subcommand;
use habitloop_core::freeze::freeze_info;
use habitloop_core::storage::HabitDb;
use habitloop_core::tz::{local_today, resolve};

#[derive(Subcommand)]
pub enum FreezeAction {
    /// Show a user's freeze quota for the current month
    Info {
        /// User ID
        user_id: String,
    },
}

pub fn run(action: FreezeAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = HabitDb::open()?;

    match action {
        FreezeAction::Info { user_id } => {
            let user = db
                .get_user(&user_id)?
                .ok_or(format!("User not found: {user_id}"))?;
            let today = local_today(resolve(&user.timezone), Utc::now());
            let info = freeze_info(&db, &user, today)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }
    Ok(())
}
