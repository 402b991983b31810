//! Configuration management commands for CLI.

use clap::Subcommand;
use habitloop_core::storage::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the current configuration
    Show,
    /// Set the Telegram bot token
    SetToken {
        /// Bot token from BotFather
        token: String,
    },
    /// Enable or disable notification delivery
    SetNotifications {
        /// true or false
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            // The token itself is redacted from display.
            println!("notifications_enabled = {}", config.notifications_enabled);
            println!(
                "telegram.bot_token = {}",
                if config.telegram.resolved_token().is_some() { "<set>" } else { "<unset>" }
            );
        }
        ConfigAction::SetToken { token } => {
            let mut config = Config::load()?;
            config.telegram.bot_token = Some(token);
            config.save()?;
            println!("Telegram bot token saved");
        }
        ConfigAction::SetNotifications { enabled } => {
            let mut config = Config::load()?;
            config.notifications_enabled = enabled;
            config.save()?;
            println!("Notifications enabled: {enabled}");
        }
    }
    Ok(())
}
