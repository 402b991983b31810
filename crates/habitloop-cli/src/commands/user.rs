//! User management commands for CLI.

use clap::Subcommand;
use habitloop_core::habit::{format_tier, SubscriptionTier, User};
use habitloop_core::storage::HabitDb;

#[derive(Subcommand)]
pub enum UserAction {
    /// Create a new user
    Create {
        /// User ID
        id: String,
        /// IANA timezone (default: UTC)
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Subscription tier: free, basic or premium (default: free)
        #[arg(long, default_value = "free")]
        tier: String,
        /// Telegram chat ID for notifications
        #[arg(long)]
        telegram_id: Option<i64>,
    },
    /// List users
    List,
    /// Get user details
    Get {
        /// User ID
        id: String,
    },
    /// Change a user's timezone
    SetTimezone {
        /// User ID
        id: String,
        /// IANA timezone
        timezone: String,
    },
    /// Change a user's subscription tier
    SetTier {
        /// User ID
        id: String,
        /// Tier: free, basic or premium
        tier: String,
    },
    /// Link a Telegram chat for notifications
    LinkTelegram {
        /// User ID
        id: String,
        /// Telegram chat ID
        telegram_id: i64,
    },
}

pub fn run(action: UserAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = HabitDb::open()?;

    match action {
        UserAction::Create { id, timezone, tier, telegram_id } => {
            let mut user = User::new(id, timezone);
            user.tier = parse_tier_arg(&tier)?;
            user.telegram_id = telegram_id;
            db.insert_user(&user)?;
            println!("User created: {}", user.id);
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserAction::List => {
            let users = db.list_users()?;
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        UserAction::Get { id } => match db.get_user(&id)? {
            Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
            None => println!("User not found: {id}"),
        },
        UserAction::SetTimezone { id, timezone } => {
            if db.update_user_timezone(&id, &timezone)? {
                println!("Timezone updated: {id} -> {timezone}");
            } else {
                println!("User not found: {id}");
            }
        }
        UserAction::SetTier { id, tier } => {
            let tier = parse_tier_arg(&tier)?;
            if db.update_user_tier(&id, tier)? {
                println!("Tier updated: {id} -> {}", format_tier(tier));
            } else {
                println!("User not found: {id}");
            }
        }
        UserAction::LinkTelegram { id, telegram_id } => {
            if db.set_user_telegram(&id, telegram_id)? {
                println!("Telegram linked: {id} -> {telegram_id}");
            } else {
                println!("User not found: {id}");
            }
        }
    }
    Ok(())
}

/// Strict tier parsing for command input. Unlike the lenient storage-side
/// parse, a typo here must fail instead of silently downgrading to free.
fn parse_tier_arg(s: &str) -> Result<SubscriptionTier, Box<dyn std::error::Error>> {
    match s {
        "free" => Ok(SubscriptionTier::Free),
        "basic" => Ok(SubscriptionTier::Basic),
        "premium" => Ok(SubscriptionTier::Premium),
        other => Err(format!("Unknown tier: {other} (expected free, basic or premium)").into()),
    }
}
