pub mod config;
pub mod freeze;
pub mod habit;
pub mod sweep;
pub mod user;
