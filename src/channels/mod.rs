//! Messaging gateway adapters.

pub mod channel;
pub mod cli;
pub mod telegram;
pub mod webhook;

pub use channel::*;
pub use cli::CliChannel;
pub use telegram::TelegramChannel;
