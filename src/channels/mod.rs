//! Chat platform adapters for letter intake and delivery.

pub mod telegram;

pub use telegram::TelegramChannel;
