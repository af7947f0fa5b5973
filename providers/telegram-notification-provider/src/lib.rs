pub mod channel;
pub mod formatter;
pub mod telegram_client;
pub mod types;

pub use channel::{TelegramChannel, TelegramConfig};
pub use telegram_client::TelegramClient;
