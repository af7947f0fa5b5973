//! sms.ir SMS channel
//!
//! Second `sms` vendor next to Kavenegar so a failed SMS can fail over to
//! another gateway. Bulk send, per-message delivery reports and credit checks.

pub mod channel;
pub mod client;
pub mod types;

pub use channel::{SmsirChannel, SmsirConfig};
pub use client::SmsirClient;
