//! Kavenegar SMS channel
//!
//! Implements the `sms` capability on top of the Kavenegar REST API: batch
//! send, delivery-status polling and account checks.

pub mod channel;
pub mod client;
pub mod types;

pub use channel::{KavenegarChannel, KavenegarConfig};
pub use client::KavenegarClient;
