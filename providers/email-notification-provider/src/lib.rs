//! Email channel
//!
//! Implements the `mail` capability on top of the Resend API. Each recipient
//! gets its own email so addresses are never disclosed to each other.

pub mod channel;
pub mod client;
pub mod formatter;

pub use channel::{ResendChannel, ResendConfig};
pub use client::ResendClient;
