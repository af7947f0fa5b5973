//! Core types for the notification system
//!
//! Channel capability flags, alert and delivery states, and the structures
//! exchanged across the [`crate::NotificationChannel`] seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::provider_base::ProviderError;

/// Capability flag identifying the medium a channel delivers through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFlag {
    Sms,
    Mail,
    Telegram,
    Mattermost,
}

impl ChannelFlag {
    pub const ALL: [ChannelFlag; 4] = [
        ChannelFlag::Sms,
        ChannelFlag::Mail,
        ChannelFlag::Telegram,
        ChannelFlag::Mattermost,
    ];

    /// Get flag as the lowercase string stored alongside providers and alerts
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFlag::Sms => "sms",
            ChannelFlag::Mail => "mail",
            ChannelFlag::Telegram => "telegram",
            ChannelFlag::Mattermost => "mattermost",
        }
    }

    /// Name of the per-member contact field this flag delivers to
    pub fn contact_field(&self) -> &'static str {
        match self {
            ChannelFlag::Sms => "mobile",
            ChannelFlag::Mail => "email",
            ChannelFlag::Telegram => "telegram_id",
            ChannelFlag::Mattermost => "mattermost_id",
        }
    }
}

impl std::fmt::Display for ChannelFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel flag: {0}")]
pub struct UnknownFlag(pub String);

impl FromStr for ChannelFlag {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(ChannelFlag::Sms),
            "mail" | "email" => Ok(ChannelFlag::Mail),
            "telegram" => Ok(ChannelFlag::Telegram),
            "mattermost" => Ok(ChannelFlag::Mattermost),
            _ => Err(UnknownFlag(s.to_string())),
        }
    }
}

/// Alert condition state as reported by the alerting source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    Resolved,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Firing => "firing",
            AlertState::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firing" => Ok(AlertState::Firing),
            "resolved" => Ok(AlertState::Resolved),
            other => Err(format!("unknown alert state: {}", other)),
        }
    }
}

/// Delivery state reported by a channel for a previously sent message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Accepted by the vendor, final outcome not known yet
    Pending,
    Delivered,
    /// Hard failure; the vendor will not deliver this message
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Pending)
    }
}

/// A message handed to a channel for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
    /// Alert state, when the message is rendered from an alert
    pub state: Option<AlertState>,
    pub time: Option<DateTime<Utc>>,
    /// Channel-specific addresses (phone numbers, chat ids, ...)
    pub receptors: Vec<String>,
}

impl OutboundMessage {
    /// Plain-text resend of an already rendered message to a single address
    pub fn resend(text: impl Into<String>, receptor: impl Into<String>) -> Self {
        Self {
            subject: String::new(),
            body: text.into(),
            state: None,
            time: None,
            receptors: vec![receptor.into()],
        }
    }

    /// Plain-text rendering for media without markup (SMS)
    pub fn plain_text(&self) -> String {
        match self.state {
            Some(state) if !self.subject.is_empty() => format!(
                "[{}] {}\n{}",
                state.as_str().to_ascii_uppercase(),
                self.subject,
                self.body
            ),
            _ => self.body.clone(),
        }
    }
}

/// Outcome of delivering to one address in a multi-recipient send
#[derive(Debug)]
pub struct RecipientOutcome {
    pub address: String,
    /// Vendor delivery reference on success
    pub result: Result<String, ProviderError>,
}

impl RecipientOutcome {
    pub fn delivered(address: impl Into<String>, delivery_ref: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            result: Ok(delivery_ref.into()),
        }
    }

    pub fn failed(address: impl Into<String>, error: ProviderError) -> Self {
        Self {
            address: address.into(),
            result: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_accepts_known_aliases() {
        assert_eq!("SMS".parse::<ChannelFlag>().unwrap(), ChannelFlag::Sms);
        assert_eq!("email".parse::<ChannelFlag>().unwrap(), ChannelFlag::Mail);
        assert_eq!(
            " telegram ".parse::<ChannelFlag>().unwrap(),
            ChannelFlag::Telegram
        );
        assert_eq!(
            "fax".parse::<ChannelFlag>(),
            Err(UnknownFlag("fax".to_string()))
        );
    }

    #[test]
    fn flag_serializes_lowercase() {
        let json = serde_json::to_string(&ChannelFlag::Mattermost).unwrap();
        assert_eq!(json, "\"mattermost\"");
        assert_eq!(ChannelFlag::Sms.to_string(), "sms");
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!DeliveryState::Pending.is_terminal());
        assert!(DeliveryState::Delivered.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
    }

    #[test]
    fn resend_targets_single_address() {
        let msg = OutboundMessage::resend("firing:disk:full", "09120000000");
        assert_eq!(msg.receptors, vec!["09120000000".to_string()]);
        assert!(msg.state.is_none());
        assert!(msg.subject.is_empty());
        assert_eq!(msg.plain_text(), "firing:disk:full");
    }

    #[test]
    fn plain_text_prefixes_state_and_subject() {
        let msg = OutboundMessage {
            subject: "DiskFull".to_string(),
            body: "95% used".to_string(),
            state: Some(AlertState::Resolved),
            time: None,
            receptors: vec![],
        };
        assert_eq!(msg.plain_text(), "[RESOLVED] DiskFull\n95% used");
    }
}
