//! Records handled by the dispatcher

use chrono::{DateTime, Utc};
use notification_common::{AlertState, ChannelFlag, NotificationChannel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// An alert raised by the monitoring source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub name: String,
    pub severity: String,
    pub description: String,
    pub status: AlertState,
    /// Capability flags eligible to carry this alert, in preference order
    pub method: Vec<String>,
    /// Receptor group names
    pub receptor: Vec<String>,
    /// Set once dispatch has been attempted
    pub send_notif: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Text stored on every message produced for this alert
    pub fn message_text(&self) -> String {
        format!("{}:{}:{}", self.status, self.name, self.description)
    }
}

/// Delivery state of a message record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Sent)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("unknown message status: {}", other)),
        }
    }
}

/// One delivery attempt to one address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub alert_id: Option<Uuid>,
    pub user_id: String,
    pub group_name: String,
    pub text: String,
    pub receptor: String,
    /// Vendor delivery reference; empty when the send failed
    pub sender_ref: String,
    /// Name of the provider that sent this message
    pub provider: String,
    pub status: MessageStatus,
    /// Status polls so far; never decreases
    pub attempt: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Providers used for this delivery so far, oldest first
    pub providers: Vec<String>,
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// A `Sent` record for `provider`, extending the given provider chain
    pub fn new(
        user_id: impl Into<String>,
        group_name: impl Into<String>,
        text: impl Into<String>,
        receptor: impl Into<String>,
        provider: impl Into<String>,
        mut chain: Vec<String>,
    ) -> Self {
        let provider = provider.into();
        if chain.last() != Some(&provider) {
            chain.push(provider.clone());
        }
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            alert_id: None,
            user_id: user_id.into(),
            group_name: group_name.into(),
            text: text.into(),
            receptor: receptor.into(),
            sender_ref: String::new(),
            provider,
            status: MessageStatus::Sent,
            attempt: 0,
            last_attempt: None,
            providers: chain,
            response: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_alert(mut self, alert_id: Uuid) -> Self {
        self.alert_id = Some(alert_id);
        self
    }

    pub fn with_sender_ref(mut self, sender_ref: impl Into<String>) -> Self {
        self.sender_ref = sender_ref.into();
        self
    }

    pub fn failed_with(mut self, response: impl Into<String>) -> Self {
        self.status = MessageStatus::Failed;
        self.response = response.into();
        self
    }

    pub fn has_used(&self, provider: &str) -> bool {
        self.provider == provider || self.providers.iter().any(|p| p == provider)
    }
}

/// Persisted provider row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderRecord {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub flag: ChannelFlag,
    /// Lower value wins
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        flag: ChannelFlag,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            flag,
            priority,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A provider row bound to its in-memory channel implementation
#[derive(Clone)]
pub struct Provider {
    pub record: ProviderRecord,
    /// `None` when no channel with this name is registered in this process
    pub channel: Option<Arc<dyn NotificationChannel>>,
}

impl Provider {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn flag(&self) -> ChannelFlag {
        self.record.flag
    }

    pub fn is_active(&self) -> bool {
        self.record.enabled && self.channel.is_some()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("record", &self.record)
            .field("bound", &self.channel.is_some())
            .finish()
    }
}

/// A group member with their per-channel contact addresses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub contacts: HashMap<ChannelFlag, String>,
}

/// One receptor group as loaded from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMembers {
    pub group: String,
    pub members: Vec<Member>,
}
