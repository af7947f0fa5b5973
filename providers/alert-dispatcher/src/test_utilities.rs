//! In-memory doubles for the store contracts and the channel seam

use async_trait::async_trait;
use chrono::Utc;
use notification_common::{
    AlertState, ChannelFlag, DeliveryState, NotificationChannel, OutboundMessage, ProviderError,
    RecipientOutcome,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::model::{Alert, GroupMembers, Member, Message, MessageStatus, ProviderRecord};
use crate::store::{AlertClaim, AlertStore, MessageStore, ProviderStore, ReceptorStore};
use crate::{DispatcherError, Result};

/// Store double. Claims mimic `FOR UPDATE SKIP LOCKED`: a claimed or already
/// sent alert cannot be claimed again until the claim is dropped.
#[derive(Default)]
pub struct MemoryStore {
    alerts: Arc<Mutex<HashMap<Uuid, Alert>>>,
    claimed: Arc<Mutex<HashSet<Uuid>>>,
    messages: Mutex<Vec<Message>>,
    providers: Mutex<Vec<ProviderRecord>>,
    groups: Mutex<Vec<GroupMembers>>,
    group_delay: Mutex<Duration>,
    fail_groups: AtomicBool,
    fail_adds: AtomicBool,
    group_reads: AtomicUsize,
    provider_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn insert_alert(&self, alert: Alert) {
        self.alerts.lock().insert(alert.id, alert);
    }

    pub fn alert(&self, id: Uuid) -> Option<Alert> {
        self.alerts.lock().get(&id).cloned()
    }

    pub fn insert_message(&self, message: Message) {
        self.messages.lock().push(message);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn message(&self, id: Uuid) -> Option<Message> {
        self.messages.lock().iter().find(|m| m.id == id).cloned()
    }

    pub fn set_groups(&self, groups: Vec<GroupMembers>) {
        *self.groups.lock() = groups;
    }

    pub fn set_group_delay(&self, delay: Duration) {
        *self.group_delay.lock() = delay;
    }

    pub fn fail_group_reads(&self, fail: bool) {
        self.fail_groups.store(fail, Ordering::SeqCst);
    }

    /// Make every `MessageStore::add` fail until reset
    pub fn fail_message_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub fn group_reads(&self) -> usize {
        self.group_reads.load(Ordering::SeqCst)
    }

    pub fn provider_reads(&self) -> usize {
        self.provider_reads.load(Ordering::SeqCst)
    }
}

struct MemoryClaim {
    id: Uuid,
    alerts: Arc<Mutex<HashMap<Uuid, Alert>>>,
    claimed: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        self.claimed.lock().remove(&self.id);
    }
}

#[async_trait]
impl AlertClaim for MemoryClaim {
    fn alert_id(&self) -> Uuid {
        self.id
    }

    async fn mark_sent(self: Box<Self>) -> Result<()> {
        let mut alerts = self.alerts.lock();
        let alert = alerts
            .get_mut(&self.id)
            .ok_or(DispatcherError::AlertNotFound(self.id))?;
        alert.send_notif = true;
        alert.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn get_unsent_alerts(&self) -> Result<Vec<Alert>> {
        let mut unsent: Vec<Alert> = self
            .alerts
            .lock()
            .values()
            .filter(|a| !a.send_notif)
            .cloned()
            .collect();
        unsent.sort_by_key(|a| a.created_at);
        Ok(unsent)
    }

    async fn claim_unsent_alert(&self, id: Uuid) -> Result<Option<Box<dyn AlertClaim>>> {
        let alerts = self.alerts.lock();
        match alerts.get(&id) {
            Some(alert) if !alert.send_notif => {}
            _ => return Ok(None),
        }
        if !self.claimed.lock().insert(id) {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryClaim {
            id,
            alerts: self.alerts.clone(),
            claimed: self.claimed.clone(),
        })))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn add(&self, message: &Message) -> Result<()> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(DispatcherError::Store("message insert failed".to_string()));
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn update_message(&self, message: &Message) -> Result<()> {
        let mut messages = self.messages.lock();
        let slot = messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| DispatcherError::Store(format!("message {} not found", message.id)))?;
        *slot = message.clone();
        Ok(())
    }

    async fn list_not_finished_messages(&self) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn add_provider(&self, provider: &ProviderRecord) -> Result<()> {
        let mut providers = self.providers.lock();
        if providers.iter().any(|p| p.name == provider.name) {
            return Err(DispatcherError::DuplicateProvider(provider.name.clone()));
        }
        providers.push(provider.clone());
        Ok(())
    }

    async fn modify_provider(&self, provider: &ProviderRecord) -> Result<()> {
        let mut providers = self.providers.lock();
        let slot = providers
            .iter_mut()
            .find(|p| p.name == provider.name)
            .ok_or_else(|| DispatcherError::ProviderNotFound(provider.name.clone()))?;
        slot.description = provider.description.clone();
        slot.priority = provider.priority;
        slot.enabled = provider.enabled;
        slot.updated_at = provider.updated_at;
        Ok(())
    }

    async fn get_provider(&self, name: &str) -> Result<Option<ProviderRecord>> {
        Ok(self.providers.lock().iter().find(|p| p.name == name).cloned())
    }

    async fn set_status_false(&self, name: &str) -> Result<()> {
        let mut providers = self.providers.lock();
        let slot = providers
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| DispatcherError::ProviderNotFound(name.to_string()))?;
        slot.enabled = false;
        Ok(())
    }

    async fn get_providers(&self) -> Result<Vec<ProviderRecord>> {
        self.provider_reads.fetch_add(1, Ordering::SeqCst);
        let mut providers = self.providers.lock().clone();
        providers.sort_by_key(|p| p.priority);
        Ok(providers)
    }
}

#[async_trait]
impl ReceptorStore for MemoryStore {
    async fn group_members(&self) -> Result<Vec<GroupMembers>> {
        self.group_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.group_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_groups.load(Ordering::SeqCst) {
            return Err(DispatcherError::Store("connection refused".to_string()));
        }
        Ok(self.groups.lock().clone())
    }
}

/// Scripted channel. Every accepted address gets a `{name}-{n}` reference.
pub struct FakeChannel {
    name: String,
    flag: ChannelFlag,
    priority: i32,
    send_error: Mutex<Option<ProviderError>>,
    failing: Mutex<HashSet<String>>,
    status: Mutex<std::result::Result<DeliveryState, ProviderError>>,
    sent: Mutex<Vec<OutboundMessage>>,
    status_calls: AtomicUsize,
    next_ref: AtomicUsize,
}

impl FakeChannel {
    pub fn new(name: &str, flag: ChannelFlag, priority: i32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            flag,
            priority,
            send_error: Mutex::new(None),
            failing: Mutex::new(HashSet::new()),
            status: Mutex::new(Ok(DeliveryState::Pending)),
            sent: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            next_ref: AtomicUsize::new(1),
        })
    }

    pub fn fail_address(&self, address: &str) {
        self.failing.lock().insert(address.to_string());
    }

    pub fn fail_sends(&self, error: ProviderError) {
        *self.send_error.lock() = Some(error);
    }

    pub fn set_status(&self, status: std::result::Result<DeliveryState, ProviderError>) {
        *self.status.lock() = status;
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_addresses(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .flat_map(|m| m.receptors.clone())
            .collect()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for FakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn flag(&self) -> ChannelFlag {
        self.flag
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn send(
        &self,
        message: &OutboundMessage,
    ) -> std::result::Result<Vec<RecipientOutcome>, ProviderError> {
        self.sent.lock().push(message.clone());
        if let Some(error) = self.send_error.lock().clone() {
            return Err(error);
        }
        let failing = self.failing.lock();
        Ok(message
            .receptors
            .iter()
            .map(|address| {
                if failing.contains(address) {
                    RecipientOutcome::failed(
                        address.clone(),
                        ProviderError::InvalidRecipient {
                            address: address.clone(),
                            reason: "blocked".to_string(),
                        },
                    )
                } else {
                    let n = self.next_ref.fetch_add(1, Ordering::SeqCst);
                    RecipientOutcome::delivered(address.clone(), format!("{}-{}", self.name, n))
                }
            })
            .collect())
    }

    async fn status(&self, _delivery_ref: &str) -> std::result::Result<DeliveryState, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status.lock().clone()
    }

    async fn verify(&self) -> std::result::Result<String, ProviderError> {
        Ok(format!("{} ready", self.name))
    }
}

pub fn member(user_id: &str, contacts: &[(ChannelFlag, &str)]) -> Member {
    Member {
        user_id: user_id.to_string(),
        contacts: contacts
            .iter()
            .map(|(flag, address)| (*flag, address.to_string()))
            .collect(),
    }
}

pub fn group(name: &str, members: Vec<Member>) -> GroupMembers {
    GroupMembers {
        group: name.to_string(),
        members,
    }
}

pub fn alert(method: &[&str], receptor: &[&str]) -> Alert {
    let now = Utc::now();
    Alert {
        id: Uuid::new_v4(),
        name: "DiskFull".to_string(),
        severity: "critical".to_string(),
        description: "disk is 95% full".to_string(),
        status: AlertState::Firing,
        method: method.iter().map(|m| m.to_string()).collect(),
        receptor: receptor.iter().map(|r| r.to_string()).collect(),
        send_notif: false,
        created_at: now,
        updated_at: now,
    }
}

/// A message already sent through `provider`, awaiting reconciliation
pub fn sent_message(provider: &str, receptor: &str, attempt: u32) -> Message {
    let mut message = Message::new(
        "u1",
        "ops",
        "firing:DiskFull:disk is 95% full",
        receptor,
        provider,
        Vec::new(),
    )
    .with_sender_ref(format!("{}-ref", provider));
    message.attempt = attempt;
    message
}
