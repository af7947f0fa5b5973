//! Alert dispatch
//!
//! Each unsent alert is claimed, resolved to addresses per capability flag,
//! sent through the highest-priority active provider for that flag and
//! recorded as one message per recipient. The alert is marked sent after a
//! single attempt whatever the delivery outcome; following up on delivery is
//! the job of [`crate::message_status`].

use async_trait::async_trait;
use chrono::Utc;
use notification_common::{ChannelFlag, OutboundMessage, ProviderError, RecipientOutcome};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::model::{Alert, Message, Provider};
use crate::periodic::Job;
use crate::receptors::ReceptorCache;
use crate::registry::ProviderRegistry;
use crate::store::{AlertStore, MessageStore};
use crate::Result;

/// How a claimed alert ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one provider was tried; counts are message records written
    Dispatched { sent: usize, failed: usize },
    /// No method or no receptor group on the alert
    SkippedNoTarget,
    /// No active provider for any of the alert's flags
    NoProvider,
    /// Sent already, or held by another worker
    AlreadyClaimed,
}

#[derive(Debug, Clone)]
struct Recipient {
    user_id: String,
    group: String,
    address: String,
}

pub struct AlertDispatchJob {
    alerts: Arc<dyn AlertStore>,
    messages: Arc<dyn MessageStore>,
    registry: Arc<ProviderRegistry>,
    receptors: Arc<ReceptorCache>,
}

impl AlertDispatchJob {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        messages: Arc<dyn MessageStore>,
        registry: Arc<ProviderRegistry>,
        receptors: Arc<ReceptorCache>,
    ) -> Self {
        Self {
            alerts,
            messages,
            registry,
            receptors,
        }
    }

    /// Claim and dispatch one alert.
    ///
    /// An `Err` leaves the alert unclaimed so a later tick retries it.
    pub async fn dispatch(&self, alert: Alert) -> Result<DispatchOutcome> {
        let Some(claim) = self.alerts.claim_unsent_alert(alert.id).await? else {
            debug!(alert_id = %alert.id, "Alert already sent or claimed elsewhere");
            return Ok(DispatchOutcome::AlreadyClaimed);
        };
        info!(
            alert_id = %alert.id,
            name = %alert.name,
            methods = ?alert.method,
            receptors = ?alert.receptor,
            "Processing alert"
        );

        if alert.method.is_empty() || alert.receptor.is_empty() {
            warn!(alert_id = %alert.id, "Alert has no method or no receptor, skipping");
            claim.mark_sent().await?;
            return Ok(DispatchOutcome::SkippedNoTarget);
        }

        let plan = self.plan(&alert).await?;
        if plan.is_empty() {
            warn!(alert_id = %alert.id, methods = ?alert.method, "No active provider found");
            claim.mark_sent().await?;
            return Ok(DispatchOutcome::NoProvider);
        }

        let text = alert.message_text();
        let mut notified: HashSet<String> = HashSet::new();
        let (mut sent, mut failed) = (0, 0);

        for (flag, provider) in plan {
            let Some(channel) = provider.channel.clone() else {
                continue;
            };
            let recipients = self.resolve(&alert, flag, &notified).await;
            if recipients.is_empty() {
                debug!(alert_id = %alert.id, flag = %flag, "No receptors left for flag");
                continue;
            }

            info!(
                alert_id = %alert.id,
                provider = provider.name(),
                recipients = recipients.len(),
                "Using provider for alert"
            );
            let outbound = OutboundMessage {
                subject: alert.name.clone(),
                body: alert.description.clone(),
                state: Some(alert.status),
                time: Some(Utc::now()),
                receptors: recipients.iter().map(|r| r.address.clone()).collect(),
            };
            let outcomes = channel.send(&outbound).await;
            let (ok, err) = self
                .record(&alert, provider.name(), &text, recipients, outcomes, &mut notified)
                .await;
            sent += ok;
            failed += err;
        }

        claim.mark_sent().await?;
        Ok(DispatchOutcome::Dispatched { sent, failed })
    }

    /// One provider per distinct known flag, in the alert's method order
    async fn plan(&self, alert: &Alert) -> Result<Vec<(ChannelFlag, Provider)>> {
        let mut flags: Vec<ChannelFlag> = Vec::new();
        for raw in &alert.method {
            match raw.parse::<ChannelFlag>() {
                Ok(flag) if !flags.contains(&flag) => flags.push(flag),
                Ok(_) => {}
                Err(e) => warn!(alert_id = %alert.id, "Skipping method: {}", e),
            }
        }

        let mut plan = Vec::with_capacity(flags.len());
        for flag in flags {
            match self.registry.pick(flag, &[]).await? {
                Some(provider) => plan.push((flag, provider)),
                None => debug!(alert_id = %alert.id, flag = %flag, "No active provider for flag"),
            }
        }
        Ok(plan)
    }

    /// Addresses for `flag` across every receptor group. A member appears at
    /// most once, and members in `notified` are left out.
    async fn resolve(
        &self,
        alert: &Alert,
        flag: ChannelFlag,
        notified: &HashSet<String>,
    ) -> Vec<Recipient> {
        let mut members = HashSet::new();
        let mut addresses = HashSet::new();
        let mut recipients = Vec::new();

        for group in &alert.receptor {
            let contacts = match self.receptors.get(flag, group).await {
                Ok(contacts) => contacts,
                Err(e) => {
                    warn!(alert_id = %alert.id, group = %group, flag = %flag, "Skipping receptor group: {}", e);
                    continue;
                }
            };

            let mut entries: Vec<(&String, &String)> = contacts.iter().collect();
            entries.sort();
            for (user_id, address) in entries {
                if notified.contains(user_id) {
                    debug!(alert_id = %alert.id, user = %user_id, "User already notified");
                    continue;
                }
                if !members.insert(user_id.clone()) || !addresses.insert(address.clone()) {
                    continue;
                }
                recipients.push(Recipient {
                    user_id: user_id.clone(),
                    group: group.clone(),
                    address: address.clone(),
                });
            }
        }
        recipients
    }

    /// Write one message per recipient, matched to its outcome by address
    async fn record(
        &self,
        alert: &Alert,
        provider: &str,
        text: &str,
        recipients: Vec<Recipient>,
        outcomes: std::result::Result<Vec<RecipientOutcome>, ProviderError>,
        notified: &mut HashSet<String>,
    ) -> (usize, usize) {
        let mut by_address: HashMap<String, std::result::Result<String, ProviderError>> =
            match outcomes {
                Ok(outcomes) => outcomes.into_iter().map(|o| (o.address, o.result)).collect(),
                Err(e) => {
                    error!(alert_id = %alert.id, provider, "Failed to send notification: {}", e);
                    recipients
                        .iter()
                        .map(|r| (r.address.clone(), Err(e.clone())))
                        .collect()
                }
            };

        let (mut sent, mut failed) = (0, 0);
        for recipient in recipients {
            let base = Message::new(
                recipient.user_id.as_str(),
                recipient.group.as_str(),
                text,
                recipient.address.as_str(),
                provider,
                Vec::new(),
            )
            .for_alert(alert.id);

            let message = match by_address.remove(&recipient.address) {
                Some(Ok(delivery_ref)) => {
                    notified.insert(recipient.user_id.clone());
                    sent += 1;
                    base.with_sender_ref(delivery_ref)
                }
                Some(Err(e)) => {
                    failed += 1;
                    base.failed_with(e.to_string())
                }
                None => {
                    failed += 1;
                    base.failed_with("no outcome reported by provider")
                }
            };

            if let Err(e) = self.messages.add(&message).await {
                error!(
                    alert_id = %alert.id,
                    message_id = %message.id,
                    receptor = %recipient.address,
                    "Failed to save message: {}",
                    e
                );
            }
        }
        (sent, failed)
    }
}

#[async_trait]
impl Job for AlertDispatchJob {
    type Item = Alert;

    fn name(&self) -> &'static str {
        "alert-dispatch"
    }

    fn key(&self, alert: &Alert) -> String {
        alert.id.to_string()
    }

    async fn collect(&self) -> Result<Vec<Alert>> {
        self.alerts.get_unsent_alerts().await
    }

    async fn process(&self, alert: Alert) {
        let alert_id = alert.id;
        match self.dispatch(alert).await {
            Ok(outcome) => debug!(alert_id = %alert_id, ?outcome, "Alert handled"),
            Err(e) => error!(alert_id = %alert_id, "Failed processing alert: {}", e),
        }
    }
}
