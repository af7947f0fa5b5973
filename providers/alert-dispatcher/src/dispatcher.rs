//! Service assembly
//!
//! [`AlertDispatcher`] wires one store into the provider registry, the
//! receptor cache and the three periodic pipelines, and owns their lifecycle.

use email_notification_provider::ResendChannel;
use kavenegar_sms_provider::KavenegarChannel;
use notification_common::NotificationChannel;
use smsir_sms_provider::SmsirChannel;
use std::sync::Arc;
use telegram_notification_provider::TelegramChannel;
use tracing::info;

use crate::alert_scheduler::AlertDispatchJob;
use crate::config::DispatcherConfig;
use crate::message_status::MessageStatusJob;
use crate::model::ProviderRecord;
use crate::periodic::PeriodicRunner;
use crate::receptors::{ReceptorCache, ReceptorRefreshJob};
use crate::registry::ProviderRegistry;
use crate::store::{AlertStore, MessageStore, ProviderStore, ReceptorStore};
use crate::Result;

pub struct AlertDispatcher {
    registry: Arc<ProviderRegistry>,
    receptors: Arc<ReceptorCache>,
    receptor_runner: PeriodicRunner<ReceptorRefreshJob>,
    alert_runner: PeriodicRunner<AlertDispatchJob>,
    status_runner: PeriodicRunner<MessageStatusJob>,
}

impl AlertDispatcher {
    /// Build every component over `store`. Nothing runs until [`start`](Self::start).
    pub fn new<S>(config: &DispatcherConfig, store: Arc<S>) -> Result<Self>
    where
        S: AlertStore + MessageStore + ProviderStore + ReceptorStore + 'static,
    {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::new(
            store.clone(),
            config.provider_cache_options(),
            config.provider_cache_ttl(),
        ));
        let receptors = Arc::new(ReceptorCache::new(
            store.clone(),
            config.receptor_cache_options(),
        ));

        let receptor_runner = PeriodicRunner::new(
            Arc::new(ReceptorRefreshJob::new(receptors.clone())),
            config.receptor_schedule(),
        )?;
        let alert_runner = PeriodicRunner::new(
            Arc::new(AlertDispatchJob::new(
                store.clone(),
                store.clone(),
                registry.clone(),
                receptors.clone(),
            )),
            config.alert_schedule(),
        )?;
        let status_runner = PeriodicRunner::new(
            Arc::new(MessageStatusJob::new(
                store,
                registry.clone(),
                config.max_attempts,
            )),
            config.status_schedule(),
        )?;

        Ok(Self {
            registry,
            receptors,
            receptor_runner,
            alert_runner,
            status_runner,
        })
    }

    /// Channels enabled in `config`, with their provider descriptions
    pub fn configured_channels(
        config: &DispatcherConfig,
    ) -> Result<Vec<(Arc<dyn NotificationChannel>, &'static str)>> {
        let mut channels: Vec<(Arc<dyn NotificationChannel>, &'static str)> = Vec::new();
        if let Some(kavenegar) = config.kavenegar() {
            let channel: Arc<dyn NotificationChannel> = Arc::new(KavenegarChannel::new(kavenegar)?);
            channels.push((channel, "Kavenegar SMS gateway"));
        }
        if let Some(smsir) = config.smsir() {
            let channel: Arc<dyn NotificationChannel> = Arc::new(SmsirChannel::new(smsir)?);
            channels.push((channel, "sms.ir SMS gateway"));
        }
        if let Some(resend) = config.resend() {
            let channel: Arc<dyn NotificationChannel> = Arc::new(ResendChannel::new(resend)?);
            channels.push((channel, "Resend email API"));
        }
        if let Some(telegram) = config.telegram() {
            let channel: Arc<dyn NotificationChannel> = Arc::new(TelegramChannel::new(telegram)?);
            channels.push((channel, "Telegram Bot API"));
        }
        Ok(channels)
    }

    /// Register every channel enabled in `config`. Returns how many were bound.
    pub async fn register_configured_channels(&self, config: &DispatcherConfig) -> Result<usize> {
        let channels = Self::configured_channels(config)?;
        let count = channels.len();
        for (channel, description) in channels {
            self.register_channel(channel, description).await?;
        }
        Ok(count)
    }

    pub async fn register_channel(
        &self,
        channel: Arc<dyn NotificationChannel>,
        description: &str,
    ) -> Result<ProviderRecord> {
        self.registry.register_channel(channel, description).await
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn receptors(&self) -> &Arc<ReceptorCache> {
        &self.receptors
    }

    /// Verify channels, then start the receptor, alert and status pipelines.
    /// A pipeline that fails to start stops the ones already running.
    pub async fn start(&self) -> Result<()> {
        self.registry.verify_all().await;

        self.receptor_runner.start().await?;
        if let Err(e) = self.alert_runner.start().await {
            self.receptor_runner.stop().await;
            return Err(e);
        }
        if let Err(e) = self.status_runner.start().await {
            self.alert_runner.stop().await;
            self.receptor_runner.stop().await;
            return Err(e);
        }

        info!("🚀 Alert dispatcher started");
        Ok(())
    }

    /// Stop the pipelines in reverse start order. The dispatcher can be
    /// started again afterwards.
    pub async fn stop(&self) {
        self.status_runner.stop().await;
        self.alert_runner.stop().await;
        self.receptor_runner.stop().await;
        info!("Alert dispatcher stopped");
    }

    /// Stop the pipelines and release the caches
    pub async fn close(&self) {
        self.stop().await;
        self.registry.close();
        self.receptors.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageStatus;
    use crate::test_utilities::{alert, group, member, FakeChannel, MemoryStore};
    use crate::DispatcherError;
    use notification_common::{ChannelFlag, DeliveryState};
    use std::time::Duration;

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            receptor_start_delay_secs: 200,
            alert_start_delay_secs: 0,
            alert_interval_secs: 10,
            status_start_delay_secs: 30,
            status_interval_secs: 60,
            ..DispatcherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_channels_configured_by_default() {
        let channels = AlertDispatcher::configured_channels(&DispatcherConfig::default()).unwrap();
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn test_configured_channels_follow_config() {
        let config = DispatcherConfig {
            kavenegar_enabled: true,
            kavenegar_api_token: "token".to_string(),
            telegram_enabled: true,
            telegram_bot_token: "123:abc".to_string(),
            smsir_enabled: true,
            smsir_api_key: "key".to_string(),
            resend_enabled: true,
            resend_api_key: "re_key".to_string(),
            resend_from: "alerts@ekko.zone".to_string(),
            ..DispatcherConfig::default()
        };
        let channels = AlertDispatcher::configured_channels(&config).unwrap();
        let summary: Vec<_> = channels
            .iter()
            .map(|(c, _)| (c.name().to_string(), c.flag(), c.priority()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (KavenegarChannel::NAME.to_string(), ChannelFlag::Sms, 1),
                (SmsirChannel::NAME.to_string(), ChannelFlag::Sms, 2),
                (ResendChannel::NAME.to_string(), ChannelFlag::Mail, 2),
                (TelegramChannel::NAME.to_string(), ChannelFlag::Telegram, 3),
            ]
        );

        let store = Arc::new(MemoryStore::default());
        let dispatcher = AlertDispatcher::new(&config, store).unwrap();
        assert_eq!(dispatcher.register_configured_channels(&config).await.unwrap(), 4);
        let active = dispatcher.registry().get_active_providers().await.unwrap();
        assert_eq!(active[0].name(), KavenegarChannel::NAME);
        let fallback = dispatcher
            .registry()
            .pick(ChannelFlag::Sms, &[KavenegarChannel::NAME.to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fallback.name(), SmsirChannel::NAME);
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let config = DispatcherConfig {
            alert_workers: 0,
            ..DispatcherConfig::default()
        };
        let err = AlertDispatcher::new(&config, Arc::new(MemoryStore::default()))
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let dispatcher = AlertDispatcher::new(&config(), Arc::new(MemoryStore::default())).unwrap();
        dispatcher.start().await.unwrap();

        let err = tokio_test::assert_err!(dispatcher.start().await);
        assert!(matches!(err, DispatcherError::AlreadyStarted(_)));

        dispatcher.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_and_reconciles_end_to_end() {
        let store = Arc::new(MemoryStore::default());
        store.set_groups(vec![group(
            "ops",
            vec![member("u1", &[(ChannelFlag::Sms, "09120000001")])],
        )]);
        let unsent = alert(&["sms"], &["ops"]);
        store.insert_alert(unsent.clone());

        let sms = FakeChannel::new("sms-a", ChannelFlag::Sms, 1);
        sms.set_status(Ok(DeliveryState::Delivered));

        let dispatcher = AlertDispatcher::new(&config(), store.clone()).unwrap();
        dispatcher.register_channel(sms.clone(), "test sms").await.unwrap();
        dispatcher.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.alert(unsent.id).unwrap().send_notif);
        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Sent);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let message = store.message(messages[0].id).unwrap();
        assert_eq!(message.status, MessageStatus::Delivered);
        assert_eq!(message.attempt, 1);

        dispatcher.close().await;
        assert_eq!(sms.sent_addresses(), vec!["09120000001".to_string()]);
    }
}
