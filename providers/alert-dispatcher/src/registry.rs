//! Provider registry
//!
//! Binds persisted provider rows to the channel implementations registered in
//! this process and serves the two read views the pipelines need ("active"
//! and "by priority") from a TTL cache. Every mutation drops both views.

use notification_common::{validate_priority, ChannelFlag, NotificationChannel};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ttl_cache::{Cache, CacheOptions};
use uuid::Uuid;

use crate::model::{Provider, ProviderRecord};
use crate::store::ProviderStore;
use crate::{DispatcherError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum View {
    Active,
    ByPriority,
}

pub struct ProviderRegistry {
    store: Arc<dyn ProviderStore>,
    channels: RwLock<HashMap<String, Arc<dyn NotificationChannel>>>,
    views: Cache<View, Arc<Vec<Provider>>>,
    view_ttl: Duration,
    /// Bumped on every mutation; a view loaded under an older generation is
    /// not cached. Held across the compare and the cache write.
    generation: Mutex<u64>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn ProviderStore>, options: CacheOptions, view_ttl: Duration) -> Self {
        Self {
            store,
            channels: RwLock::new(HashMap::new()),
            views: Cache::new(options),
            view_ttl,
            generation: Mutex::new(0),
        }
    }

    /// Bind `channel` by name and make sure its provider row exists.
    ///
    /// A new row takes flag and priority from the channel. An existing row
    /// keeps its persisted priority and enabled flag.
    pub async fn register_channel(
        &self,
        channel: Arc<dyn NotificationChannel>,
        description: &str,
    ) -> Result<ProviderRecord> {
        let name = channel.name().to_string();
        let flag = channel.flag();
        let priority = channel.priority();
        validate_priority(priority).map_err(|_| DispatcherError::InvalidPriority(priority))?;

        self.channels.write().insert(name.clone(), channel);

        let record = match self.store.get_provider(&name).await? {
            Some(existing) => {
                if existing.flag != flag {
                    warn!(
                        provider = %name,
                        stored = %existing.flag,
                        channel = %flag,
                        "stored capability flag differs from channel"
                    );
                }
                existing
            }
            None => {
                let record = ProviderRecord::new(name.as_str(), description, flag, priority);
                self.store.add_provider(&record).await?;
                info!(provider = %name, flag = %flag, priority, "Provider registered");
                record
            }
        };
        self.invalidate();
        Ok(record)
    }

    pub async fn add_provider(&self, record: ProviderRecord) -> Result<()> {
        validate_priority(record.priority)
            .map_err(|_| DispatcherError::InvalidPriority(record.priority))?;
        self.store.add_provider(&record).await?;
        self.invalidate();
        Ok(())
    }

    pub async fn enable_provider(&self, name: &str) -> Result<()> {
        let mut record = self.load(name).await?;
        record.enabled = true;
        record.updated_at = chrono::Utc::now();
        self.store.modify_provider(&record).await?;
        self.invalidate();
        info!(provider = %name, "Provider enabled");
        Ok(())
    }

    pub async fn disable_provider(&self, name: &str) -> Result<()> {
        self.store.set_status_false(name).await?;
        self.invalidate();
        info!(provider = %name, "Provider disabled");
        Ok(())
    }

    pub async fn modify_provider_priority(&self, name: &str, priority: i32) -> Result<()> {
        validate_priority(priority).map_err(|_| DispatcherError::InvalidPriority(priority))?;
        let mut record = self.load(name).await?;
        record.priority = priority;
        record.updated_at = chrono::Utc::now();
        self.store.modify_provider(&record).await?;
        self.invalidate();
        info!(provider = %name, priority, "Provider priority changed");
        Ok(())
    }

    /// Enabled providers with a bound channel, highest priority first
    pub async fn get_active_providers(&self) -> Result<Arc<Vec<Provider>>> {
        self.view(View::Active).await
    }

    /// Every provider, highest priority first; ties keep registration order
    pub async fn get_providers_by_priority(&self) -> Result<Arc<Vec<Provider>>> {
        self.view(View::ByPriority).await
    }

    /// Uncached read of every provider
    pub async fn get_all_providers(&self) -> Result<Vec<Provider>> {
        let records = self.store.get_providers().await?;
        Ok(records.into_iter().map(|r| self.bind(r)).collect())
    }

    pub async fn get_provider_by_name(&self, name: &str) -> Result<Provider> {
        Ok(self.bind(self.load(name).await?))
    }

    pub async fn get_provider_by_id(&self, id: Uuid) -> Result<Provider> {
        self.get_all_providers()
            .await?
            .into_iter()
            .find(|p| p.record.id == id)
            .ok_or_else(|| DispatcherError::ProviderNotFound(id.to_string()))
    }

    /// Highest-priority active provider for `flag` whose name is not in `exclude`
    pub async fn pick(&self, flag: ChannelFlag, exclude: &[String]) -> Result<Option<Provider>> {
        let active = self.get_active_providers().await?;
        Ok(active
            .iter()
            .find(|p| p.flag() == flag && !exclude.iter().any(|name| name == p.name()))
            .cloned())
    }

    pub fn channel(&self, name: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.read().get(name).cloned()
    }

    /// Run every bound channel's credential check. Failures are logged only.
    pub async fn verify_all(&self) {
        let channels: Vec<_> = self.channels.read().values().cloned().collect();
        for channel in channels {
            match channel.verify().await {
                Ok(summary) => info!(provider = channel.name(), "Provider verified: {}", summary),
                Err(e) => warn!(provider = channel.name(), "Provider verification failed: {}", e),
            }
        }
    }

    pub fn close(&self) {
        self.views.close();
    }

    async fn load(&self, name: &str) -> Result<ProviderRecord> {
        self.store
            .get_provider(name)
            .await?
            .ok_or_else(|| DispatcherError::ProviderNotFound(name.to_string()))
    }

    fn bind(&self, record: ProviderRecord) -> Provider {
        let channel = self.channel(&record.name);
        Provider { record, channel }
    }

    fn invalidate(&self) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.views.delete(&View::Active);
        self.views.delete(&View::ByPriority);
    }

    async fn view(&self, view: View) -> Result<Arc<Vec<Provider>>> {
        if let Some(cached) = self.views.get(&view) {
            return Ok(cached);
        }

        let generation = *self.generation.lock();
        let mut providers = self.get_all_providers().await?;
        // stable: equal priorities keep the store's registration order
        providers.sort_by_key(|p| p.record.priority);
        if view == View::Active {
            providers.retain(Provider::is_active);
        }
        let providers = Arc::new(providers);

        let current = self.generation.lock();
        if *current == generation {
            if let Err(e) = self.views.set(view, providers.clone(), self.view_ttl) {
                debug!("provider view not cached: {}", e);
            }
        }
        drop(current);
        Ok(providers)
    }
}
