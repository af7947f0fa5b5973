//! Receptor cache
//!
//! Keeps `(capability flag, group) -> {member id -> address}` maps warm.
//! A full refresh replaces every entry without TTL; reads that miss trigger
//! one synchronous refresh and look again.

use async_trait::async_trait;
use notification_common::ChannelFlag;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ttl_cache::{Cache, CacheOptions, NO_EXPIRY};

use crate::periodic::Job;
use crate::store::ReceptorStore;
use crate::{DispatcherError, Result};

/// Member id to contact address
pub type Contacts = HashMap<String, String>;

type Key = (ChannelFlag, String);

pub struct ReceptorCache {
    store: Arc<dyn ReceptorStore>,
    cache: Cache<Key, Arc<Contacts>>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Completed refreshes
    generation: AtomicU64,
}

impl ReceptorCache {
    pub fn new(store: Arc<dyn ReceptorStore>, options: CacheOptions) -> Self {
        Self {
            store,
            cache: Cache::new(options),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Reload every group from the store. Returns the number of cached maps.
    pub async fn refresh(&self) -> Result<usize> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Contacts of `group` for `flag`, refreshing once on a miss
    pub async fn get(&self, flag: ChannelFlag, group: &str) -> Result<Arc<Contacts>> {
        let key = (flag, group.to_string());
        if let Some(contacts) = self.cache.get(&key) {
            return Ok(contacts);
        }

        debug!(group, flag = %flag, "receptor cache miss, refreshing");
        self.refresh_on_miss().await?;
        self.cache
            .get(&key)
            .ok_or_else(|| DispatcherError::GroupNotFound(group.to_string()))
    }

    /// Mobile numbers of `group`
    pub async fn get_numbers(&self, group: &str) -> Result<Arc<Contacts>> {
        self.get(ChannelFlag::Sms, group).await
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn close(&self) {
        self.cache.close();
    }

    async fn refresh_on_miss(&self) -> Result<()> {
        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != seen {
            // a refresh finished while this caller waited for the lock
            return Ok(());
        }
        self.refresh_locked().await.map(|_| ())
    }

    async fn refresh_locked(&self) -> Result<usize> {
        let groups = self.store.group_members().await?;

        let mut fresh: HashMap<Key, Contacts> = HashMap::new();
        for group in &groups {
            for flag in ChannelFlag::ALL {
                fresh.entry((flag, group.group.clone())).or_default();
            }
            for member in &group.members {
                for (flag, address) in &member.contacts {
                    let address = address.trim();
                    if address.is_empty() {
                        continue;
                    }
                    fresh
                        .entry((*flag, group.group.clone()))
                        .or_default()
                        .insert(member.user_id.clone(), address.to_string());
                }
            }
        }

        for key in self.cache.keys() {
            if !fresh.contains_key(&key) {
                self.cache.delete(&key);
            }
        }

        let entries = fresh.len();
        let capacity = self.cache.capacity();
        if entries > capacity {
            // an LRU eviction here would turn known groups into GroupNotFound
            error!(
                entries,
                capacity,
                "Receptor cache capacity is below groups x flags, growing it to fit"
            );
            self.cache.set_capacity(entries);
        }
        for (key, contacts) in fresh {
            if let Err(e) = self.cache.set(key, Arc::new(contacts), NO_EXPIRY) {
                warn!("receptor cache not updated: {}", e);
                break;
            }
        }
        self.generation.fetch_add(1, Ordering::SeqCst);

        info!(groups = groups.len(), entries, "Receptor cache refreshed");
        Ok(entries)
    }
}

/// Periodic full refresh of a [`ReceptorCache`]
pub struct ReceptorRefreshJob {
    receptors: Arc<ReceptorCache>,
}

impl ReceptorRefreshJob {
    pub fn new(receptors: Arc<ReceptorCache>) -> Self {
        Self { receptors }
    }
}

#[async_trait]
impl Job for ReceptorRefreshJob {
    type Item = ();

    fn name(&self) -> &'static str {
        "receptor-refresh"
    }

    fn key(&self, _item: &()) -> String {
        "refresh".to_string()
    }

    async fn collect(&self) -> Result<Vec<()>> {
        Ok(vec![()])
    }

    async fn process(&self, _item: ()) {
        if let Err(e) = self.receptors.refresh().await {
            warn!("Receptor refresh failed: {}", e);
        }
    }
}
