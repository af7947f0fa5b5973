//! PostgreSQL store
//!
//! Implements every repository contract over a `deadpool-postgres` pool.
//! Alert claims hold an open transaction with the row locked
//! `FOR UPDATE SKIP LOCKED`; concurrent workers and other instances skip the
//! row until the claim commits or is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, Object, Pool, Runtime};
use notification_common::{AlertState, ChannelFlag};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Alert, GroupMembers, Member, Message, MessageStatus, ProviderRecord};
use crate::store::{AlertClaim, AlertStore, MessageStore, ProviderStore, ReceptorStore};
use crate::{DispatcherError, Result};

/// Tables owned by the dispatcher
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS alerts (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL,
    severity        TEXT NOT NULL DEFAULT '',
    description     TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL,
    method          TEXT[] NOT NULL DEFAULT '{}',
    receptor        TEXT[] NOT NULL DEFAULT '{}',
    send_notif      BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_alerts_unsent ON alerts(created_at) WHERE send_notif = false;

CREATE TABLE IF NOT EXISTS messages (
    id              UUID PRIMARY KEY,
    alert_id        UUID,
    user_id         TEXT NOT NULL,
    group_name      TEXT NOT NULL DEFAULT '',
    text            TEXT NOT NULL,
    receptor        TEXT NOT NULL,
    sender_ref      TEXT NOT NULL DEFAULT '',
    provider        TEXT NOT NULL,
    status          TEXT NOT NULL,
    attempt         INTEGER NOT NULL DEFAULT 0,
    last_attempt    TIMESTAMPTZ,
    providers       TEXT[] NOT NULL DEFAULT '{}',
    response        TEXT NOT NULL DEFAULT '',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);

CREATE TABLE IF NOT EXISTS providers (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    description     TEXT NOT NULL DEFAULT '',
    flag            TEXT NOT NULL,
    priority        INTEGER NOT NULL CHECK (priority BETWEEN 1 AND 5),
    enabled         BOOLEAN NOT NULL DEFAULT true,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS groups (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    description     TEXT NOT NULL DEFAULT '',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS users (
    id              UUID PRIMARY KEY,
    username        TEXT NOT NULL UNIQUE,
    mobile          TEXT,
    email           TEXT,
    telegram_id     TEXT,
    mattermost_id   TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS user_groups (
    user_id         UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id        UUID NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, group_id)
);
"#;

const ALERT_COLUMNS: &str =
    "id, name, severity, description, status, method, receptor, send_notif, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, alert_id, user_id, group_name, text, receptor, sender_ref, \
     provider, status, attempt, last_attempt, providers, response, created_at, updated_at";

const PROVIDER_COLUMNS: &str =
    "id, name, description, flag, priority, enabled, created_at, updated_at";

const CLAIM_ALERT: &str =
    "SELECT id FROM alerts WHERE id = $1 AND send_notif = false FOR UPDATE SKIP LOCKED";

const MARK_ALERT_SENT: &str =
    "UPDATE alerts SET send_notif = true, updated_at = NOW() WHERE id = $1";

const GROUP_MEMBERS: &str = r#"
SELECT g.name AS group_name, u.id::text AS user_id,
       u.mobile, u.email, u.telegram_id, u.mattermost_id
FROM groups g
LEFT JOIN user_groups ug ON ug.group_id = g.id
LEFT JOIN users u ON u.id = ug.user_id
ORDER BY g.name, u.username
"#;

pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Build a pool for `database_url`. Connections are opened lazily.
    /// Waiting for a free connection gives up after `wait_timeout`, if set.
    pub fn connect(
        database_url: &str,
        pool_size: usize,
        wait_timeout: Option<Duration>,
    ) -> Result<Self> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e| DispatcherError::Configuration(format!("invalid database_url: {}", e)))?;
        let manager = Manager::new(pg_config, NoTls);
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .wait_timeout(wait_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DispatcherError::Configuration(format!("failed to build pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create missing tables and indexes
    pub async fn migrate(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        info!("Database schema ready");
        Ok(())
    }
}

/// Drop a connection instead of returning it to the pool. The server rolls
/// back whatever transaction it had open.
fn discard(client: Object) {
    drop(Object::take(client));
}

struct PgClaim {
    id: Uuid,
    client: Option<Object>,
}

impl Drop for PgClaim {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            debug!(alert_id = %self.id, "Releasing unfinished alert claim");
            discard(client);
        }
    }
}

#[async_trait]
impl AlertClaim for PgClaim {
    fn alert_id(&self) -> Uuid {
        self.id
    }

    async fn mark_sent(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let Some(client) = this.client.take() else {
            return Err(DispatcherError::Store("alert claim already released".to_string()));
        };

        let committed = async {
            client.execute(MARK_ALERT_SENT, &[&this.id]).await?;
            client.batch_execute("COMMIT").await
        }
        .await;

        match committed {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(alert_id = %this.id, "Failed to mark alert as sent: {}", e);
                discard(client);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl AlertStore for PostgresStore {
    async fn get_unsent_alerts(&self) -> Result<Vec<Alert>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM alerts WHERE send_notif = false ORDER BY created_at",
            ALERT_COLUMNS
        );
        let rows = client.query(query.as_str(), &[]).await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn claim_unsent_alert(&self, id: Uuid) -> Result<Option<Box<dyn AlertClaim>>> {
        let client = self.pool.get().await?;
        if let Err(e) = client.batch_execute("BEGIN").await {
            discard(client);
            return Err(e.into());
        }

        let locked = match client.query_opt(CLAIM_ALERT, &[&id]).await {
            Ok(row) => row.is_some(),
            Err(e) => {
                discard(client);
                return Err(e.into());
            }
        };
        if !locked {
            if let Err(e) = client.batch_execute("ROLLBACK").await {
                discard(client);
                return Err(e.into());
            }
            return Ok(None);
        }

        Ok(Some(Box::new(PgClaim {
            id,
            client: Some(client),
        })))
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn add(&self, message: &Message) -> Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            "INSERT INTO messages ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            MESSAGE_COLUMNS
        );
        client
            .execute(
                query.as_str(),
                &[
                    &message.id,
                    &message.alert_id,
                    &message.user_id,
                    &message.group_name,
                    &message.text,
                    &message.receptor,
                    &message.sender_ref,
                    &message.provider,
                    &message.status.as_str(),
                    &attempt_to_sql(message.attempt),
                    &message.last_attempt,
                    &message.providers,
                    &message.response,
                    &message.created_at,
                    &message.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_message(&self, message: &Message) -> Result<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET status = $2, attempt = $3, last_attempt = $4, response = $5, updated_at = $6 WHERE id = $1",
                &[
                    &message.id,
                    &message.status.as_str(),
                    &attempt_to_sql(message.attempt),
                    &message.last_attempt,
                    &message.response,
                    &message.updated_at,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(DispatcherError::Store(format!(
                "message {} not found",
                message.id
            )));
        }
        Ok(())
    }

    async fn list_not_finished_messages(&self) -> Result<Vec<Message>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM messages WHERE status = $1 ORDER BY created_at",
            MESSAGE_COLUMNS
        );
        let rows = client
            .query(query.as_str(), &[&MessageStatus::Sent.as_str()])
            .await?;
        rows.iter().map(message_from_row).collect()
    }
}

#[async_trait]
impl ProviderStore for PostgresStore {
    async fn add_provider(&self, provider: &ProviderRecord) -> Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            "INSERT INTO providers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            PROVIDER_COLUMNS
        );
        let inserted = client
            .execute(
                query.as_str(),
                &[
                    &provider.id,
                    &provider.name,
                    &provider.description,
                    &provider.flag.as_str(),
                    &provider.priority,
                    &provider.enabled,
                    &provider.created_at,
                    &provider.updated_at,
                ],
            )
            .await;
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(DispatcherError::DuplicateProvider(provider.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn modify_provider(&self, provider: &ProviderRecord) -> Result<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE providers SET description = $2, priority = $3, enabled = $4, updated_at = $5 WHERE name = $1",
                &[
                    &provider.name,
                    &provider.description,
                    &provider.priority,
                    &provider.enabled,
                    &provider.updated_at,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(DispatcherError::ProviderNotFound(provider.name.clone()));
        }
        Ok(())
    }

    async fn get_provider(&self, name: &str) -> Result<Option<ProviderRecord>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {} FROM providers WHERE name = $1", PROVIDER_COLUMNS);
        client
            .query_opt(query.as_str(), &[&name])
            .await?
            .as_ref()
            .map(provider_from_row)
            .transpose()
    }

    async fn set_status_false(&self, name: &str) -> Result<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE providers SET enabled = false, updated_at = NOW() WHERE name = $1",
                &[&name],
            )
            .await?;
        if updated == 0 {
            return Err(DispatcherError::ProviderNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn get_providers(&self) -> Result<Vec<ProviderRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM providers ORDER BY priority ASC, created_at ASC, name ASC",
            PROVIDER_COLUMNS
        );
        let rows = client.query(query.as_str(), &[]).await?;
        rows.iter().map(provider_from_row).collect()
    }
}

#[async_trait]
impl ReceptorStore for PostgresStore {
    async fn group_members(&self) -> Result<Vec<GroupMembers>> {
        let client = self.pool.get().await?;
        let rows = client.query(GROUP_MEMBERS, &[]).await?;

        let mut groups: Vec<GroupMembers> = Vec::new();
        for row in &rows {
            let name: String = row.try_get("group_name")?;
            if groups.last().map(|g| g.group != name).unwrap_or(true) {
                groups.push(GroupMembers {
                    group: name,
                    members: Vec::new(),
                });
            }

            let Some(user_id) = row.try_get::<_, Option<String>>("user_id")? else {
                continue;
            };
            let mut member = Member {
                user_id,
                ..Default::default()
            };
            for flag in ChannelFlag::ALL {
                if let Some(address) = row.try_get::<_, Option<String>>(flag.contact_field())? {
                    member.contacts.insert(flag, address);
                }
            }
            if let Some(group) = groups.last_mut() {
                group.members.push(member);
            }
        }
        Ok(groups)
    }
}

fn attempt_to_sql(attempt: u32) -> i32 {
    i32::try_from(attempt).unwrap_or(i32::MAX)
}

fn alert_from_row(row: &Row) -> Result<Alert> {
    let status: String = row.try_get("status")?;
    Ok(Alert {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        severity: row.try_get("severity")?,
        description: row.try_get("description")?,
        status: status
            .parse::<AlertState>()
            .map_err(DispatcherError::Store)?,
        method: row.try_get("method")?,
        receptor: row.try_get("receptor")?,
        send_notif: row.try_get("send_notif")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &Row) -> Result<Message> {
    let status: String = row.try_get("status")?;
    let attempt: i32 = row.try_get("attempt")?;
    let last_attempt: Option<DateTime<Utc>> = row.try_get("last_attempt")?;
    Ok(Message {
        id: row.try_get("id")?,
        alert_id: row.try_get("alert_id")?,
        user_id: row.try_get("user_id")?,
        group_name: row.try_get("group_name")?,
        text: row.try_get("text")?,
        receptor: row.try_get("receptor")?,
        sender_ref: row.try_get("sender_ref")?,
        provider: row.try_get("provider")?,
        status: status
            .parse::<MessageStatus>()
            .map_err(DispatcherError::Store)?,
        attempt: u32::try_from(attempt).unwrap_or(0),
        last_attempt,
        providers: row.try_get("providers")?,
        response: row.try_get("response")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn provider_from_row(row: &Row) -> Result<ProviderRecord> {
    let flag: String = row.try_get("flag")?;
    Ok(ProviderRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        flag: flag
            .parse::<ChannelFlag>()
            .map_err(|e| DispatcherError::Store(e.to_string()))?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
