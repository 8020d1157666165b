use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One delivery-log row, written per recipient after the gateway accepts a
/// batch. Rows are append-only; nothing in this service mutates or deletes
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessageLog {
    pub sender_id: Uuid,
    pub recipient_phone: String,
    pub body: String,
    pub message_type: String,
    pub status: String,
}

#[async_trait]
pub trait MessagingStore: Send + Sync {
    /// Portal role for the authenticated account, from the profile store.
    async fn fetch_role(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn insert_message_logs(&self, entries: &[NewMessageLog]) -> Result<()>;
}

pub struct PgMessagingStore {
    pool: PgPool,
}

impl PgMessagingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessagingStore for PgMessagingStore {
    async fn fetch_role(&self, user_id: Uuid) -> Result<Option<String>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn insert_message_logs(&self, entries: &[NewMessageLog]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"INSERT INTO message_logs (id, sender_id, recipient_phone, body, message_type, status)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(Uuid::new_v4())
            .bind(entry.sender_id)
            .bind(&entry.recipient_phone)
            .bind(&entry.body)
            .bind(&entry.message_type)
            .bind(&entry.status)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// In-memory store used by tests.
#[derive(Default)]
pub struct MemoryMessagingStore {
    roles: Mutex<HashMap<Uuid, String>>,
    logs: Mutex<Vec<NewMessageLog>>,
}

impl MemoryMessagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_role(&self, user_id: Uuid, role: impl Into<String>) {
        self.roles
            .lock()
            .expect("mutex poisoned")
            .insert(user_id, role.into());
    }

    pub fn logs(&self) -> Vec<NewMessageLog> {
        self.logs.lock().expect("mutex poisoned").clone()
    }
}

#[async_trait]
impl MessagingStore for MemoryMessagingStore {
    async fn fetch_role(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .roles
            .lock()
            .expect("mutex poisoned")
            .get(&user_id)
            .cloned())
    }

    async fn insert_message_logs(&self, entries: &[NewMessageLog]) -> Result<()> {
        self.logs
            .lock()
            .expect("mutex poisoned")
            .extend_from_slice(entries);
        Ok(())
    }
}
