use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    Completed,
    Failed,
}

impl ContributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionStatus::Pending => "pending",
            ContributionStatus::Completed => "completed",
            ContributionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<ContributionStatus> {
        match s {
            "pending" => Some(ContributionStatus::Pending),
            "completed" => Some(ContributionStatus::Completed),
            "failed" => Some(ContributionStatus::Failed),
            _ => None,
        }
    }

    /// `completed` and `failed` are terminal; only the webhook reconciler
    /// moves a record out of `pending`, exactly once.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContributionStatus::Completed | ContributionStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Contribution {
    pub id: Uuid,
    pub payment_reference: String,
    pub amount_ghs: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContributionStore: Send + Sync {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Contribution>>;

    /// Conditional transition out of `pending` (compare-and-swap). Returns the
    /// number of rows changed: 0 means a concurrent delivery already settled
    /// the record, which callers treat as success to stay idempotent under
    /// at-least-once webhook redelivery.
    async fn transition_if_pending(
        &self,
        reference: &str,
        to: ContributionStatus,
    ) -> Result<u64>;
}

pub struct PgContributionStore {
    pool: PgPool,
}

impl PgContributionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContributionStore for PgContributionStore {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Contribution>> {
        let rec = sqlx::query_as::<_, Contribution>(
            r#"SELECT id, payment_reference, amount_ghs, status, created_at, updated_at
               FROM contributions WHERE payment_reference = $1"#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn transition_if_pending(
        &self,
        reference: &str,
        to: ContributionStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE contributions SET status = $2, updated_at = now()
               WHERE payment_reference = $1 AND status = 'pending'"#,
        )
        .bind(reference)
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// In-memory store used by tests and local development.
#[derive(Default)]
pub struct MemoryContributionStore {
    inner: Mutex<HashMap<String, Contribution>>,
}

impl MemoryContributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contribution: Contribution) {
        let mut guard = self.inner.lock().expect("mutex poisoned");
        guard.insert(contribution.payment_reference.clone(), contribution);
    }

    pub fn get(&self, reference: &str) -> Option<Contribution> {
        let guard = self.inner.lock().expect("mutex poisoned");
        guard.get(reference).cloned()
    }
}

#[async_trait]
impl ContributionStore for MemoryContributionStore {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Contribution>> {
        Ok(self.get(reference))
    }

    async fn transition_if_pending(
        &self,
        reference: &str,
        to: ContributionStatus,
    ) -> Result<u64> {
        let mut guard = self.inner.lock().expect("mutex poisoned");
        match guard.get_mut(reference) {
            Some(record) if record.status == ContributionStatus::Pending.as_str() => {
                record.status = to.as_str().to_string();
                record.updated_at = Utc::now();
                Ok(1)
            }
            Some(_) => Ok(0),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn pending(reference: &str, amount: &str) -> Contribution {
        Contribution {
            id: Uuid::new_v4(),
            payment_reference: reference.to_string(),
            amount_ghs: BigDecimal::parse_bytes(amount.as_bytes(), 10).unwrap(),
            status: ContributionStatus::Pending.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cas_applies_only_once() {
        let store = MemoryContributionStore::new();
        store.insert(pending("REF1", "50.00"));

        let first = store
            .transition_if_pending("REF1", ContributionStatus::Completed)
            .await
            .unwrap();
        let second = store
            .transition_if_pending("REF1", ContributionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.get("REF1").unwrap().status, "completed");
    }

    #[tokio::test]
    async fn cas_does_not_clobber_terminal_state() {
        let store = MemoryContributionStore::new();
        store.insert(pending("REF2", "50.00"));
        store
            .transition_if_pending("REF2", ContributionStatus::Completed)
            .await
            .unwrap();

        let rows = store
            .transition_if_pending("REF2", ContributionStatus::Failed)
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.get("REF2").unwrap().status, "completed");
    }

    #[test]
    fn status_round_trip() {
        for status in [
            ContributionStatus::Pending,
            ContributionStatus::Completed,
            ContributionStatus::Failed,
        ] {
            assert_eq!(ContributionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ContributionStatus::from_str("voided"), None);
        assert!(!ContributionStatus::Pending.is_terminal());
        assert!(ContributionStatus::Completed.is_terminal());
    }
}
