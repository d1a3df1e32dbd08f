// src/store.rs

//! The `Store` trait: a single, table/key-addressed CAS store, implemented
//! by both the in-memory reference store and the replicated backend client.
//! Per-call results are plain sum types, not folded into `MeshKvError` —
//! `DATA_CONTENTION` and `NOT_FOUND` are routine outcomes a caller branches
//! on, not failures.

use async_trait::async_trait;

use crate::core::errors::Result;

/// Outcome of a `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Ok { data: Vec<u8>, cas: u64 },
    NotFound,
}

/// Outcome of a `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Ok,
    /// The supplied CAS token no longer matches the stored record.
    DataContention,
}

/// Outcome of a `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Ok,
}

/// A table/key-addressed, CAS-guarded key/value store.
///
/// `cas == 0` on `set` means "create if absent, overwriting a tombstone if
/// one is present"; any other value is a conditional update that must match
/// the record's current CAS token.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<GetOutcome>;

    async fn set(
        &self,
        table: &str,
        key: &str,
        data: &[u8],
        cas: u64,
        expiry_seconds: i64,
    ) -> Result<SetOutcome>;

    async fn delete(&self, table: &str, key: &str) -> Result<DeleteOutcome>;
}

#[async_trait]
impl Store for crate::core::local_store::LocalStore {
    async fn get(&self, table: &str, key: &str) -> Result<GetOutcome> {
        use crate::core::local_store::LocalOutcome;
        match self.get_data(table, key) {
            LocalOutcome::Ok((data, cas)) => Ok(GetOutcome::Ok { data, cas }),
            LocalOutcome::NotFound => Ok(GetOutcome::NotFound),
            LocalOutcome::DataContention => Ok(GetOutcome::NotFound),
            LocalOutcome::Error => Err(crate::core::errors::MeshKvError::Transport(
                "forced get error".to_string(),
            )),
        }
    }

    async fn set(
        &self,
        table: &str,
        key: &str,
        data: &[u8],
        cas: u64,
        expiry_seconds: i64,
    ) -> Result<SetOutcome> {
        use crate::core::local_store::LocalOutcome;
        let expiry = crate::record::backend_expiration(expiry_seconds);
        match self.set_data(table, key, data, cas, expiry) {
            LocalOutcome::Ok(()) => Ok(SetOutcome::Ok),
            LocalOutcome::DataContention => Ok(SetOutcome::DataContention),
            LocalOutcome::NotFound => Ok(SetOutcome::DataContention),
            LocalOutcome::Error => Err(crate::core::errors::MeshKvError::Transport(
                "forced set error".to_string(),
            )),
        }
    }

    async fn delete(&self, table: &str, key: &str) -> Result<DeleteOutcome> {
        use crate::core::local_store::LocalOutcome;
        match self.delete_data(table, key) {
            LocalOutcome::Ok(()) => Ok(DeleteOutcome::Ok),
            LocalOutcome::NotFound => Ok(DeleteOutcome::Ok),
            LocalOutcome::DataContention => Ok(DeleteOutcome::Ok),
            LocalOutcome::Error => Err(crate::core::errors::MeshKvError::Transport(
                "forced delete error".to_string(),
            )),
        }
    }
}
