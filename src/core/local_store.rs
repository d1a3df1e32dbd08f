// src/core/local_store.rs

//! In-memory reference store: the non-replicated, single-process
//! implementation of [`crate::store::Store`], used directly by callers that
//! don't need replication and as the test double behind
//! [`crate::client::topology_neutral`]'s unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::key::fully_qualified_key;

#[derive(Debug, Clone)]
struct Record {
    data: Vec<u8>,
    cas: u64,
    expiry: u32,
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

struct Db {
    records: HashMap<String, Record>,
    shadow: HashMap<String, Record>,
}

impl Db {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            shadow: HashMap::new(),
        }
    }
}

/// A self-contained, single-process key/value store. Table and key are
/// joined into one fully-qualified key (see [`crate::key`]) and stored
/// directly, with no vbucket routing and no network I/O.
pub struct LocalStore {
    db: Mutex<Db>,
    force_contention: std::sync::atomic::AtomicBool,
    force_get_error: std::sync::atomic::AtomicBool,
    force_set_error: std::sync::atomic::AtomicBool,
    force_delete_error: std::sync::atomic::AtomicBool,
}

/// Outcome of a [`LocalStore`] operation, mirroring the `Store` outcome
/// vocabulary used by the replicated client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome<T> {
    Ok(T),
    NotFound,
    DataContention,
    Error,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            db: Mutex::new(Db::new()),
            force_contention: std::sync::atomic::AtomicBool::new(false),
            force_get_error: std::sync::atomic::AtomicBool::new(false),
            force_set_error: std::sync::atomic::AtomicBool::new(false),
            force_delete_error: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Empties the store.
    pub fn flush_all(&self) {
        let mut db = self.db.lock().expect("local store mutex poisoned");
        db.records.clear();
        db.shadow.clear();
    }

    /// Makes the *next* `get` read from the pre-previous-write snapshot
    /// instead of the live table, for exercising contention handling in
    /// tests.
    pub fn force_contention(&self) {
        self.force_contention
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn force_get_error(&self) {
        self.force_get_error
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn force_set_error(&self) {
        self.force_set_error
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn force_delete_error(&self) {
        self.force_delete_error
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn get_data(&self, table: &str, key: &str) -> LocalOutcome<(Vec<u8>, u64)> {
        if self
            .force_get_error
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return LocalOutcome::Error;
        }

        let fqkey = fully_qualified_key(table, key);
        let mut db = self.db.lock().expect("local store mutex poisoned");
        let use_shadow = self
            .force_contention
            .swap(false, std::sync::atomic::Ordering::SeqCst);
        let table_ref = if use_shadow {
            &mut db.shadow
        } else {
            &mut db.records
        };

        let now_secs = now();
        match table_ref.get(&fqkey) {
            Some(record) if record.expiry != 0 && record.expiry < now_secs => {
                table_ref.remove(&fqkey);
                LocalOutcome::NotFound
            }
            Some(record) => LocalOutcome::Ok((record.data.clone(), record.cas)),
            None => LocalOutcome::NotFound,
        }
    }

    pub fn set_data(
        &self,
        table: &str,
        key: &str,
        data: &[u8],
        cas: u64,
        expiry_seconds: u32,
    ) -> LocalOutcome<()> {
        if self
            .force_set_error
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return LocalOutcome::Error;
        }

        let fqkey = fully_qualified_key(table, key);
        let mut db = self.db.lock().expect("local store mutex poisoned");
        let now_secs = now();

        if let Some(existing) = db.records.get(&fqkey).cloned() {
            let cas_ok = (existing.expiry == 0 || existing.expiry >= now_secs) && cas == existing.cas;
            let expired_add = existing.expiry != 0 && existing.expiry < now_secs && cas == 0;

            if cas_ok || expired_add {
                db.shadow.insert(fqkey.clone(), existing.clone());
                let new_expiry = if expiry_seconds == 0 {
                    0
                } else {
                    expiry_seconds + now_secs
                };
                db.records.insert(
                    fqkey,
                    Record {
                        data: data.to_vec(),
                        cas: existing.cas + 1,
                        expiry: new_expiry,
                    },
                );
                return LocalOutcome::Ok(());
            }
            return LocalOutcome::DataContention;
        }

        if cas == 0 {
            let new_expiry = if expiry_seconds == 0 {
                0
            } else {
                expiry_seconds + now_secs
            };
            db.records.insert(
                fqkey,
                Record {
                    data: data.to_vec(),
                    cas: 1,
                    expiry: new_expiry,
                },
            );
            return LocalOutcome::Ok(());
        }

        LocalOutcome::DataContention
    }

    pub fn delete_data(&self, table: &str, key: &str) -> LocalOutcome<()> {
        if self
            .force_delete_error
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return LocalOutcome::Error;
        }

        let fqkey = fully_qualified_key(table, key);
        let mut db = self.db.lock().expect("local store mutex poisoned");
        db.records.remove(&fqkey);
        LocalOutcome::Ok(())
    }

    /// Exchanges the live tables of two stores. Lock order is by ascending
    /// memory address of the two `Mutex`es, so that concurrent calls to
    /// `swap_dbs(a, b)` and `swap_dbs(b, a)` cannot deadlock.
    pub fn swap_dbs(a: &LocalStore, b: &LocalStore) {
        let a_addr = std::ptr::addr_of!(a.db) as usize;
        let b_addr = std::ptr::addr_of!(b.db) as usize;

        if a_addr == b_addr {
            return;
        }

        let (first, second) = if a_addr < b_addr { (a, b) } else { (b, a) };
        let mut first_db = first.db.lock().expect("local store mutex poisoned");
        let mut second_db = second.db.lock().expect("local store mutex poisoned");
        std::mem::swap(&mut first_db.records, &mut second_db.records);
        std::mem::swap(&mut first_db.shadow, &mut second_db.shadow);
    }
}
