// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Key-value store adapters
//!
//! Two implementations of [`KeyValueStore`]:
//! - [`InMemoryKeyValueStore`] - `BTreeMap` behind a `parking_lot::RwLock`, for
//!   tests and `storage.backend: in-memory`
//! - [`SledKeyValueStore`] - one `sled` tree per aggregate, JSON values;
//!   `update` is a compare-and-swap loop so it is atomic per key

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;

use crate::domain::repository::{KeyValueStore, RepositoryError, UpdateFn};

pub struct InMemoryKeyValueStore<V> {
    entries: RwLock<BTreeMap<String, V>>,
}

impl<V> InMemoryKeyValueStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<V> Default for InMemoryKeyValueStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> KeyValueStore<V> for InMemoryKeyValueStore<V> {
    fn get(&self, key: &str) -> Result<Option<V>, RepositoryError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: V) -> Result<(), RepositoryError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn update(&self, key: &str, update: UpdateFn<'_, V>) -> Result<V, RepositoryError> {
        let mut entries = self.entries.write();
        let next = update(entries.get(key).cloned())?;
        entries.insert(key.to_string(), next.clone());
        Ok(next)
    }

    fn values(&self) -> Result<Vec<V>, RepositoryError> {
        Ok(self.entries.read().values().cloned().collect())
    }
}

/// Open (or create) the sled database under `data_dir`.
pub fn open_sled_database(data_dir: &Path) -> Result<sled::Db, RepositoryError> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| RepositoryError::Database(format!("Failed to create {}: {}", data_dir.display(), e)))?;
    Ok(sled::open(data_dir.join("state.sled"))?)
}

pub struct SledKeyValueStore<V> {
    tree: sled::Tree,
    _value: PhantomData<fn() -> V>,
}

impl<V> SledKeyValueStore<V> {
    pub fn open(db: &sled::Db, tree_name: &str) -> Result<Self, RepositoryError> {
        Ok(Self {
            tree: db.open_tree(tree_name)?,
            _value: PhantomData,
        })
    }
}

impl<V> SledKeyValueStore<V>
where
    V: DeserializeOwned,
{
    fn decode(bytes: &[u8]) -> Result<V, RepositoryError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<V> KeyValueStore<V> for SledKeyValueStore<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &str) -> Result<Option<V>, RepositoryError> {
        self.tree
            .get(key)?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn set(&self, key: &str, value: V) -> Result<(), RepositoryError> {
        self.tree.insert(key, serde_json::to_vec(&value)?)?;
        Ok(())
    }

    fn update(&self, key: &str, update: UpdateFn<'_, V>) -> Result<V, RepositoryError> {
        loop {
            let current = self.tree.get(key)?;
            let decoded = current.as_ref().map(|bytes| Self::decode(bytes)).transpose()?;
            let next = update(decoded)?;
            let encoded = serde_json::to_vec(&next)?;

            match self.tree.compare_and_swap(key, current, Some(encoded))? {
                Ok(()) => return Ok(next),
                Err(_) => {
                    tracing::debug!(key, "Concurrent write detected, retrying update");
                }
            }
        }
    }

    fn values(&self) -> Result<Vec<V>, RepositoryError> {
        self.tree
            .iter()
            .values()
            .map(|bytes| Self::decode(&bytes?))
            .collect()
    }
}
