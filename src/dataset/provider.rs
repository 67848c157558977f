//! Dataset providers and their cache

use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{Error, Result};
use crate::builder::With;

pub type DatasetId = u64;

/// Anything returning the tabular payload of a dataset
pub trait DatasetProvider {
    fn get_rows(&self, dataset: DatasetId) -> Result<String>;
}

/// Payloads held in memory
#[derive(Clone, Debug, Default)]
pub struct InMemoryProvider {
    payloads: HashMap<DatasetId, String>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        InMemoryProvider::default()
    }
}

impl<S: Into<String>> With<(DatasetId, S)> for InMemoryProvider {
    fn with(mut self, (dataset, payload): (DatasetId, S)) -> Self {
        self.payloads.insert(dataset, payload.into());
        self
    }
}

impl DatasetProvider for InMemoryProvider {
    fn get_rows(&self, dataset: DatasetId) -> Result<String> {
        self.payloads
            .get(&dataset)
            .cloned()
            .ok_or_else(|| Error::unknown_dataset(dataset))
    }
}

type Slot = Arc<Mutex<Option<Arc<str>>>>;

/// Memoizes a provider.
/// Each dataset is fetched at most once until evicted, concurrent readers of one dataset
/// wait for the same fetch while other datasets proceed.
#[derive(Debug)]
pub struct CachedProvider<P> {
    provider: P,
    slots: DashMap<DatasetId, Slot>,
}

impl<P: DatasetProvider> CachedProvider<P> {
    pub fn new(provider: P) -> Self {
        CachedProvider {
            provider,
            slots: DashMap::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn get(&self, dataset: DatasetId) -> Result<Arc<str>> {
        // Clone the slot so the map shard is unlocked while fetching
        let slot = self.slots.entry(dataset).or_default().clone();
        let mut payload = slot
            .lock()
            .map_err(|_| Error::other(format!("cache slot of dataset {dataset} is poisoned")))?;
        if let Some(payload) = payload.as_ref() {
            log::debug!("dataset {dataset} served from cache");
            return Ok(payload.clone());
        }
        log::info!("fetching dataset {dataset}");
        let fetched: Arc<str> = Arc::from(self.provider.get_rows(dataset)?);
        *payload = Some(fetched.clone());
        Ok(fetched)
    }

    pub fn contains(&self, dataset: DatasetId) -> bool {
        let Some(slot) = self.slots.get(&dataset) else {
            return false;
        };
        let cached = slot.lock().map(|payload| payload.is_some()).unwrap_or(false);
        cached
    }

    /// Drop a dataset, returns whether it was cached
    pub fn evict(&self, dataset: DatasetId) -> bool {
        let evicted = self.slots.remove(&dataset).is_some();
        if evicted {
            log::info!("dataset {dataset} evicted");
        }
        evicted
    }
}

impl<P: DatasetProvider> DatasetProvider for CachedProvider<P> {
    fn get_rows(&self, dataset: DatasetId) -> Result<String> {
        self.get(dataset).map(|payload| payload.to_string())
    }
}
