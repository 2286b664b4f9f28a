use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::instrument;

use super::{CounterMap, CounterStore, StoreErr, StoreResult};

/// In-process store. Every mutation happens under a single write lock, which is what makes
/// [`CounterStore::increment_field`] atomic here.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    hashes: HashMap<String, CounterMap>,
    scalars: HashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    #[instrument(skip(self))]
    async fn read_fields(&self, key: &str) -> StoreResult<CounterMap> {
        let inner = self.inner.read().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    #[instrument(skip(self, fields), fields(count = fields.len()))]
    async fn write_fields(&self, key: &str, fields: &CounterMap) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if fields.is_empty() {
            inner.hashes.remove(key);
        } else {
            inner.hashes.insert(key.to_owned(), fields.clone());
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let count = inner
            .hashes
            .entry(key.to_owned())
            .or_default()
            .entry(field.to_owned())
            .or_insert(0);

        *count = count.checked_add(delta).ok_or_else(|| StoreErr::Overflow {
            key: key.to_owned(),
            field: field.to_owned(),
            delta,
        })?;
        Ok(*count)
    }

    #[instrument(skip(self, floors), fields(count = floors.len()))]
    async fn raise_fields(&self, key: &str, floors: &CounterMap) -> StoreResult<()> {
        if floors.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        let fields = inner.hashes.entry(key.to_owned()).or_default();
        for (field, floor) in floors {
            let count = fields.entry(field.clone()).or_insert(0);
            *count = (*count).max(*floor);
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_scalar(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self.inner.read().await.scalars.get(key).copied())
    }

    #[instrument(skip(self))]
    async fn set_scalar(&self, key: &str, value: i64) -> StoreResult<()> {
        self.inner.write().await.scalars.insert(key.to_owned(), value);
        Ok(())
    }
}
