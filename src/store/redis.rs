use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::instrument;

use super::{CounterMap, CounterStore, StoreErr, StoreResult, decode_count, decode_fields};

const CANNOT_DEBUG: &str = "RedisStore { manager: ConnectionManager }";

/// `ARGV` holds `field, floor` pairs. Non-numeric values are left for the reader to reject.
const RAISE_FIELDS_LUA: &str = r#"
    local key = KEYS[1]
    for i = 1, #ARGV, 2 do
        local current = tonumber(redis.call('HGET', key, ARGV[i]) or '0')
        local floor = tonumber(ARGV[i + 1])
        if current ~= nil and floor > current then
            redis.call('HSET', key, ARGV[i], ARGV[i + 1])
        end
    end
    return 0
"#;

static RAISE_FIELDS: LazyLock<redis::Script> = LazyLock::new(|| redis::Script::new(RAISE_FIELDS_LUA));

/// Redis-backed store: field sets are hashes, scalars are plain string keys.
///
/// The [`ConnectionManager`] is cloned for every call so each operation owns its handle for
/// exactly one round trip.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl core::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", CANNOT_DEBUG)
    }
}

impl RedisStore {
    #[instrument(skip(url))]
    pub async fn connect(url: &str, timeout: Duration) -> StoreResult<Self> {
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "connecting to redis server");

        let client = redis::Client::open(url)?;
        let manager = match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
            Ok(manager) => manager?,
            Err(_) => return Err(StoreErr::Timeout(timeout)),
        };

        Ok(Self { manager, timeout })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Bounds a single round trip by the configured timeout.
    async fn within<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "redis round trip timed out");
                Err(StoreErr::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    #[instrument(skip(self))]
    async fn read_fields(&self, key: &str) -> StoreResult<CounterMap> {
        let mut conn = self.conn();
        let raw: HashMap<String, String> = self.within(conn.hgetall(key)).await?;

        decode_fields(key, raw)
    }

    #[instrument(skip(self, fields), fields(count = fields.len()))]
    async fn write_fields(&self, key: &str, fields: &CounterMap) -> StoreResult<()> {
        let mut conn = self.conn();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(key).ignore();

        if !fields.is_empty() {
            let items: Vec<(&str, i64)> = fields
                .iter()
                .map(|(field, count)| (field.as_str(), *count))
                .collect();
            pipe.hset_multiple(key, &items).ignore();
        }

        let _: () = self.within(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn();
        let value: i64 = self.within(conn.hincr(key, field, delta)).await?;

        Ok(value)
    }

    #[instrument(skip(self, floors), fields(count = floors.len()))]
    async fn raise_fields(&self, key: &str, floors: &CounterMap) -> StoreResult<()> {
        if floors.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let mut invocation = RAISE_FIELDS.key(key);
        for (field, floor) in floors {
            invocation.arg(field.as_str()).arg(*floor);
        }

        let _: i64 = self.within(invocation.invoke_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_scalar(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn();
        let raw: Option<String> = self.within(conn.get(key)).await?;

        raw.map(|value| decode_count(|| key.to_owned(), &value))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn set_scalar(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = self.within(conn.set(key, value)).await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use futures::future::join_all;

    use super::*;

    /// Redis-backed tests only run against a live server named by `REDIS_TEST_URL`.
    async fn test_store() -> Option<RedisStore> {
        let url = std::env::var("REDIS_TEST_URL").ok()?;
        Some(
            RedisStore::connect(&url, Duration::from_secs(2))
                .await
                .unwrap(),
        )
    }

    fn unique_key(name: &str) -> String {
        format!("luna-test:{}:{}", name, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_redis_round_trip() {
        let Some(store) = test_store().await else {
            return;
        };
        let key = unique_key("quoted");

        assert!(store.read_fields(&key).await.unwrap().is_empty());

        store.increment_field(&key, "ana", 1).await.unwrap();
        store.increment_field(&key, "ana", 1).await.unwrap();
        store.increment_field(&key, "bo", 1).await.unwrap();

        let fields = store.read_fields(&key).await.unwrap();
        assert_eq!(fields, CounterMap::from([("ana".into(), 2), ("bo".into(), 1)]));

        store.write_fields(&key, &CounterMap::new()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_redis_concurrent_increments() {
        let Some(store) = test_store().await else {
            return;
        };
        let key = unique_key("requested");

        let tasks = (0..64).map(|_| {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move { store.increment_field(&key, "cy", 1).await })
        });

        for res in join_all(tasks).await {
            res.unwrap().unwrap();
        }

        let fields = store.read_fields(&key).await.unwrap();
        assert_eq!(fields.get("cy"), Some(&64));

        store.write_fields(&key, &CounterMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_raise_fields_never_lowers() {
        let Some(store) = test_store().await else {
            return;
        };
        let key = unique_key("quoted");

        store.increment_field(&key, "ana", 10).await.unwrap();
        store
            .raise_fields(
                &key,
                &CounterMap::from([("ana".into(), 3), ("bo".into(), 2)]),
            )
            .await
            .unwrap();

        let fields = store.read_fields(&key).await.unwrap();
        assert_eq!(fields, CounterMap::from([("ana".into(), 10), ("bo".into(), 2)]));

        store.write_fields(&key, &CounterMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_scalar_decode_error() {
        let Some(store) = test_store().await else {
            return;
        };
        let key = unique_key("last_quote");

        assert_eq!(store.get_scalar(&key).await.unwrap(), None);

        let mut conn = store.conn();
        let _: () = conn.set(&key, "not-a-number").await.unwrap();

        let err = store.get_scalar(&key).await.unwrap_err();
        assert!(matches!(err, StoreErr::Decode(_)));

        let _: () = conn.del(&key).await.unwrap();
    }
}
