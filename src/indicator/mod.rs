//! Per-server usage indicators.
//!
//! An [`Indicator`] is bound to one [`Scope`] and owns three records in the counter store:
//! the `quoted` tally, the `requested` tally and the last-quote pointer. Registrations go through
//! the store's atomic field increment so concurrent commands on the same server never lose a
//! count.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::quotes::QuoteId;
use crate::store::{CounterMap, CounterStore, StoreErr};

pub mod keys;
pub mod rank;

pub use keys::{IndicatorKey, Kind, Scope, Subject};

#[derive(Debug, Clone)]
pub struct Indicator {
    store: Arc<dyn CounterStore>,
    scope: Scope,
    prefix: Option<String>,
}

impl Indicator {
    pub fn new(store: Arc<dyn CounterStore>, scope: impl Into<Scope>) -> Self {
        Self {
            store,
            scope: scope.into(),
            prefix: None,
        }
    }

    /// Namespaces every key under `prefix`, e.g. `luna:quoted:{scope}`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn key(&self, key: IndicatorKey) -> String {
        key.with_scope(self.prefix.as_deref(), &self.scope)
    }

    pub async fn register_quoted(&self, user: &Subject) -> IndicatorResult<i64> {
        self.register(Kind::Quoted, user).await
    }

    pub async fn register_requested(&self, user: &Subject) -> IndicatorResult<i64> {
        self.register(Kind::Requested, user).await
    }

    /// Adds exactly one to `user`'s count for `kind`, returning the new count.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn register(&self, kind: Kind, user: &Subject) -> IndicatorResult<i64> {
        let key = self.key(IndicatorKey::Counter(kind));
        let count = self
            .store
            .increment_field(&key, user.as_str(), 1)
            .await
            .map_err(|e| IndicatorErr::new("register", &key, e))?;

        tracing::debug!(
            monotonic_counter.indicator_registrations = 1,
            key = %key,
            count,
            "registered usage"
        );

        Ok(count)
    }

    pub async fn get_quoted(&self) -> IndicatorResult<Option<CounterMap>> {
        self.tally(Kind::Quoted).await
    }

    pub async fn get_requested(&self) -> IndicatorResult<Option<CounterMap>> {
        self.tally(Kind::Requested).await
    }

    /// Full tally for `kind`, or `None` when nothing was ever registered on this scope.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn tally(&self, kind: Kind) -> IndicatorResult<Option<CounterMap>> {
        let key = self.key(IndicatorKey::Counter(kind));
        let fields = self
            .store
            .read_fields(&key)
            .await
            .map_err(|e| IndicatorErr::new("tally", &key, e))?;

        Ok((!fields.is_empty()).then_some(fields))
    }

    /// Folds an authoritative recount into the quoted tally. Each author ends up with at least
    /// the recounted value; counts are never lowered and authors missing from `tally` are kept.
    #[instrument(skip(self, tally), fields(scope = %self.scope, authors = tally.len()))]
    pub async fn reconcile_quoted(&self, tally: &CounterMap) -> IndicatorResult<()> {
        let key = self.key(IndicatorKey::Counter(Kind::Quoted));
        self.store
            .raise_fields(&key, tally)
            .await
            .map_err(|e| IndicatorErr::new("reconcile", &key, e))
    }

    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn set_last_quote(&self, id: QuoteId) -> IndicatorResult<()> {
        let key = self.key(IndicatorKey::LastQuote);
        self.store
            .set_scalar(&key, id.0)
            .await
            .map_err(|e| IndicatorErr::new("set_last_quote", &key, e))
    }

    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn get_last_quote(&self) -> IndicatorResult<Option<QuoteId>> {
        let key = self.key(IndicatorKey::LastQuote);
        let id = self
            .store
            .get_scalar(&key)
            .await
            .map_err(|e| IndicatorErr::new("get_last_quote", &key, e))?;

        Ok(id.map(QuoteId))
    }
}

pub type IndicatorResult<T> = core::result::Result<T, IndicatorErr>;

#[derive(Debug, Error)]
#[error("indicator {op} on '{key}' failed")]
pub struct IndicatorErr {
    pub op: &'static str,
    pub key: String,
    #[source]
    pub source: StoreErr,
}

impl IndicatorErr {
    fn new(op: &'static str, key: &str, source: StoreErr) -> Self {
        tracing::error!(op, key, error = %source, "store operation failed");
        Self {
            op,
            key: key.to_owned(),
            source,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use futures::future::join_all;

    use super::*;
    use crate::store::{DecodeErr, MemoryStore, StoreResult};

    fn indicator(store: &Arc<MemoryStore>, scope: &str) -> Indicator {
        Indicator::new(store.clone(), scope)
    }

    #[tokio::test]
    async fn test_sequential_registrations() {
        let store = Arc::new(MemoryStore::new());
        let s1 = indicator(&store, "S1");

        s1.register_quoted(&"ana".into()).await.unwrap();
        s1.register_quoted(&"ana".into()).await.unwrap();
        s1.register_quoted(&"bo".into()).await.unwrap();

        let quoted = s1.get_quoted().await.unwrap().unwrap();
        assert_eq!(quoted, CounterMap::from([("ana".into(), 2), ("bo".into(), 1)]));
    }

    #[tokio::test]
    async fn test_monotonic_count() {
        let store = Arc::new(MemoryStore::new());
        let s1 = indicator(&store, "S1");
        let user = Subject::from("ana");

        for expected in 1..=25 {
            assert_eq!(s1.register_quoted(&user).await.unwrap(), expected);
        }

        assert_eq!(s1.get_quoted().await.unwrap().unwrap()["ana"], 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_registrations_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let s1 = indicator(&store, "S1");

        let tasks = (0..200).map(|i| {
            let s1 = s1.clone();
            tokio::spawn(async move {
                let user = if i % 2 == 0 { "ana" } else { "bo" };
                s1.register_quoted(&user.into()).await
            })
        });

        for res in join_all(tasks).await {
            res.unwrap().unwrap();
        }

        let quoted = s1.get_quoted().await.unwrap().unwrap();
        assert_eq!(quoted["ana"], 100);
        assert_eq!(quoted["bo"], 100);
    }

    #[tokio::test]
    async fn test_fresh_scope_is_absent() {
        let store = Arc::new(MemoryStore::new());
        let s2 = indicator(&store, "S2");

        assert_eq!(s2.get_requested().await.unwrap(), None);
        assert_eq!(s2.get_quoted().await.unwrap(), None);
        assert_eq!(s2.get_last_quote().await.unwrap(), None);

        s2.register_requested(&"cy".into()).await.unwrap();
        assert_eq!(
            s2.get_requested().await.unwrap(),
            Some(CounterMap::from([("cy".into(), 1)]))
        );
    }

    #[tokio::test]
    async fn test_scope_and_kind_isolation() {
        let store = Arc::new(MemoryStore::new());
        let a = indicator(&store, "A");
        let b = indicator(&store, "B");

        a.register_quoted(&"ana".into()).await.unwrap();
        a.set_last_quote(QuoteId(3)).await.unwrap();

        assert_eq!(a.get_requested().await.unwrap(), None);
        assert_eq!(b.get_quoted().await.unwrap(), None);
        assert_eq!(b.get_last_quote().await.unwrap(), None);

        b.register_requested(&"ana".into()).await.unwrap();
        assert_eq!(
            a.get_quoted().await.unwrap(),
            Some(CounterMap::from([("ana".into(), 1)]))
        );
        assert_eq!(a.get_requested().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_case_distinct_ids_are_isolated() {
        let store = Arc::new(MemoryStore::new());

        indicator(&store, "S1")
            .register_quoted(&"ana".into())
            .await
            .unwrap();

        assert_eq!(indicator(&store, "s1").get_quoted().await.unwrap(), None);
        assert!(indicator(&store, "S1").get_quoted().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_numeric_and_string_scope_share_keys() {
        let store = Arc::new(MemoryStore::new());

        Indicator::new(store.clone(), 7781u64)
            .register_quoted(&"ana".into())
            .await
            .unwrap();

        let by_name = Indicator::new(store.clone(), "7781");
        assert!(by_name.get_quoted().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_quote_overwrite() {
        let store = Arc::new(MemoryStore::new());
        let s1 = indicator(&store, "S1");

        s1.set_last_quote(QuoteId(7)).await.unwrap();
        s1.set_last_quote(QuoteId(9)).await.unwrap();
        assert_eq!(s1.get_last_quote().await.unwrap(), Some(QuoteId(9)));
    }

    #[tokio::test]
    async fn test_reconcile_only_raises() {
        let store = Arc::new(MemoryStore::new());
        let s1 = indicator(&store, "S1").with_prefix("luna");

        for _ in 0..3 {
            s1.register_quoted(&"bo".into()).await.unwrap();
        }
        s1.register_quoted(&"cy".into()).await.unwrap();

        s1.reconcile_quoted(&CounterMap::from([("ana".into(), 4), ("bo".into(), 1)]))
            .await
            .unwrap();

        assert_eq!(
            s1.get_quoted().await.unwrap(),
            Some(CounterMap::from([
                ("ana".into(), 4),
                ("bo".into(), 3),
                ("cy".into(), 1)
            ]))
        );
        assert_eq!(
            store.read_fields("luna:quoted:S1").await.unwrap()["ana"],
            4
        );
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn read_fields(&self, key: &str) -> StoreResult<CounterMap> {
            Err(DecodeErr::new(key, "garbage").into())
        }

        async fn write_fields(&self, _: &str, _: &CounterMap) -> StoreResult<()> {
            Err(StoreErr::Timeout(std::time::Duration::from_millis(10)))
        }

        async fn increment_field(&self, _: &str, _: &str, _: i64) -> StoreResult<i64> {
            Err(StoreErr::Timeout(std::time::Duration::from_millis(10)))
        }

        async fn raise_fields(&self, _: &str, _: &CounterMap) -> StoreResult<()> {
            Err(StoreErr::Timeout(std::time::Duration::from_millis(10)))
        }

        async fn get_scalar(&self, _: &str) -> StoreResult<Option<i64>> {
            Ok(None)
        }

        async fn set_scalar(&self, _: &str, _: i64) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_errors_propagate_with_context() {
        let s1 = Indicator::new(Arc::new(BrokenStore), "S1");

        let err = s1.register_quoted(&"ana".into()).await.unwrap_err();
        assert_eq!(err.key, "quoted:S1");
        assert!(err.is_retryable());

        let err = s1.get_requested().await.unwrap_err();
        assert!(matches!(err.source, StoreErr::Decode(_)));
        assert!(!err.is_retryable());
    }
}
