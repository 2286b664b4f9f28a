use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Pool, Postgres};
use tracing::instrument;

use super::{NewQuote, Quote, QuoteId, QuoteResult, QuoteStore};
use crate::indicator::Scope;
use crate::store::CounterMap;

/// Quote archive backed by a `quotes` table:
///
/// ```sql
/// CREATE TABLE quotes (
///     id          BIGSERIAL PRIMARY KEY,
///     message     TEXT NOT NULL,
///     server      VARCHAR(50) NOT NULL,
///     created_by  VARCHAR(50) NOT NULL,
///     created_at  TIMESTAMP NOT NULL DEFAULT NOW()
/// );
/// CREATE INDEX quote_srv_idx ON quotes (server);
/// ```
#[derive(Debug, Clone)]
pub struct PgQuoteStore {
    pool: Pool<Postgres>,
}

#[derive(Debug, sqlx::FromRow)]
struct QuoteRow {
    id: i64,
    message: String,
    server: String,
    created_by: String,
    created_at: NaiveDateTime,
}

impl From<QuoteRow> for Quote {
    fn from(row: QuoteRow) -> Self {
        Self {
            id: QuoteId(row.id),
            message: row.message,
            server: row.server.into(),
            created_by: row.created_by.into(),
            created_at: row.created_at,
        }
    }
}

impl PgQuoteStore {
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> QuoteResult<Self> {
        tracing::info!("connecting to quote database");
        let pool = PgPool::connect(url).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl QuoteStore for PgQuoteStore {
    #[instrument(skip(self, quote), fields(server = %quote.server))]
    async fn create(&self, quote: NewQuote) -> QuoteResult<Quote> {
        let row = sqlx::query_as::<_, QuoteRow>(
            r#"
            INSERT INTO quotes (
                message,
                server,
                created_by,
                created_at
            )
            VALUES ($1, $2, $3, NOW())
            RETURNING
                id,
                message,
                server,
                created_by,
                created_at
            "#,
        )
        .bind(&quote.message)
        .bind(quote.server.as_str())
        .bind(quote.created_by.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(id = row.id, "created quote");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: QuoteId) -> QuoteResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(
            r#"
            SELECT id, message, server, created_by, created_at
            FROM quotes
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Quote::from))
    }

    #[instrument(skip(self))]
    async fn ids_by_server(&self, server: &Scope) -> QuoteResult<Vec<QuoteId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM quotes WHERE server = $1 ORDER BY id")
                .bind(server.as_str())
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(QuoteId).collect())
    }

    #[instrument(skip(self))]
    async fn servers(&self) -> QuoteResult<Vec<Scope>> {
        let servers: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT server FROM quotes ORDER BY server")
                .fetch_all(&self.pool)
                .await?;

        Ok(servers.into_iter().map(Scope::from).collect())
    }

    #[instrument(skip(self))]
    async fn tally_by_author(&self, server: &Scope) -> QuoteResult<CounterMap> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT created_by, COUNT(id)
            FROM quotes
            WHERE server = $1
            GROUP BY created_by
            "#,
        )
        .bind(server.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use tokio::sync::OnceCell;

    use super::*;
    use crate::indicator::Subject;

    static SCHEMA: OnceCell<()> = OnceCell::const_new();

    /// Postgres-backed tests only run against a live database named by `DATABASE_TEST_URL`.
    async fn test_store() -> Option<PgQuoteStore> {
        let url = std::env::var("DATABASE_TEST_URL").ok()?;
        let store = PgQuoteStore::connect(&url).await.unwrap();

        SCHEMA.get_or_init(|| create_schema(&store)).await;
        Some(store)
    }

    async fn create_schema(store: &PgQuoteStore) {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                id          BIGSERIAL PRIMARY KEY,
                message     TEXT NOT NULL,
                server      VARCHAR(50) NOT NULL,
                created_by  VARCHAR(50) NOT NULL,
                created_at  TIMESTAMP NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();
    }

    fn unique_server(name: &str) -> Scope {
        Scope::from(format!("{}-{}", name, uuid::Uuid::new_v4().simple()))
    }

    async fn add(store: &PgQuoteStore, server: &Scope, author: &str, message: &str) -> Quote {
        let quote = NewQuote::new(message, server.clone(), Subject::from(author)).unwrap();
        store.create(quote).await.unwrap()
    }

    #[tokio::test]
    async fn test_pg_create_and_get() {
        let Some(store) = test_store().await else {
            return;
        };
        let server = unique_server("Pg");

        let created = add(&store, &server, "ana", " the moon is cheese ").await;
        assert_eq!(created.message, "the moon is cheese");
        assert_eq!(created.server, server);
        assert_eq!(created.created_by.as_str(), "ana");

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        assert_eq!(store.get(QuoteId(-1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pg_server_listing_and_tally() {
        let Some(store) = test_store().await else {
            return;
        };
        let s1 = unique_server("Pg");
        let s2 = unique_server("Pg");

        let first = add(&store, &s1, "ana", "one").await;
        let second = add(&store, &s1, "ana", "two").await;
        let third = add(&store, &s1, "bo", "three").await;
        let other = add(&store, &s2, "cy", "elsewhere").await;

        assert_eq!(
            store.ids_by_server(&s1).await.unwrap(),
            vec![first.id, second.id, third.id]
        );
        assert_eq!(store.ids_by_server(&s2).await.unwrap(), vec![other.id]);

        let servers = store.servers().await.unwrap();
        assert!(servers.contains(&s1));
        assert!(servers.contains(&s2));

        assert_eq!(
            store.tally_by_author(&s1).await.unwrap(),
            CounterMap::from([("ana".into(), 2), ("bo".into(), 1)])
        );
        assert!(store.tally_by_author(&unique_server("Pg")).await.unwrap().is_empty());
    }
}
