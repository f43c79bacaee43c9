//! Storage collaborator seam, Postgres implementation, and the read-path
//! entry point.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tracing::warn;

use crate::event::{Event, Tag};
use crate::filter::Filter;
use crate::query::{plan, rebind, Limits, Param, Plan};

/// External persistence executing the assembled query and returning rows.
///
/// Implementations accept query text with `?` placeholders and a matching
/// parameter list, adapt the placeholders to their own binding convention,
/// and return the decoded rows. Zero rows is a success, never an error.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn select(&self, sql: &str, params: &[Param]) -> Result<Vec<Event>>;
}

/// Translate `filter` into a bounded query and fetch matching events.
///
/// Filters rejected by the translation caps yield an empty list without
/// touching the store; a caller cannot tell that outcome apart from a query
/// that genuinely matched nothing. A missing filter is the one input error
/// that is always reported. Storage failures are wrapped with the generated
/// query text and propagated, never retried.
pub async fn query_events<S>(store: &S, filter: Option<&Filter>) -> Result<Vec<Event>>
where
    S: EventStore + ?Sized,
{
    query_events_with_limits(store, filter, &Limits::default()).await
}

/// [`query_events`] with explicit policy caps.
pub async fn query_events_with_limits<S>(
    store: &S,
    filter: Option<&Filter>,
    limits: &Limits,
) -> Result<Vec<Event>>
where
    S: EventStore + ?Sized,
{
    let filter = filter.ok_or_else(|| anyhow!("filter cannot be null"))?;
    match plan(filter, limits) {
        Plan::Unsatisfiable => Ok(vec![]),
        Plan::Query { sql, params } => match store.select(&sql, &params).await {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(filter = ?filter, query = %sql, error = %err, "failed to fetch events");
                Err(err.context(format!("failed to fetch events for query `{sql}`")))
            }
        },
    }
}

/// Postgres-backed event store.
#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

const MAX_CONNECTIONS: u32 = 16;

/// Schema statements executed by `init`, one per entry because sqlx prepares
/// each query individually.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS event (
        id text PRIMARY KEY,
        pubkey text NOT NULL,
        created_at bigint NOT NULL,
        kind integer NOT NULL,
        tags jsonb NOT NULL,
        content text NOT NULL,
        sig text NOT NULL,
        tagvalues text[] NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS event_created_at_idx ON event (created_at)",
    "CREATE INDEX IF NOT EXISTS event_tagvalues_idx ON event USING gin (tagvalues)",
];

impl PgStore {
    /// Connect to the database behind a small connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    /// Create the event table and its indexes.
    ///
    /// `tagvalues` holds every tag's value with its name stripped; the GIN
    /// index on it backs the name-agnostic overlap predicate.
    pub async fn init(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("creating schema")?;
        }
        Ok(())
    }

    /// Insert an event if it isn't already stored.
    pub async fn save(&self, ev: &Event) -> Result<()> {
        let tagvalues: Vec<String> = ev
            .tags
            .iter()
            .filter_map(|t| t.value().map(str::to_string))
            .collect();
        sqlx::query(
            "INSERT INTO event (id, pubkey, created_at, kind, tags, content, sig, tagvalues) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (id) DO NOTHING",
        )
        .bind(&ev.id)
        .bind(&ev.pubkey)
        .bind(ev.created_at as i64)
        .bind(ev.kind as i32)
        .bind(Json(&ev.tags))
        .bind(&ev.content)
        .bind(&ev.sig)
        .bind(&tagvalues)
        .execute(&self.pool)
        .await
        .context("inserting event")?;
        Ok(())
    }
}

/// Row shape returned by the event table, decoded into [`Event`].
#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    pubkey: String,
    created_at: i64,
    kind: i32,
    tags: Json<Vec<Tag>>,
    content: String,
    sig: String,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            pubkey: row.pubkey,
            kind: row.kind as u32,
            created_at: row.created_at as u64,
            tags: row.tags.0,
            content: row.content,
            sig: row.sig,
        }
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn select(&self, sql: &str, params: &[Param]) -> Result<Vec<Event>> {
        let sql = rebind(sql);
        let mut query = sqlx::query_as::<_, EventRow>(&sql);
        for p in params {
            query = match p {
                Param::Text(s) => query.bind(s.clone()),
                Param::Int(i) => query.bind(*i),
            };
        }
        // fetch_all returns an empty vec for no matches, which is not an
        // error at this layer.
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }
}
