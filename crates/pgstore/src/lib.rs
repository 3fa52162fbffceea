mod delete;
mod index;
mod query_sql;
mod read;
mod statement;
mod write;

pub use index::PagedIndex;
pub use statement::{bind, SqlValue, Statement};

use schema::{Node, Resources};
use shred::{Action, QueryResult};
use sqlx::postgres::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 500;
const INDEX_TTL: Duration = Duration::from_secs(30);
const CLEAN_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Schema(#[from] schema::SchemaError),
    #[error(transparent)]
    Shred(#[from] shred::ShredError),
    #[error(transparent)]
    Codec(#[from] schema::CodecError),
    #[error("failed to create table {table}")]
    CreateTable {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// Postgres is the SQL executor: it owns the pre-opened pool, the
/// process-local table-verification set, and the paged read index. One
/// exclusive mutex serializes every public operation; scale-out is by
/// activating more executors over distinct service areas.
pub struct Postgres {
    pool: PgPool,
    res: Resources,
    batch_size: usize,
    /// The single executor lock. The verification set lives inside it so
    /// schema probes and statement generation see a stable view for the
    /// whole call.
    pub(crate) guard: tokio::sync::Mutex<HashSet<String>>,
    pub(crate) index: Arc<PagedIndex>,
    cleaner: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Postgres {
    /// Must be called from within a tokio runtime; the index cleaner ticks
    /// on a spawned task until `close`.
    pub fn new(pool: PgPool, res: Resources) -> Self {
        let index = Arc::new(PagedIndex::new(INDEX_TTL));
        let cleaner = tokio::spawn({
            let index = index.clone();
            async move {
                let mut tick = tokio::time::interval(CLEAN_INTERVAL);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    index.evict_expired();
                }
            }
        });
        Self {
            pool,
            res,
            batch_size: DEFAULT_BATCH_SIZE,
            guard: tokio::sync::Mutex::new(HashSet::new()),
            index,
            cleaner: std::sync::Mutex::new(Some(cleaner)),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub(crate) fn resources(&self) -> &Resources {
        &self.res
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Stop the index cleaner and close the pool.
    pub async fn close(&self) {
        if let Some(handle) = self.cleaner.lock().unwrap().take() {
            handle.abort();
        }
        self.pool.close().await;
    }

    /// Ensure a table exists for every struct type reachable from the
    /// root. Each table is probed at most once per process; a probe
    /// answering "undefined table" triggers the lazy CREATE TABLE plus the
    /// secondary indexes of non-unique decorated fields.
    pub(crate) async fn verify_tables(
        &self,
        verified: &mut HashSet<String>,
        root: &Node,
    ) -> Result<(), StoreError> {
        let mut tables = HashMap::new();
        collect_tables(root, &mut tables);
        for (name, node) in tables {
            if verified.contains(&name) {
                continue;
            }
            self.verify_table(&name, node).await?;
            verified.insert(name);
        }
        Ok(())
    }

    async fn verify_table(&self, name: &str, node: &Node) -> Result<(), StoreError> {
        let probe = format!("select * from {name} where false");
        match sqlx::query(&probe).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(err) if is_undefined_table(&err) => self.create_table(name, node).await,
            Err(err) => Err(StoreError::Sql(err)),
        }
    }

    async fn create_table(&self, name: &str, node: &Node) -> Result<(), StoreError> {
        let mut sql = format!("create table {name} (\nParentKey text,\nRecKey text,\n");
        for (attr_name, attr) in node.column_attributes() {
            sql.push_str(&format!("{attr_name} {},\n", postgres_type_of(attr)));
        }
        sql.push_str(&format!(
            "CONSTRAINT {name}_key PRIMARY KEY (ParentKey, RecKey)\n)"
        ));
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::CreateTable {
                table: name.to_string(),
                source,
            })?;
        tracing::info!(table = name, "created table");

        for field in self.res.registry.decorator(name).non_unique {
            let index_sql = format!("CREATE INDEX {name}_{field}_idx ON {name} ({field})");
            sqlx::query(&index_sql)
                .execute(&self.pool)
                .await
                .map_err(|source| StoreError::CreateTable {
                    table: name.to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl shred::Store for Postgres {
    async fn read(&self, query: &query::Query) -> anyhow::Result<QueryResult> {
        Ok(self.read_objects(query).await?)
    }

    async fn write(&self, action: Action, elements: Vec<schema::Value>) -> anyhow::Result<()> {
        Ok(self.write_objects(action, &elements).await?)
    }

    async fn delete(&self, query: &query::Query) -> anyhow::Result<()> {
        Ok(self.delete_objects(query).await?)
    }

    async fn close(&self) -> anyhow::Result<()> {
        Postgres::close(self).await;
        Ok(())
    }
}

fn collect_tables<'a>(node: &'a Node, tables: &mut HashMap<String, &'a Node>) {
    tables.insert(node.type_name.clone(), node);
    for (_, attr) in node.struct_attributes() {
        if !tables.contains_key(&attr.type_name) {
            collect_tables(attr, tables);
        }
    }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("42P01") || db.message().contains("does not exist")
        }
        _ => false,
    }
}

fn postgres_type_of(node: &Node) -> &'static str {
    if node.is_map || node.is_slice {
        return "text";
    }
    match node.type_name.as_str() {
        "string" => "text",
        "int32" => "integer",
        "int64" => "bigint",
        "float64" => "float8",
        "float32" => "real",
        "bool" => "boolean",
        // Enumerations persist as their integer discriminant.
        _ => "integer",
    }
}
