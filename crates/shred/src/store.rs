use crate::{Action, QueryResult};
use query::Query;
use schema::Value;

/// Store is the executor capability the service handler drives: read,
/// write, delete, close. Implementations serialize their own database
/// access; callers never hold a store lock.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, query: &Query) -> anyhow::Result<QueryResult>;

    async fn write(&self, action: Action, elements: Vec<Value>) -> anyhow::Result<()>;

    async fn delete(&self, query: &Query) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}
