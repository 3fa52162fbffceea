use crate::statement::Statement;
use crate::{Postgres, StoreError};
use query::Query;
use shred::Bundle;
use sqlx::Row as _;

impl Postgres {
    /// Delete every record matching the query, children first: the root
    /// keys are read inside the transaction, each child table is cleared
    /// by full-key prefix, and the root is deleted last by its criteria.
    /// An empty matching set is a no-op. Invalidates the paged index
    /// regardless of outcome.
    pub async fn delete_objects(&self, query: &Query) -> Result<(), StoreError> {
        let result = self.delete_relational(query).await;
        self.index.invalidate();
        result
    }

    pub async fn delete_relational(&self, query: &Query) -> Result<(), StoreError> {
        let bundle = Bundle::for_query(query, self.resources())?;
        let root_name = query.root_type().to_string();
        let root_node = self.resources().registry.node(&root_name)?;
        let root_columns = bundle.tables[&root_name].columns.clone();
        let root_stmt = Statement::new(
            root_node,
            root_columns,
            Some(query.clone()),
            self.resources().clone(),
        );

        let _guard = self.guard.lock().await;
        let mut tx = self.pool().begin().await?;

        let keys_sql = root_stmt.root_keys_sql();
        let rows = sqlx::query(&keys_sql).fetch_all(&mut *tx).await?;
        let full_keys = rows
            .iter()
            .map(|row| {
                Ok(format!(
                    "{}{}",
                    row.try_get::<String, _>(0)?,
                    row.try_get::<String, _>(1)?
                ))
            })
            .collect::<Result<Vec<String>, sqlx::Error>>()?;

        if full_keys.is_empty() {
            tx.commit().await?;
            return Ok(());
        }

        // Child tables first; the root goes last.
        for (name, table) in &bundle.tables {
            if name.eq_ignore_ascii_case(&root_name) {
                continue;
            }
            let node = self.resources().registry.node(name)?;
            let stmt = Statement::new(
                node,
                table.columns.clone(),
                Some(query.clone()),
                self.resources().clone(),
            );
            if let Some(sql) = stmt.delete_by_keys_sql(&full_keys) {
                sqlx::query(&sql).execute(&mut *tx).await?;
            }
        }

        let root_delete = root_stmt.delete_sql(None);
        sqlx::query(&root_delete).execute(&mut *tx).await?;

        tx.commit().await?;
        tracing::debug!(
            root = root_name.as_str(),
            records = full_keys.len(),
            "deleted matching records"
        );
        Ok(())
    }
}
