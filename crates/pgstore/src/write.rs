use crate::statement::{bind, Statement};
use crate::{Postgres, StoreError};
use schema::Value;
use shred::{shred, Action, Bundle};

impl Postgres {
    /// Shred and persist elements in one transaction per batch. The paged
    /// index is invalidated regardless of outcome.
    pub async fn write_objects(
        &self,
        action: Action,
        elements: &[Value],
    ) -> Result<(), StoreError> {
        let result = self.write_inner(action, elements).await;
        self.index.invalidate();
        result
    }

    async fn write_inner(&self, action: Action, elements: &[Value]) -> Result<(), StoreError> {
        if elements.is_empty() {
            return Ok(());
        }
        if elements.len() <= self.batch_size() {
            let bundle = shred(action, elements, &[], self.resources())?;
            return self.write_relational(action, &bundle).await;
        }
        for chunk in elements.chunks(self.batch_size()) {
            let bundle = shred(action, chunk, &[], self.resources())?;
            self.write_relational(action, &bundle).await?;
        }
        Ok(())
    }

    /// Persist one bundle: verify the schema of the root closure, then run
    /// the upsert (POST/PUT) or COALESCE update (PATCH) for every row of
    /// every table, in emit order, inside a single transaction. Dropping
    /// the transaction on the error path rolls it back.
    pub async fn write_relational(
        &self,
        action: Action,
        bundle: &Bundle,
    ) -> Result<(), StoreError> {
        let root = self.resources().registry.node(&bundle.root_type)?;
        let mut verified = self.guard.lock().await;
        self.verify_tables(&mut verified, &root).await?;

        let mut tx = self.pool().begin().await?;
        for (name, table) in &bundle.tables {
            let node = self.resources().registry.node(name)?;
            let mut stmt = Statement::new(
                node,
                table.columns.clone(),
                None,
                self.resources().clone(),
            );
            let sql = match action {
                Action::Patch => stmt.update_sql().to_string(),
                _ => stmt.insert_sql().to_string(),
            };
            for instance in table.instance_rows.values() {
                for attr_rows in instance.attribute_rows.values() {
                    for row in &attr_rows.rows {
                        let args = stmt.row_values(action, row)?;
                        let mut q = sqlx::query(&sql);
                        for arg in &args {
                            q = bind(q, arg);
                        }
                        q.execute(&mut *tx).await?;
                    }
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
