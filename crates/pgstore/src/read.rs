use crate::index::page_slice;
use crate::statement::Statement;
use crate::{Postgres, StoreError};
use query::Query;
use shred::{reassemble, Bundle, Meta, QueryResult};
use sqlx::Row as _;

impl Postgres {
    /// Read matching records: the paged path when the query carries a
    /// limit, otherwise a full table walk, reassembled either way.
    pub async fn read_objects(&self, query: &Query) -> Result<QueryResult, StoreError> {
        if query.limit() > 0 {
            return self.read_paged(query).await;
        }
        let (bundle, meta) = self.read_relational(query).await?;
        Ok(reassemble(&bundle, Some(meta), self.resources())?)
    }

    /// The full read: one SELECT per table of the root closure, each row
    /// filed back into the bundle under (parent-key, field-name), plus the
    /// root COUNT for metadata.
    pub async fn read_relational(&self, query: &Query) -> Result<(Bundle, Meta), StoreError> {
        let mut bundle = Bundle::for_query(query, self.resources())?;
        let _guard = self.guard.lock().await;
        let mut tx = self.pool().begin().await?;
        let mut meta = Meta::default();

        let table_names: Vec<String> = bundle.tables.keys().cloned().collect();
        for name in table_names {
            let node = self.resources().registry.node(&name)?;
            let columns = bundle.tables[&name].columns.clone();
            let mut stmt = Statement::new(
                node,
                columns,
                Some(query.clone()),
                self.resources().clone(),
            );
            let Some(sql) = stmt.select_sql().map(str::to_string) else {
                continue;
            };
            let pg_rows = sqlx::query(&sql).fetch_all(&mut *tx).await?;
            for pg_row in &pg_rows {
                let row = stmt.scan_row(pg_row)?;
                bundle.file_row(&name, row);
            }
            if name == query.root_type() {
                let count_sql = stmt.count_sql().to_string();
                let row = sqlx::query(&count_sql).fetch_one(&mut *tx).await?;
                meta = Meta::with_total(row.try_get::<i64, _>(0)?);
            }
        }

        tx.commit().await?;
        Ok((bundle, meta))
    }

    async fn read_paged(&self, query: &Query) -> Result<QueryResult, StoreError> {
        let hash = query.hash();
        if let Some((keys, meta)) = self.index.lookup_page(hash, query.page(), query.limit()) {
            tracing::debug!(hash, page = query.page(), "paged index hit");
            return self.read_by_rec_keys(query, &keys, meta).await;
        }

        let (all_keys, meta) = self.read_rec_keys(query).await?;
        let keys = page_slice(&all_keys, query.page(), query.limit());
        self.index.store(hash, all_keys, meta.clone());
        self.read_by_rec_keys(query, &keys, meta).await
    }

    /// Every matching root rec-key in sort order, with the total count.
    pub async fn read_rec_keys(&self, query: &Query) -> Result<(Vec<String>, Meta), StoreError> {
        let bundle = Bundle::for_query(query, self.resources())?;
        let node = self.resources().registry.node(query.root_type())?;
        let columns = bundle.tables[query.root_type()].columns.clone();
        let mut stmt = Statement::new(
            node,
            columns,
            Some(query.clone()),
            self.resources().clone(),
        );

        let _guard = self.guard.lock().await;
        let mut tx = self.pool().begin().await?;

        let sql = stmt.rec_keys_sql().to_string();
        let rows = sqlx::query(&sql).fetch_all(&mut *tx).await?;
        let keys = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()?;

        let count_sql = stmt.count_sql().to_string();
        let row = sqlx::query(&count_sql).fetch_one(&mut *tx).await?;
        let meta = Meta::with_total(row.try_get::<i64, _>(0)?);

        tx.commit().await?;
        Ok((keys, meta))
    }

    /// Serve one page: the root rows by rec-key, the child tables in full
    /// with their rows filtered in memory to descendants of the page's
    /// root keys.
    pub async fn read_by_rec_keys(
        &self,
        query: &Query,
        rec_keys: &[String],
        meta: Meta,
    ) -> Result<QueryResult, StoreError> {
        if rec_keys.is_empty() {
            return Ok(QueryResult::of(Vec::new(), Some(meta)));
        }
        let mut bundle = Bundle::for_query(query, self.resources())?;
        {
            let _guard = self.guard.lock().await;
            let mut tx = self.pool().begin().await?;

            let table_names: Vec<String> = bundle.tables.keys().cloned().collect();
            for name in table_names {
                let node = self.resources().registry.node(&name)?;
                let columns = bundle.tables[&name].columns.clone();
                let mut stmt = Statement::new(
                    node,
                    columns,
                    Some(query.clone()),
                    self.resources().clone(),
                );
                let is_root = name == query.root_type();
                let sql = if is_root {
                    match stmt.select_by_rec_keys_sql(rec_keys) {
                        Some(sql) => sql,
                        None => continue,
                    }
                } else {
                    match stmt.select_sql().map(str::to_string) {
                        Some(sql) => sql,
                        None => continue,
                    }
                };
                let pg_rows = sqlx::query(&sql).fetch_all(&mut *tx).await?;
                for pg_row in &pg_rows {
                    let row = stmt.scan_row(pg_row)?;
                    // A root row's full key is its rec-key; keep only the
                    // child rows hanging beneath the page.
                    if !is_root && !rec_keys.iter().any(|k| row.parent_key.starts_with(k.as_str()))
                    {
                        continue;
                    }
                    bundle.file_row(&name, row);
                }
            }

            tx.commit().await?;
        }
        Ok(reassemble(&bundle, Some(meta), self.resources())?)
    }
}
