//! Read iterator: issues the `SELECT` derived by [`crate::query`], decodes
//! each row into an [`Entity`] through the mapper on demand, and carries the
//! continuation token computed from the pre-query `MAX(since_column)`
//! snapshot.
//!
//! The row-set itself cannot be kept open across the lifetime of the
//! returned iterator without a self-referential struct (the `oracle` crate's
//! `ResultSet` borrows the `Connection` it was issued from, and the
//! connection here is an owned, pooled checkout moving with the iterator).
//! Rather than reach for a self-referencing-struct crate for this, the raw
//! `oracle::Row`s are fetched into an in-memory buffer at construction time,
//! within the same pooled-connection borrow used to run the query; the
//! connection itself is kept alive on the iterator afterwards purely so
//! `close()` controls when it returns to the pool. Decoding a row's columns
//! into a [`RowItem`] and running it through the mapper stays deferred to
//! `next()` — a row that scans or maps poorly does not erase the entities
//! already produced from rows ahead of it. Fetching a row from the open
//! `ResultSet` can itself fail; when it does, rows fetched before the
//! failure are still buffered and delivered through `next()` before the
//! buffered error is returned and the iterator ends.

use std::collections::HashMap;

use oracle::ColumnInfo;
use r2d2::PooledConnection;

use crate::config::DatasetDefinition;
use crate::connection::OracleConnectionManager;
use crate::decode::{self, ScanKind, Scanned};
use crate::entity::{Continuation, Entity, NamespaceContext, RowItem};
use crate::error::{LayerError, LayerResult};
use crate::mapper::Mapper;
use crate::query;

pub struct ReadIterator {
    mapper: Mapper,
    columns: Vec<String>,
    scan_kinds: Vec<ScanKind>,
    rows: std::vec::IntoIter<LayerResult<oracle::Row>>,
    next_token: Continuation,
    conn: Option<PooledConnection<OracleConnectionManager>>,
    errored: bool,
    closed: bool,
}

impl ReadIterator {
    pub fn open(
        conn: PooledConnection<OracleConnectionManager>,
        def: &DatasetDefinition,
        mapper: Mapper,
        since: &str,
        limit: i64,
    ) -> LayerResult<Self> {
        let since_column = def
            .source_config
            .get(crate::config::SINCE_COLUMN)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let max_since_raw = match &since_column {
            Some(sc) => {
                let max_since_sql = query::build_max_since_query(def, sc)?;
                query_scalar_string(&conn, &max_since_sql)?.unwrap_or_default()
            }
            None => String::new(),
        };
        let next_token = if max_since_raw.is_empty() {
            Continuation::empty()
        } else {
            Continuation::encode(&max_since_raw)
        };

        let sql = query::build_query(def, since, &max_since_raw, limit)?;

        let mapping_by_column = outgoing_mapping_by_column(def);

        let result_set = conn.query(&sql, &[]).map_err(LayerError::query)?;
        let column_info: Vec<ColumnInfo> = result_set.column_info().to_vec();
        let columns: Vec<String> = column_info.iter().map(|c| c.name().to_string()).collect();
        let scan_kinds: Vec<ScanKind> = column_info
            .iter()
            .map(|c| {
                let mapping = mapping_by_column.get(c.name());
                decode::decide_scan_kind(c.oracle_type(), mapping.copied())
            })
            .collect();

        // Fetching exhausts the `ResultSet`'s borrow of `conn` within this
        // function, but a row fetch can itself fail mid-stream. Stop at the
        // first such failure rather than aborting the whole open(): rows
        // fetched before it are kept, so next() still delivers them before
        // surfacing the fetch error.
        let mut buffered = Vec::new();
        for row_result in result_set {
            match row_result {
                Ok(row) => buffered.push(Ok(row)),
                Err(e) => {
                    buffered.push(Err(LayerError::scan(e)));
                    break;
                }
            }
        }

        Ok(ReadIterator {
            mapper,
            columns,
            scan_kinds,
            rows: buffered.into_iter(),
            next_token,
            conn: Some(conn),
            errored: false,
            closed: false,
        })
    }

    /// Returns the next entity, or `None` once the row-set is exhausted.
    ///
    /// Once a row fails to fetch or decode, that error is returned once and
    /// every subsequent call returns `None` — matching "on scan failure
    /// surfaces an internal error and stops".
    pub fn next(&mut self) -> LayerResult<Option<Entity>> {
        if self.errored {
            return Ok(None);
        }
        match self.rows.next() {
            None => Ok(None),
            Some(Err(e)) => {
                self.errored = true;
                Err(e)
            }
            Some(Ok(row)) => match self.decode_row(&row) {
                Ok(item) => self.mapper.map_item_to_entity(&item).map(Some),
                Err(e) => {
                    self.errored = true;
                    Err(e)
                }
            },
        }
    }

    fn decode_row(&self, row: &oracle::Row) -> LayerResult<RowItem> {
        let mut item = RowItem::new();
        for (idx, column) in self.columns.iter().enumerate() {
            let scanned = scan_column(row, idx, self.scan_kinds[idx])?;
            item.set_value(column.clone(), decode::scanned_to_value(&scanned));
        }
        Ok(item)
    }

    /// Always returns the token computed at construction, even when empty,
    /// so the framework can emit a terminator.
    pub fn token(&self) -> LayerResult<Continuation> {
        Ok(self.next_token.clone())
    }

    /// The mapper has already expanded every URI, so this is always empty.
    pub fn context(&self) -> NamespaceContext {
        NamespaceContext
    }

    pub fn close(mut self) -> LayerResult<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> LayerResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Read checkouts run with autocommit on (see
        // `OracleConnectionManager::connect`), so a `SELECT` never leaves an
        // open transaction behind; dropping the held pooled connection
        // simply returns it to the pool.
        self.conn.take();
        Ok(())
    }
}

impl Drop for ReadIterator {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close_inner() {
                tracing::error!(error = %e, "failed to close read iterator on drop");
            }
        }
    }
}

fn outgoing_mapping_by_column(
    def: &DatasetDefinition,
) -> HashMap<String, &crate::config::OutgoingPropertyMapping> {
    let mut map = HashMap::new();
    if let Some(outgoing) = &def.outgoing_mapping_config {
        for pm in &outgoing.property_mappings {
            map.insert(pm.property.to_uppercase(), pm);
        }
    }
    map
}

fn scan_column(row: &oracle::Row, idx: usize, kind: ScanKind) -> LayerResult<Scanned> {
    match kind {
        ScanKind::Bool => row
            .get::<usize, Option<bool>>(idx)
            .map(Scanned::Bool)
            .map_err(LayerError::scan),
        ScanKind::Float => row
            .get::<usize, Option<f64>>(idx)
            .map(Scanned::Float)
            .map_err(LayerError::scan),
        ScanKind::Str => row
            .get::<usize, Option<String>>(idx)
            .map(Scanned::Str)
            .map_err(LayerError::scan),
    }
}

/// Fetches column 0 of the first (and only expected) row of a scalar query,
/// as text — used for the `MAX(since_column)` snapshot. Failures here are
/// query-class: the snapshot query runs before the iterator exists, so a
/// failure at any step of it means the iterator is never created.
fn query_scalar_string(conn: &oracle::Connection, sql: &str) -> LayerResult<Option<String>> {
    let mut result_set = conn.query(sql, &[]).map_err(LayerError::query)?;
    match result_set.next() {
        Some(row_result) => {
            let row = row_result.map_err(LayerError::query)?;
            row.get::<usize, Option<String>>(0).map_err(LayerError::query)
        }
        None => Ok(None),
    }
}
