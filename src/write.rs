//! Write session: buffers entities into a text batch and flushes it as one
//! of two Oracle statement shapes (`INSERT ALL` for append mode, `MERGE` for
//! upsert-with-delete).

use std::fmt::Write as _;

use r2d2::PooledConnection;
use serde_json::Value;
use tracing::debug;

use crate::config::{DatasetDefinition, APPEND_MODE, FLUSH_THRESHOLD, TABLE_NAME};
use crate::connection::OracleConnectionManager;
use crate::entity::{Entity, RowItem};
use crate::error::{LayerError, LayerResult};
use crate::mapper::{identity_column, Mapper};

const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

/// Literal formatting used in both `append` and `upsert` value lists:
/// strings are single-quoted, absent/null values become `NULL`, everything
/// else is rendered via its default textual form.
fn sql_val(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => format!("'{other}'"),
    }
}

pub struct WriteSession {
    conn: PooledConnection<OracleConnectionManager>,
    mapper: Mapper,
    table: String,
    flush_threshold: usize,
    append_mode: bool,
    id_column: String,
    batch: String,
    batch_size: usize,
    last_cols: Vec<String>,
    in_transaction: bool,
    closed: bool,
}

impl WriteSession {
    pub fn open(
        conn: PooledConnection<OracleConnectionManager>,
        def: &DatasetDefinition,
        mapper: Mapper,
    ) -> LayerResult<Self> {
        let table = def
            .source_config
            .get(TABLE_NAME)
            .and_then(|v| v.as_str())
            .ok_or_else(|| LayerError::configuration(format!("{TABLE_NAME} not found in source config")))?
            .to_uppercase();

        let flush_threshold = match def.source_config.get(FLUSH_THRESHOLD) {
            Some(v) => v
                .as_u64()
                .ok_or_else(|| LayerError::configuration("flush_threshold must be an integer"))?
                as usize,
            None => DEFAULT_FLUSH_THRESHOLD,
        };

        let append_mode = def
            .source_config
            .get(APPEND_MODE)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let id_column = identity_column(def.incoming_mapping_config.as_ref());

        let mut session = WriteSession {
            conn,
            mapper,
            table,
            flush_threshold,
            append_mode,
            id_column,
            batch: String::new(),
            batch_size: 0,
            last_cols: Vec::new(),
            in_transaction: false,
            closed: false,
        };
        session.begin()?;
        Ok(session)
    }

    fn begin(&mut self) -> LayerResult<()> {
        // This checkout comes out of the pool with autocommit on (shared
        // with the read path); turn it off for the lifetime of this
        // session's own transaction so the first statement doesn't commit
        // itself, then the first statement implicitly opens the transaction.
        self.conn.set_autocommit(false);
        self.in_transaction = true;
        debug!("transaction started");
        Ok(())
    }

    /// Ends this session's explicit transaction bookkeeping and restores the
    /// checkout to the autocommit-on state every pooled connection is handed
    /// out in, so the next checkout (read or write) starts clean.
    fn end_transaction(&mut self) {
        self.in_transaction = false;
        self.conn.set_autocommit(true);
    }

    pub fn write(&mut self, entity: &Entity) -> LayerResult<()> {
        let mut item = self.mapper.map_entity_to_item(entity)?;
        item.deleted = entity.deleted;

        if self.append_mode {
            self.append(&item);
        } else {
            self.upsert(&item);
        }

        if self.batch_size >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn append(&mut self, item: &RowItem) {
        if self.batch.is_empty() {
            self.batch.push_str("INSERT ALL\n");
        }
        self.batch.push_str("\tINTO \"");
        self.batch.push_str(&self.table);
        self.batch.push_str("\" (");
        for (i, col) in item.columns.iter().enumerate() {
            if i != 0 {
                self.batch.push_str(", ");
            }
            let _ = write!(self.batch, "\"{}\"", col.to_uppercase());
        }
        self.batch.push_str(") VALUES (");
        for (i, value) in item.values.iter().enumerate() {
            if i != 0 {
                self.batch.push_str(", ");
            }
            self.batch.push_str(&sql_val(value));
        }
        self.batch.push_str(")\n");
        self.batch_size += 1;
    }

    fn upsert(&mut self, item: &RowItem) {
        if self.batch.is_empty() {
            let _ = write!(self.batch, "MERGE INTO {} t USING ((\n\t", self.table);
        } else {
            self.batch.push_str("\n\tUNION ");
        }
        self.batch.push_str("SELECT ");
        for (col, value) in item.columns.iter().zip(&item.values) {
            self.batch.push_str(&sql_val(value));
            let _ = write!(self.batch, " AS \"{}\", ", col.to_uppercase());
        }
        self.batch.push_str(&sql_val(&Value::Bool(item.deleted)));
        self.batch.push_str(" AS \"_DELETED\" FROM dual");
        self.batch_size += 1;
        self.last_cols = item.columns.iter().map(|c| c.to_uppercase()).collect();
    }

    fn flush(&mut self) -> LayerResult<()> {
        if self.batch_size == 0 {
            return Ok(());
        }

        if self.append_mode {
            self.batch.push_str("SELECT 1 FROM dual");
        } else {
            self.batch.push_str(")) n ON (t.");
            self.batch.push_str(&self.id_column);
            self.batch.push_str(" = n.");
            self.batch.push_str(&self.id_column);
            self.batch.push_str(")\nWHEN MATCHED THEN UPDATE SET ");
            let mut need_comma = false;
            for col in &self.last_cols {
                if *col == self.id_column {
                    continue;
                }
                if need_comma {
                    self.batch.push_str(", ");
                }
                let _ = write!(self.batch, "t.{col} = n.{col}");
                need_comma = true;
            }
            self.batch.push_str("\nDELETE WHERE n.\"_DELETED\"");
            self.batch.push_str("\nWHEN NOT MATCHED THEN INSERT (");
            for (i, col) in self.last_cols.iter().enumerate() {
                if i != 0 {
                    self.batch.push_str(", ");
                }
                self.batch.push_str(col);
            }
            self.batch.push_str(") VALUES (");
            for (i, col) in self.last_cols.iter().enumerate() {
                if i != 0 {
                    self.batch.push_str(", ");
                }
                let _ = write!(self.batch, "n.{col}");
            }
            self.batch.push(')');
        }

        debug!(statement = %self.batch, "flushing batch");

        let batch_size = self.batch_size;
        let statement = std::mem::take(&mut self.batch);
        self.batch_size = 0;

        let result = self.conn.execute(&statement, &[]);
        let stmt = match result {
            Ok(stmt) => stmt,
            Err(e) => {
                let rollback_result = self.conn.rollback();
                self.end_transaction();
                return match rollback_result {
                    Ok(()) => {
                        debug!("transaction rolled back");
                        Err(LayerError::from(e))
                    }
                    Err(rollback_err) => {
                        Err(LayerError::write_failed(LayerError::from(e), Err(LayerError::from(rollback_err))))
                    }
                };
            }
        };

        if self.append_mode {
            let affected = stmt.row_count().map_err(LayerError::scan)?;
            if affected as usize != batch_size {
                let err = LayerError::BatchSizeMismatch {
                    observed: affected as i64,
                    expected: batch_size,
                };
                let rollback_result = self.conn.rollback();
                self.end_transaction();
                return match rollback_result {
                    Ok(()) => Err(err),
                    Err(rollback_err) => Err(LayerError::write_failed(err, Err(LayerError::from(rollback_err)))),
                };
            }
        } else {
            let affected = stmt.row_count().unwrap_or(0);
            debug!(batch_size, affected, "merge executed; row count not asserted");
        }

        Ok(())
    }

    pub fn close(mut self) -> LayerResult<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> LayerResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        if self.in_transaction {
            let result = self.conn.commit();
            self.end_transaction();
            result?;
            debug!("transaction committed");
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close_inner() {
                tracing::error!(error = %e, "failed to close write session on drop");
            }
        }
    }
}
