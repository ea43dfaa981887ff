//! Batch repository: the `batches` and `batch_errors` tables.

use rusqlite::{params, OptionalExtension, Row};

use super::codec::{self, now, optional_time_column, parsed_column, time_column};
use super::{Database, DatabaseError};
use crate::batch::{Batch, BatchErrorEntry, BatchStatistics, BatchStatus, ItemOutcome};
use crate::item::ItemState;

fn batch_from_row(row: &Row<'_>) -> Result<Batch, rusqlite::Error> {
    Ok(Batch {
        id: row.get("id")?,
        name: row.get("name")?,
        status: parsed_column(row, "status")?,
        total: row.get("total")?,
        processed: row.get("processed")?,
        successful: row.get("successful")?,
        failed: row.get("failed")?,
        skipped: row.get("skipped")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
        started_at: optional_time_column(row, "started_at")?,
        completed_at: optional_time_column(row, "completed_at")?,
    })
}

/// Inserts a new batch row.
pub fn insert(db: &Database, batch: &Batch) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO batches (id, name, status, total, processed, successful, failed,
             skipped, created_at, updated_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                batch.id,
                batch.name,
                batch.status.as_str(),
                batch.total,
                batch.processed,
                batch.successful,
                batch.failed,
                batch.skipped,
                codec::timestamp(&batch.created_at),
                codec::timestamp(&batch.updated_at),
                batch.started_at.as_ref().map(codec::timestamp),
                batch.completed_at.as_ref().map(codec::timestamp),
            ],
        )?;
        Ok(())
    })
}

/// Finds a batch by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Batch>, DatabaseError> {
    db.with_conn(|conn| {
        let batch = conn
            .query_row("SELECT * FROM batches WHERE id = ?1", params![id], batch_from_row)
            .optional()?;
        Ok(batch)
    })
}

/// Lists batches in a status, oldest first.
pub fn list_by_status(db: &Database, status: BatchStatus) -> Result<Vec<Batch>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM batches WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![status.as_str()], batch_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a batch from one of `from` to `to`, stamping `started_at` or
/// `completed_at` as appropriate. Returns `false` if the batch was not in
/// any of the expected statuses.
pub fn transition(
    db: &Database,
    id: &str,
    from: &[BatchStatus],
    to: BatchStatus,
) -> Result<bool, DatabaseError> {
    let allowed = from
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let stamp = match to {
        BatchStatus::Processing => ", started_at = ?2",
        s if s.is_terminal() => ", completed_at = ?2",
        _ => "",
    };
    let sql = format!(
        "UPDATE batches SET status = ?1, updated_at = ?2{} WHERE id = ?3 AND status IN ({})",
        stamp, allowed
    );
    db.with_conn(|conn| {
        let changed = conn.execute(&sql, params![to.as_str(), now(), id])?;
        Ok(changed == 1)
    })
}

/// Increments `total` for a newly added item.
pub fn increment_total(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE batches SET total = total + 1, updated_at = ?2 WHERE id = ?1",
            params![id, now()],
        )?;
        Ok(())
    })
}

/// Counts one finished item and, if given, appends its error, in one
/// transaction. Counter updates are relative so concurrent completions
/// never lose an increment.
pub fn record_outcome(
    db: &Database,
    batch_id: &str,
    outcome: ItemOutcome,
    error: Option<(&str, &str)>,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE batches SET processed = processed + 1, {col} = {col} + 1, updated_at = ?2
         WHERE id = ?1",
        col = outcome.column()
    );
    db.with_transaction(|tx| {
        let at = now();
        tx.execute(&sql, params![batch_id, at])?;
        if let Some((item_id, message)) = error {
            tx.execute(
                "INSERT INTO batch_errors (batch_id, item_id, error, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![batch_id, item_id, message, at],
            )?;
        }
        Ok(())
    })
}

/// Takes back one counted outcome after an administrative reset, so the item
/// can be counted again when it finishes.
pub fn revert_outcome(
    db: &Database,
    batch_id: &str,
    outcome: ItemOutcome,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE batches SET processed = MAX(processed - 1, 0), {col} = MAX({col} - 1, 0),
         updated_at = ?2 WHERE id = ?1",
        col = outcome.column()
    );
    db.with_conn(|conn| {
        conn.execute(&sql, params![batch_id, now()])?;
        Ok(())
    })
}

/// Puts a completed batch back into processing after one of its items was
/// reset. Other statuses are left alone.
pub fn reopen(db: &Database, batch_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE batches SET status = 'processing', completed_at = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'completed'",
            params![batch_id, now()],
        )?;
        Ok(changed == 1)
    })
}

/// Counts a rejected upload: it adds to `total`, `skipped` and `processed`
/// together and logs why.
pub fn record_skipped_upload(
    db: &Database,
    batch_id: &str,
    filename: &str,
    reason: &str,
) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        let at = now();
        tx.execute(
            "UPDATE batches SET total = total + 1, skipped = skipped + 1,
             processed = processed + 1, updated_at = ?2 WHERE id = ?1",
            params![batch_id, at],
        )?;
        tx.execute(
            "INSERT INTO batch_errors (batch_id, filename, error, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![batch_id, filename, reason, at],
        )?;
        Ok(())
    })
}

/// The error log of a batch, in append order.
pub fn errors_for(db: &Database, batch_id: &str) -> Result<Vec<BatchErrorEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT item_id, filename, error, created_at FROM batch_errors
             WHERE batch_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![batch_id], |row| {
                Ok(BatchErrorEntry {
                    item_id: row.get("item_id")?,
                    filename: row.get("filename")?,
                    error: row.get("error")?,
                    timestamp: time_column(row, "created_at")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Marks a processing batch completed once none of its items is unfinished.
/// Returns whether the batch was completed by this call.
pub fn complete_if_drained(db: &Database, batch_id: &str) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE batches SET status = 'completed', completed_at = ?2, updated_at = ?2
         WHERE id = ?1 AND status = 'processing'
         AND NOT EXISTS (SELECT 1 FROM items WHERE items.batch_id = ?1 AND items.state IN ({}))",
        codec::state_list(&ItemState::UNFINISHED)
    );
    db.with_conn(|conn| {
        let changed = conn.execute(&sql, params![batch_id, now()])?;
        Ok(changed == 1)
    })
}

/// Aggregate counts across all batches.
pub fn statistics(db: &Database) -> Result<BatchStatistics, DatabaseError> {
    db.with_conn(|conn| {
        let mut stats = BatchStatistics::default();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*), SUM(total), SUM(processed), SUM(successful),
             SUM(failed), SUM(skipped) FROM batches GROUP BY status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<i64>>(2)?.unwrap_or(0).max(0) as u64,
                row.get::<_, Option<i64>>(3)?.unwrap_or(0).max(0) as u64,
                row.get::<_, Option<i64>>(4)?.unwrap_or(0).max(0) as u64,
                row.get::<_, Option<i64>>(5)?.unwrap_or(0).max(0) as u64,
                row.get::<_, Option<i64>>(6)?.unwrap_or(0).max(0) as u64,
            ))
        })?;
        for row in rows {
            let (status, count, total, processed, successful, failed, skipped) = row?;
            stats.total_batches += count;
            match status.parse::<BatchStatus>() {
                Ok(BatchStatus::Pending) => stats.pending += count,
                Ok(BatchStatus::Processing) => stats.processing += count,
                Ok(BatchStatus::Completed) => stats.completed += count,
                Ok(BatchStatus::Failed) => stats.failed += count,
                Ok(BatchStatus::Cancelled) => stats.cancelled += count,
                Err(e) => log::warn!("Ignoring batches with {}", e),
            }
            stats.total_items += total;
            stats.processed_items += processed;
            stats.successful_items += successful;
            stats.failed_items += failed;
            stats.skipped_items += skipped;
        }
        Ok(stats)
    })
}
