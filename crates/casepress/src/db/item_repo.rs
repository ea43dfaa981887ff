//! Item repository: CRUD and guarded state updates for the `items` table.

use rusqlite::{params, OptionalExtension, Row};

use super::codec::{self, json_column, now, parsed_column, time_column, to_json};
use super::{Database, DatabaseError};
use crate::chunker::RiskLevel;
use crate::item::{ItemState, WorkItem};

fn item_from_row(row: &Row<'_>) -> Result<WorkItem, rusqlite::Error> {
    let risk: Option<String> = row.get("privacy_risk")?;
    Ok(WorkItem {
        id: row.get("id")?,
        batch_id: row.get("batch_id")?,
        filename: row.get("filename")?,
        content_hash: row.get("content_hash")?,
        state: parsed_column(row, "state")?,
        progress: row.get("progress")?,
        progress_message: row.get("progress_message")?,
        failure_reason: row.get("failure_reason")?,
        raw_text: row.get("raw_text")?,
        cleaned_text: row.get("cleaned_text")?,
        deidentified_text: row.get("deidentified_text")?,
        privacy_risk: risk.as_deref().map(RiskLevel::parse_lenient),
        requires_review: row.get("requires_review")?,
        review_notes: row.get("review_notes")?,
        analysis: json_column(row, "analysis")?,
        draft: json_column(row, "draft")?,
        quality_report: json_column(row, "quality_report")?,
        review_draft: json_column(row, "review_draft")?,
        external_ref: row.get("external_ref")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

/// Inserts a new item row.
pub fn insert(db: &Database, item: &WorkItem) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO items (id, batch_id, filename, content_hash, state, progress,
             progress_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id,
                item.batch_id,
                item.filename,
                item.content_hash,
                item.state.as_str(),
                item.progress,
                item.progress_message,
                codec::timestamp(&item.created_at),
                codec::timestamp(&item.updated_at),
            ],
        )?;
        Ok(())
    })
}

fn write_item(
    db: &Database,
    item: &WorkItem,
    expected: Option<ItemState>,
) -> Result<bool, DatabaseError> {
    let analysis = to_json(item.analysis.as_ref())?;
    let draft = to_json(item.draft.as_ref())?;
    let report = to_json(item.quality_report.as_ref())?;
    let review_draft = to_json(item.review_draft.as_ref())?;
    let guard = if expected.is_some() {
        " AND state = ?20"
    } else {
        " AND ?20 IS NULL"
    };
    let sql = format!(
        "UPDATE items SET state = ?2, progress = ?3, progress_message = ?4,
         failure_reason = ?5, raw_text = ?6, cleaned_text = ?7, deidentified_text = ?8,
         privacy_risk = ?9, requires_review = ?10, review_notes = ?11, analysis = ?12,
         draft = ?13, quality_report = ?14, review_draft = ?15, external_ref = ?16,
         updated_at = ?17, filename = ?18, content_hash = ?19
         WHERE id = ?1{}",
        guard
    );
    db.with_conn(|conn| {
        let changed = conn.execute(
            &sql,
            params![
                item.id,
                item.state.as_str(),
                item.progress,
                item.progress_message,
                item.failure_reason,
                item.raw_text,
                item.cleaned_text,
                item.deidentified_text,
                item.privacy_risk.map(|r| r.as_str()),
                item.requires_review,
                item.review_notes,
                analysis,
                draft,
                report,
                review_draft,
                item.external_ref,
                now(),
                item.filename,
                item.content_hash,
                expected.map(|s| s.as_str()),
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Overwrites every mutable column of an item.
pub fn save(db: &Database, item: &WorkItem) -> Result<(), DatabaseError> {
    write_item(db, item, None)?;
    Ok(())
}

/// Overwrites an item only if its stored state is still `expected`.
/// Returns `false` when another writer moved it first.
pub fn save_if_state(
    db: &Database,
    item: &WorkItem,
    expected: ItemState,
) -> Result<bool, DatabaseError> {
    write_item(db, item, Some(expected))
}

/// Finds an item by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<WorkItem>, DatabaseError> {
    db.with_conn(|conn| {
        let item = conn
            .query_row("SELECT * FROM items WHERE id = ?1", params![id], item_from_row)
            .optional()?;
        Ok(item)
    })
}

/// Compare-and-set state change. Progress never moves backwards.
pub fn transition(
    db: &Database,
    id: &str,
    from: ItemState,
    to: ItemState,
    progress: u8,
    message: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE items SET state = ?3, progress = MAX(progress, ?4), progress_message = ?5,
             updated_at = ?6 WHERE id = ?1 AND state = ?2",
            params![id, from.as_str(), to.as_str(), progress, message, now()],
        )?;
        Ok(changed == 1)
    })
}

/// Records progress; the stored value is the maximum ever reported.
pub fn update_progress(
    db: &Database,
    id: &str,
    progress: u8,
    message: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE items SET progress = MAX(progress, ?2), progress_message = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, progress.min(100), message, now()],
        )?;
        Ok(())
    })
}

/// Marks a live item failed with a reason. Already finished items are left alone.
pub fn mark_failed(db: &Database, id: &str, reason: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE items SET state = 'failed', failure_reason = ?2, progress_message = ?2,
             updated_at = ?3 WHERE id = ?1 AND state NOT IN ('failed', 'published')",
            params![id, reason, now()],
        )?;
        Ok(changed == 1)
    })
}

/// Up to `limit` items of a batch ready for the pipeline, oldest first.
pub fn fetch_eligible(
    db: &Database,
    batch_id: &str,
    limit: usize,
) -> Result<Vec<WorkItem>, DatabaseError> {
    let sql = format!(
        "SELECT * FROM items WHERE batch_id = ?1 AND state IN ({})
         ORDER BY created_at ASC, rowid ASC LIMIT ?2",
        codec::state_list(&ItemState::ELIGIBLE)
    );
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![batch_id, limit as i64], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// All items of a batch, oldest first.
pub fn list_by_batch(db: &Database, batch_id: &str) -> Result<Vec<WorkItem>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM items WHERE batch_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![batch_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_in_states(
    db: &Database,
    batch_id: &str,
    states: &[ItemState],
) -> Result<usize, DatabaseError> {
    let sql = format!(
        "SELECT COUNT(*) FROM items WHERE batch_id = ?1 AND state IN ({})",
        codec::state_list(states)
    );
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(&sql, params![batch_id], |r| r.get(0))?;
        Ok(count.max(0) as usize)
    })
}

/// An item of the batch with the same content hash, if one exists.
pub fn find_by_hash(
    db: &Database,
    batch_id: &str,
    content_hash: &str,
) -> Result<Option<WorkItem>, DatabaseError> {
    db.with_conn(|conn| {
        let item = conn
            .query_row(
                "SELECT * FROM items WHERE batch_id = ?1 AND content_hash = ?2
                 ORDER BY created_at ASC LIMIT 1",
                params![batch_id, content_hash],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    })
}
