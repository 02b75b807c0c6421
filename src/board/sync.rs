//! Board column ↔ request status mapping.
//!
//! Every operation that needs to translate between the two axes goes
//! through [`column_to_status`] or [`status_to_column`]; the table lives
//! nowhere else.

use rusqlite::{Connection, params};
use tracing::{info, warn};

use super::db::{append_activity, fetch_request, now_timestamp};
use super::models::{ActivityAction, ActivityLogEntry, BoardColumn, RequestStatus};
use crate::errors::{BoardError, BoardResult};

/// Status a linked request takes when its item lands in `column`.
pub fn column_to_status(column: BoardColumn) -> RequestStatus {
    match column {
        BoardColumn::Backlog => RequestStatus::Backlog,
        BoardColumn::InProgress => RequestStatus::InProgress,
        BoardColumn::Released => RequestStatus::Completed,
    }
}

/// Column an un-boarded request is projected into.
pub fn status_to_column(status: RequestStatus) -> BoardColumn {
    match status {
        RequestStatus::InProgress => BoardColumn::InProgress,
        RequestStatus::Completed => BoardColumn::Released,
        _ => BoardColumn::Backlog,
    }
}

/// Bring a linked request's status in line with `column`.
///
/// Writes the new status and a `status_change` activity entry attributed to
/// `actor_id`. Returns `None` when nothing changed: the status already
/// matches, or the request has been merged (its `duplicate` status is
/// terminal).
pub fn sync_request_status(
    conn: &Connection,
    request_id: i64,
    column: BoardColumn,
    actor_id: i64,
) -> BoardResult<Option<ActivityLogEntry>> {
    let request =
        fetch_request(conn, request_id)?.ok_or_else(|| BoardError::not_found("Request", request_id))?;

    if request.is_merged() {
        warn!(
            request_id,
            merged_into = request.merged_into_id,
            "skipping status sync for merged request"
        );
        return Ok(None);
    }

    let new_status = column_to_status(column);
    if request.status == new_status {
        return Ok(None);
    }

    conn.execute(
        "UPDATE requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![new_status.as_str(), now_timestamp(), request_id],
    )?;
    let entry = append_activity(
        conn,
        request_id,
        actor_id,
        ActivityAction::StatusChange,
        Some(request.status.as_str()),
        Some(new_status.as_str()),
    )?;
    info!(
        request_id,
        from = %request.status,
        to = %new_status,
        "request status synced from board"
    );
    Ok(Some(entry))
}
