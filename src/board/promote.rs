//! Turning a synced projection into an explicit roadmap item.

use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use super::db::fetch_request;
use super::models::{BoardColumn, NewItem, RoadmapItem};
use super::positions::insert_item;
use super::sync::sync_request_status;
use crate::errors::{BoardError, BoardResult};

/// Create an explicit item for `request_id` at `(column, position)`.
///
/// Fails with `Conflict` when the request already has an item, so the
/// request can never be represented twice.
pub fn promote_request(
    conn: &Connection,
    request_id: i64,
    column: BoardColumn,
    position: i32,
    actor_id: i64,
) -> BoardResult<RoadmapItem> {
    let request =
        fetch_request(conn, request_id)?.ok_or_else(|| BoardError::not_found("Request", request_id))?;

    if let Some(target) = request.merged_into_id {
        return Err(BoardError::validation(format!(
            "Request {} was merged into #{} and cannot be promoted",
            request_id, target
        )));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM roadmap_items WHERE request_id = ?1",
            params![request_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(item_id) = existing {
        return Err(BoardError::Conflict(format!(
            "Request {} is already on the board as item {}",
            request_id, item_id
        )));
    }

    let new = NewItem {
        fields: request.fields.clone(),
        column: Some(column),
        position: Some(position),
        is_discovery: false,
    };
    let item = insert_item(conn, request.project_id, &new, Some(request_id))?;
    sync_request_status(conn, request_id, column, actor_id)?;

    info!(
        request_id,
        item_id = item.id,
        column = %column,
        position = item.position,
        "request promoted to roadmap item"
    );
    Ok(item)
}
