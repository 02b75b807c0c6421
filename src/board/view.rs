//! Read model of the roadmap board.
//!
//! Explicit items come first in each column, in stored position order.
//! Requests without an item follow as synced entries in the column their
//! status maps to.

use std::collections::HashSet;

use rusqlite::{Connection, params};

use super::db::{fetch_project, query_items, query_requests};
use super::models::{BoardColumn, BoardEntry, BoardView, ColumnView, Request, RoadmapItem};
use super::sync::status_to_column;
use crate::errors::{BoardError, BoardResult};

/// Assemble the board from its two sources.
///
/// A request that is linked by any item in `items` is never projected, even
/// if it also shows up in `unlinked`; hidden statuses are dropped.
pub fn compose(project_id: i64, items: Vec<RoadmapItem>, unlinked: Vec<Request>) -> BoardView {
    let linked: HashSet<i64> = items.iter().filter_map(|i| i.request_id).collect();

    let mut columns: Vec<ColumnView> = BoardColumn::ALL
        .iter()
        .map(|&name| ColumnView {
            name,
            entries: Vec::new(),
        })
        .collect();

    let mut items = items;
    items.sort_by_key(|i| (i.position, i.id));
    for item in items {
        bucket(&mut columns, item.column).push(BoardEntry::Explicit { item });
    }

    let mut unlinked: Vec<Request> = unlinked
        .into_iter()
        .filter(|r| !linked.contains(&r.id) && !r.status.is_hidden_from_board())
        .collect();
    unlinked.sort_by_key(|r| r.id);
    for request in unlinked {
        let column = status_to_column(request.status);
        bucket(&mut columns, column).push(BoardEntry::Synced { request, column });
    }

    BoardView {
        project_id,
        columns,
    }
}

fn bucket(columns: &mut [ColumnView], name: BoardColumn) -> &mut Vec<BoardEntry> {
    let idx = match name {
        BoardColumn::Backlog => 0,
        BoardColumn::InProgress => 1,
        BoardColumn::Released => 2,
    };
    &mut columns[idx].entries
}

/// Load the board for one project.
pub fn load_board(conn: &Connection, project_id: i64) -> BoardResult<BoardView> {
    if fetch_project(conn, project_id)?.is_none() {
        return Err(BoardError::not_found("Project", project_id));
    }
    let items = query_items(
        conn,
        "WHERE ri.project_id = ?1 ORDER BY ri.column_name, ri.position, ri.id",
        params![project_id],
    )?;
    let unlinked = query_requests(
        conn,
        "WHERE r.project_id = ?1
           AND r.status NOT IN ('rejected', 'duplicate', 'archived')
           AND NOT EXISTS (SELECT 1 FROM roadmap_items ri WHERE ri.request_id = r.id)
         ORDER BY r.id",
        params![project_id],
    )?;
    Ok(compose(project_id, items, unlinked))
}
