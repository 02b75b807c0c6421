//! Folding a duplicate request into a canonical one.
//!
//! ## Sequence
//!
//! 1. Votes (optional): union of source and target keyed on
//!    `(user, vote_type)`; every source vote is removed afterwards.
//! 2. Comments (optional): re-parented onto the target, authorship intact.
//! 3. Source is marked `duplicate` with `merged_into_id = target`.
//! 4. One audit entry on each side.
//!
//! The caller runs all of this inside one write transaction. A merge that
//! fails at any step leaves no trace, and a retried merge of an already
//! merged source is rejected before anything is written.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::db::{append_activity, fetch_request, now_timestamp, query_votes};
use super::models::{ActivityAction, MergeOptions, MergeResult, Request, RequestStatus, Vote, VoteType};
use crate::errors::{BoardError, BoardResult};

/// Product rules for merges that the data model alone does not settle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Allow a merge whose target has itself been merged away.
    #[serde(default)]
    pub allow_duplicate_target: bool,
}

/// Votes to copy onto the target, and how many source votes the target
/// already had an equivalent for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotePlan {
    pub to_copy: Vec<(i64, VoteType)>,
    pub dropped: usize,
}

pub fn plan_vote_union(source: &[Vote], target: &[Vote]) -> VotePlan {
    let existing: HashSet<(i64, VoteType)> =
        target.iter().map(|v| (v.user_id, v.vote_type)).collect();
    let mut to_copy = Vec::new();
    let mut dropped = 0;
    for vote in source {
        let key = (vote.user_id, vote.vote_type);
        if existing.contains(&key) {
            dropped += 1;
        } else {
            to_copy.push(key);
        }
    }
    VotePlan { to_copy, dropped }
}

fn check_merge(source: &Request, target: &Request, policy: MergePolicy) -> BoardResult<()> {
    if let Some(existing) = source.merged_into_id {
        return Err(BoardError::validation(format!(
            "Request {} is already merged into #{}",
            source.id, existing
        )));
    }
    if source.project_id != target.project_id {
        return Err(BoardError::validation(format!(
            "Requests {} and {} belong to different projects",
            source.id, target.id
        )));
    }
    if target.is_merged() && !policy.allow_duplicate_target {
        return Err(BoardError::validation(format!(
            "Target request {} is itself merged into #{}",
            target.id,
            target.merged_into_id.unwrap_or_default()
        )));
    }
    Ok(())
}

pub fn merge_requests(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    opts: MergeOptions,
    policy: MergePolicy,
    actor_id: i64,
) -> BoardResult<MergeResult> {
    if source_id == target_id {
        return Err(BoardError::validation("Cannot merge a request into itself"));
    }
    let source =
        fetch_request(conn, source_id)?.ok_or_else(|| BoardError::not_found("Request", source_id))?;
    let target =
        fetch_request(conn, target_id)?.ok_or_else(|| BoardError::not_found("Request", target_id))?;
    check_merge(&source, &target, policy)?;

    let now = now_timestamp();

    let (votes_moved, votes_dropped) = if opts.merge_votes {
        let plan = plan_vote_union(
            &query_votes(conn, source_id)?,
            &query_votes(conn, target_id)?,
        );
        let mut insert = conn.prepare(
            "INSERT INTO votes (request_id, user_id, vote_type, created_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (user_id, vote_type) in &plan.to_copy {
            insert.execute(params![target_id, user_id, vote_type.as_str(), now])?;
        }
        conn.execute("DELETE FROM votes WHERE request_id = ?1", params![source_id])?;
        (plan.to_copy.len(), plan.dropped)
    } else {
        (0, 0)
    };

    let comments_moved = if opts.merge_comments {
        conn.execute(
            "UPDATE comments SET request_id = ?1 WHERE request_id = ?2",
            params![target_id, source_id],
        )?
    } else {
        0
    };

    conn.execute(
        "UPDATE requests SET status = ?1, merged_into_id = ?2, updated_at = ?3 WHERE id = ?4",
        params![RequestStatus::Duplicate.as_str(), target_id, now, source_id],
    )?;

    append_activity(
        conn,
        source_id,
        actor_id,
        ActivityAction::Merge,
        Some(source.status.as_str()),
        Some(&format!("merged into #{}", target_id)),
    )?;
    append_activity(
        conn,
        target_id,
        actor_id,
        ActivityAction::MergeReceived,
        None,
        Some(&format!("merged from #{}", source_id)),
    )?;

    let orphaned: Option<i64> = conn
        .query_row(
            "SELECT id FROM roadmap_items WHERE request_id = ?1",
            params![source_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(item_id) = orphaned {
        warn!(source_id, target_id, item_id, "merged request keeps its roadmap item");
    }

    info!(
        source_id,
        target_id,
        votes_moved,
        votes_dropped,
        comments_moved,
        "requests merged"
    );

    Ok(MergeResult {
        source: fetch_request(conn, source_id)?
            .ok_or_else(|| BoardError::not_found("Request", source_id))?,
        target: fetch_request(conn, target_id)?
            .ok_or_else(|| BoardError::not_found("Request", target_id))?,
        votes_moved,
        votes_dropped,
        comments_moved,
    })
}
