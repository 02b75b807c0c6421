use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{BoardError, BoardResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// The board's grouping axis. Discovery is a flag on the item, not a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BoardColumn {
    Backlog,
    InProgress,
    Released,
}

impl BoardColumn {
    /// Display order of the board.
    pub const ALL: [BoardColumn; 3] = [Self::Backlog, Self::InProgress, Self::Released];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::Released => "released",
        }
    }
}

impl std::fmt::Display for BoardColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Self::Backlog),
            "in_progress" => Ok(Self::InProgress),
            "released" => Ok(Self::Released),
            _ => Err(format!("Invalid column: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    UnderReview,
    Planned,
    Backlog,
    InProgress,
    Completed,
    Rejected,
    Duplicate,
    Archived,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Planned => "planned",
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Duplicate => "duplicate",
            Self::Archived => "archived",
        }
    }

    /// Statuses that never surface on the board as a synthetic projection.
    pub fn is_hidden_from_board(&self) -> bool {
        matches!(self, Self::Rejected | Self::Duplicate | Self::Archived)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "under_review" => Ok(Self::UnderReview),
            "planned" => Ok(Self::Planned),
            "backlog" => Ok(Self::Backlog),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "duplicate" => Ok(Self::Duplicate),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
        }
    }
}

impl FromStr for VoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(Self::Upvote),
            "downvote" => Ok(Self::Downvote),
            _ => Err(format!("Invalid vote type: {}", s)),
        }
    }
}

/// Descriptive fields shared by requests and the items copied from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: i64,
    pub project_id: i64,
    #[serde(flatten)]
    pub fields: ItemFields,
    pub status: RequestStatus,
    pub merged_into_id: Option<i64>,
    pub vote_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Request {
    pub fn is_merged(&self) -> bool {
        self.merged_into_id.is_some()
    }
}

/// An explicit, persisted card on the board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoadmapItem {
    pub id: i64,
    pub project_id: i64,
    pub request_id: Option<i64>,
    pub column: BoardColumn,
    pub position: i32,
    #[serde(flatten)]
    pub fields: ItemFields,
    pub is_discovery: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub request_id: i64,
    pub user_id: i64,
    pub vote_type: VoteType,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub request_id: i64,
    pub user_id: i64,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    StatusChange,
    Merge,
    MergeReceived,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::Merge => "merge",
            Self::MergeReceived => "merge_received",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_change" => Ok(Self::StatusChange),
            "merge" => Ok(Self::Merge),
            "merge_received" => Ok(Self::MergeReceived),
            _ => Err(format!("Invalid activity action: {}", s)),
        }
    }
}

/// Append-only audit record of a state transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub request_id: i64,
    pub user_id: i64,
    pub action: ActivityAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: String,
}

/// Role resolved by the upstream authentication layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// The identity a mutation is performed and audited as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn member(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Gate for board mutations.
    pub fn require_admin(&self, action: &str) -> BoardResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BoardError::Forbidden(format!(
                "User {} may not {}: admin role required",
                self.user_id, action
            )))
        }
    }
}

// Operation inputs and outputs

/// Input for `CreateItem`. Column defaults to backlog, position to the end.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    #[serde(flatten)]
    pub fields: ItemFields,
    pub column: Option<BoardColumn>,
    pub position: Option<i32>,
    #[serde(default)]
    pub is_discovery: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeOptions {
    #[serde(default)]
    pub merge_votes: bool,
    #[serde(default)]
    pub merge_comments: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub source: Request,
    pub target: Request,
    pub votes_moved: usize,
    pub votes_dropped: usize,
    pub comments_moved: usize,
}

// Board view types

/// One card on the rendered board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardEntry {
    /// A persisted roadmap item.
    Explicit { item: RoadmapItem },
    /// A computed projection of a request that has no item yet.
    Synced {
        request: Request,
        column: BoardColumn,
    },
}

impl BoardEntry {
    /// The request this entry stands for, if any.
    pub fn request_id(&self) -> Option<i64> {
        match self {
            Self::Explicit { item } => item.request_id,
            Self::Synced { request, .. } => Some(request.id),
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnView {
    pub name: BoardColumn,
    pub entries: Vec<BoardEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardView {
    pub project_id: i64,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, name: BoardColumn) -> &[BoardEntry] {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }
}

/// A column whose stored positions are not exactly `0..n`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefect {
    pub project_id: i64,
    pub column: BoardColumn,
    pub positions: Vec<i32>,
}
