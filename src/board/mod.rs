//! Roadmap board: request lifecycle consistency engine.
//!
//! ## Overview
//!
//! Feature requests collected from users are triaged onto a three-column
//! roadmap board (backlog, in progress, released). The board is backed by
//! explicit roadmap items, each with a per-column position, and requests
//! that have no item yet are projected onto it from their status. This
//! module keeps positions, statuses and the merge history consistent under
//! concurrent edits.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState, Actor)  │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ DbHandle::call_with_retry()            │
//!                       │         v                                        │
//!                       │  db.rs  (BoardDb: one IMMEDIATE tx per op)       │
//!                       │         │                                        │
//!                       │         ├─ positions.rs (ColumnOrder, Move)      │
//!                       │         ├─ sync.rs      (column ↔ status)        │
//!                       │         ├─ promote.rs   (request → item)         │
//!                       │         ├─ merge.rs     (duplicate folding)      │
//!                       │         └─ view.rs      (board read model)       │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module   | Responsibility                                             |
//! |----------|------------------------------------------------------------|
//! | `models` | Shared types: `RoadmapItem`, `Request`, `BoardEntry`       |
//! | `ws`     | `WsMessage` enum + `broadcast_message()` helper            |
//!
//! ## Typical Request Flow (drag a linked card to "Released")
//!
//! 1. `PATCH /api/items/{id}/move` → `api::move_item()`; the `Actor`
//!    extractor reads the caller's identity and the db layer checks the
//!    admin role.
//! 2. `BoardDb::move_item()` opens a `BEGIN IMMEDIATE` transaction, loads
//!    the source and destination columns as `ColumnOrder`s, validates the
//!    target slot, and writes back only the rows whose position changed.
//! 3. The column changed and the item is linked, so `sync_request_status()`
//!    sets the request to `completed` and appends a `status_change` entry.
//! 4. The transaction commits; on SQLITE_BUSY the whole operation is retried
//!    with backoff by `DbHandle`.
//! 5. `WsMessage::ItemMoved` is broadcast to connected clients.

pub mod api;
pub mod db;
pub mod merge;
pub mod models;
pub mod positions;
pub mod promote;
pub mod server;
pub mod sync;
pub mod view;
pub mod ws;
