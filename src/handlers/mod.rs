//! Handler modules for the orchestration core's HTTP surface (§6).
//!
//! - `auth` — login/logout/register
//! - `chat` — the chat orchestrator pipeline, bookmarks, save-as-note
//! - `feedback` — feedback submission
//! - `health` — health, readiness, circuit-status snapshot
//! - `jobs` — wiki generation job lifecycle

pub mod auth;
pub mod chat;
pub mod feedback;
pub mod health;
pub mod jobs;
pub mod sessions;

pub use auth::*;
pub use chat::*;
pub use feedback::*;
pub use health::*;
pub use jobs::*;
pub use sessions::*;
