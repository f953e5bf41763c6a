//! Persistence for users and tickets.
//!
//! Handlers and job functions only see the [`Store`] trait object. The
//! PostgreSQL implementation is used when `DATABASE_URL` is configured,
//! otherwise everything lives in memory for the lifetime of the process.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use regex::RegexBuilder;
use thiserror::Error;
use uuid::Uuid;

use crate::core::shared::models::{
    NewTicket, NewUser, Ticket, TicketAnnex, TicketFilter, TicketStatus, User, UserChanges,
};
use crate::security::auth_api::Role;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("blocking task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Users holding `role`, oldest first.
    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError>;
    async fn update_user(&self, email: &str, changes: UserChanges)
        -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_ticket(&self, ticket: NewTicket) -> Result<Ticket, StoreError>;
    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;
    /// Newest first.
    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError>;
    async fn set_ticket_status(&self, id: Uuid, status: TicketStatus) -> Result<bool, StoreError>;
    /// Writes the annex and moves the ticket to `IN_PROGRESS`. Returns `false`
    /// without touching the row when the ticket is missing or already triaged.
    async fn apply_triage(&self, id: Uuid, annex: &TicketAnnex) -> Result<bool, StoreError>;
    async fn assign_ticket(&self, id: Uuid, assignee: Option<Uuid>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait Store: UserStore + TicketStore {
    async fn ping(&self) -> Result<(), StoreError>;
    fn backend_name(&self) -> &'static str;
}

/// First moderator (oldest first) with a skill matching any of `related_skills`.
///
/// Each related skill is escaped and the set is joined into one
/// case-insensitive alternation tested against every moderator skill.
pub async fn find_matching_moderator(
    store: &dyn Store,
    related_skills: &[String],
) -> Result<Option<User>, StoreError> {
    let Some(pattern) = skills_pattern(related_skills) else {
        return Ok(None);
    };
    let moderators = store.users_with_role(Role::Moderator).await?;
    Ok(moderators
        .into_iter()
        .find(|m| m.skills.iter().any(|skill| pattern.is_match(skill))))
}

fn skills_pattern(related_skills: &[String]) -> Option<regex::Regex> {
    let alternation = related_skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        return None;
    }
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .ok()
}
