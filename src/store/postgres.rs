use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use super::{Store, StoreError, TicketStore, UserStore};
use crate::core::shared::models::{
    normalize_email, NewTicket, NewUser, Priority, Ticket, TicketAnnex, TicketFilter,
    TicketStatus, User, UserChanges,
};
use crate::core::shared::schema::{tickets, users};
use crate::core::shared::utils::DbPool;
use crate::security::auth_api::Role;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    skills: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {e}", row.id)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            skills: row.skills,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct TicketRow {
    id: Uuid,
    title: String,
    description: String,
    status: String,
    created_by: Uuid,
    assigned_to: Option<Uuid>,
    deadline: Option<DateTime<Utc>>,
    summary: Option<String>,
    priority: Option<String>,
    helpful_notes: Option<String>,
    related_skills: Vec<String>,
    triaged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TicketStatus>()
            .map_err(|e| StoreError::Corrupt(format!("ticket {}: {e}", row.id)))?;
        let priority = row
            .priority
            .as_deref()
            .map(|p| {
                p.parse::<Priority>()
                    .map_err(|e| StoreError::Corrupt(format!("ticket {}: {e}", row.id)))
            })
            .transpose()?;
        Ok(Ticket {
            id: row.id,
            title: row.title,
            description: row.description,
            status,
            created_by: row.created_by,
            assigned_to: row.assigned_to,
            deadline: row.deadline,
            summary: row.summary,
            priority,
            helpful_notes: row.helpful_notes,
            related_skills: row.related_skills,
            triaged_at: row.triaged_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset {
    role: Option<String>,
    skills: Option<Vec<String>>,
}

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Diesel-backed store. Every query runs on the blocking pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Pool(format!("Failed to get database connection: {e}")))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn to_users(rows: Vec<UserRow>) -> Result<Vec<User>, StoreError> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: normalize_email(&user.email),
            password_hash: user.password_hash,
            role: user.role.as_str().to_string(),
            skills: user.skills,
            created_at: Utc::now(),
        };
        self.run(move |conn| {
            let email = row.email.clone();
            let inserted: UserRow = diesel::insert_into(users::table)
                .values(&row)
                .returning(UserRow::as_returning())
                .get_result(conn)
                .map_err(|e| match StoreError::from(e) {
                    StoreError::Conflict(_) => StoreError::Conflict(format!(
                        "A user with email {email} already exists"
                    )),
                    other => other,
                })?;
            User::try_from(inserted)
        })
        .await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.run(move |conn| {
            users::table
                .find(id)
                .select(UserRow::as_select())
                .first(conn)
                .optional()?
                .map(User::try_from)
                .transpose()
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        self.run(move |conn| {
            users::table
                .filter(users::email.eq(email))
                .select(UserRow::as_select())
                .first(conn)
                .optional()?
                .map(User::try_from)
                .transpose()
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.run(|conn| {
            let rows = users::table
                .order(users::created_at.asc())
                .select(UserRow::as_select())
                .load(conn)?;
            to_users(rows)
        })
        .await
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        self.run(move |conn| {
            let rows = users::table
                .filter(users::role.eq(role.as_str()))
                .order(users::created_at.asc())
                .select(UserRow::as_select())
                .load(conn)?;
            to_users(rows)
        })
        .await
    }

    async fn update_user(
        &self,
        email: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        let changeset = UserChangeset {
            role: changes.role.map(|r| r.as_str().to_string()),
            skills: changes.skills,
        };
        self.run(move |conn| {
            let target = users::table.filter(users::email.eq(&email));
            let row = if changeset.role.is_none() && changeset.skills.is_none() {
                target.select(UserRow::as_select()).first(conn).optional()?
            } else {
                diesel::update(target)
                    .set(&changeset)
                    .returning(UserRow::as_returning())
                    .get_result(conn)
                    .optional()?
            };
            row.map(User::try_from).transpose()
        })
        .await
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn insert_ticket(&self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        let now = Utc::now();
        let row = TicketRow {
            id: Uuid::new_v4(),
            title: ticket.title,
            description: ticket.description,
            status: TicketStatus::Todo.as_str().to_string(),
            created_by: ticket.created_by,
            assigned_to: None,
            deadline: ticket.deadline,
            summary: None,
            priority: None,
            helpful_notes: None,
            related_skills: Vec::new(),
            triaged_at: None,
            created_at: now,
            updated_at: now,
        };
        self.run(move |conn| {
            let inserted: TicketRow = diesel::insert_into(tickets::table)
                .values(&row)
                .returning(TicketRow::as_returning())
                .get_result(conn)?;
            Ticket::try_from(inserted)
        })
        .await
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        self.run(move |conn| {
            tickets::table
                .find(id)
                .select(TicketRow::as_select())
                .first(conn)
                .optional()?
                .map(Ticket::try_from)
                .transpose()
        })
        .await
    }

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        self.run(move |conn| {
            let mut query = tickets::table
                .order(tickets::created_at.desc())
                .select(TicketRow::as_select())
                .into_boxed();
            if let Some(owner) = filter.created_by {
                query = query.filter(tickets::created_by.eq(owner));
            }
            query
                .load(conn)?
                .into_iter()
                .map(Ticket::try_from)
                .collect()
        })
        .await
    }

    async fn set_ticket_status(&self, id: Uuid, status: TicketStatus) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let updated = diesel::update(tickets::table.find(id))
                .set((
                    tickets::status.eq(status.as_str()),
                    tickets::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn apply_triage(&self, id: Uuid, annex: &TicketAnnex) -> Result<bool, StoreError> {
        let annex = annex.clone();
        self.run(move |conn| {
            let now = Utc::now();
            let updated = diesel::update(
                tickets::table
                    .find(id)
                    .filter(tickets::triaged_at.is_null()),
            )
            .set((
                tickets::summary.eq(Some(annex.summary)),
                tickets::priority.eq(Some(annex.priority.as_str())),
                tickets::helpful_notes.eq(Some(annex.helpful_notes)),
                tickets::related_skills.eq(annex.related_skills),
                tickets::status.eq(TicketStatus::InProgress.as_str()),
                tickets::triaged_at.eq(Some(now)),
                tickets::updated_at.eq(now),
            ))
            .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn assign_ticket(&self, id: Uuid, assignee: Option<Uuid>) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let updated = diesel::update(tickets::table.find(id))
                .set((
                    tickets::assigned_to.eq(assignee),
                    tickets::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
