//! Ticket routes under `/api/tickets`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::models::{
    NewTicket, Priority, Ticket, TicketFilter, TicketStatus, MAX_TITLE_LEN,
};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::events::TICKET_CREATED;
use crate::security::auth_api::{require_auth_middleware, AuthenticatedUser, Permission};
use crate::store::{Store, TicketStore, UserStore};

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<String>,
}

/// What a ticket's creator sees.
#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketSummary {
    fn from(t: &Ticket) -> Self {
        Self {
            id: t.id,
            title: t.title.clone(),
            description: t.description.clone(),
            status: t.status,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Assignee {
    pub id: Uuid,
    pub email: String,
}

/// What moderators and admins see.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_by: Uuid,
    pub assigned_to: Option<Assignee>,
    pub deadline: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub priority: Option<Priority>,
    pub helpful_notes: Option<String>,
    pub related_skills: Vec<String>,
    pub triaged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketDetails {
    fn new(t: Ticket, assignee: Option<Assignee>) -> Self {
        Self {
            id: t.id,
            title: t.title,
            description: t.description,
            status: t.status,
            created_by: t.created_by,
            assigned_to: assignee,
            deadline: t.deadline,
            summary: t.summary,
            priority: t.priority,
            helpful_notes: t.helpful_notes,
            related_skills: t.related_skills,
            triaged_at: t.triaged_at,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TicketView {
    Summary(TicketSummary),
    Details(TicketDetails),
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_deadline(raw: Option<String>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| ApiError::BadRequest(format!("Invalid deadline '{raw}', expected RFC 3339"))),
        None => Ok(None),
    }
}

/// Resolves assignee ids to `{id, email}`, looking each user up once.
async fn with_assignees(store: &dyn Store, tickets: Vec<Ticket>) -> Result<Vec<TicketDetails>, ApiError> {
    let mut cache: HashMap<Uuid, Option<Assignee>> = HashMap::new();
    let mut out = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        let assignee = match ticket.assigned_to {
            Some(id) => {
                if !cache.contains_key(&id) {
                    let user = store.find_user(id).await?;
                    cache.insert(id, user.map(|u| Assignee { id: u.id, email: u.email }));
                }
                cache.get(&id).cloned().flatten()
            }
            None => None,
        };
        out.push(TicketDetails::new(ticket, assignee));
    }
    Ok(out)
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if !user.has_permission(&Permission::CreateTickets) {
        return Err(ApiError::Forbidden("Forbidden".into()));
    }
    let (Some(title), Some(description)) = (required(req.title), required(req.description)) else {
        return Err(ApiError::BadRequest("Title and description are required".into()));
    };
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    let deadline = parse_deadline(req.deadline)?;

    let ticket = state
        .store
        .insert_ticket(NewTicket {
            title,
            description,
            created_by: user.user_id,
            deadline,
        })
        .await?;
    info!("Ticket {} created by {}", ticket.id, user.user_id);

    let data = json!({
        "ticket_id": ticket.id,
        "title": ticket.title,
        "description": ticket.description,
        "created_by": ticket.created_by,
    });
    if let Err(e) = state.events.send(TICKET_CREATED, data).await {
        warn!("Failed to emit {TICKET_CREATED} for ticket {}: {e}", ticket.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Ticket created and processing started",
            "ticket": ticket,
        })),
    ))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    if user.has_permission(&Permission::ReadAllTickets) {
        let tickets = state.store.list_tickets(TicketFilter::all()).await?;
        let details = with_assignees(state.store.as_ref(), tickets).await?;
        return Ok(Json(details.into_iter().map(TicketView::Details).collect()));
    }
    if !user.has_permission(&Permission::ReadOwnTickets) {
        return Err(ApiError::Forbidden("Forbidden".into()));
    }

    let tickets = state
        .store
        .list_tickets(TicketFilter::created_by(user.user_id))
        .await?;
    Ok(Json(
        tickets
            .iter()
            .map(|t| TicketView::Summary(TicketSummary::from(t)))
            .collect(),
    ))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketView>, ApiError> {
    let not_found = || ApiError::NotFound("Ticket not found".into());
    let ticket = state.store.find_ticket(id).await?.ok_or_else(not_found)?;

    if user.has_permission(&Permission::ReadAllTickets) {
        let mut details = with_assignees(state.store.as_ref(), vec![ticket]).await?;
        let details = details.pop().ok_or_else(not_found)?;
        return Ok(Json(TicketView::Details(details)));
    }
    if ticket.created_by == user.user_id && user.has_permission(&Permission::ReadOwnTickets) {
        return Ok(Json(TicketView::Summary(TicketSummary::from(&ticket))));
    }
    Err(not_found())
}

pub fn configure_ticket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::TICKETS, get(list_tickets).post(create_ticket))
        .route(ApiUrls::TICKET_BY_ID, get(get_ticket))
        .layer(middleware::from_fn(require_auth_middleware))
}
