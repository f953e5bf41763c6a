//! Background functions triggered by application events.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{Event, EventRuntime, FunctionContext, FunctionError, TICKET_CREATED, USER_SIGNUP};
use crate::core::shared::models::TicketStatus;
use crate::email::{assignment_mail, welcome_mail, Mailer};
use crate::security::auth_api::Role;
use crate::store::{find_matching_moderator, TicketStore, UserStore};

pub const ON_USER_SIGNUP: &str = "on-user-signup";
pub const ON_TICKET_CREATED: &str = "on-ticket-created";

#[derive(Debug, Deserialize)]
struct SignupData {
    email: String,
}

#[derive(Debug, Deserialize)]
struct TicketCreatedData {
    #[serde(alias = "ticketId")]
    ticket_id: Uuid,
}

fn payload<T: for<'de> Deserialize<'de>>(event: &Event) -> Result<T, FunctionError> {
    serde_json::from_value(event.data.clone()).map_err(|e| {
        FunctionError::NonRetriable(format!("invalid {} payload: {e}", event.name))
    })
}

pub async fn register_all(runtime: &EventRuntime, retries: u32) {
    runtime
        .register(ON_USER_SIGNUP, USER_SIGNUP, retries, on_user_signup)
        .await;
    runtime
        .register(ON_TICKET_CREATED, TICKET_CREATED, retries, on_ticket_created)
        .await;
}

pub async fn on_user_signup(ctx: FunctionContext, event: Event) -> Result<Value, FunctionError> {
    let SignupData { email } = payload(&event)?;
    let store = ctx.jobs.store.clone();

    let user = ctx
        .step("get-user-email", async {
            store
                .find_user_by_email(&email)
                .await?
                .ok_or_else(|| FunctionError::NonRetriable("User no longer exists in our database".into()))
        })
        .await?;

    ctx.step("send-welcome-email", async {
        ctx.jobs.mailer.send(welcome_mail(&user.email)).await.map_err(FunctionError::from)
    })
    .await?;

    Ok(json!({ "success": true }))
}

pub async fn on_ticket_created(ctx: FunctionContext, event: Event) -> Result<Value, FunctionError> {
    let TicketCreatedData { ticket_id } = payload(&event)?;
    let store = ctx.jobs.store.clone();

    let ticket = ctx
        .step("fetch-ticket", async {
            store
                .find_ticket(ticket_id)
                .await?
                .ok_or_else(|| FunctionError::NonRetriable("Ticket not found".into()))
        })
        .await?;

    // A retry of this run finds the annex its earlier attempt wrote and only
    // redoes assignment and mail from the stored skills.
    let resuming = ticket.is_triaged() && ctx.attempt > 1;
    if ticket.is_triaged() && !resuming {
        info!("Ticket {ticket_id} already triaged, skipping");
        return Ok(json!({ "success": true, "skipped": true }));
    }

    let (source, priority, related_skills) = if resuming {
        info!(
            "Ticket {ticket_id} triaged by attempt {}, resuming assignment",
            ctx.attempt - 1
        );
        (None, ticket.priority, ticket.related_skills.clone())
    } else {
        ctx.step("update-ticket-status", async {
            store
                .set_ticket_status(ticket_id, TicketStatus::Todo)
                .await
                .map_err(FunctionError::from)
        })
        .await?;

        let report = ctx.jobs.triage.analyze_ticket(&ticket.title, &ticket.description).await;

        let applied = ctx
            .step("ai-processing", async {
                store
                    .apply_triage(ticket_id, &report.annex)
                    .await
                    .map_err(FunctionError::from)
            })
            .await?;
        if !applied {
            info!("Ticket {ticket_id} was triaged concurrently, skipping assignment");
            return Ok(json!({ "success": true, "skipped": true }));
        }
        (
            Some(report.source),
            Some(report.annex.priority),
            report.annex.related_skills,
        )
    };

    let (assignee, matched_moderator) = ctx
        .step("assign-moderator", async {
            let moderator = find_matching_moderator(store.as_ref(), &related_skills).await?;
            let assignee = match moderator.clone() {
                Some(moderator) => Some(moderator),
                None => store.users_with_role(Role::Admin).await?.into_iter().next(),
            };
            store
                .assign_ticket(ticket_id, assignee.as_ref().map(|u| u.id))
                .await?;
            Ok::<_, FunctionError>((assignee, moderator.is_some()))
        })
        .await?;

    if let (Some(moderator), true) = (&assignee, matched_moderator) {
        ctx.step("send-email-notification", async {
            ctx.jobs
                .mailer
                .send(assignment_mail(&moderator.email, &ticket.title))
                .await
                .map_err(FunctionError::from)
        })
        .await?;
    }

    Ok(json!({
        "success": true,
        "source": source,
        "priority": priority,
        "related_skills": related_skills,
        "assigned_to": assignee.map(|u| u.id),
    }))
}
