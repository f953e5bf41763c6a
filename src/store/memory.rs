use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError, TicketStore, UserStore};
use crate::core::shared::models::{
    normalize_email, NewTicket, NewUser, Ticket, TicketAnnex, TicketFilter, TicketStatus, User,
    UserChanges,
};
use crate::security::auth_api::Role;

/// Process-local store. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    tickets: RwLock<HashMap<Uuid, Ticket>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let email = normalize_email(&user.email);
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!(
                "A user with email {email} already exists"
            )));
        }
        let created = User {
            id: Uuid::new_v4(),
            email,
            password_hash: user.password_hash,
            role: user.role,
            skills: user.skills,
            created_at: Utc::now(),
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn update_user(
        &self,
        email: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        let mut users = self.users.write().await;
        let Some(user) = users.values_mut().find(|u| u.email == email) else {
            return Ok(None);
        };
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(skills) = changes.skills {
            user.skills = skills;
        }
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_ticket(&self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        let now = Utc::now();
        let created = Ticket {
            id: Uuid::new_v4(),
            title: ticket.title,
            description: ticket.description,
            status: TicketStatus::Todo,
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
        self.tickets
            .write()
            .await
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .read()
            .await
            .values()
            .filter(|t| filter.created_by.is_none_or(|owner| t.created_by == owner))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    async fn set_ticket_status(&self, id: Uuid, status: TicketStatus) -> Result<bool, StoreError> {
        let mut tickets = self.tickets.write().await;
        let Some(ticket) = tickets.get_mut(&id) else {
            return Ok(false);
        };
        ticket.status = status;
        ticket.updated_at = Utc::now();
        Ok(true)
    }

    async fn apply_triage(&self, id: Uuid, annex: &TicketAnnex) -> Result<bool, StoreError> {
        let mut tickets = self.tickets.write().await;
        let Some(ticket) = tickets.get_mut(&id) else {
            return Ok(false);
        };
        if ticket.is_triaged() {
            return Ok(false);
        }
        let now = Utc::now();
        ticket.summary = Some(annex.summary.clone());
        ticket.priority = Some(annex.priority);
        ticket.helpful_notes = Some(annex.helpful_notes.clone());
        ticket.related_skills = annex.related_skills.clone();
        ticket.status = TicketStatus::InProgress;
        ticket.triaged_at = Some(now);
        ticket.updated_at = now;
        Ok(true)
    }

    async fn assign_ticket(&self, id: Uuid, assignee: Option<Uuid>) -> Result<bool, StoreError> {
        let mut tickets = self.tickets.write().await;
        let Some(ticket) = tickets.get_mut(&id) else {
            return Ok(false);
        };
        ticket.assigned_to = assignee;
        ticket.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::Priority;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            skills: vec![],
        }
    }

    fn annex() -> TicketAnnex {
        TicketAnnex {
            summary: "Login page crashes".into(),
            priority: Priority::High,
            helpful_notes: "Check the auth reducer".into(),
            related_skills: vec!["React".into()],
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = MemoryStore::new();
        store.insert_user(new_user("Ana@Example.com")).await.expect("first insert");
        let err = store
            .insert_user(new_user(" ana@example.com "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_user_by_email() {
        let store = MemoryStore::new();
        store.insert_user(new_user("mod@example.com")).await.expect("insert");

        let updated = store
            .update_user(
                "MOD@example.com",
                UserChanges {
                    role: Some(Role::Moderator),
                    skills: Some(vec!["Docker".into()]),
                },
            )
            .await
            .expect("update")
            .expect("user exists");
        assert_eq!(updated.role, Role::Moderator);
        assert_eq!(updated.skills, vec!["Docker".to_string()]);

        let missing = store
            .update_user("ghost@example.com", UserChanges::default())
            .await
            .expect("update");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_tickets_filters_by_owner_newest_first() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for (owner, title) in [(alice, "first"), (bob, "other"), (alice, "second")] {
            store
                .insert_ticket(NewTicket {
                    title: title.into(),
                    description: "d".into(),
                    created_by: owner,
                    deadline: None,
                })
                .await
                .expect("insert");
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let mine = store
            .list_tickets(TicketFilter::created_by(alice))
            .await
            .expect("list");
        let titles: Vec<_> = mine.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);

        let all = store.list_tickets(TicketFilter::all()).await.expect("list");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_apply_triage_only_once() {
        let store = MemoryStore::new();
        let ticket = store
            .insert_ticket(NewTicket {
                title: "Crash".into(),
                description: "App crashes".into(),
                created_by: Uuid::new_v4(),
                deadline: None,
            })
            .await
            .expect("insert");
        assert!(ticket.summary.is_none());
        assert!(ticket.related_skills.is_empty());

        assert!(store.apply_triage(ticket.id, &annex()).await.expect("triage"));
        let mut second = annex();
        second.summary = "changed".into();
        assert!(!store.apply_triage(ticket.id, &second).await.expect("triage"));

        let stored = store
            .find_ticket(ticket.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(stored.status, TicketStatus::InProgress);
        assert_eq!(stored.summary.as_deref(), Some("Login page crashes"));
        assert_eq!(stored.priority, Some(Priority::High));
        assert!(stored.is_triaged());
    }

    #[tokio::test]
    async fn test_missing_ticket_updates_report_false() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(!store.set_ticket_status(id, TicketStatus::Todo).await.expect("status"));
        assert!(!store.assign_ticket(id, None).await.expect("assign"));
        assert!(!store.apply_triage(id, &annex()).await.expect("triage"));
    }
}
