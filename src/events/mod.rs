//! In-process event bus and background function runtime.
//!
//! Handlers publish named events on the [`EventBus`]; the [`EventRuntime`]
//! dispatcher starts one run per function registered for that name.

pub mod api;
pub mod functions;
pub mod runtime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::email::MailError;
use crate::store::StoreError;

pub use runtime::{EventRuntime, FunctionContext, FunctionInfo, JobContext, RunRecord, RunStatus};

pub const USER_SIGNUP: &str = "user/signup";
pub const TICKET_CREATED: &str = "ticket/created";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub data: Value,
    pub ts: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            data,
            ts: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event name must not be empty")]
    EmptyName,
    #[error("event runtime is not running")]
    Closed,
}

/// Failure of a single function attempt.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// Transient; the run is retried while budget remains.
    #[error("{0}")]
    Retriable(String),
    /// Ends the run immediately.
    #[error("{0}")]
    NonRetriable(String),
}

impl FunctionError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

impl From<StoreError> for FunctionError {
    fn from(e: StoreError) -> Self {
        Self::Retriable(e.to_string())
    }
}

impl From<MailError> for FunctionError {
    fn from(e: MailError) -> Self {
        Self::Retriable(e.to_string())
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<Event>,
}

impl EventBus {
    /// Bus plus the receiving end the runtime dispatcher consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn send(&self, name: &str, data: Value) -> Result<Uuid, EventError> {
        self.publish(Event::new(name, data)).await
    }

    pub async fn publish(&self, event: Event) -> Result<Uuid, EventError> {
        if event.name.trim().is_empty() {
            return Err(EventError::EmptyName);
        }
        let id = event.id;
        debug!("Publishing event {} ({id})", event.name);
        self.tx.send(event).await.map_err(|_| EventError::Closed)?;
        Ok(id)
    }
}
