use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Event, FunctionError};
use crate::email::Mailer;
use crate::store::Store;
use crate::triage::Triage;

pub const RUN_HISTORY_LIMIT: usize = 100;

/// Services available to every function run.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn Store>,
    pub triage: Arc<Triage>,
    pub mailer: Arc<dyn Mailer>,
}

/// Per-attempt view handed to a function.
#[derive(Clone)]
pub struct FunctionContext {
    pub jobs: JobContext,
    pub run_id: Uuid,
    pub function_id: String,
    pub attempt: u32,
}

impl FunctionContext {
    /// Runs one named step of the function, logging its outcome.
    pub async fn step<T, E, F>(&self, name: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        info!("[{}] run={} step {name} started", self.function_id, self.run_id);
        let result = fut.await;
        match &result {
            Ok(_) => info!("[{}] run={} step {name} finished", self.function_id, self.run_id),
            Err(e) => warn!("[{}] run={} step {name} failed: {e}", self.function_id, self.run_id),
        }
        result
    }
}

pub type FunctionFuture = Pin<Box<dyn Future<Output = Result<Value, FunctionError>> + Send>>;
pub type FunctionHandler = Arc<dyn Fn(FunctionContext, Event) -> FunctionFuture + Send + Sync>;

#[derive(Clone)]
struct RegisteredFunction {
    id: String,
    trigger: String,
    retries: u32,
    handler: FunctionHandler,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    pub id: String,
    pub trigger: String,
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub function_id: String,
    pub event_id: Uuid,
    pub event_name: String,
    pub status: RunStatus,
    pub attempts: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Function registry, dispatcher and bounded run history.
#[derive(Clone)]
pub struct EventRuntime {
    jobs: JobContext,
    functions: Arc<RwLock<Vec<RegisteredFunction>>>,
    history: Arc<RwLock<VecDeque<RunRecord>>>,
    retry_delay: Duration,
}

impl EventRuntime {
    pub fn new(jobs: JobContext, retry_delay: Duration) -> Self {
        Self {
            jobs,
            functions: Arc::new(RwLock::new(Vec::new())),
            history: Arc::new(RwLock::new(VecDeque::new())),
            retry_delay,
        }
    }

    pub fn jobs(&self) -> &JobContext {
        &self.jobs
    }

    pub async fn register<F, Fut>(&self, id: &str, trigger: &str, retries: u32, handler: F)
    where
        F: Fn(FunctionContext, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
    {
        let handler: FunctionHandler =
            Arc::new(move |ctx: FunctionContext, event: Event| -> FunctionFuture {
                Box::pin(handler(ctx, event))
            });
        let mut functions = self.functions.write().await;
        functions.retain(|f| f.id != id);
        functions.push(RegisteredFunction {
            id: id.to_string(),
            trigger: trigger.to_string(),
            retries,
            handler,
        });
        info!("Registered function {id} on {trigger} (retries={retries})");
    }

    pub async fn functions(&self) -> Vec<FunctionInfo> {
        self.functions
            .read()
            .await
            .iter()
            .map(|f| FunctionInfo {
                id: f.id.clone(),
                trigger: f.trigger.clone(),
                retries: f.retries,
            })
            .collect()
    }

    /// Consumes events until every [`super::EventBus`] is dropped.
    pub fn start(&self, mut rx: mpsc::Receiver<Event>) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            info!("Event dispatcher started");
            while let Some(event) = rx.recv().await {
                runtime.dispatch(event).await;
            }
            info!("Event dispatcher stopped");
        })
    }

    /// Spawns one run per function triggered by `event`.
    pub async fn dispatch(&self, event: Event) -> Vec<JoinHandle<RunRecord>> {
        let matching: Vec<RegisteredFunction> = self
            .functions
            .read()
            .await
            .iter()
            .filter(|f| f.trigger == event.name)
            .cloned()
            .collect();

        if matching.is_empty() {
            warn!("No function registered for event {} ({})", event.name, event.id);
        }

        matching
            .into_iter()
            .map(|function| {
                let runtime = self.clone();
                let event = event.clone();
                tokio::spawn(async move { runtime.execute(&function, event).await })
            })
            .collect()
    }

    async fn execute(&self, function: &RegisteredFunction, event: Event) -> RunRecord {
        let mut record = RunRecord {
            id: Uuid::new_v4(),
            function_id: function.id.clone(),
            event_id: event.id,
            event_name: event.name.clone(),
            status: RunStatus::Running,
            attempts: 0,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.record(record.clone()).await;
        info!("[{}] run={} started for event {}", function.id, record.id, event.id);

        let max_attempts = function.retries + 1;
        loop {
            record.attempts += 1;
            let ctx = FunctionContext {
                jobs: self.jobs.clone(),
                run_id: record.id,
                function_id: function.id.clone(),
                attempt: record.attempts,
            };

            match (function.handler)(ctx, event.clone()).await {
                Ok(output) => {
                    record.status = RunStatus::Completed;
                    record.output = Some(output);
                    record.error = None;
                    info!("[{}] run={} completed after {} attempt(s)", function.id, record.id, record.attempts);
                    break;
                }
                Err(e) if e.is_retriable() && record.attempts < max_attempts => {
                    warn!(
                        "[{}] run={} attempt {}/{} failed, retrying: {e}",
                        function.id, record.id, record.attempts, max_attempts
                    );
                    record.error = Some(e.to_string());
                    self.record(record.clone()).await;
                    tokio::time::sleep(self.retry_delay * record.attempts).await;
                }
                Err(e) => {
                    record.status = RunStatus::Failed;
                    record.error = Some(e.to_string());
                    error!("[{}] run={} failed: {e}", function.id, record.id);
                    break;
                }
            }
        }

        record.finished_at = Some(Utc::now());
        self.record(record.clone()).await;
        record
    }

    async fn record(&self, record: RunRecord) {
        let mut history = self.history.write().await;
        if let Some(existing) = history.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
            return;
        }
        history.push_front(record);
        history.truncate(RUN_HISTORY_LIMIT);
    }

    /// Most recent runs first.
    pub async fn runs(&self) -> Vec<RunRecord> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn run(&self, id: Uuid) -> Option<RunRecord> {
        self.history.read().await.iter().find(|r| r.id == id).cloned()
    }
}
