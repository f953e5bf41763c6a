//! Support-ticket intake service with background AI triage.

pub mod auth;
pub mod core;
pub mod email;
pub mod events;
pub mod llm;
pub mod main_module;
pub mod security;
pub mod store;
pub mod tickets;
pub mod triage;
