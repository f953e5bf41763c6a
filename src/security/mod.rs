pub mod auth_api;
pub mod cors;
pub mod jwt;
pub mod password;
pub mod webhook;
