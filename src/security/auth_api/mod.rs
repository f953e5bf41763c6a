//! Bearer-token authentication and role checks for the HTTP API.

pub mod config;
pub mod error;
pub mod middleware;
pub mod types;
pub mod utils;

pub use config::AuthConfig;
pub use error::AuthError;
pub use middleware::{
    admin_only_middleware, auth_middleware, require_auth_middleware,
    require_permission_middleware, AuthMiddlewareState,
};
pub use types::{AuthenticatedUser, Permission, Role};
pub use utils::{authenticate_token, extract_bearer_from_headers, is_jwt_format};
