#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";

    // Auth - JSON APIs
    pub const AUTH: &'static str = "/api/auth";
    pub const AUTH_SIGNUP: &'static str = "/api/auth/signup";
    pub const AUTH_LOGIN: &'static str = "/api/auth/login";
    pub const AUTH_LOGOUT: &'static str = "/api/auth/logout";
    pub const AUTH_USERS: &'static str = "/api/auth/users";
    pub const AUTH_UPDATE_USER: &'static str = "/api/auth/update-user";

    // Tickets - JSON APIs
    pub const TICKETS: &'static str = "/api/tickets";
    pub const TICKET_BY_ID: &'static str = "/api/tickets/{id}";

    // Background events
    pub const EVENTS: &'static str = "/api/events";
    pub const EVENT_RUNS: &'static str = "/api/events/runs";
}

impl ApiUrls {
    /// Replaces `{key}` placeholders in a route template.
    pub fn with_params(url: &str, params: &[(&str, &str)]) -> String {
        let mut result = url.to_string();
        for (key, value) in params {
            result = result.replace(&format!("{{{key}}}"), value);
        }
        result
    }
}
