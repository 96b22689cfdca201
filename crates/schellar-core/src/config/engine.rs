use serde::{Deserialize, Serialize};

/// Orchestration engine client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base API URL, e.g. `http://conductor-server:8080/api`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page size for instance searches; only the newest instance matters.
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Value of the `x-auth-user-roles` header.
    #[serde(default = "default_admin_roles")]
    pub admin_roles: String,

    /// Value of the `x-auth-user-groups` header.
    #[serde(default = "default_admin_groups")]
    pub admin_groups: String,

    /// Value of the `from` header.
    #[serde(default = "default_from")]
    pub from: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            request_timeout_secs: default_request_timeout(),
            search_page_size: default_search_page_size(),
            admin_roles: default_admin_roles(),
            admin_groups: default_admin_groups(),
            from: default_from(),
        }
    }
}

fn default_url() -> String {
    "http://conductor-server:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_search_page_size() -> u32 {
    5
}

fn default_admin_roles() -> String {
    "OWNER".to_string()
}

fn default_admin_groups() -> String {
    "network-admin".to_string()
}

fn default_from() -> String {
    "schellar".to_string()
}
