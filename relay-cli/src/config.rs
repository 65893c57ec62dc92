//! Configuration module
//!
//! Connection settings shared by every command.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,
    /// Owner the requests are made on behalf of
    pub owner_id: i64,
}
