// Authentication module
// OAuth credential lifecycle: exchange, persistence, refresh

mod manager;
mod oauth;
mod refresh;
mod store;
mod types;

pub use manager::CredentialManager;
pub use oauth::{OAuthClient, OAuthSettings};
pub use refresh::spawn_refresh_task;
pub use store::{CredentialStore, MemoryStore, SqliteStore};
pub use types::{CredentialError, CredentialRecord, CredentialState};
