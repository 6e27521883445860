// Authentication module
// Token cache, credential exchange and durable token storage

mod error;
mod exchange;
mod manager;
mod store;
mod types;

pub use error::AuthError;
pub use exchange::basic_credential;
pub use manager::{TokenManager, TokenManagerOptions};
pub use store::{open_store, parse_datetime, CredentialStore, FileStore, SqliteStore};
pub use types::{CachedToken, CredentialRecord, TokenState, TokenStatus, MAX_BUFFER_MINUTES};
