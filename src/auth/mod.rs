// Authentication module
// Credential store contract, header eligibility and single-flight refresh

mod manager;
mod refresh;
mod store;

pub use manager::{AuthManager, TENANT_HEADER};
pub use refresh::{process_refresh_lock, RefreshCoordinator, RefreshLock};
pub use store::{CredentialStore, MemoryCredentialStore};
