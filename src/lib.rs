// Envelope Client - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod reinterpret;
pub mod transfer;

pub use auth::{CredentialStore, MemoryCredentialStore};
pub use error::ApiError;
pub use http_client::{ApiClient, ApiRequest, ClientOptions};
pub use models::ResultEnvelope;
