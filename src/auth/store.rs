// Credential store contract and an in-memory implementation

use std::sync::RwLock;

use crate::models::LoginKeyStyle;

/// Source of truth for server location, login settings and the current token.
///
/// Implementations must be cheap to read: `token()` and `tenant()` are called
/// immediately before every request attempt.
pub trait CredentialStore: Send + Sync {
    /// Base address including scheme, e.g. `http://192.168.0.8`
    fn server_address(&self) -> String;

    fn server_port(&self) -> Option<u16>;

    /// Current bearer token, empty when not logged in
    fn token(&self) -> String;

    /// Current tenant, empty when not applicable
    fn tenant(&self) -> String;

    fn username(&self) -> String;

    fn password(&self) -> String;

    fn login_path(&self) -> String;

    fn upload_file_path(&self) -> String;

    fn bucket_name(&self) -> String;

    fn login_key_style(&self) -> LoginKeyStyle {
        LoginKeyStyle::CamelCase
    }

    /// Called after a successful login or refresh
    fn on_new_credential(&self, token: &str, tenant: Option<&str>);
}

/// Mutable part of the in-memory store
#[derive(Debug, Clone, Default)]
struct SessionState {
    token: String,
    tenant: String,
}

/// Credential store kept in process memory
#[derive(Debug)]
pub struct MemoryCredentialStore {
    server_address: String,
    server_port: Option<u16>,
    username: String,
    password: String,
    login_path: String,
    upload_file_path: String,
    bucket_name: String,
    login_key_style: LoginKeyStyle,
    session: RwLock<SessionState>,
}

impl MemoryCredentialStore {
    /// Create a store pointing at `server_address` with default paths
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            server_port: None,
            username: String::new(),
            password: String::new(),
            login_path: "/user/login".to_string(),
            upload_file_path: "/uploadMinio".to_string(),
            bucket_name: String::new(),
            login_key_style: LoginKeyStyle::default(),
            session: RwLock::new(SessionState::default()),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_upload(mut self, path: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.upload_file_path = path.into();
        self.bucket_name = bucket.into();
        self
    }

    pub fn with_login_key_style(mut self, style: LoginKeyStyle) -> Self {
        self.login_key_style = style;
        self
    }

    /// Seed the session with an existing token/tenant
    pub fn with_session(self, token: impl Into<String>, tenant: impl Into<String>) -> Self {
        {
            let mut session = self.write_session();
            session.token = token.into();
            session.tenant = tenant.into();
        }
        self
    }

    /// Build a store from loaded configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        let mut store = Self::new(config.server_address.clone())
            .with_login(config.username.clone(), config.password.clone())
            .with_login_path(config.login_path.clone())
            .with_upload(config.upload_file_path.clone(), config.bucket_name.clone())
            .with_login_key_style(config.login_key_style)
            .with_session(config.token.clone(), config.tenant.clone());
        store.server_port = config.server_port;
        store
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        // A panicked writer cannot leave the two strings half-updated
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn server_address(&self) -> String {
        self.server_address.clone()
    }

    fn server_port(&self) -> Option<u16> {
        self.server_port
    }

    fn token(&self) -> String {
        self.read_session().token.clone()
    }

    fn tenant(&self) -> String {
        self.read_session().tenant.clone()
    }

    fn username(&self) -> String {
        self.username.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }

    fn login_path(&self) -> String {
        self.login_path.clone()
    }

    fn upload_file_path(&self) -> String {
        self.upload_file_path.clone()
    }

    fn bucket_name(&self) -> String {
        self.bucket_name.clone()
    }

    fn login_key_style(&self) -> LoginKeyStyle {
        self.login_key_style
    }

    fn on_new_credential(&self, token: &str, tenant: Option<&str>) {
        let mut session = self.write_session();
        session.token = token.to_string();
        if let Some(tenant) = tenant {
            session.tenant = tenant.to_string();
        }
        tracing::info!(
            "Stored new credential (token: {}..., tenant: {:?})",
            token.chars().take(8).collect::<String>(),
            tenant
        );
    }
}
