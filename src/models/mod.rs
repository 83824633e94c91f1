// Wire models shared by all endpoints

pub mod envelope;
pub mod login;

pub use envelope::{result_code, Credential, ResultEnvelope};
pub use login::{login_payload, LoginKeyStyle, LoginPayload};
