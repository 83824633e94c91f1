// Uniform response envelope shared by every endpoint

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, FailureKind};

/// Business result codes returned by the server in `code`
pub mod result_code {
    pub const OK: i32 = 200;
    pub const NO_LOGIN: i32 = 401;
    pub const NO_PERMISSION: i32 = 403;
    pub const NOT_FOUND: i32 = 404;
    pub const INTERNAL_SERVER_ERROR: i32 = 500;
    pub const ERROR: i32 = 501;
}

/// Generic response wrapper.
///
/// `data`, `rows` and `token` are populated depending on the endpoint; all of
/// them are optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<T> {
    pub code: i32,

    #[serde(rename = "msg", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    // No `default` here: it would require `T: Default` to deserialize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<T>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,

    #[serde(rename = "img", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Credential>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Credential issued by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    #[serde(
        rename = "deptId",
        alias = "officeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub office_id: Option<i64>,
}

impl<T> ResultEnvelope<T> {
    /// Successful envelope wrapping `data`
    pub fn success(data: T) -> Self {
        Self {
            code: result_code::OK,
            message: Some("Success".to_string()),
            data: Some(data),
            ..Self::empty(result_code::OK)
        }
    }

    /// Failed envelope with no payload
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::empty(code)
        }
    }

    /// Failed envelope for a classified error
    pub fn from_error(err: &ApiError) -> Self {
        Self::error(err.code(), err.user_message())
    }

    fn empty(code: i32) -> Self {
        Self {
            code,
            message: None,
            data: None,
            rows: None,
            total: None,
            image: None,
            token: None,
            uuid: None,
            url: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == result_code::OK
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Taxonomy entry when this envelope was produced by the client itself
    pub fn failure_kind(&self) -> Option<FailureKind> {
        FailureKind::from_code(self.code)
    }
}

impl<T> From<ApiError> for ResultEnvelope<T> {
    fn from(err: ApiError) -> Self {
        Self::from_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_envelope() {
        let raw = json!({
            "code": 200,
            "msg": "ok",
            "data": "payload",
            "rows": ["a", "b"],
            "total": 2,
            "img": "base64",
            "token": {"token": "abc", "deptId": 7, "tenant": "t1"},
            "uuid": "u-1",
            "url": "http://x/y"
        });
        let env: ResultEnvelope<String> = serde_json::from_value(raw).unwrap();
        assert!(env.is_success());
        assert_eq!(env.message.as_deref(), Some("ok"));
        assert_eq!(env.data.as_deref(), Some("payload"));
        assert_eq!(env.rows, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(env.total, Some(2));
        assert_eq!(env.image.as_deref(), Some("base64"));
        let token = env.token.unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(token.office_id, Some(7));
        assert_eq!(token.tenant.as_deref(), Some("t1"));
        assert_eq!(env.uuid.as_deref(), Some("u-1"));
        assert_eq!(env.url.as_deref(), Some("http://x/y"));
    }

    #[test]
    fn test_decode_minimal_envelope() {
        let env: ResultEnvelope<serde_json::Value> =
            serde_json::from_str(r#"{"code":501}"#).unwrap();
        assert!(env.is_error());
        assert!(env.message.is_none());
        assert!(env.data.is_none());
        assert!(env.token.is_none());
    }

    #[test]
    fn test_office_id_alias() {
        let cred: Credential =
            serde_json::from_str(r#"{"token":"t","officeId":3}"#).unwrap();
        assert_eq!(cred.office_id, Some(3));
    }

    #[test]
    fn test_payload_shape_mismatch_fails() {
        let result = serde_json::from_str::<ResultEnvelope<u32>>(r#"{"code":200,"data":"nope"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_error_carries_code_and_message() {
        let env: ResultEnvelope<()> = ApiError::Timeout.into();
        assert_eq!(env.code, 901);
        assert_eq!(env.message.as_deref(), Some("Network request timed out"));
        assert_eq!(env.failure_kind(), Some(FailureKind::Timeout));
        assert!(env.is_error());
    }

    #[test]
    fn test_success_has_no_failure_kind() {
        let env = ResultEnvelope::success(1u8);
        assert!(env.is_success());
        assert_eq!(env.failure_kind(), None);
        assert_eq!(env.data, Some(1));
    }

    #[test]
    fn test_serialize_uses_wire_keys() {
        let mut env = ResultEnvelope::error(501, "bad");
        env.image = Some("i".to_string());
        let value = serde_json::to_value(&env as &ResultEnvelope<()>).unwrap();
        assert_eq!(value, json!({"code": 501, "msg": "bad", "img": "i"}));
    }

    /// Payload type without a `Default` impl
    #[derive(Debug, PartialEq, Deserialize)]
    struct Device {
        id: u32,
    }

    fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> ResultEnvelope<T> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_decode_payload_without_default() {
        let env: ResultEnvelope<Device> = decode(r#"{"code":200,"rows":[{"id":1},{"id":2}]}"#);
        assert_eq!(env.data, None);
        assert_eq!(env.rows, Some(vec![Device { id: 1 }, Device { id: 2 }]));

        let env: ResultEnvelope<Device> = decode(r#"{"code":404,"msg":"gone"}"#);
        assert_eq!(env.data, None);
        assert_eq!(env.rows, None);
    }
}
