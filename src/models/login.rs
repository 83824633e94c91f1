// Login request payloads

use serde::Serialize;
use std::str::FromStr;

/// Key naming used by the login endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginKeyStyle {
    /// `{"userName": ..., "passWord": ...}`
    #[default]
    CamelCase,

    /// `{"username": ..., "password": ...}`
    LowerCase,
}

impl FromStr for LoginKeyStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "camel" | "camel_case" | "v1" | "a" => Ok(LoginKeyStyle::CamelCase),
            "lower" | "lower_case" | "v2" | "b" => Ok(LoginKeyStyle::LowerCase),
            other => Err(format!("unknown login key style: {}", other)),
        }
    }
}

/// Login body, serialized with the keys of its style in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LoginPayload<'a> {
    CamelCase {
        #[serde(rename = "userName")]
        username: &'a str,
        #[serde(rename = "passWord")]
        password: &'a str,
    },
    LowerCase {
        username: &'a str,
        password: &'a str,
    },
}

/// Build the login body for the given key style
pub fn login_payload<'a>(
    style: LoginKeyStyle,
    username: &'a str,
    password: &'a str,
) -> LoginPayload<'a> {
    match style {
        LoginKeyStyle::CamelCase => LoginPayload::CamelCase { username, password },
        LoginKeyStyle::LowerCase => LoginPayload::LowerCase { username, password },
    }
}
