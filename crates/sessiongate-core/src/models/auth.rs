use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body returned by both the login and the refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// The administrator behind the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let json = r#"{"accessToken": "eyJhbGciOi.abc.def"}"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token, "eyJhbGciOi.abc.def");
    }

    #[test]
    fn test_reset_confirm_uses_camel_case() {
        let body = PasswordResetConfirmRequest {
            token: "reset-token".to_string(),
            new_password: "hunter22".to_string(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["newPassword"], "hunter22");
        assert!(value.get("new_password").is_none());
    }
}
