use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Profile fields this crate does not interpret, kept so the cached
    /// snapshot round-trips unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginPayload<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub device_info: DeviceInfo,
}

/// Body shared by the refresh and logout endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTokenRequest {
    pub refresh_token: String,
    pub device_id: String,
}

/// Success body of login and refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub user: User,
}

impl LoginResponse {
    /// Rejects bodies that parse but cannot back a session.
    pub fn validate(self) -> Result<Self, String> {
        if self.access_token.trim().is_empty() {
            return Err("accessToken is empty".into());
        }
        if self.refresh_token.trim().is_empty() {
            return Err("refreshToken is empty".into());
        }
        if self.expires_in == 0 {
            return Err("expiresIn must be positive".into());
        }
        if self.user.id.trim().is_empty() {
            return Err("user.id is empty".into());
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub code: String,
    pub new_password: String,
    #[serde(default)]
    pub confirm_new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Error body returned by the API on non-success responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ApiErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .filter(|message| !message.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login_json() -> Value {
        json!({
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "expiresIn": 3600,
            "user": {
                "_id": "u1",
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "role": "instructor",
                "status": "active"
            }
        })
    }

    #[test]
    fn login_response_parses_camel_case_and_keeps_extra_profile_fields() {
        let response: LoginResponse = serde_json::from_value(login_json()).unwrap();
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.user.id, "u1");
        assert_eq!(response.user.avatar, None);
        assert_eq!(response.user.extra.get("status"), Some(&json!("active")));

        let stored = serde_json::to_string(&response.user).unwrap();
        let restored: User = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, response.user);
    }

    #[test]
    fn login_response_without_tokens_fails_to_parse() {
        let mut body = login_json();
        body.as_object_mut().unwrap().remove("accessToken");
        assert!(serde_json::from_value::<LoginResponse>(body).is_err());
    }

    #[test]
    fn validate_rejects_empty_tokens_and_zero_lifetime() {
        let response: LoginResponse = serde_json::from_value(login_json()).unwrap();
        assert!(response.clone().validate().is_ok());

        let mut empty = response.clone();
        empty.refresh_token = " ".into();
        assert!(empty.validate().is_err());

        let mut zero = response;
        zero.expires_in = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn login_payload_serializes_device_info() {
        let payload = LoginPayload {
            email: "ada@example.com",
            password: "secret",
            device_info: DeviceInfo {
                device_id: "device-1".into(),
                user_agent: "agent".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "email": "ada@example.com",
                "password": "secret",
                "deviceInfo": { "deviceId": "device-1", "userAgent": "agent" }
            })
        );
    }

    #[test]
    fn error_body_prefers_message_over_error() {
        let body: ApiErrorBody =
            serde_json::from_value(json!({ "message": "Invalid credentials", "error": "x" }))
                .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid credentials"));

        let body: ApiErrorBody = serde_json::from_value(json!({ "error": "Bad code" })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Bad code"));

        assert_eq!(ApiErrorBody::default().into_message(), None);
    }
}
