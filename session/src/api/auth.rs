use reqwest::{header::HeaderMap, Method, Response};

use super::{
    client::{error_message, json_headers, parse_json, parse_json_or_default, ApiClient},
    error::AuthError,
    types::{
        ChangePasswordRequest, DeviceInfo, DeviceTokenRequest, ForgotPasswordRequest,
        LoginPayload, LoginRequest, LoginResponse, MessageResponse, ResetPasswordRequest,
    },
};

async fn session_response(
    response: Response,
    failure: fn(String) -> AuthError,
    fallback: &str,
) -> Result<LoginResponse, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let message = error_message(response)
            .await
            .unwrap_or_else(|| format!("{} ({})", fallback, status));
        return Err(failure(message));
    }
    let parsed: LoginResponse = parse_json(response).await.map_err(AuthError::Decode)?;
    parsed.validate().map_err(AuthError::Decode)
}

async fn message_response(
    response: Response,
    failure: fn(String) -> AuthError,
    fallback: &str,
) -> Result<MessageResponse, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let message = error_message(response)
            .await
            .unwrap_or_else(|| format!("{} ({})", fallback, status));
        return Err(failure(message));
    }
    parse_json_or_default(response)
        .await
        .map_err(AuthError::Decode)
}

impl ApiClient {
    pub async fn login(
        &self,
        request: &LoginRequest,
        device_info: DeviceInfo,
    ) -> Result<LoginResponse, AuthError> {
        let payload = LoginPayload {
            email: &request.email,
            password: &request.password,
            device_info,
        };
        let response = self
            .send_json(Method::POST, "/users/login", json_headers(), &payload)
            .await
            .map_err(AuthError::LoginFailed)?;
        session_response(response, AuthError::LoginFailed, "Login failed").await
    }

    pub async fn refresh_token(
        &self,
        request: &DeviceTokenRequest,
        headers: HeaderMap,
    ) -> Result<LoginResponse, AuthError> {
        let response = self
            .send_json(Method::POST, "/users/refresh-token", headers, request)
            .await
            .map_err(AuthError::SessionExpired)?;
        session_response(response, AuthError::SessionExpired, "Refresh failed").await
    }

    pub async fn logout(
        &self,
        request: &DeviceTokenRequest,
        headers: HeaderMap,
    ) -> Result<(), String> {
        let response = self
            .send_json(Method::POST, "/users/logout", headers, request)
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(error_message(response)
                .await
                .unwrap_or_else(|| format!("Logout failed ({})", status)))
        }
    }

    pub async fn forgot_password(
        &self,
        request: &ForgotPasswordRequest,
        headers: HeaderMap,
    ) -> Result<MessageResponse, AuthError> {
        let response = self
            .send_json(Method::PATCH, "/users/forgot-password", headers, request)
            .await
            .map_err(AuthError::ResetPasswordFailed)?;
        message_response(response, AuthError::ResetPasswordFailed, "ResetPasswordFailed").await
    }

    pub async fn reset_password(
        &self,
        request: &ResetPasswordRequest,
        headers: HeaderMap,
    ) -> Result<MessageResponse, AuthError> {
        let response = self
            .send_json(Method::PATCH, "/users/reset-password", headers, request)
            .await
            .map_err(AuthError::ResetPasswordFailed)?;
        message_response(response, AuthError::ResetPasswordFailed, "ResetPasswordFailed").await
    }

    pub async fn change_password(
        &self,
        request: &ChangePasswordRequest,
        headers: HeaderMap,
    ) -> Result<MessageResponse, AuthError> {
        let response = self
            .send_json(Method::PATCH, "/users/change-password", headers, request)
            .await
            .map_err(AuthError::ChangePasswordFailed)?;
        message_response(
            response,
            AuthError::ChangePasswordFailed,
            "ChangePasswordFailed",
        )
        .await
    }
}
