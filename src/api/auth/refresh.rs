use super::auth::{post_token_form, tokens_from_response, AuthTokens};
use crate::error::AuthError;

/// 使用 refresh token 向令牌端点换取新的 access token。
pub fn exchange_refresh_token(
    token_uri: &str,
    client_id: &str,
    client_secret: Option<&str>,
    refresh_token: &str,
) -> Result<AuthTokens, AuthError> {
    let mut params = vec![
        ("client_id", client_id.to_string()),
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.to_string()),
    ];
    if let Some(secret) = client_secret {
        params.push(("client_secret", secret.to_string()));
    }

    let payload = post_token_form(token_uri, &params).map_err(AuthError::RefreshDenied)?;
    tokens_from_response(payload, Some(refresh_token)).map_err(AuthError::RefreshDenied)
}
