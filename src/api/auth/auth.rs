use super::secrets::ClientSecrets;
use crate::error::AuthError;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::blocking::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use url::Url;

/// 令牌端点返回的令牌集合（授权码交换与刷新共用）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_in: Option<u64>,
    pub(crate) scope: Option<String>,
    pub(crate) token_type: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

/// 通过本机浏览器完成 OAuth 授权码 + PKCE 流程。
/// 回调监听在 127.0.0.1 的随机端口上，只接受一次重定向。
pub fn authenticate_via_browser(
    secrets: &ClientSecrets,
    scopes: &[String],
) -> Result<AuthTokens, AuthError> {
    let scope_param = scopes.join(" ");
    let code_verifier = random_string(64);
    let code_challenge = build_code_challenge(&code_verifier);
    let state = random_string(32);

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| interactive(format!("failed to bind redirect listener: {e}")))?;
    let redirect_port = listener
        .local_addr()
        .map_err(|e| interactive(format!("failed to read redirect listener port: {e}")))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{redirect_port}");

    let authorize_url = build_authorize_url(
        secrets,
        &scope_param,
        &redirect_uri,
        &code_challenge,
        &state,
    )?;

    info!("opening browser for authorization");
    if let Err(err) = webbrowser::open(&authorize_url) {
        warn!("failed to open browser ({err}); visit this URL manually: {authorize_url}");
    }

    let (code, received_state) = wait_for_code(listener)?;
    if received_state.as_deref() != Some(state.as_str()) {
        return Err(interactive("state mismatch in authorization response"));
    }

    exchange_code_for_tokens(secrets, &redirect_uri, &code_verifier, &code)
}

fn build_authorize_url(
    secrets: &ClientSecrets,
    scope: &str,
    redirect_uri: &str,
    code_challenge: &str,
    state: &str,
) -> Result<String, AuthError> {
    let mut url = Url::parse(&secrets.auth_uri)
        .map_err(|e| interactive(format!("failed to parse authorize endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &secrets.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("state", state);
    Ok(url.into())
}

fn exchange_code_for_tokens(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    code_verifier: &str,
    code: &str,
) -> Result<AuthTokens, AuthError> {
    let mut params = vec![
        ("client_id", secrets.client_id.clone()),
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
        ("code_verifier", code_verifier.to_string()),
    ];
    if let Some(secret) = secrets.client_secret.as_ref() {
        params.push(("client_secret", secret.clone()));
    }

    let payload = post_token_form(&secrets.token_uri, &params).map_err(interactive)?;
    let tokens = tokens_from_response(payload, None).map_err(interactive)?;
    Ok(tokens)
}

/// 向令牌端点提交表单并解析 JSON；HTTP 层与协议层的错误都转成字符串返回。
pub(crate) fn post_token_form(
    token_uri: &str,
    params: &[(&str, String)],
) -> Result<TokenResponse, String> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))?;

    let response = client
        .post(token_uri)
        .form(params)
        .send()
        .map_err(|e| format!("token request failed: {e}"))?;

    let status = response.status();
    let payload: Result<TokenResponse, _> = response.json();
    match payload {
        Ok(body) if body.error.is_some() => {
            let error = body.error.unwrap_or_default();
            let description = body.error_description.unwrap_or_default();
            Err(format!("{error}: {description}"))
        }
        Ok(_) if !status.is_success() => Err(format!("token endpoint returned HTTP {status}")),
        Ok(body) => Ok(body),
        Err(e) if !status.is_success() => Err(format!("token endpoint returned HTTP {status}: {e}")),
        Err(e) => Err(format!("failed to parse token response: {e}")),
    }
}

/// 刷新响应通常不会带回 refresh_token，此时沿用调用方提供的旧值。
pub(crate) fn tokens_from_response(
    payload: TokenResponse,
    previous_refresh_token: Option<&str>,
) -> Result<AuthTokens, String> {
    let access_token = payload
        .access_token
        .ok_or_else(|| "missing access_token in response".to_string())?;
    Ok(AuthTokens {
        access_token,
        refresh_token: payload
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string)),
        expires_in: payload.expires_in,
        scope: payload.scope,
        token_type: payload.token_type,
    })
}

fn wait_for_code(listener: TcpListener) -> Result<(String, Option<String>), AuthError> {
    let (mut stream, _) = listener
        .accept()
        .map_err(|e| interactive(format!("failed to receive redirect: {e}")))?;

    let mut buffer = [0_u8; 4096];
    let read = stream
        .read(&mut buffer)
        .map_err(|e| interactive(format!("failed to read redirect: {e}")))?;
    let request = String::from_utf8_lossy(&buffer[..read]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| interactive("failed to parse HTTP request line"))?;

    let redirect_url = Url::parse(&format!("http://127.0.0.1{path}"))
        .map_err(|e| interactive(format!("failed to parse redirect url: {e}")))?;
    let mut code: Option<String> = None;
    let mut state: Option<String> = None;

    for (key, value) in redirect_url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                send_browser_response(
                    &mut stream,
                    "Authorization Failed",
                    "drivelift could not complete sign-in. You can close this window.",
                )?;
                return Err(interactive(format!("authorization error: {value}")));
            }
            _ => {}
        }
    }

    let code = code.ok_or_else(|| interactive("authorization code missing in redirect"))?;

    send_browser_response(
        &mut stream,
        "Authorization Complete",
        "You can return to the terminal.",
    )?;

    Ok((code, state))
}

fn send_browser_response(stream: &mut TcpStream, title: &str, message: &str) -> Result<(), AuthError> {
    let body = format!(
        "<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .map_err(|e| interactive(format!("failed to send browser response: {e}")))
}

fn build_code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn interactive(message: impl Into<String>) -> AuthError {
    AuthError::Interactive(message.into())
}
