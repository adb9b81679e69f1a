use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Credentials used to open a session, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Anonymous access
    #[default]
    None,
    /// HTTP Basic Auth on every request
    Basic { username: String, password: String },
    /// A pre-issued Bearer token
    Bearer { token: String },
    /// OAuth 2.0 password grant; the token is fetched on every connect
    OauthPassword {
        username: String,
        password: String,
        client_id: String,
        /// Defaults to `{base_url}/auth/token`
        #[serde(default)]
        token_url: Option<String>,
    },
}

/// What the session needs to set the Authorization header
#[derive(Debug, Clone)]
pub enum AuthHeader {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl AuthHeader {
    pub(crate) fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Basic { username, password } => req.basic_auth(username, Some(password)),
            Self::Bearer { token } => req.bearer_auth(token),
        }
    }
}

impl Credentials {
    /// Resolve the credentials into a header, requesting a token when needed.
    pub async fn authorize(
        &self,
        http: &reqwest::Client,
        base_url: &str,
    ) -> Result<Option<AuthHeader>> {
        match self {
            Self::None => Ok(None),
            Self::Basic { username, password } => Ok(Some(AuthHeader::Basic {
                username: username.clone(),
                password: password.clone(),
            })),
            Self::Bearer { token } => Ok(Some(AuthHeader::Bearer {
                token: token.clone(),
            })),
            Self::OauthPassword {
                username,
                password,
                client_id,
                token_url,
            } => {
                let token_url = token_url
                    .clone()
                    .unwrap_or_else(|| format!("{}/auth/token", base_url.trim_end_matches('/')));
                debug!(token_url = %token_url, "requesting OAuth token");
                let token = oauth_password(http, &token_url, username, password, client_id).await?;
                Ok(Some(AuthHeader::Bearer {
                    token: token.access_token,
                }))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn oauth_password(
    http: &reqwest::Client,
    token_url: &str,
    username: &str,
    password: &str,
    client_id: &str,
) -> Result<TokenResponse> {
    let resp = http
        .post(token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=password&username={}&password={}&client_id={}",
            urlencoding(username),
            urlencoding(password),
            urlencoding(client_id),
        ))
        .send()
        .await
        .map_err(|e| ClientError::transport(token_url, e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Auth(format!(
            "OAuth login failed (HTTP {status}): {body}"
        )));
    }

    resp.json()
        .await
        .map_err(|e| ClientError::Auth(format!("Failed to parse token response: {e}")))
}

fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_deserialize_by_tag() {
        let creds: Credentials =
            serde_json::from_str(r#"{"type": "basic", "username": "u", "password": "p"}"#)
                .unwrap();
        assert_eq!(
            creds,
            Credentials::Basic {
                username: "u".into(),
                password: "p".into()
            }
        );

        let creds: Credentials = serde_json::from_str(
            r#"{"type": "oauth_password", "username": "u", "password": "p", "client_id": "cli"}"#,
        )
        .unwrap();
        assert!(matches!(creds, Credentials::OauthPassword { token_url: None, .. }));
    }

    #[test]
    fn urlencoding_escapes_reserved() {
        assert_eq!(urlencoding("a b&c"), "a+b%26c");
    }

    #[tokio::test]
    async fn static_credentials_need_no_request() {
        let http = reqwest::Client::new();
        let header = Credentials::Bearer { token: "t".into() }
            .authorize(&http, "http://unused")
            .await
            .unwrap();
        assert!(matches!(header, Some(AuthHeader::Bearer { token }) if token == "t"));
        assert!(
            Credentials::None
                .authorize(&http, "http://unused")
                .await
                .unwrap()
                .is_none()
        );
    }
}
