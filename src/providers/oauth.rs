//! Spotify authorization-code flow
//!
//! Lets a client link their own Spotify account for playback. The service
//! only brokers the code-for-token exchange; tokens are returned to the
//! client and never stored.

use crate::error::{LobbyError, Result};
use serde::{Deserialize, Serialize};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes requested for in-browser playback via the Web Playback SDK
const SCOPES: &str = "streaming user-read-email user-read-private";

/// Tokens handed back to the client after an exchange or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

pub struct SpotifyOauth {
    client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl SpotifyOauth {
    pub fn new(
        client: reqwest::Client,
        client_id: Option<String>,
        client_secret: Option<String>,
        redirect_uri: String,
    ) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// URL the client is redirected to for consent. `state` is echoed back
    /// on the callback for CSRF checking by the client.
    pub fn login_url(&self, state: &str) -> Result<String> {
        let client_id = self.require_credentials()?.0;
        let mut url = reqwest::Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("scope", SCOPES)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Trade the callback code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    /// Mint a fresh access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let (client_id, client_secret) = self.require_credentials()?;

        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LobbyError::ProviderUnavailable {
                message: format!("spotify token endpoint returned {}", response.status()),
            }
            .into());
        }

        Ok(response.json().await?)
    }

    fn require_credentials(&self) -> Result<(&String, &String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(LobbyError::ProviderUnavailable {
                message: "spotify credentials missing".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> SpotifyOauth {
        SpotifyOauth::new(
            reqwest::Client::new(),
            Some("client-id".to_string()),
            Some("client-secret".to_string()),
            "http://localhost:8080/auth/callback".to_string(),
        )
    }

    #[test]
    fn test_login_url_carries_redirect_and_state() {
        let url = oauth().login_url("nonce123").unwrap();
        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state=nonce123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fcallback"));
    }

    #[test]
    fn test_unconfigured_login_url_fails() {
        let oauth = SpotifyOauth::new(
            reqwest::Client::new(),
            None,
            None,
            "http://localhost:8080/auth/callback".to_string(),
        );
        assert!(!oauth.is_configured());
        assert!(oauth.login_url("nonce").is_err());
    }

    #[test]
    fn test_token_grant_parses_optional_refresh() {
        let json = r#"{
            "access_token": "BQDBKJ5e",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "AQAYWq"
        }"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.expires_in, 3600);
        assert!(grant.refresh_token.is_some());

        let json = r#"{"access_token": "BQDBKJ5e", "token_type": "Bearer", "expires_in": 3600}"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert!(grant.refresh_token.is_none());
    }
}
