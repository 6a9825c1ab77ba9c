//! Client for the identity provider that mints web identity tokens.

use std::fmt;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    github::GitHubToken,
};

/// What a token is issued for: an organization, or a team inside one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subject {
    Org { org_id: u64 },
    Team { org_id: u64, team_id: u64 },
}

impl Subject {
    pub fn path(&self) -> String {
        match self {
            Self::Org { org_id } => format!("/gh/org/{org_id}"),
            Self::Team { org_id, team_id } => format!("/gh/team/{org_id}/{team_id}"),
        }
    }
}

/// A signed JWT from the identity provider.
pub struct FederatedToken(String);

impl FederatedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FederatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FederatedToken(..)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

pub struct IdpClient {
    base_url: String,
    audience: String,
    token: GitHubToken,
    http: reqwest::Client,
}

impl IdpClient {
    pub fn new(base_url: &str, audience: &str, token: GitHubToken, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            audience: audience.to_string(),
            token,
            http,
        }
    }

    pub async fn issue_token(&self, subject: &Subject) -> Result<FederatedToken> {
        let url = format!("{}{}", self.base_url, subject.path());
        tracing::debug!(%url, audience = %self.audience, "requesting web identity token");

        let response = self
            .http
            .get(&url)
            .query(&[("audience", self.audience.as_str())])
            .bearer_auth(self.token.reveal())
            .send()
            .await
            .map_err(|source| Error::Network { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status { url, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| Error::Network { url: url.clone(), source })?;
        let TokenResponse { token } = serde_json::from_slice(&body)
            .map_err(|err| Error::MalformedResponse { url: url.clone(), reason: err.to_string() })?;
        if token.is_empty() {
            return Err(Error::MalformedResponse { url, reason: "empty `token` field".into() });
        }

        Ok(FederatedToken::new(token))
    }
}
