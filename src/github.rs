//! GitHub REST API lookups and token discovery.

use std::fmt;

use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const TOKEN_ENV_VARS: [&str; 2] = ["GH_TOKEN", "GITHUB_TOKEN"];
const API_VERSION: &str = "2022-11-28";

/// A GitHub access token. Never shown in `Debug` output.
#[derive(Clone)]
pub struct GitHubToken(String);

impl GitHubToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Looks up a token in `GH_TOKEN`, then `GITHUB_TOKEN`, then asks the
    /// GitHub CLI via `gh auth token`.
    pub async fn discover() -> Result<Self> {
        Self::discover_with(|name| std::env::var(name).ok()).await
    }

    async fn discover_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        for name in TOKEN_ENV_VARS {
            if let Some(token) = env(name).map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
                tracing::debug!(source = name, "using GitHub token from environment");
                return Ok(Self::new(token));
            }
        }

        match Command::new("gh").args(["auth", "token"]).output().await {
            Ok(output) if output.status.success() => {
                let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !token.is_empty() {
                    tracing::debug!("using GitHub token from `gh auth token`");
                    return Ok(Self::new(token));
                }
            }
            Ok(output) => {
                tracing::debug!(status = %output.status, "`gh auth token` failed");
            }
            Err(err) => {
                tracing::debug!(%err, "could not run `gh`");
            }
        }

        Err(Error::Authentication(
            "no GitHub token found; set GH_TOKEN or run `gh auth login`".into(),
        ))
    }
}

impl fmt::Debug for GitHubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GitHubToken(..)")
    }
}

#[derive(Deserialize)]
struct Id {
    id: u64,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

/// The handful of GitHub REST endpoints needed to build a token subject.
pub struct GitHubClient {
    api_url: String,
    token: GitHubToken,
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: GitHubToken, http: reqwest::Client) -> Self {
        Self { api_url: api_url.trim_end_matches('/').to_string(), token, http }
    }

    pub async fn org_id(&self, org: &str) -> Result<u64> {
        let Id { id } = self.get(&format!("orgs/{org}"), ("organization", org)).await?;
        tracing::debug!(org, id, "resolved organization");
        Ok(id)
    }

    pub async fn team_id(&self, org: &str, team: &str) -> Result<u64> {
        let name = format!("{org}/{team}");
        let Id { id } = self.get(&format!("orgs/{org}/teams/{team}"), ("team", &name)).await?;
        tracing::debug!(org, team, id, "resolved team");
        Ok(id)
    }

    pub async fn username(&self) -> Result<String> {
        let User { login } = self.get("user", ("user", "authenticated user")).await?;
        Ok(login)
    }

    /// `what` names the looked up entity for not-found errors.
    async fn get<T: DeserializeOwned>(&self, path: &str, what: (&'static str, &str)) -> Result<T> {
        let url = format!("{}/{path}", self.api_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.reveal())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|source| Error::Network { url: url.clone(), source })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::Authentication(format!(
                    "GitHub rejected the token ({})",
                    response.status()
                )));
            }
            StatusCode::NOT_FOUND => {
                let (kind, name) = what;
                return Err(Error::NotFound { kind, name: name.to_string() });
            }
            status => return Err(Error::Status { url, status }),
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| Error::Network { url: url.clone(), source })?;
        serde_json::from_slice(&body)
            .map_err(|err| Error::MalformedResponse { url, reason: err.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve, serve_json};

    fn client(url: &str) -> GitHubClient {
        GitHubClient::new(url, GitHubToken::new("gho_abc"), reqwest::Client::new())
    }

    #[tokio::test]
    async fn env_token_wins() {
        let token = GitHubToken::discover_with(|name| match name {
            "GH_TOKEN" => Some("  ".to_string()),
            "GITHUB_TOKEN" => Some("ghp_from_env\n".to_string()),
            _ => None,
        })
        .await
        .unwrap();
        assert_eq!(token.reveal(), "ghp_from_env");
    }

    #[test]
    fn token_debug_is_redacted() {
        assert_eq!(format!("{:?}", GitHubToken::new("gho_secret")), "GitHubToken(..)");
    }

    #[tokio::test]
    async fn resolves_org_and_team() {
        let (url, server) = serve(vec![
            (200, "application/json", r#"{"id":1234,"login":"acme"}"#.to_string()),
            (200, "application/json", r#"{"id":99,"slug":"infra"}"#.to_string()),
        ])
        .await;
        let client = client(&url);

        assert_eq!(client.org_id("acme").await.unwrap(), 1234);
        assert_eq!(client.team_id("acme", "infra").await.unwrap(), 99);

        let requests = server.await.unwrap();
        assert_eq!(requests[0].request_line(), "GET /orgs/acme HTTP/1.1");
        assert_eq!(requests[0].header("authorization"), Some("Bearer gho_abc"));
        assert_eq!(requests[0].header("x-github-api-version"), Some(API_VERSION));
        assert_eq!(requests[1].request_line(), "GET /orgs/acme/teams/infra HTTP/1.1");
    }

    #[tokio::test]
    async fn resolves_username() {
        let (url, server) = serve_json(200, r#"{"login":"octocat","id":1}"#).await;
        assert_eq!(client(&url).username().await.unwrap(), "octocat");
        assert_eq!(server.await.unwrap()[0].request_line(), "GET /user HTTP/1.1");
    }

    #[tokio::test]
    async fn unknown_org_is_not_found() {
        let (url, _server) = serve_json(404, r#"{"message":"Not Found"}"#).await;
        let err = client(&url).org_id("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "organization", ref name } if name == "nope"), "{err:?}");
    }

    #[tokio::test]
    async fn bad_token_is_authentication_error() {
        let (url, _server) = serve_json(401, r#"{"message":"Bad credentials"}"#).await;
        let err = client(&url).username().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)), "{err:?}");
    }

    #[tokio::test]
    async fn server_error_keeps_status() {
        let (url, _server) = serve_json(502, "").await;
        let err = client(&url).team_id("acme", "infra").await.unwrap_err();
        assert!(matches!(err, Error::Status { status, .. } if status == StatusCode::BAD_GATEWAY), "{err:?}");
    }

    #[tokio::test]
    async fn unexpected_body_is_malformed() {
        let (url, _server) = serve_json(200, r#"{"name":"acme"}"#).await;
        let err = client(&url).org_id("acme").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }), "{err:?}");
    }
}
