//! The exchange itself: GitHub identity, then JWT, then STS credentials.
//!
//! Each stage sits behind a small trait so the sequence can be driven
//! with in-memory stand-ins.

use crate::{
    credentials::Credentials,
    error::{Result, Stage, StageExt},
    github::GitHubClient,
    idp::{FederatedToken, IdpClient, Subject},
    sts::{AssumeRoleRequest, StsBroker},
};

/// Who the credentials are requested for, by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Org { org: String },
    Team { org: String, team: String },
}

pub(crate) trait IdentityResolver {
    async fn org_id(&self, org: &str) -> Result<u64>;
    async fn team_id(&self, org: &str, team: &str) -> Result<u64>;
    async fn username(&self) -> Result<String>;
}

pub(crate) trait TokenIssuer {
    async fn issue_token(&self, subject: &Subject) -> Result<FederatedToken>;
}

pub(crate) trait RoleAssumer {
    async fn assume_role(&self, request: AssumeRoleRequest<'_>) -> Result<Credentials>;
}

impl IdentityResolver for GitHubClient {
    async fn org_id(&self, org: &str) -> Result<u64> {
        GitHubClient::org_id(self, org).await
    }

    async fn team_id(&self, org: &str, team: &str) -> Result<u64> {
        GitHubClient::team_id(self, org, team).await
    }

    async fn username(&self) -> Result<String> {
        GitHubClient::username(self).await
    }
}

impl TokenIssuer for IdpClient {
    async fn issue_token(&self, subject: &Subject) -> Result<FederatedToken> {
        IdpClient::issue_token(self, subject).await
    }
}

impl RoleAssumer for StsBroker {
    async fn assume_role(&self, request: AssumeRoleRequest<'_>) -> Result<Credentials> {
        StsBroker::assume_role(self, request).await
    }
}

/// Role parameters that stay fixed for a run.
#[derive(Clone, Debug)]
pub struct RoleSpec {
    pub role_arn: String,
    pub duration_seconds: i32,
    pub profile: String,
}

pub(crate) struct Pipeline<I, T, R> {
    pub identity: I,
    pub issuer: T,
    pub assumer: R,
    pub role: RoleSpec,
}

impl<I, T, R> Pipeline<I, T, R>
where
    I: IdentityResolver,
    T: TokenIssuer,
    R: RoleAssumer,
{
    /// Runs every stage once. Nothing is cached between runs.
    pub async fn run(&self, target: &Target) -> Result<Credentials> {
        let username = self.identity.username().await.stage(Stage::Username)?;
        let subject = self.resolve(target).await?;
        tracing::info!(user = %username, subject = %subject.path(), "requesting credentials");

        let token = self.issuer.issue_token(&subject).await.stage(Stage::Jwt)?;

        self.assumer
            .assume_role(AssumeRoleRequest {
                token: &token,
                role_arn: &self.role.role_arn,
                username: &username,
                duration_seconds: self.role.duration_seconds,
                profile: &self.role.profile,
            })
            .await
            .stage(Stage::AssumeRole)
    }

    async fn resolve(&self, target: &Target) -> Result<Subject> {
        let subject = match target {
            Target::Org { org } => Subject::Org {
                org_id: self.identity.org_id(org).await.stage(Stage::OrgId)?,
            },
            Target::Team { org, team } => Subject::Team {
                org_id: self.identity.org_id(org).await.stage(Stage::OrgId)?,
                team_id: self.identity.team_id(org, team).await.stage(Stage::TeamId)?,
            },
        };
        Ok(subject)
    }
}
