//! Role assumption through STS `AssumeRoleWithWebIdentity`.

use std::time::Duration;

use aws_config::{meta::region::RegionProviderChain, retry::RetryConfig, timeout::TimeoutConfig};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_types::region::Region;
use chrono::{DateTime, Utc};

use crate::{
    credentials::Credentials,
    error::{Error, Result},
    idp::FederatedToken,
};

/// The region the broker falls back to when none is configured.
pub const DEFAULT_REGION: &str = "us-east-2";

/// Prefix of every role session name; the GitHub username follows it.
pub const SESSION_NAME_PREFIX: &str = "nv-gha-aws";

pub struct AssumeRoleRequest<'a> {
    pub token: &'a FederatedToken,
    pub role_arn: &'a str,
    pub username: &'a str,
    pub duration_seconds: i32,
    pub profile: &'a str,
}

/// Names the role session after the caller so CloudTrail shows who it was.
pub fn session_name(username: &str) -> String {
    format!("{SESSION_NAME_PREFIX}-{username}")
}

pub struct StsBroker {
    client: aws_sdk_sts::Client,
}

impl StsBroker {
    /// Builds an STS client for `region`, or the default region chain.
    ///
    /// Retries are off: a rejected web identity token stays rejected.
    /// No AWS credentials are loaded; the web identity token is the only
    /// proof of identity and the request goes out unsigned.
    pub async fn new(region: Option<String>, timeout: Duration, endpoint_url: Option<&str>) -> Self {
        let region = RegionProviderChain::first_try(region.map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut loader = aws_config::from_env()
            .no_credentials()
            .region(region)
            .retry_config(RetryConfig::disabled())
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        if let Some(url) = endpoint_url {
            loader = loader.endpoint_url(url);
        }

        let config = loader.load().await;
        Self { client: aws_sdk_sts::Client::new(&config) }
    }

    pub async fn assume_role(&self, request: AssumeRoleRequest<'_>) -> Result<Credentials> {
        let session_name = session_name(request.username);
        tracing::debug!(
            role_arn = request.role_arn,
            session_name = %session_name,
            duration_seconds = request.duration_seconds,
            "assuming role with web identity"
        );

        let rejected = |message: String| Error::RoleAssumption {
            role_arn: request.role_arn.to_string(),
            message,
        };

        let output = self
            .client
            .assume_role_with_web_identity()
            .role_arn(request.role_arn)
            .role_session_name(&session_name)
            .web_identity_token(request.token.reveal())
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|err| match (err.code(), err.message()) {
                (Some(code), Some(message)) => rejected(format!("{code}: {message}")),
                _ => rejected(DisplayErrorContext(&err).to_string()),
            })?;

        let creds = output
            .credentials()
            .ok_or_else(|| rejected("STS returned no credentials".into()))?;
        let field = |value: Option<&str>, name: &str| {
            value
                .map(str::to_string)
                .ok_or_else(|| rejected(format!("STS response is missing {name}")))
        };

        let expiration = creds
            .expiration()
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()));
        if let Some(expiration) = expiration {
            tracing::info!(%expiration, "credentials issued");
        }

        Ok(Credentials {
            access_key_id: field(creds.access_key_id(), "AccessKeyId")?,
            secret_access_key: field(creds.secret_access_key(), "SecretAccessKey")?,
            session_token: field(creds.session_token(), "SessionToken")?,
            expiration,
            profile: request.profile.to_string(),
        })
    }
}
