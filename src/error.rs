//! Error types shared by every stage of the credential exchange.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Result type for credential exchange operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code used for bad flags or flag combinations.
const EXIT_USAGE: u8 = 2;

/// Exit code used when the run is aborted by SIGINT/SIGTERM.
const EXIT_INTERRUPTED: u8 = 130;

/// A step of the exchange pipeline, used to label failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    GitHubToken,
    Username,
    OrgId,
    TeamId,
    Jwt,
    AssumeRole,
    WriteCredentials,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GitHubToken => "get GitHub token",
            Self::Username => "get username",
            Self::OrgId => "get org ID",
            Self::TeamId => "get team ID",
            Self::Jwt => "get JWT",
            Self::AssumeRole => "get AWS credentials",
            Self::WriteCredentials => "write credentials file",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// No GitHub token, or the token was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An organization or team name that GitHub does not know.
    #[error("{kind} `{name}` not found")]
    NotFound { kind: &'static str, name: String },

    /// The request never produced an HTTP response.
    #[error("request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A non-2xx response that has no more specific meaning.
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// STS refused the web identity token or the role.
    #[error("failed to assume role {role_arn}: {message}")]
    RoleAssumption { role_arn: String, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to encode credentials")]
    Encode(#[source] serde_json::Error),

    #[error("failed to access {}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {reason}", path.display())]
    CredentialsFile { path: PathBuf, reason: String },

    #[error("interrupted")]
    Interrupted,

    #[error("failed to {stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem { path: path.into(), source }
    }

    /// Wraps this error with the pipeline stage it came from.
    pub fn at(self, stage: Stage) -> Self {
        Self::Stage { stage, source: Box::new(self) }
    }

    /// The innermost error, skipping stage labels.
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self.root() {
            Self::Validation(_) => EXIT_USAGE,
            Self::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}

/// Extension for labelling a result with the stage that produced it.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|err| err.at(stage))
    }
}
