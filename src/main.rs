mod cli;
mod config;
mod credentials;
mod error;
mod github;
mod idp;
mod pipeline;
mod sts;
#[cfg(test)]
mod test_support;

use std::{io::Write, path::Path, process::ExitCode, time::Duration};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    cli::Cli,
    config::Config,
    credentials::{Credentials, OutputFormat},
    error::{Error, Result, Stage, StageExt},
    github::{GitHubClient, GitHubToken},
    idp::IdpClient,
    pipeline::{Pipeline, Target},
    sts::StsBroker,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.options.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut message = err.to_string();
            let mut source = std::error::Error::source(err.root());
            while let Some(cause) = source {
                message.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            eprintln!("Error: {message}");
            ExitCode::from(err.exit_code())
        }
    }
}

/// Logs go to stderr; stdout only ever carries credentials.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let (config, target) = cli.into_config()?;

    tokio::select! {
        result = exchange(config, target) => result,
        () = shutdown_signal() => {
            tracing::warn!("interrupted, aborting");
            Err(Error::Interrupted)
        }
    }
}

async fn exchange(config: Config, target: Target) -> Result<()> {
    let token = GitHubToken::discover().await.stage(Stage::GitHubToken)?;
    let http = http_client(config.timeout)?;

    let pipeline = Pipeline {
        identity: GitHubClient::new(&config.github_api_url, token.clone(), http.clone()),
        issuer: IdpClient::new(&config.idp_url, &config.audience, token, http),
        assumer: StsBroker::new(config.region.clone(), config.timeout, None).await,
        role: config.role.clone(),
    };
    let creds = pipeline.run(&target).await?;

    let mut stdout = std::io::stdout().lock();
    deliver(&creds, config.output, config.write_to.as_deref(), &mut stdout)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::HttpClient)
}

/// Renders, persists when asked, and only then prints, so a failed write
/// leaves `out` untouched.
fn deliver(creds: &Credentials, format: OutputFormat, write_to: Option<&Path>, out: &mut impl Write) -> Result<()> {
    let rendered = creds.render(format)?;
    if let Some(path) = write_to {
        creds.persist(path).stage(Stage::WriteCredentials)?;
    }

    out.write_all(rendered.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| Error::filesystem("<stdout>", err))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::debug!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::debug!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "ASIAEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: "session".into(),
            expiration: None,
            profile: "ci".into(),
        }
    }

    #[test]
    fn failed_write_prints_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("credentials");

        let mut out = Vec::new();
        let err = deliver(&creds(), OutputFormat::CredsFile, Some(&path), &mut out).unwrap_err();

        assert!(matches!(err, Error::Stage { stage: Stage::WriteCredentials, .. }), "{err:?}");
        assert!(out.is_empty());
    }

    #[test]
    fn write_also_prints_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");

        let mut out = Vec::new();
        deliver(&creds(), OutputFormat::CredsFile, Some(&path), &mut out).unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("[ci]\naws_access_key_id=ASIAEXAMPLE\n"), "{printed}");
        assert!(fs::read_to_string(&path).unwrap().contains("aws_session_token=session"));
    }

    #[test]
    fn print_only_leaves_filesystem_alone() {
        let mut out = Vec::new();
        deliver(&creds(), OutputFormat::Shell, None, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "export AWS_ACCESS_KEY_ID=ASIAEXAMPLE\nexport AWS_SECRET_ACCESS_KEY=secret\nexport AWS_SESSION_TOKEN=session\n"
        );
    }

    #[test]
    fn client_setup_failure_names_no_request() {
        let source = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err = Error::HttpClient(source);
        assert_eq!(err.to_string(), "failed to build HTTP client");
        assert_eq!(err.exit_code(), 1);
        assert!(http_client(Duration::from_secs(5)).is_ok());
    }
}
