use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::{credentials::OutputFormat, github};

pub const DEFAULT_IDP_URL: &str = "https://token.gha-runners.nvidia.com";
pub const DEFAULT_AUDIENCE: &str = "sts.amazonaws.com";
pub const DEFAULT_DURATION: i32 = 43200;

/// A GitHub CLI extension to receive AWS credentials
#[derive(Debug, Parser)]
#[command(name = "nv-gha-aws", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub options: Options,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Receive AWS credentials by providing an organization name
    Org {
        /// GitHub organization name
        org: String,
    },
    /// Receive AWS credentials by providing both an organization name and a team name
    Team {
        /// GitHub organization name
        org: String,
        /// Team name (slug) within the organization
        team: String,
    },
}

#[derive(Debug, Args)]
pub struct Options {
    /// Role ARN to assume
    #[arg(long, global = true, env = "NV_GHA_AWS_ROLE_ARN")]
    pub role_arn: Option<String>,

    /// Identity provider URL
    #[arg(long, global = true, env = "NV_GHA_AWS_IDP_URL", default_value = DEFAULT_IDP_URL)]
    pub idp_url: String,

    /// Audience of the web identity token
    #[arg(long, global = true, default_value = DEFAULT_AUDIENCE)]
    pub aud: String,

    /// The maximum session duration of the temporary AWS credentials in seconds
    #[arg(short, long, global = true, default_value_t = DEFAULT_DURATION)]
    pub duration: i32,

    /// Output format of the credentials
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Shell)]
    pub output: OutputFormat,

    /// Write the credentials to the AWS credentials file
    #[arg(short, long, global = true)]
    pub write: bool,

    /// File path to write AWS credentials to [default: ~/.aws/credentials]
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Profile the credentials are written under [default: default]
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// AWS region of the STS endpoint [default: AWS region chain, then us-east-2]
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// GitHub REST API URL
    #[arg(long, global = true, env = "GH_API_URL", default_value = github::DEFAULT_API_URL)]
    pub github_api_url: String,

    /// Timeout for each network request in seconds
    #[arg(long, global = true, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}
