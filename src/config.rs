//! Validated run configuration built from the command line.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    cli::{Cli, Commands},
    credentials::OutputFormat,
    error::{Error, Result},
    pipeline::{RoleSpec, Target},
};

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Clone, Debug)]
pub struct Config {
    pub role: RoleSpec,
    pub idp_url: String,
    pub audience: String,
    pub output: OutputFormat,
    /// Credentials file to update, when `--write` was given.
    pub write_to: Option<PathBuf>,
    pub region: Option<String>,
    pub github_api_url: String,
    pub timeout: Duration,
}

impl Cli {
    /// Checks flag combinations and resolves defaults.
    ///
    /// Runs before any token lookup or network request.
    pub fn into_config(self) -> Result<(Config, Target)> {
        let opts = self.options;
        let creds_file = opts.output == OutputFormat::CredsFile;

        if opts.file.is_some() && !opts.write {
            return Err(Error::validation("the write flag must be set if specifying a file path"));
        }
        if opts.profile.is_some() && !creds_file {
            return Err(Error::validation(
                "the profile can only be set if the output flag is set to creds-file",
            ));
        }
        if opts.write && !creds_file {
            return Err(Error::validation(
                "the write flag can only be set if the output flag is set to creds-file",
            ));
        }

        let role_arn = opts
            .role_arn
            .filter(|arn| !arn.trim().is_empty())
            .ok_or_else(|| Error::validation("the --role-arn flag is required"))?;

        let write_to = if opts.write {
            Some(match opts.file {
                Some(file) => expand_home(&expand_vars(&file, |name| std::env::var(name).ok()))?,
                None => default_credentials_path()?,
            })
        } else {
            None
        };

        let target = match self.command {
            Commands::Org { org } => Target::Org { org },
            Commands::Team { org, team } => Target::Team { org, team },
        };

        let config = Config {
            role: RoleSpec {
                role_arn,
                duration_seconds: opts.duration,
                profile: opts.profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            },
            idp_url: opts.idp_url,
            audience: opts.aud,
            output: opts.output,
            write_to,
            region: opts.region,
            github_api_url: opts.github_api_url,
            timeout: Duration::from_secs(opts.timeout),
        };
        Ok((config, target))
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::validation("could not determine home directory"))
}

fn default_credentials_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".aws").join("credentials"))
}

/// Expands `$NAME` and `${NAME}`; unset variables become empty.
fn expand_vars(path: &Path, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    let Some(input) = path.to_str() else {
        return path.to_path_buf();
    };

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, tail) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], &braced[end + 1..]),
                None => ("", after),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                after.split_at(end)
            }
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
        } else {
            out.push_str(&env(name).unwrap_or_default());
            rest = tail;
        }
    }
    out.push_str(rest);
    PathBuf::from(out)
}

/// Expands a leading `~` to the home directory.
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}
