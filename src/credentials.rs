//! Temporary AWS credentials and the sinks they can be written to.

use std::{
    fmt, fs,
    io::{self, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use configparser::ini::Ini;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";

/// Holds keys that appear before the first `[section]` header, so they
/// are written back without a header.
const UNSECTIONED: &str = "\u{0}unsectioned";

/// Textual encodings for a set of credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `export` statements for a POSIX shell
    #[default]
    Shell,
    /// A JSON object
    Json,
    /// A profile block in AWS credentials file format
    CredsFile,
}

/// Credentials returned by STS for one profile.
///
/// The secret key and session token are not printed in `Debug` output.
#[derive(Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    pub profile: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        let text = match format {
            OutputFormat::Shell => format!(
                "export AWS_ACCESS_KEY_ID={}\nexport AWS_SECRET_ACCESS_KEY={}\nexport AWS_SESSION_TOKEN={}\n",
                self.access_key_id, self.secret_access_key, self.session_token
            ),
            OutputFormat::Json => {
                let mut json = serde_json::to_string_pretty(self).map_err(Error::Encode)?;
                json.push('\n');
                json
            }
            OutputFormat::CredsFile => format!(
                "[{}]\n{ACCESS_KEY_ID}={}\n{SECRET_ACCESS_KEY}={}\n{SESSION_TOKEN}={}\n",
                self.profile, self.access_key_id, self.secret_access_key, self.session_token
            ),
        };
        Ok(text)
    }

    /// Stores the credentials under `[profile]` in the INI file at `path`.
    ///
    /// Other sections are kept as they are. The new content goes to a
    /// temporary file next to the real file (the symlink target, if `path`
    /// is a link) which is then renamed over it, so the file is never left
    /// half written.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let target = match fs::canonicalize(path) {
            Ok(target) => target,
            Err(err) if err.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
            Err(err) => return Err(Error::filesystem(path, err)),
        };

        let mut ini = Ini::new_cs();
        ini.set_default_section(UNSECTIONED);
        // No comment syntax: comment lines are kept as valueless keys and
        // values containing `#` or `;` are not cut short.
        ini.set_comment_symbols(&[]);

        match fs::read_to_string(&target) {
            Ok(contents) => {
                ini.read(contents).map_err(|reason| Error::CredentialsFile {
                    path: target.clone(),
                    reason,
                })?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::filesystem(&target, err)),
        }

        ini.set(&self.profile, ACCESS_KEY_ID, Some(self.access_key_id.clone()));
        ini.set(&self.profile, SECRET_ACCESS_KEY, Some(self.secret_access_key.clone()));
        ini.set(&self.profile, SESSION_TOKEN, Some(self.session_token.clone()));

        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|err| Error::filesystem(dir, err))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|err| Error::filesystem(dir, err))?;
        tmp.write_all(ini.writes().as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|err| Error::filesystem(tmp.path(), err))?;
        tmp.persist(&target).map_err(|err| Error::filesystem(&target, err.error))?;

        tracing::info!(path = %target.display(), profile = %self.profile, "wrote credentials");
        Ok(())
    }
}
