use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the default credential file.
pub const CREDENTIAL_ENV: &str = "ADSAPI_RC";

/// Static credentials for the Atmosphere Data Store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Base API URL, typically `https://ads.atmosphere.copernicus.eu/api/v2`.
    pub base_url: String,
    pub user: String,
    pub secret: String,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

impl Credential {
    /// Loads credentials from `path`, or from the file named by `ADSAPI_RC` when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = resolve_path(path, std::env::var_os(CREDENTIAL_ENV))?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "failed to read credential file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&text, &path)
    }

    /// Parses the rc format:
    ///
    /// ```text
    /// url: https://ads.atmosphere.copernicus.eu/api/v2
    /// key: <UID>:<APIKEY>
    /// verify: 1
    /// ```
    ///
    /// Blank lines are allowed; any other line must be one of the three keys.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let mut url: Option<String> = None;
        let mut key: Option<(String, String)> = None;
        let mut verify: Option<bool> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let syntax_error = || Error::CredentialSyntax {
                path: origin.to_path_buf(),
                line: idx + 1,
                content: line.to_string(),
            };

            let (k, v) = line.split_once(':').ok_or_else(syntax_error)?;
            let v = strip_quotes(v.trim());
            let duplicate = match k.trim() {
                "url" if !v.is_empty() => url.replace(v.to_string()).is_some(),
                "key" => {
                    let pair = split_key_basic(v).ok_or_else(syntax_error)?;
                    key.replace(pair).is_some()
                }
                "verify" => {
                    let flag = match v {
                        "0" => false,
                        "1" => true,
                        _ => return Err(syntax_error()),
                    };
                    verify.replace(flag).is_some()
                }
                _ => return Err(syntax_error()),
            };
            if duplicate {
                return Err(Error::Config(format!(
                    "{}:{}: `{}` is given more than once",
                    origin.display(),
                    idx + 1,
                    k.trim()
                )));
            }
        }

        let base_url = url.ok_or_else(|| {
            Error::Config(format!("missing `url:` line in {}", origin.display()))
        })?;
        let (user, secret) = key.ok_or_else(|| {
            Error::Config(format!("missing `key:` line in {}", origin.display()))
        })?;

        Ok(Self {
            base_url,
            user,
            secret,
            verify_tls: verify.unwrap_or(true),
        })
    }
}

fn resolve_path(explicit: Option<&Path>, env_value: Option<OsString>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    match env_value {
        Some(v) if !v.is_empty() => Ok(PathBuf::from(v)),
        _ => Err(Error::Config(format!(
            "no credential file given and {} is not set",
            CREDENTIAL_ENV
        ))),
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn split_key_basic(key: &str) -> Option<(String, String)> {
    let (user, secret) = key.split_once(':')?;
    let (user, secret) = (user.trim(), secret.trim());
    if user.is_empty() || secret.is_empty() {
        return None;
    }
    Some((user.to_string(), secret.to_string()))
}
