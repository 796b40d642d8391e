//! Backing-file locations.

use crate::error::{BridgeError, BridgeResult};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// URL schemes treated as remote.
pub const REMOTE_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(Url),
}

impl Location {
    /// Resolve a location string.
    ///
    /// `scheme://...` strings are parsed as URLs (`file://` is local);
    /// anything else is a path, joined onto `root` when relative. Paths are
    /// not sandboxed: `..` segments and absolute paths pass through.
    pub fn resolve(location: &str, root: &Path) -> BridgeResult<Self> {
        if location.is_empty() {
            return Err(BridgeError::Configuration("empty location".to_string()));
        }
        if !location.contains("://") {
            let path = Path::new(location);
            return Ok(if path.is_absolute() {
                Location::Local(path.to_path_buf())
            } else {
                Location::Local(root.join(path))
            });
        }

        let url = Url::parse(location).map_err(|err| {
            BridgeError::Configuration(format!("invalid location URL '{location}': {err}"))
        })?;
        match url.scheme() {
            "file" => url.to_file_path().map(Location::Local).map_err(|()| {
                BridgeError::Configuration(format!("'{location}' is not a usable file URL"))
            }),
            scheme if REMOTE_SCHEMES.contains(&scheme) => Ok(Location::Remote(url)),
            scheme => Err(BridgeError::Configuration(format!(
                "unsupported location scheme '{scheme}'"
            ))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote(_))
    }
}

/// Remote locations display without their password.
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(url) => {
                let mut shown = url.clone();
                if shown.password().is_some() {
                    let _ = shown.set_password(Some("***"));
                }
                f.write_str(shown.as_str())
            }
        }
    }
}
