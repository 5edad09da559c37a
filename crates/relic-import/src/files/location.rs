use super::remote::RemoteLocation;
use std::fmt;
use std::path::PathBuf;

/// Parsed form of a job's `binaries_location`
///
/// | written as                         | meaning                          |
/// |------------------------------------|----------------------------------|
/// | `/path/to/dir`                     | local directory                  |
/// | `zip:/path/to/file.zip`            | local zip archive                |
/// | `sftp:user@host/path`, `ftp:...`   | directory on a remote server     |
/// | `zip+sftp:user@host/file.zip`      | zip archive on a remote server   |
/// | `http://...`, `https://...`        | web-accessible directory         |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinariesLocation {
    Local(PathBuf),
    Archive(PathBuf),
    Remote(RemoteLocation),
    ArchiveOverRemote(RemoteLocation),
    /// Base URL, always ending in `/`
    Http(String),
}

const REMOTE_SCHEMES: &[&str] = &["sftp", "ftp"];

impl BinariesLocation {
    /// Classify a location string. Unknown forms are local paths.
    pub fn parse(location: &str) -> Self {
        if let Some(rest) = location.strip_prefix("zip+") {
            if let Some((scheme, remainder)) = split_remote(rest) {
                return BinariesLocation::ArchiveOverRemote(RemoteLocation::parse(scheme, remainder));
            }
        }
        if let Some(path) = location.strip_prefix("zip:") {
            return BinariesLocation::Archive(PathBuf::from(path));
        }
        if let Some((scheme, remainder)) = split_remote(location) {
            return BinariesLocation::Remote(RemoteLocation::parse(scheme, remainder));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            let mut base = location.to_string();
            if !base.ends_with('/') {
                base.push('/');
            }
            return BinariesLocation::Http(base);
        }
        BinariesLocation::Local(PathBuf::from(location))
    }

    /// Scheme whose connector this location needs, if any
    pub fn remote_scheme(&self) -> Option<&str> {
        match self {
            BinariesLocation::Remote(remote) | BinariesLocation::ArchiveOverRemote(remote) => Some(&remote.scheme),
            _ => None,
        }
    }
}

fn split_remote(location: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = location.split_once(':')?;
    REMOTE_SCHEMES.contains(&scheme).then_some((scheme, rest))
}

impl fmt::Display for BinariesLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinariesLocation::Local(path) => write!(f, "{}", path.display()),
            BinariesLocation::Archive(path) => write!(f, "zip:{}", path.display()),
            BinariesLocation::Remote(remote) => write!(f, "{remote}"),
            BinariesLocation::ArchiveOverRemote(remote) => write!(f, "zip+{remote}"),
            BinariesLocation::Http(base) => f.write_str(base),
        }
    }
}
