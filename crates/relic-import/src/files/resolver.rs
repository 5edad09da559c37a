use super::archive::{ArchiveLocation, RemoteArchive, ZipFileSource};
use super::ftp::FtpConnector;
use super::http::HttpFileSource;
use super::local::LocalFileSource;
use super::location::BinariesLocation;
use super::remote::{RemoteConnector, RemoteCredentials, RemoteFileSource};
use super::{BinarySource, UnavailableSource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Maps a binaries location and a relative path to a [`BinarySource`].
///
/// Resolution never touches the network or the filesystem. Remote archives
/// are shared between sources so each one is downloaded at most once per
/// resolver.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    http: reqwest::Client,
    connectors: HashMap<String, Arc<dyn RemoteConnector>>,
    credentials: RemoteCredentials,
    archives: Arc<Mutex<HashMap<String, Arc<RemoteArchive>>>>,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceResolver {
    /// Resolver with the built-in FTP connector registered
    pub fn new() -> Self {
        let mut resolver = Self {
            http: reqwest::Client::new(),
            connectors: HashMap::new(),
            credentials: RemoteCredentials::default(),
            archives: Arc::new(Mutex::new(HashMap::new())),
        };
        resolver.register(Arc::new(FtpConnector::new()));
        resolver
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Register or replace the connector for its scheme
    pub fn with_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.register(connector);
        self
    }

    pub fn with_credentials(mut self, credentials: RemoteCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn credentials(&self) -> &RemoteCredentials {
        &self.credentials
    }

    fn register(&mut self, connector: Arc<dyn RemoteConnector>) {
        self.connectors.insert(connector.scheme().to_string(), connector);
    }

    pub fn resolve(&self, base_location: &str, path: &str) -> Box<dyn BinarySource> {
        self.resolve_in(&BinariesLocation::parse(base_location), path)
    }

    pub fn resolve_in(&self, location: &BinariesLocation, path: &str) -> Box<dyn BinarySource> {
        debug!(location = %location, path, "Resolving binary source");
        match location {
            BinariesLocation::Local(base) => Box::new(LocalFileSource::new(base.clone(), path)),
            BinariesLocation::Archive(archive) => {
                Box::new(ZipFileSource::new(ArchiveLocation::Local(archive.clone()), path))
            },
            BinariesLocation::Http(base) => Box::new(HttpFileSource::new(self.http.clone(), base, path)),
            BinariesLocation::Remote(remote) => match self.connectors.get(&remote.scheme) {
                Some(connector) => Box::new(RemoteFileSource::new(
                    connector.clone(),
                    remote.clone(),
                    self.credentials.clone(),
                    path,
                )),
                None => self.unavailable(location, &remote.scheme, path),
            },
            BinariesLocation::ArchiveOverRemote(remote) => match self.connectors.get(&remote.scheme) {
                Some(connector) => {
                    let key = location.to_string();
                    let archive = self
                        .archives
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entry(key)
                        .or_insert_with(|| {
                            Arc::new(RemoteArchive::new(
                                connector.clone(),
                                remote.clone(),
                                self.credentials.clone(),
                            ))
                        })
                        .clone();
                    Box::new(ZipFileSource::new(ArchiveLocation::Remote(archive), path))
                },
                None => self.unavailable(location, &remote.scheme, path),
            },
        }
    }

    fn unavailable(&self, location: &BinariesLocation, scheme: &str, path: &str) -> Box<dyn BinarySource> {
        Box::new(UnavailableSource {
            filename: path.to_string(),
            location: format!("{location}/{path}"),
            scheme: scheme.to_string(),
        })
    }
}
