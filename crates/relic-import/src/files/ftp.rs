//! FTP transport for `ftp:` and `zip+ftp:` locations
//!
//! suppaftp's client is blocking, so each operation runs on the blocking
//! pool with its own connection and is retried with linear back-off.

use super::remote::{RemoteConnector, RemoteCredentials, RemoteLocation};
use crate::error::BinarySourceError;
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;
use suppaftp::{FtpError, FtpStream};
use tracing::{debug, warn};

/// Maximum number of attempts per FTP operation
pub const MAX_RETRIES: u32 = 3;

/// Base delay between attempts; multiplied by the attempt number
pub const RETRY_DELAY_SECS: u64 = 5;

const DEFAULT_PORT: u16 = 21;
const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

#[derive(Debug, Clone)]
struct FtpTarget {
    address: String,
    username: String,
    password: String,
}

impl FtpTarget {
    fn new(location: &RemoteLocation, credentials: &RemoteCredentials) -> Self {
        Self {
            address: format!("{}:{}", location.host, location.port.unwrap_or(DEFAULT_PORT)),
            username: location.user.clone().unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            password: credentials
                .password
                .clone()
                .unwrap_or_else(|| ANONYMOUS_PASSWORD.to_string()),
        }
    }

    fn connect(&self) -> Result<FtpStream, FtpError> {
        debug!(address = %self.address, user = %self.username, "Connecting to FTP server");
        let mut stream = FtpStream::connect(&self.address)?;
        // Extended passive mode works through NAT and containers
        stream.set_mode(suppaftp::Mode::ExtendedPassive);
        stream.login(&self.username, &self.password)?;
        stream.transfer_type(suppaftp::types::FileType::Binary)?;
        Ok(stream)
    }

    fn exists_sync(&self, path: &str) -> Result<bool, FtpError> {
        let mut stream = self.connect()?;
        let exists = match stream.size(path) {
            Ok(_) => true,
            // the server answered but would not size the path
            Err(FtpError::UnexpectedResponse(_)) => false,
            Err(e) => return Err(e),
        };
        if let Err(e) = stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }
        Ok(exists)
    }

    fn fetch_sync(&self, path: &str) -> Result<Vec<u8>, FtpError> {
        let mut stream = self.connect()?;
        let mut reader = stream.retr_as_buffer(path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(FtpError::ConnectionError)?;
        debug!("Downloaded {} bytes from {}", data.len(), path);
        if let Err(e) = stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }
        Ok(data)
    }
}

/// Built-in connector for `ftp:` locations
#[derive(Debug, Clone)]
pub struct FtpConnector {
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for FtpConnector {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECS),
        }
    }
}

impl FtpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn with_retry<T, F>(&self, what: &str, op: F) -> Result<T, BinarySourceError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, FtpError> + Clone + Send + 'static,
    {
        for attempt in 1..=self.max_retries {
            debug!("{} attempt {}/{}", what, attempt, self.max_retries);
            match tokio::task::spawn_blocking(op.clone()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if attempt < self.max_retries => {
                    let delay = self.retry_delay * attempt;
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}...",
                        what, attempt, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                },
                Ok(Err(e)) => {
                    return Err(BinarySourceError::Remote(format!(
                        "{} failed after {} attempts: {}",
                        what, self.max_retries, e
                    )))
                },
                Err(e) => {
                    return Err(BinarySourceError::Remote(format!("FTP task panicked: {e}")));
                },
            }
        }
        Err(BinarySourceError::Remote(format!("{what} was not attempted")))
    }
}

#[async_trait]
impl RemoteConnector for FtpConnector {
    fn scheme(&self) -> &str {
        "ftp"
    }

    async fn exists(
        &self,
        location: &RemoteLocation,
        credentials: &RemoteCredentials,
        path: &str,
    ) -> Result<bool, BinarySourceError> {
        let target = FtpTarget::new(location, credentials);
        let path = path.to_string();
        self.with_retry(&format!("SIZE {path}"), move || target.exists_sync(&path))
            .await
    }

    async fn fetch(
        &self,
        location: &RemoteLocation,
        credentials: &RemoteCredentials,
        path: &str,
    ) -> Result<Vec<u8>, BinarySourceError> {
        let target = FtpTarget::new(location, credentials);
        let path = path.to_string();
        self.with_retry(&format!("RETR {path}"), move || target.fetch_sync(&path))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults_to_anonymous_login() {
        let location = RemoteLocation::parse("ftp", "ftp.example.org/pub/scans");
        let target = FtpTarget::new(&location, &RemoteCredentials::default());
        assert_eq!(target.address, "ftp.example.org:21");
        assert_eq!(target.username, "anonymous");
        assert_eq!(target.password, "anonymous@");
    }

    #[test]
    fn test_target_uses_location_user_and_password() {
        let location = RemoteLocation::parse("ftp", "loader@10.0.0.5:2121/incoming");
        let credentials = RemoteCredentials {
            password: Some("s3cret".to_string()),
            ..Default::default()
        };
        let target = FtpTarget::new(&location, &credentials);
        assert_eq!(target.address, "10.0.0.5:2121");
        assert_eq!(target.username, "loader");
        assert_eq!(target.password, "s3cret");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_remote_error() {
        let connector = FtpConnector::new().with_retries(1, Duration::from_millis(1));
        let location = RemoteLocation::parse("ftp", "127.0.0.1:1/none");
        let err = connector
            .exists(&location, &RemoteCredentials::default(), "/none/a.tif")
            .await
            .unwrap_err();
        assert!(matches!(err, BinarySourceError::Remote(_)));
    }
}
