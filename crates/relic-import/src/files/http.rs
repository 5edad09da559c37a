use super::{mimetype, BinarySource, ByteStream};
use crate::error::BinarySourceError;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{header, StatusCode};
use tokio_util::io::StreamReader;

/// A file served over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFileSource {
    client: reqwest::Client,
    url: String,
    filename: String,
}

impl HttpFileSource {
    /// `base` must end in `/`
    pub fn new(client: reqwest::Client, base: &str, filename: &str) -> Self {
        let path = filename
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            client,
            url: format!("{base}{path}"),
            filename: filename.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BinarySource for HttpFileSource {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn location(&self) -> String {
        self.url.clone()
    }

    async fn exists(&self) -> Result<bool, BinarySourceError> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| BinarySourceError::http(&self.url, e))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            status => Err(BinarySourceError::http(&self.url, format!("HEAD returned {status}"))),
        }
    }

    /// Server-declared Content-Type, falling back to the extension
    async fn mimetype(&self) -> Result<String, BinarySourceError> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| BinarySourceError::http(&self.url, e))?;
        let declared = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(mimetype::essence)
            .filter(|essence| !essence.is_empty());
        Ok(declared
            .or_else(|| mimetype::from_extension(&self.filename).map(str::to_string))
            .unwrap_or_else(|| mimetype::DEFAULT_MIMETYPE.to_string()))
    }

    async fn open(&self) -> Result<ByteStream, BinarySourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BinarySourceError::http(&self.url, e))?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Err(BinarySourceError::NotFound(self.url.clone()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| BinarySourceError::http(&self.url, e))?;
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_source() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/batch/page%201.html"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/html; charset=utf-8"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/batch/page%201.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>one</p>"))
            .mount(&server)
            .await;

        let base = format!("{}/batch/", server.uri());
        let source = HttpFileSource::new(reqwest::Client::new(), &base, "page 1.html");
        assert!(source.exists().await.unwrap());
        assert_eq!(source.mimetype().await.unwrap(), "text/html");

        let mut body = String::new();
        source.open().await.unwrap().read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "<p>one</p>");
    }

    #[tokio::test]
    async fn test_http_source_missing() {
        let server = MockServer::start().await;
        let base = format!("{}/", server.uri());
        let source = HttpFileSource::new(reqwest::Client::new(), &base, "gone.tif");
        assert!(!source.exists().await.unwrap());
        assert!(matches!(source.open().await, Err(BinarySourceError::NotFound(_))));
    }
}
