//! LDP repository client
//!
//! Speaks the Fedora-style REST API: N-Triples reads, Turtle creates,
//! SPARQL Update patches and `fcr:tx` transactions. Inside a transaction
//! every URI under the endpoint is re-rooted at the transaction URL.

use super::{NewBinary, Repository, RepositoryResult, Transaction};
use crate::error::RepositoryError;
use crate::rdf::{parse_ntriples, Changeset, Description, Term, Triple};
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const NTRIPLES: &str = "application/n-triples";
const TURTLE: &str = "text/turtle";
const SPARQL_UPDATE: &str = "application/sparql-update";

#[derive(Debug, Clone)]
struct Connection {
    client: Client,
    token: Option<String>,
}

impl Connection {
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn patch(&self, url: &str, changes: &Changeset) -> RepositoryResult<()> {
        debug!(url, "PATCH");
        let response = self
            .request(Method::PATCH, url)
            .header(header::CONTENT_TYPE, SPARQL_UPDATE)
            .body(changes.to_sparql_update())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Client for an LDP repository endpoint such as `http://localhost:8080/rest`
#[derive(Debug, Clone)]
pub struct HttpRepository {
    connection: Connection,
    endpoint: String,
}

impl HttpRepository {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> RepositoryResult<Self> {
        url::Url::parse(endpoint)
            .map_err(|e| RepositoryError::Parse(format!("invalid repository endpoint {endpoint}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            connection: Connection { client, token },
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Canonical URI for a container given as a path or a full URI
    pub fn container_uri(&self, container: &str) -> String {
        if container.starts_with("http://") || container.starts_with("https://") {
            container.trim_end_matches('/').to_string()
        } else {
            format!("{}/{}", self.endpoint, container.trim_matches('/'))
        }
    }
}

async fn check(response: Response) -> RepositoryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(RepositoryError::Http {
        status: status.as_u16(),
        url,
        body,
    })
}

fn location(response: &Response) -> RepositoryResult<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Parse(format!("No Location header in response from {}", response.url())))
}

#[async_trait]
impl Repository for HttpRepository {
    async fn read(&self, uri: &str) -> RepositoryResult<Option<Description>> {
        let response = self
            .connection
            .request(Method::GET, uri)
            .header(header::ACCEPT, NTRIPLES)
            .send()
            .await?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        let body = check(response).await?.text().await?;
        let triples = parse_ntriples(&body).map_err(|e| RepositoryError::Parse(format!("{uri}: {e}")))?;
        Ok(Some(Description::from_triples(uri, &triples)))
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn Transaction>> {
        let url = format!("{}/fcr:tx", self.endpoint);
        let response = check(self.connection.request(Method::POST, &url).send().await?).await?;
        let tx = location(&response)?.trim_end_matches('/').to_string();
        info!(transaction = %tx, "Started transaction");
        Ok(Box::new(HttpTransaction {
            connection: self.connection.clone(),
            endpoint: self.endpoint.clone(),
            tx,
        }))
    }

    async fn update(&self, uri: &str, changes: &Changeset) -> RepositoryResult<()> {
        self.connection.patch(uri, changes).await
    }
}

struct HttpTransaction {
    connection: Connection,
    endpoint: String,
    tx: String,
}

impl HttpTransaction {
    fn to_tx(&self, uri: &str) -> String {
        match uri.strip_prefix(&self.endpoint) {
            Some(rest) => format!("{}{}", self.tx, rest),
            None => uri.to_string(),
        }
    }

    fn from_tx(&self, uri: &str) -> String {
        match uri.strip_prefix(&self.tx) {
            Some(rest) => format!("{}{}", self.endpoint, rest),
            None => uri.to_string(),
        }
    }

    fn term_to_tx(&self, term: &Term) -> Term {
        match term {
            Term::Iri(iri) if !iri.is_empty() => Term::Iri(self.to_tx(iri)),
            other => other.clone(),
        }
    }

    fn triple_to_tx(&self, triple: &Triple) -> Triple {
        Triple::new(
            self.to_tx(&triple.subject),
            triple.predicate.clone(),
            self.term_to_tx(&triple.object),
        )
    }

    fn changes_to_tx(&self, changes: &Changeset) -> Changeset {
        Changeset {
            deletes: changes.deletes.iter().map(|t| self.triple_to_tx(t)).collect(),
            inserts: changes.inserts.iter().map(|t| self.triple_to_tx(t)).collect(),
        }
    }

    fn container_url(&self, container: &str) -> String {
        if container.starts_with("http://") || container.starts_with("https://") {
            self.to_tx(container.trim_end_matches('/'))
        } else {
            format!("{}/{}", self.tx, container.trim_matches('/'))
        }
    }

    async fn finish(&self, action: &str) -> RepositoryResult<()> {
        let url = format!("{}/fcr:tx/fcr:{action}", self.tx);
        let response = self.connection.request(Method::POST, &url).send().await?;
        check(response)
            .await
            .map_err(|e| RepositoryError::Transaction(format!("{action} of {} failed: {e}", self.tx)))?;
        info!(transaction = %self.tx, "Transaction {}", action);
        Ok(())
    }
}

#[async_trait]
impl Transaction for HttpTransaction {
    async fn create_child(&mut self, container: &str, description: &Description) -> RepositoryResult<String> {
        let mut body = Description::new("");
        for (predicate, object) in &description.statements {
            body.add(predicate.clone(), self.term_to_tx(object));
        }
        let url = self.container_url(container);
        debug!(url = %url, "POST resource");
        let response = self
            .connection
            .request(Method::POST, &url)
            .header(header::CONTENT_TYPE, TURTLE)
            .body(body.to_ntriples())
            .send()
            .await?;
        let created = location(&check(response).await?)?;
        Ok(self.from_tx(&created))
    }

    async fn create_binary(&mut self, container: &str, mut binary: NewBinary) -> RepositoryResult<String> {
        let mut data = Vec::new();
        binary
            .data
            .read_to_end(&mut data)
            .await
            .map_err(|e| RepositoryError::Transaction(format!("Reading {} failed: {e}", binary.filename)))?;

        let url = self.container_url(container);
        debug!(url = %url, filename = %binary.filename, bytes = data.len(), "POST binary");
        let response = self
            .connection
            .request(Method::POST, &url)
            .header(header::CONTENT_TYPE, binary.mimetype.as_str())
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", binary.filename.replace('"', "")),
            )
            .header("Digest", relic_common::checksum::digest_header(&binary.digest))
            .body(data)
            .send()
            .await?;
        let created = location(&check(response).await?)?;

        if !binary.description.statements.is_empty() {
            let mut changes = Changeset::default();
            for (predicate, object) in &binary.description.statements {
                changes.insert(Triple::new(created.clone(), predicate.clone(), self.term_to_tx(object)));
            }
            self.connection
                .patch(&format!("{created}/fcr:metadata"), &changes)
                .await?;
        }
        Ok(self.from_tx(&created))
    }

    async fn update(&mut self, uri: &str, changes: &Changeset) -> RepositoryResult<()> {
        self.connection
            .patch(&self.to_tx(uri), &self.changes_to_tx(changes))
            .await
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.finish("commit").await
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        self.finish("rollback").await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rdf::vocab;
    use wiremock::matchers::{body_string_contains, header as has_header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repository(server: &MockServer) -> HttpRepository {
        HttpRepository::new(
            &format!("{}/rest", server.uri()),
            Some("s3cret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_must_be_a_url() {
        let err = HttpRepository::new("localhost/rest", None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, RepositoryError::Parse(_)));
    }

    #[tokio::test]
    async fn test_read_existing_and_missing() {
        let server = MockServer::start().await;
        let uri = format!("{}/rest/objects/1", server.uri());
        let body = format!(
            "<{uri}> <{}> \"A letter\" .\n<{uri}> <{}> <{}> .\n",
            vocab::DCTERMS_TITLE,
            vocab::RDF_TYPE,
            vocab::PCDM_OBJECT
        );
        Mock::given(method("GET"))
            .and(path("/rest/objects/1"))
            .and(has_header("Accept", NTRIPLES))
            .and(has_header("Authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let repo = repository(&server);
        let description = repo.read(&uri).await.unwrap().unwrap();
        assert!(description.has_type(vocab::PCDM_OBJECT));
        assert_eq!(
            description.values(vocab::DCTERMS_TITLE).next().map(Term::value),
            Some("A letter")
        );

        let missing = repo.read(&format!("{}/rest/objects/2", server.uri())).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_transactional_create() {
        let server = MockServer::start().await;
        let tx = format!("{}/rest/tx:abc", server.uri());
        Mock::given(method("POST"))
            .and(path("/rest/fcr:tx"))
            .respond_with(ResponseTemplate::new(201).insert_header("Location", tx.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/tx:abc/objects"))
            .and(has_header("Content-Type", TURTLE))
            .and(body_string_contains("A letter"))
            .respond_with(ResponseTemplate::new(201).insert_header("Location", format!("{tx}/objects/xyz").as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/tx:abc/objects/xyz"))
            .and(has_header("Digest", "sha-256=abc123"))
            .and(has_header("Content-Disposition", "attachment; filename=\"p1.html\""))
            .respond_with(
                ResponseTemplate::new(201).insert_header("Location", format!("{tx}/objects/xyz/file1").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/tx:abc/objects/xyz/file1/fcr:metadata"))
            .and(body_string_contains(&format!("<{tx}/objects/xyz>")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/tx:abc/fcr:tx/fcr:commit"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let repo = repository(&server);
        let mut transaction = repo.begin().await.unwrap();

        let mut item = Description::new("");
        item.add(vocab::DCTERMS_TITLE, Term::literal("A letter"));
        let uri = transaction.create_child("/objects", &item).await.unwrap();
        assert_eq!(uri, format!("{}/rest/objects/xyz", server.uri()));

        let mut file = Description::new("");
        file.add(vocab::PCDM_FILE_OF, Term::iri(uri.clone()));
        let binary_uri = transaction
            .create_binary(
                &uri,
                NewBinary {
                    filename: "p1.html".to_string(),
                    mimetype: "text/html".to_string(),
                    digest: "abc123".to_string(),
                    data: Box::new(std::io::Cursor::new(b"<p>one</p>".to_vec())),
                    description: file,
                },
            )
            .await
            .unwrap();
        assert_eq!(binary_uri, format!("{}/rest/objects/xyz/file1", server.uri()));

        transaction.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_update_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/objects/1"))
            .and(has_header("Content-Type", SPARQL_UPDATE))
            .respond_with(ResponseTemplate::new(409).set_body_string("Constraint violation"))
            .mount(&server)
            .await;

        let repo = repository(&server);
        let uri = format!("{}/rest/objects/1", server.uri());
        let mut changes = Changeset::default();
        changes.insert(Triple::new(uri.clone(), vocab::DCTERMS_TITLE, Term::literal("New")));

        let err = repo.update(&uri, &changes).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Http { status: 409, .. }));
        assert_eq!(err.detail(), Some("Constraint violation"));
    }
}
