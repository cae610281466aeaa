use std::time::Duration;

use blake3::Hasher;
use dinesafe_parser::RawTable;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Untyped payload as retrieved, plus a content hash of the bytes received.
#[derive(Debug, Clone)]
pub struct RawFetch {
    pub table: RawTable,
    pub payload_hash: String,
}

/// Retrieves the raw inspection table. One attempt per call; retrying is
/// left to the caller.
pub trait Fetcher {
    /// Identifier recorded alongside every snapshot produced from this source.
    fn source_id(&self) -> String;
    fn fetch(&self) -> Result<RawFetch>;
}

impl<T: Fetcher + ?Sized> Fetcher for Box<T> {
    fn source_id(&self) -> String {
        (**self).source_id()
    }

    fn fetch(&self) -> Result<RawFetch> {
        (**self).fetch()
    }
}

/// Reads the DineSafe package from a CKAN portal: `package_show` lists the
/// resources and every datastore-backed resource is downloaded as CSV.
#[derive(Debug, Clone)]
pub struct CkanFetcher {
    client: Client,
    base_url: String,
    package_id: String,
}

#[derive(Debug, Deserialize)]
struct PackageEnvelope {
    success: bool,
    result: Option<PackageResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PackageResult {
    resources: Vec<PackageResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PackageResource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub datastore_active: bool,
}

impl CkanFetcher {
    pub fn new(
        base_url: impl Into<String>,
        package_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            package_id: package_id.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.base_url, &config.package_id, config.timeout())
    }

    fn package_url(&self) -> String {
        format!("{}/api/3/action/package_show", self.base_url)
    }

    /// `package_show` for the configured package; the id is query-encoded.
    fn package_request(&self) -> RequestBuilder {
        self.client
            .get(self.package_url())
            .query(&[("id", self.package_id.as_str())])
    }

    fn dump_url(&self, resource_id: &str) -> String {
        format!("{}/datastore/dump/{}", self.base_url, resource_id)
    }

    /// Sends `request`; `url` only labels errors.
    fn get_bytes(&self, request: RequestBuilder, url: &str) -> Result<Vec<u8>> {
        let response = request
            .send()
            .map_err(|err| PipelineError::network(url, err))?
            .error_for_status()
            .map_err(|err| PipelineError::network(url, err))?;
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| PipelineError::network(url, err))
    }
}

impl Fetcher for CkanFetcher {
    fn source_id(&self) -> String {
        format!("{}#{}", self.base_url, self.package_id)
    }

    fn fetch(&self) -> Result<RawFetch> {
        let body = self.get_bytes(self.package_request(), &self.package_url())?;
        let resources = datastore_resources(&body)?;

        let mut hasher = Hasher::new();
        let mut tables = Vec::with_capacity(resources.len());
        for resource in &resources {
            let url = self.dump_url(&resource.id);
            let dump = self.get_bytes(self.client.get(&url), &url)?;
            hasher.update(&dump);
            let text = std::str::from_utf8(&dump).map_err(|err| {
                PipelineError::UpstreamFormat(format!("dump of {} is not UTF-8: {err}", resource.id))
            })?;
            let table = RawTable::from_csv(text)?;
            debug!(
                resource = %resource.id,
                name = resource.name.as_deref().unwrap_or(""),
                rows = table.len(),
                "Downloaded datastore dump"
            );
            tables.push(table);
        }

        let table = RawTable::concat(tables);
        let payload_hash = hasher.finalize().to_hex().to_string();
        info!(
            package = %self.package_id,
            resources = resources.len(),
            rows = table.len(),
            "Fetched upstream inspections"
        );
        Ok(RawFetch {
            table,
            payload_hash,
        })
    }
}

/// Datastore-backed resources listed in a `package_show` response.
pub(crate) fn datastore_resources(body: &[u8]) -> Result<Vec<PackageResource>> {
    let envelope: PackageEnvelope = serde_json::from_slice(body).map_err(|err| {
        PipelineError::UpstreamFormat(format!("package_show response is not valid: {err}"))
    })?;

    if !envelope.success {
        let detail = envelope
            .error
            .map(|value| value.to_string())
            .unwrap_or_else(|| "no error detail".to_string());
        return Err(PipelineError::UpstreamFormat(format!(
            "package_show reported failure: {detail}"
        )));
    }

    let result = envelope.result.ok_or_else(|| {
        PipelineError::UpstreamFormat("package_show response has no result".to_string())
    })?;

    let resources: Vec<PackageResource> = result
        .resources
        .into_iter()
        .filter(|resource| resource.datastore_active)
        .collect();
    if resources.is_empty() {
        return Err(PipelineError::UpstreamFormat(
            "package has no datastore-active resources".to_string(),
        ));
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_only_datastore_resources() {
        let body = r#"{
            "success": true,
            "result": {
                "resources": [
                    {"id": "a1", "name": "Dinesafe", "datastore_active": true},
                    {"id": "b2", "name": "Readme", "datastore_active": false},
                    {"id": "c3", "name": "Dinesafe 2023", "datastore_active": true},
                    {"id": "d4"}
                ]
            }
        }"#;
        let resources = datastore_resources(body.as_bytes()).expect("resources");
        let ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a1", "c3"]);
    }

    #[test]
    fn failed_envelope_is_a_format_error() {
        let body = r#"{"success": false, "error": {"message": "Not found"}}"#;
        let err = datastore_resources(body.as_bytes()).expect_err("must fail");
        assert!(matches!(err, PipelineError::UpstreamFormat(ref msg) if msg.contains("Not found")));
    }

    #[test]
    fn non_json_and_empty_packages_are_format_errors() {
        assert!(matches!(
            datastore_resources(b"<html>maintenance</html>"),
            Err(PipelineError::UpstreamFormat(_))
        ));
        assert!(matches!(
            datastore_resources(br#"{"success": true, "result": {"resources": []}}"#),
            Err(PipelineError::UpstreamFormat(_))
        ));
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let fetcher = CkanFetcher::new("https://portal.example/", "dinesafe", Duration::from_secs(1))
            .expect("client");
        let request = fetcher.package_request().build().expect("request");
        assert_eq!(
            request.url().as_str(),
            "https://portal.example/api/3/action/package_show?id=dinesafe"
        );
        assert_eq!(
            fetcher.dump_url("abc"),
            "https://portal.example/datastore/dump/abc"
        );
        assert_eq!(fetcher.source_id(), "https://portal.example#dinesafe");
    }

    #[test]
    fn package_id_is_encoded_into_the_query() {
        let fetcher = CkanFetcher::new(
            "https://portal.example",
            "dine safe&format=xml",
            Duration::from_secs(1),
        )
        .expect("client");
        let request = fetcher.package_request().build().expect("request");
        assert_eq!(request.url().path(), "/api/3/action/package_show");
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("id".to_string(), "dine safe&format=xml".to_string())]
        );
    }
}
