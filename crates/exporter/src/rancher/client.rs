//! REST client — basic-auth HTTP access to the Rancher v2-beta API,
//! project discovery, and paginated collection walking.

use std::time::Duration;

use base64::Engine as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::ExporterConfig;
use crate::error::{ExporterError, Result};

/// The project (environment) this exporter is scoped to.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One page of a Rancher collection endpoint.
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RancherClient {
    http: Client,
    endpoint: Url,
    access_key: String,
    secret_key: String,
}

impl RancherClient {
    pub fn new(config: &ExporterConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.cattle_url)?;
        if endpoint.cannot_be_a_base() {
            return Err(ExporterError::OpaqueUrl(endpoint));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.scrape_timeout))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            access_key: config.cattle_access_key.clone(),
            secret_key: config.cattle_secret_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `Authorization` header value equivalent to this client's basic auth,
    /// for transports that cannot use reqwest's builder (the websocket).
    pub fn auth_header(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.access_key, self.secret_key));
        format!("Basic {token}")
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ExporterError::OpaqueUrl(self.endpoint.clone()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(String, String)],
    ) -> Result<T> {
        let mut url = self.url_for(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        let response = self
            .http
            .get(url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// The first project returned by the API drives the exporter's scope.
    pub async fn first_project(&self) -> Result<Project> {
        let list: Collection<Project> = self.get(&["projects"], &[]).await?;
        list.data.into_iter().next().ok_or(ExporterError::NoProjects)
    }

    /// Fetch a single stack's display name.
    pub async fn stack_name(&self, project_id: &str, stack_id: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Named {
            #[serde(default)]
            name: String,
        }
        let named: Named = self
            .get(&["projects", project_id, "stacks", stack_id], &[])
            .await?;
        Ok(named.name)
    }

    /// Walk a paginated project collection, invoking `handle` for every
    /// element across all pages.
    pub async fn for_each_collection<T, F>(
        &self,
        project_id: &str,
        subpath: &str,
        hide_sys: bool,
        mut handle: F,
    ) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        let mut query: Vec<(String, String)> = vec![
            ("limit".to_string(), "100".to_string()),
            ("sort".to_string(), "id".to_string()),
        ];
        if hide_sys {
            query.push(("system".to_string(), "false".to_string()));
        }

        loop {
            let page: Collection<T> = self
                .get(&["projects", project_id, subpath], &query)
                .await?;
            if page.kind != "collection" {
                return Err(ExporterError::NotACollection(subpath.to_string()));
            }
            for item in page.data {
                handle(item);
            }
            match page.pagination.and_then(|p| p.next) {
                Some(next) => query = next_page_query(&next)?,
                None => break,
            }
        }
        Ok(())
    }
}

/// A `pagination.next` link carries the full query for the following page.
fn next_page_query(next: &str) -> Result<Vec<(String, String)>> {
    let url = Url::parse(next)?;
    Ok(url.query_pairs().into_owned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RancherClient {
        RancherClient::new(&ExporterConfig {
            cattle_url: "http://rancher.local:8080/v2-beta".to_string(),
            cattle_access_key: "ak".to_string(),
            cattle_secret_key: "sk".to_string(),
            ..ExporterConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn url_for_appends_below_the_api_root() {
        let url = client().url_for(&["projects", "1a5", "stacks"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://rancher.local:8080/v2-beta/projects/1a5/stacks"
        );
    }

    #[test]
    fn auth_header_encodes_the_key_pair() {
        // base64("ak:sk")
        assert_eq!(client().auth_header(), "Basic YWs6c2s=");
    }

    #[test]
    fn collection_page_deserializes() {
        let page: Collection<Project> = serde_json::from_str(
            r#"{
                "type": "collection",
                "data": [{"id": "1a5", "name": "Default"}],
                "pagination": {"next": "http://rancher.local:8080/v2-beta/projects?limit=100&marker=m1"}
            }"#,
        )
        .unwrap();
        assert_eq!(page.kind, "collection");
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "Default");
        assert!(page.pagination.unwrap().next.is_some());
    }

    #[test]
    fn collection_tolerates_missing_pagination() {
        let page: Collection<Project> =
            serde_json::from_str(r#"{"type": "collection", "data": []}"#).unwrap();
        assert!(page.pagination.is_none());
        assert!(page.data.is_empty());
    }

    #[test]
    fn next_page_query_extracts_all_pairs() {
        let query =
            next_page_query("http://rancher.local:8080/v2-beta/projects/1a5/stacks?limit=100&sort=id&marker=m1")
                .unwrap();
        assert!(query.contains(&("limit".to_string(), "100".to_string())));
        assert!(query.contains(&("marker".to_string(), "m1".to_string())));
    }
}
