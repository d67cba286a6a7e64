//! HTTP client for the content management API

use crate::wire::{
    AliasBody, AliasDto, ApiKeyBody, ApiKeyDto, Collection, EntryBody, EntryDto, EnvironmentDto,
    Link, LocaleDto,
};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use spacemig_core::{
    AliasRecord, ApiKey, ClientError, Entry, Environment, EnvironmentId, EnvironmentStatus,
    LocalizedFields, Locale, ResourceClient,
};
use std::time::Duration;

/// Default management API endpoint
pub const DEFAULT_API_URL: &str = "https://api.contentful.com";

const MEDIA_TYPE: &str = "application/vnd.contentful.management.v1+json";
const VERSION_HEADER: &str = "X-Contentful-Version";
const CONTENT_TYPE_HEADER: &str = "X-Contentful-Content-Type";
const PAGE_LIMIT: u64 = 100;

/// Space-scoped management API client
pub struct ManagementClient {
    client: Client,
    base_url: String,
    space_id: String,
    access_token: String,
}

impl ManagementClient {
    /// Create a client for `space_id`
    ///
    /// # Errors
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, space_id: &str, access_token: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            space_id: space_id.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/spaces/{}{}", self.base_url, self.space_id, path);
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE))
    }

    fn with_body<B: Serialize>(request: RequestBuilder, body: &B) -> Result<RequestBuilder, ClientError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(request.body(bytes))
    }

    // ========== Request builders ==========

    fn environment_request(&self, method: Method, id: &EnvironmentId) -> RequestBuilder {
        self.request(method, &format!("/environments/{id}"))
    }

    fn update_api_key_request(&self, key: &ApiKey) -> Result<RequestBuilder, ClientError> {
        let request = self
            .request(Method::PUT, &format!("/api_keys/{}", key.id))
            .header(VERSION_HEADER, key.version);
        Self::with_body(request, &ApiKeyBody::from(key))
    }

    fn update_alias_request(&self, alias: &AliasRecord) -> Result<RequestBuilder, ClientError> {
        let request = self
            .request(Method::PUT, &format!("/environment_aliases/{}", alias.name))
            .header(VERSION_HEADER, alias.version);
        let body = AliasBody {
            environment: Link::environment(&alias.target_environment_id),
        };
        Self::with_body(request, &body)
    }

    fn page_request(&self, path: &str, filters: &[(&str, &str)], skip: u64) -> RequestBuilder {
        let mut query: Vec<(&str, String)> =
            filters.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        query.push(("skip", skip.to_string()));
        query.push(("limit", PAGE_LIMIT.to_string()));
        self.request(Method::GET, path).query(&query)
    }

    fn create_entry_request(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
        fields: LocalizedFields,
    ) -> Result<RequestBuilder, ClientError> {
        let request = self
            .request(Method::POST, &format!("/environments/{environment}/entries"))
            .header(CONTENT_TYPE_HEADER, content_type);
        Self::with_body(request, &EntryBody { fields })
    }

    fn publish_entry_request(&self, environment: &EnvironmentId, entry: &Entry) -> RequestBuilder {
        self.request(
            Method::PUT,
            &format!("/environments/{environment}/entries/{}/published", entry.id),
        )
        .header(VERSION_HEADER, entry.version)
    }

    // ========== Internal HTTP helpers ==========

    async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().path().to_string();
        let message = response.text().await.unwrap_or_default();
        tracing::debug!("{} returned {}: {}", url, status, message);
        Err(status_error(status, &url, message))
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let text = Self::send(request)
            .await?
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn execute(request: RequestBuilder) -> Result<(), ClientError> {
        Self::send(request).await.map(|_| ())
    }

    /// Every item of a paginated collection
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut skip = 0;
        loop {
            let page: Collection<T> = Self::fetch(self.page_request(path, filters, skip)).await?;
            let fetched = page.items.len();
            items.extend(page.items);
            match next_skip(skip, fetched, page.total) {
                Some(next) => skip = next,
                None => break,
            }
        }
        Ok(items)
    }
}

/// Offset of the next page, `None` once the collection is exhausted
fn next_skip(skip: u64, fetched: usize, total: u64) -> Option<u64> {
    let next = skip + fetched as u64;
    (fetched > 0 && next < total).then_some(next)
}

fn status_error(status: StatusCode, path: &str, message: String) -> ClientError {
    if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(path.to_string())
    } else {
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ResourceClient for ManagementClient {
    async fn get_environment(&self, id: &EnvironmentId) -> Result<Option<Environment>, ClientError> {
        match Self::fetch::<EnvironmentDto>(self.environment_request(Method::GET, id)).await {
            Ok(dto) => Ok(Some(dto.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_environment(
        &self,
        id: &EnvironmentId,
        name: &str,
    ) -> Result<Environment, ClientError> {
        let request = Self::with_body(
            self.environment_request(Method::PUT, id),
            &serde_json::json!({ "name": name }),
        )?;
        Ok(Self::fetch::<EnvironmentDto>(request).await?.into())
    }

    async fn delete_environment(&self, environment: &Environment) -> Result<(), ClientError> {
        Self::execute(self.environment_request(Method::DELETE, &environment.id)).await
    }

    async fn get_environment_status(
        &self,
        id: &EnvironmentId,
    ) -> Result<EnvironmentStatus, ClientError> {
        let dto: EnvironmentDto = Self::fetch(self.environment_request(Method::GET, id)).await?;
        Ok(dto.status())
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, ClientError> {
        let keys: Vec<ApiKeyDto> = self.fetch_all("/api_keys", &[]).await?;
        tracing::debug!("Fetched {} api keys", keys.len());
        Ok(keys.into_iter().map(Into::into).collect())
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<(), ClientError> {
        Self::execute(self.update_api_key_request(key)?).await
    }

    async fn get_environment_alias(&self, name: &str) -> Result<AliasRecord, ClientError> {
        let dto: AliasDto =
            Self::fetch(self.request(Method::GET, &format!("/environment_aliases/{name}"))).await?;
        Ok(dto.into())
    }

    async fn update_alias(&self, alias: &AliasRecord) -> Result<(), ClientError> {
        Self::execute(self.update_alias_request(alias)?).await
    }

    async fn list_locales(&self, environment: &EnvironmentId) -> Result<Vec<Locale>, ClientError> {
        let locales: Vec<LocaleDto> = self
            .fetch_all(&format!("/environments/{environment}/locales"), &[])
            .await?;
        Ok(locales.into_iter().map(Into::into).collect())
    }

    async fn query_entries(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
    ) -> Result<Vec<Entry>, ClientError> {
        let entries: Vec<Entry> = self
            .fetch_all::<EntryDto>(
                &format!("/environments/{environment}/entries"),
                &[("content_type", content_type)],
            )
            .await?
            .into_iter()
            .map(Entry::from)
            .collect();
        tracing::debug!("Fetched {} {} entries from {}", entries.len(), content_type, environment);
        Ok(entries)
    }

    async fn create_entry(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
        fields: LocalizedFields,
    ) -> Result<Entry, ClientError> {
        let dto: EntryDto =
            Self::fetch(self.create_entry_request(environment, content_type, fields)?).await?;
        Ok(dto.into())
    }

    async fn publish_entry(&self, environment: &EnvironmentId, entry: &Entry) -> Result<(), ClientError> {
        Self::execute(self.publish_entry_request(environment, entry)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn client() -> ManagementClient {
        ManagementClient::new("https://api.example.test/", "space1", "CFPAT-secret").unwrap()
    }

    fn body(request: &reqwest::Request) -> serde_json::Value {
        let bytes = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(client().base_url, "https://api.example.test");
    }

    #[test]
    fn requests_carry_auth_and_media_type() {
        let request = client()
            .environment_request(Method::GET, &"qa".into())
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.test/spaces/space1/environments/qa"
        );
        assert_eq!(request.headers()["authorization"], "Bearer CFPAT-secret");
        assert_eq!(request.headers()["content-type"], MEDIA_TYPE);
    }

    #[test]
    fn api_key_update_is_versioned() {
        let key = ApiKey {
            id: "key1".into(),
            name: "Website".into(),
            description: Some("Used by the production website".into()),
            version: 5,
            environments: vec!["master".into(), "qa".into()],
        };
        let request = client().update_api_key_request(&key).unwrap().build().unwrap();

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.url().path(), "/spaces/space1/api_keys/key1");
        assert_eq!(request.headers()[VERSION_HEADER], "5");
        assert_eq!(body(&request)["environments"][1]["sys"]["id"], "qa");
        assert_eq!(body(&request)["description"], "Used by the production website");
    }

    #[test]
    fn alias_update_links_target() {
        let alias = AliasRecord {
            name: "master".into(),
            target_environment_id: "master-2024-01-01-1200".into(),
            version: 2,
        };
        let request = client().update_alias_request(&alias).unwrap().build().unwrap();

        assert_eq!(request.url().path(), "/spaces/space1/environment_aliases/master");
        assert_eq!(request.headers()[VERSION_HEADER], "2");
        assert_eq!(
            body(&request),
            serde_json::json!({
                "environment": {
                    "sys": { "type": "Link", "linkType": "Environment", "id": "master-2024-01-01-1200" }
                }
            })
        );
    }

    #[test]
    fn entry_requests() {
        let c = client();
        let env: EnvironmentId = "qa".into();

        let page = c
            .page_request(
                "/environments/qa/entries",
                &[("content_type", "migrationVersions")],
                200,
            )
            .build()
            .unwrap();
        assert_eq!(page.url().path(), "/spaces/space1/environments/qa/entries");
        assert_eq!(
            page.url().query(),
            Some("content_type=migrationVersions&skip=200&limit=100")
        );

        let mut fields = LocalizedFields::new();
        fields.insert(
            "version".into(),
            BTreeMap::from([("en-US".to_string(), serde_json::json!("1.0.0"))]),
        );
        let create = c.create_entry_request(&env, "migrationVersions", fields).unwrap().build().unwrap();
        assert_eq!(create.method(), &Method::POST);
        assert_eq!(create.headers()[CONTENT_TYPE_HEADER], "migrationVersions");
        assert_eq!(body(&create)["fields"]["version"]["en-US"], "1.0.0");

        let entry = Entry {
            id: "e1".into(),
            version: 1,
            published_version: None,
            fields: LocalizedFields::new(),
        };
        let publish = c.publish_entry_request(&env, &entry).build().unwrap();
        assert_eq!(
            publish.url().path(),
            "/spaces/space1/environments/qa/entries/e1/published"
        );
        assert_eq!(publish.headers()[VERSION_HEADER], "1");
    }

    #[test]
    fn api_keys_are_paged() {
        let second = client().page_request("/api_keys", &[], 100).build().unwrap();
        assert_eq!(second.method(), &Method::GET);
        assert_eq!(second.url().path(), "/spaces/space1/api_keys");
        assert_eq!(second.url().query(), Some("skip=100&limit=100"));
    }

    #[test]
    fn paging_stops_at_total() {
        // 150 keys: a full first page, then the remaining 50
        assert_eq!(next_skip(0, 100, 150), Some(100));
        assert_eq!(next_skip(100, 50, 150), None);
        assert_eq!(next_skip(0, 3, 3), None);
        // an empty page ends the walk even if total claims more
        assert_eq!(next_skip(100, 0, 150), None);
    }

    #[test]
    fn status_errors() {
        assert!(status_error(StatusCode::NOT_FOUND, "/x", String::new()).is_not_found());
        assert_eq!(
            status_error(StatusCode::CONFLICT, "/x", "VersionMismatch".into()),
            ClientError::Api {
                status: 409,
                message: "VersionMismatch".into()
            }
        );
    }
}
