use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{
    ConfluenceConfig, Credentials, PageHandle, RemoteClient, RemoteError, RemoteMedia,
    SpaceHandle, SpaceOutcome, SpaceRequest,
};
use crate::scan::Visibility;

const DEFAULT_MAX_RETRIES: u32 = 5;

/// Blocking Confluence Cloud REST client (v1 for spaces and attachments,
/// v2 for pages)
pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    max_retries: u32,
}

impl ConfluenceClient {
    /// Create a new client
    pub fn new(config: ConfluenceConfig) -> Result<Self, RemoteError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::Config(
                "Base URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            credentials: config.credentials,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn v1(&self, path: &str) -> String {
        format!("{}/rest/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn v2(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.credentials.username, Some(&self.credentials.api_token))
            .header("Accept", "application/json")
    }

    /// Send a request, retrying rate limits and gateway errors with
    /// exponential backoff. `build` is called once per attempt so multipart
    /// bodies can be rebuilt.
    fn send<F>(&self, build: F) -> Result<Response, RemoteError>
    where
        F: Fn() -> Result<RequestBuilder, RemoteError>,
    {
        let mut attempt = 1;
        loop {
            let response = self.authed(build()?).send()?;
            let status = response.status();
            log::debug!("  Status: {} (attempt {})", status, attempt);

            let retryable = matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            );
            if !retryable || attempt >= self.max_retries {
                return Ok(response);
            }

            let wait = Duration::from_secs(1 << (attempt - 1));
            log::warn!(
                "Request failed with {} (attempt {}). Retrying in {}s...",
                status,
                attempt,
                wait.as_secs()
            );
            thread::sleep(wait);
            attempt += 1;
        }
    }

    /// Map error statuses to [`RemoteError`], passing successes through
    fn check(response: Response, what: &str) -> Result<Response, RemoteError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::AuthFailed),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(what.to_string())),
            status => Err(RemoteError::Server {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            }),
        }
    }

    fn json(response: Response) -> Result<Value, RemoteError> {
        response
            .json::<Value>()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    /// Look up a space by key (used when creation reports a duplicate)
    pub fn find_space(&self, key: &str) -> Result<Option<SpaceHandle>, RemoteError> {
        let url = self.v2("spaces");
        let response = self.send(|| Ok(self.client.get(&url).query(&[("keys", key)])))?;
        let body = Self::json(Self::check(response, key)?)?;

        let Some(space) = body["results"].as_array().and_then(|r| r.first()) else {
            return Ok(None);
        };

        Ok(Some(SpaceHandle {
            id: id_of(&space["id"])
                .ok_or_else(|| RemoteError::InvalidResponse("space without id".to_string()))?,
            key: space["key"].as_str().unwrap_or(key).to_string(),
            url: self.space_url(key),
            home_page_id: id_of(&space["homepageId"]),
        }))
    }

    fn space_url(&self, key: &str) -> String {
        format!("{}/spaces/{}", self.base_url, key)
    }

    /// Current title and version number of a page
    fn page_version(&self, page_id: &str) -> Result<(String, u64), RemoteError> {
        let url = self.v2(&format!("pages/{}", page_id));
        let response = self.send(|| Ok(self.client.get(&url)))?;
        let page = Self::json(Self::check(response, page_id)?)?;

        let version = page["version"]["number"].as_u64().ok_or_else(|| {
            RemoteError::InvalidResponse(format!("page {} has no version number", page_id))
        })?;
        let title = page["title"].as_str().unwrap_or_default().to_string();
        Ok((title, version))
    }
}

impl RemoteClient for ConfluenceClient {
    fn create_space(&self, request: &SpaceRequest) -> Result<SpaceOutcome, RemoteError> {
        // Private spaces are created for the calling user only; permissions
        // are sorted out by hand after the migration.
        let url = match request.visibility {
            Visibility::Private => self.v1("space/_private"),
            Visibility::Public => self.v1("space"),
        };
        let payload = json!({
            "name": request.name,
            "key": request.key,
            "description": {
                "plain": { "value": request.description, "representation": "plain" }
            }
        });

        log::debug!("Making Request: POST - {}", url);
        let response = self.send(|| Ok(self.client.post(&url).json(&payload)))?;
        let status = response.status();

        if status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT {
            let message = response.text().unwrap_or_default();
            if message.to_lowercase().contains("already exists") {
                log::info!("Space '{}' already exists, looking it up", request.key);
                return match self.find_space(&request.key)? {
                    Some(handle) => Ok(SpaceOutcome::AlreadyExists(handle)),
                    None => Err(RemoteError::NotFound(request.key.clone())),
                };
            }
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body = Self::json(Self::check(response, &request.key)?)?;
        let key = body["key"].as_str().unwrap_or(&request.key).to_string();

        Ok(SpaceOutcome::Created(SpaceHandle {
            id: id_of(&body["id"])
                .ok_or_else(|| RemoteError::InvalidResponse("space without id".to_string()))?,
            url: self.space_url(&key),
            home_page_id: id_of(&body["homepage"]["id"]),
            key,
        }))
    }

    fn create_page(
        &self,
        space_id: &str,
        title: &str,
        body: &str,
        parent_id: Option<&str>,
    ) -> Result<PageHandle, RemoteError> {
        let url = self.v2("pages");
        let mut payload = json!({
            "spaceId": space_id,
            "status": "current",
            "title": title,
            "body": { "representation": "storage", "value": body }
        });
        if let Some(parent_id) = parent_id {
            payload["parentId"] = json!(parent_id);
        }

        log::debug!("Making Request: POST - {}", url);
        let response = self.send(|| Ok(self.client.post(&url).json(&payload)))?;
        let page = Self::json(Self::check(response, title)?)?;

        let id = id_of(&page["id"])
            .ok_or_else(|| RemoteError::InvalidResponse(format!("page '{}' without id", title)))?;
        let url = match (page["_links"]["base"].as_str(), page["_links"]["webui"].as_str()) {
            (Some(base), Some(webui)) => format!("{}{}", base, webui),
            (None, Some(webui)) => format!("{}{}", self.base_url, webui),
            _ => format!("{}/pages/viewpage.action?pageId={}", self.base_url, id),
        };

        Ok(PageHandle { id, url })
    }

    fn upload_media(&self, page_id: &str, local_path: &Path) -> Result<RemoteMedia, RemoteError> {
        let url = self.v1(&format!("content/{}/child/attachment", page_id));

        log::debug!("Making Request: POST - {}", url);
        let response = self.send(|| {
            let form = multipart::Form::new()
                .file("file", local_path)?
                .text("minorEdit", "true")
                .text("comment", "Uploaded from Slite");
            Ok(self
                .client
                .post(&url)
                .header("X-Atlassian-Token", "nocheck")
                .multipart(form))
        })?;
        let body = Self::json(Self::check(response, page_id)?)?;

        let file_name = body["results"][0]["title"]
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                local_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .ok_or_else(|| RemoteError::InvalidResponse("attachment without title".to_string()))?;

        let url = format!(
            "{}/download/attachments/{}/{}",
            self.base_url,
            page_id,
            urlencoding::encode(&file_name)
        );
        log::debug!("Uploaded attachment: {} → {}", file_name, url);

        Ok(RemoteMedia { file_name, url })
    }

    fn patch_page_body(&self, page_id: &str, body: &str) -> Result<(), RemoteError> {
        let (title, version) = self.page_version(page_id)?;
        let url = self.v2(&format!("pages/{}", page_id));
        let payload = json!({
            "id": page_id,
            "status": "current",
            "title": title,
            "body": { "representation": "storage", "value": body },
            "version": { "number": version + 1, "message": "Migrated content" }
        });

        log::debug!("Making Request: PUT - {}", url);
        let response = self.send(|| Ok(self.client.put(&url).json(&payload)))?;
        Self::check(response, page_id)?;
        Ok(())
    }
}

/// Ids arrive as numbers from v1 and strings from v2
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> Result<ConfluenceClient, RemoteError> {
        ConfluenceClient::new(ConfluenceConfig {
            base_url: base_url.to_string(),
            credentials: Credentials {
                username: "me".to_string(),
                api_token: "token".to_string(),
            },
        })
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(matches!(client("ftp://example.com"), Err(RemoteError::Config(_))));
    }

    #[test]
    fn test_endpoint_urls() {
        let client = client("https://acme.atlassian.net/wiki/").unwrap();

        assert_eq!(client.base_url(), "https://acme.atlassian.net/wiki");
        assert_eq!(client.v1("space"), "https://acme.atlassian.net/wiki/rest/api/space");
        assert_eq!(client.v2("/pages/1"), "https://acme.atlassian.net/wiki/api/v2/pages/1");
        assert_eq!(client.space_url("ENG"), "https://acme.atlassian.net/wiki/spaces/ENG");
    }

    #[test]
    fn test_id_of_accepts_numbers_and_strings() {
        assert_eq!(id_of(&json!(42)), Some("42".to_string()));
        assert_eq!(id_of(&json!("42")), Some("42".to_string()));
        assert_eq!(id_of(&json!(null)), None);
        assert_eq!(id_of(&json!("")), None);
    }
}
