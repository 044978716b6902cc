//! Confluence Server / Data Center REST client.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use netwiki_shared::{ConfluenceSettings, NetWikiError, Result};

use crate::wire::{ContentList, Content, NewPage, NewSpace, PAGE_TYPE, PageUpdate, SpaceRef, StorageBody, Version};
use crate::{PageContent, PageStore};

/// User-Agent string for wiki requests.
const USER_AGENT: &str = concat!("NetWiki/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error response body carried into the error message.
const MAX_ERROR_DETAIL: usize = 200;

/// [`PageStore`] backed by the Confluence REST API.
#[derive(Debug, Clone)]
pub struct ConfluenceStore {
    client: Client,
    settings: ConfluenceSettings,
}

impl ConfluenceStore {
    /// Build the HTTP client without touching the network.
    pub fn new(settings: ConfluenceSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| NetWikiError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    /// Build the client and make sure the configured space exists.
    #[instrument(skip_all, fields(url = %settings.base_url, space = %settings.space_key))]
    pub async fn connect(settings: ConfluenceSettings) -> Result<Self> {
        let store = Self::new(settings)?;
        store.ensure_space().await?;
        Ok(store)
    }

    pub fn space_key(&self) -> &str {
        &self.settings.space_key
    }

    /// Create the configured space (named after its key) if it does not exist.
    pub async fn ensure_space(&self) -> Result<()> {
        let key = self.settings.space_key.as_str();
        let path = format!("/rest/api/space/{key}");
        let what = format!("GET {path}");
        let response = self.send(self.client.get(self.endpoint(&path)), &what).await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(space = key, "space not found, creating it");
            let what = "POST /rest/api/space";
            let request = self
                .client
                .post(self.endpoint("/rest/api/space"))
                .json(&NewSpace { key, name: key });
            self.expect_success(request, what).await?;
            return Ok(());
        }

        check_status(response, &what).await?;
        debug!(space = key, "space exists");
        Ok(())
    }

    async fn create_page(&self, title: &str) -> Result<PageContent> {
        let request = self
            .client
            .post(self.endpoint("/rest/api/content"))
            .json(&NewPage {
                kind: PAGE_TYPE,
                title,
                space: SpaceRef {
                    key: &self.settings.space_key,
                },
                body: StorageBody::new(""),
            });
        let content: Content = self.fetch_json(request, "POST /rest/api/content").await?;
        info!(title, id = %content.id, "created page");

        Ok(PageContent {
            id: content.id,
            title: content.title,
            body: String::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url.as_str().trim_end_matches('/'))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .send()
            .await
            .map_err(|e| NetWikiError::RemoteWrite(format!("{what}: {e}")))
    }

    async fn expect_success(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self.send(request, what).await?;
        check_status(response, what).await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.expect_success(request, what)
            .await?
            .json()
            .await
            .map_err(|e| NetWikiError::RemoteWrite(format!("{what}: unreadable response: {e}")))
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response.text().await.unwrap_or_default();
    let detail: String = detail.trim().chars().take(MAX_ERROR_DETAIL).collect();
    if detail.is_empty() {
        Err(NetWikiError::RemoteWrite(format!("{what}: HTTP {status}")))
    } else {
        Err(NetWikiError::RemoteWrite(format!("{what}: HTTP {status}: {detail}")))
    }
}

impl PageStore for ConfluenceStore {
    #[instrument(skip(self), fields(space = %self.settings.space_key))]
    async fn fetch_or_create(&self, title: &str) -> Result<PageContent> {
        let request = self
            .client
            .get(self.endpoint("/rest/api/content"))
            .query(&[
                ("spaceKey", self.settings.space_key.as_str()),
                ("title", title),
                ("expand", "body.storage,version"),
            ]);
        let list: ContentList = self.fetch_json(request, "GET /rest/api/content").await?;

        let Some(content) = list.results.into_iter().next() else {
            return self.create_page(title).await;
        };

        let body = content
            .storage_value()
            .ok_or_else(|| {
                NetWikiError::parse(format!(
                    "page `{}` (id {}) has no storage body",
                    content.title, content.id
                ))
            })?
            .to_string();
        debug!(id = %content.id, bytes = body.len(), "fetched page");

        Ok(PageContent {
            id: content.id,
            title: content.title,
            body,
        })
    }

    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn push(&self, page_id: &str, title: &str, body: &str) -> Result<()> {
        let path = format!("/rest/api/content/{page_id}");

        let request = self
            .client
            .get(self.endpoint(&path))
            .query(&[("expand", "version")]);
        let current: Content = self.fetch_json(request, &format!("GET {path}")).await?;
        let version = current.version.ok_or_else(|| {
            NetWikiError::RemoteWrite(format!("GET {path}: response has no version"))
        })?;

        let next = version.number + 1;
        let request = self.client.put(self.endpoint(&path)).json(&PageUpdate {
            id: page_id,
            kind: PAGE_TYPE,
            title,
            body: StorageBody::new(body),
            version: Version { number: next },
        });
        self.expect_success(request, &format!("PUT {path}")).await?;

        info!(version = next, "pushed page");
        Ok(())
    }
}
