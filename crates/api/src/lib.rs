pub mod adf;
pub mod client;
pub mod credentials;
pub mod error;
pub mod jql;
pub mod model;
pub mod pagination;
pub mod tracker;

pub use client::{ClientConfig, IssueTrackerClient};
pub use credentials::Credentials;
pub use error::{ApiError, Result};
pub use jql::JqlBuilder;
pub use model::{
    Comment, Issue, IssueUpdate, NamedEntity, Priority, Project, Status, Transition, User,
    Worklog,
};
pub use tracker::IssueTracker;

use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// REST API generation spoken by the tracker. Only the description/comment
/// encoding differs between the two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "3")]
    V3,
}

impl ApiVersion {
    fn segment(self) -> &'static str {
        match self {
            ApiVersion::V2 => "2",
            ApiVersion::V3 => "3",
        }
    }
}

/// Authenticated JSON transport rooted at `{base_url}/rest/api/{version}/`.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_root: Url,
    credentials: Credentials,
    version: ApiVersion,
}

impl ApiClient {
    pub fn new(credentials: Credentials, version: ApiVersion, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("issuetracker/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        let mut api_root = credentials.base_url().clone();
        api_root
            .path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["rest", "api", version.segment()]);

        Ok(Self {
            client,
            api_root,
            credentials,
            version,
        })
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    /// Resolve path segments against the API root. Segments are
    /// percent-encoded and dot segments are refused, so keys can never
    /// escape their path position.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(segment) = segments.iter().find(|s| model::is_dot_segment(s)) {
            return Err(ApiError::validation(format!(
                "'{segment}' is not allowed as a path segment"
            )));
        }

        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(Method::GET, url, Option::<&()>::None).await?;
        Self::decode(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::POST, url, Some(body)).await?;
        Self::decode(response).await
    }

    /// POST where the response body is irrelevant (often 204).
    pub async fn post_unit<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<()> {
        self.send(Method::POST, url, Some(body)).await?;
        Ok(())
    }

    pub async fn put_unit<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<()> {
        self.send(Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    pub async fn delete_unit(&self, url: Url) -> Result<()> {
        self.send(Method::DELETE, url, Option::<&()>::None).await?;
        Ok(())
    }

    /// Issue exactly one request. Non-2xx statuses are classified into
    /// `ApiError`; nothing is retried.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response> {
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .basic_auth(self.credentials.username(), Some(self.credentials.secret()));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(method = %method, status = status.as_u16(), "Request succeeded");
            return Ok(response);
        }

        let body = response.text().await.ok().filter(|text| !text.is_empty());
        debug!(method = %method, status = status.as_u16(), "Request failed");
        Err(ApiError::from_status(status, url.path(), body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse JSON response: {}", e);
            ApiError::InvalidResponse(e.to_string())
        })
    }
}
