pub mod review;
pub mod status;
pub mod tasks;
pub mod work;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sl_api_types::ErrorBody;

/// Thin client for the coordinator HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid API url {base_url:?}"))?;
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key).context("API key is not a valid header value")?;
            headers.insert("x-api-key", value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base, client })
    }

    /// `base` joined with `segments`, each percent-encoded as one segment.
    pub fn url(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API url {} cannot take a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> anyhow::Result<T> {
        self.get_url(self.url(segments)?).await
    }

    pub async fn get_url<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        let resp = self.client.get(url).send().await.map_err(friendly_error)?;
        decode(resp).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> anyhow::Result<T> {
        let resp = self
            .client
            .post(self.url(segments)?)
            .json(body)
            .send()
            .await
            .map_err(friendly_error)?;
        decode(resp).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, segments: &[&str]) -> anyhow::Result<T> {
        let resp = self
            .client
            .delete(self.url(segments)?)
            .send()
            .await
            .map_err(friendly_error)?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> anyhow::Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| "unknown error".to_string());
        anyhow::bail!("{message} (HTTP {status})");
    }
    resp.json().await.map_err(friendly_error)
}

/// Map common reqwest errors to user-friendly messages.
pub fn friendly_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!(
            "Could not connect to the sluice daemon. Is it running?\n  \
             (hint: start it with `sluice-daemon` or check --url)"
        )
    } else if err.is_timeout() {
        anyhow::anyhow!("Request timed out. The daemon may be overloaded.")
    } else if err.is_decode() {
        anyhow::anyhow!("Unexpected response from the daemon: {err}")
    } else {
        anyhow::anyhow!("API request failed: {err}")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    use super::ApiClient;

    /// Serve `app` on an ephemeral port and return a client for it.
    pub async fn serve(app: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(&format!("http://{addr}"), None).unwrap()
    }
}
