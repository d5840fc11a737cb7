//! Search index adapter speaking the Elasticsearch REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    application::{
        query::{INDEX_DATE_PATTERN, NewsDocument, SearchQuery},
        repos::{SearchError, SearchHits, SearchIndex},
    },
    infra::deadline::with_deadline,
};

#[derive(Clone, Debug)]
pub struct ElasticsearchIndex {
    client: Client,
    base: Url,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(rename = "_shards")]
    shards: ShardsInfo,
}

#[derive(Debug, Deserialize)]
struct ShardsInfo {
    successful: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

impl ElasticsearchIndex {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let base = Url::parse(url).map_err(|err| SearchError::Transport(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(SearchError::Transport(format!("`{url}` cannot be a base URL")));
        }
        let client = Client::builder()
            .user_agent(concat!("newsfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| SearchError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    /// Ping the cluster root; fails when the engine is unreachable.
    pub async fn ping(&self) -> Result<(), SearchError> {
        let response = self.send(Method::GET, self.base.clone(), None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_body(status, &read_body(response).await?));
        }
        Ok(())
    }

    /// Create `index` with a date mapping for `created` unless it already exists.
    pub async fn ensure_index(&self, index: &str) -> Result<(), SearchError> {
        let url = self.url(&[index])?;
        let response = self.send(Method::HEAD, url.clone(), None).await?;
        match response.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => return Err(error_from_body(status, "")),
        }

        let response = self.send(Method::PUT, url, Some(index_mapping())).await?;
        let status = response.status();
        let body = read_body(response).await?;
        if status.is_success() {
            info!(target = "newsfeed::search", index, "created search index");
            return Ok(());
        }
        let error = error_from_body(status, &body);
        match &error {
            SearchError::Status { kind, .. } if kind == "resource_already_exists_exception" => {
                Ok(())
            }
            _ => Err(error),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SearchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Transport(format!("`{}` cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Response, SearchError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body.as_ref() {
            request = request.json(body);
        }
        with_deadline(
            self.timeout,
            async {
                request.send().await.map_err(|err| {
                    if err.is_timeout() {
                        SearchError::Timeout(self.timeout)
                    } else {
                        SearchError::Transport(err.to_string())
                    }
                })
            },
            || SearchError::Timeout(self.timeout),
        )
        .await
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn index_news(&self, index: &str, document: &NewsDocument) -> Result<(), SearchError> {
        if index.is_empty() {
            return Err(SearchError::InvalidIndex);
        }
        if document.id <= 0 {
            return Err(SearchError::InvalidId(document.id));
        }

        let id = document.id.to_string();
        let mut url = self.url(&[index, "_doc", id.as_str()])?;
        url.set_query(Some("refresh=true"));

        let body =
            serde_json::to_value(document).map_err(|err| SearchError::Decode(err.to_string()))?;
        let response = self.send(Method::PUT, url, Some(body)).await?;
        let status = response.status();
        let text = read_body(response).await?;
        if !status.is_success() {
            return Err(error_from_body(status, &text));
        }
        parse_index_response(document.id, &text)
    }

    async fn search_ids(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchHits, SearchError> {
        if index.is_empty() {
            return Err(SearchError::InvalidIndex);
        }

        let mut url = self.url(&[index, "_search"])?;
        url.set_query(Some("track_total_hits=true"));

        let response = self.send(Method::POST, url, Some(query.to_body())).await?;
        let status = response.status();
        let text = read_body(response).await?;
        if !status.is_success() {
            return Err(error_from_body(status, &text));
        }
        parse_search_response(&text)
    }
}

async fn read_body(response: Response) -> Result<String, SearchError> {
    response
        .text()
        .await
        .map_err(|err| SearchError::Transport(err.to_string()))
}

fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "long" },
                "created": { "type": "date", "format": INDEX_DATE_PATTERN }
            }
        }
    })
}

fn parse_index_response(id: i64, body: &str) -> Result<(), SearchError> {
    let response: IndexResponse =
        serde_json::from_str(body).map_err(|err| SearchError::Decode(err.to_string()))?;
    if response.shards.successful == 0 {
        return Err(SearchError::Rejected { id });
    }
    Ok(())
}

fn parse_search_response(body: &str) -> Result<SearchHits, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|err| SearchError::Decode(err.to_string()))?;

    let ids = response
        .hits
        .hits
        .iter()
        .map(|hit| {
            hit.id
                .parse::<i64>()
                .map_err(|_| SearchError::Decode(format!("hit id `{}` is not numeric", hit.id)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let total = response
        .hits
        .total
        .map_or(ids.len() as u64, |total| total.value);

    Ok(SearchHits { ids, total })
}

fn error_from_body(status: StatusCode, body: &str) -> SearchError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error }) => SearchError::Status {
            status: status.as_u16(),
            kind: error.kind,
            reason: error.reason.unwrap_or_default(),
        },
        Err(_) => SearchError::Status {
            status: status.as_u16(),
            kind: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
            reason: body.chars().take(256).collect(),
        },
    }
}
