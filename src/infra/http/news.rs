use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Deserialize;

use crate::{application::query::PageNumber, domain::news::NewsPage};

use super::{
    HttpState,
    envelope::{ApiError, ApiResponse},
};

const SUBMIT_SOURCE: &str = "infra::http::news::submit_news";

#[derive(Debug, Deserialize)]
pub struct SubmitNewsRequest {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ListNewsParams {
    pub page: Option<String>,
}

pub async fn submit_news(
    State(state): State<HttpState>,
    payload: Result<Json<SubmitNewsRequest>, JsonRejection>,
) -> Result<ApiResponse<()>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::invalid(SUBMIT_SOURCE, rejection.body_text()))?;

    if request.author.is_empty() {
        return Err(ApiError::invalid(SUBMIT_SOURCE, "author is required"));
    }
    if request.body.is_empty() {
        return Err(ApiError::invalid(SUBMIT_SOURCE, "body is required"));
    }

    state.news.submit(&request.author, &request.body).await?;
    Ok(ApiResponse(()))
}

pub async fn list_news(
    State(state): State<HttpState>,
    params: Result<Query<ListNewsParams>, QueryRejection>,
) -> Result<ApiResponse<NewsPage>, ApiError> {
    let raw = params.ok().and_then(|Query(params)| params.page);
    let page = PageNumber::parse(raw.as_deref());
    let items = state.news.read_page(page).await?;
    Ok(ApiResponse(items))
}
