mod envelope;
mod middleware;
mod news;

pub use envelope::{ApiError, ApiResponse, codes};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use news::{ListNewsParams, SubmitNewsRequest};

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::{
    error::ErrorReport,
    news::NewsService,
    repos::{NewsRepo, RepoError},
};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub news: Arc<NewsService>,
    pub store: Arc<dyn NewsRepo>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/news", get(news::list_news).post(news::submit_news))
        .route("/healthz", get(health))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn health(State(state): State<HttpState>) -> Response {
    db_health_response(state.store.health_check().await)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
