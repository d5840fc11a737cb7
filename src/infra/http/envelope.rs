//! JSON response envelope shared by every endpoint.

use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::{error::ErrorReport, news::NewsError};

pub mod codes {
    pub const SUCCESS: &str = "000";
    pub const FAILURE: &str = "001";
}

const SUCCESS_MESSAGE: &str = "Success";
const FAILURE_MESSAGE: &str = "Request could not be completed";

#[derive(Debug, Serialize)]
struct SuccessBody<'a, T> {
    code: &'static str,
    message: &'static str,
    data: &'a T,
}

#[derive(Debug, Serialize)]
struct FailureBody<'a> {
    code: &'static str,
    message: &'a str,
}

/// Successful result wrapped as `{"code":"000","message":"Success","data":...}`.
#[derive(Debug)]
pub struct ApiResponse<T>(pub T);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = SuccessBody {
            code: codes::SUCCESS,
            message: SUCCESS_MESSAGE,
            data: &self.0,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Failure wrapped as `{"code":"001","message":...}`; diagnostics travel in an [`ErrorReport`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    /// The caller sent something unusable; the message is shown as-is.
    pub fn invalid(source: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        let report = ErrorReport::from_message(source, StatusCode::BAD_REQUEST, message.clone());
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
            report,
        }
    }

    /// The system could not complete the request; details stay in the report.
    pub fn failure(source: &'static str, error: &dyn StdError) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        Self {
            status,
            message: FAILURE_MESSAGE.to_string(),
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<NewsError> for ApiError {
    fn from(error: NewsError) -> Self {
        ApiError::failure("infra::http::news_error", &error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = FailureBody {
            code: codes::FAILURE,
            message: &self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
