//! HTTP status and transport error mapping shared by all providers.

use reagent_application::BackendError;
use reagent_domain::util::truncate_str;
use reqwest::StatusCode;

pub(crate) fn from_status(provider: &str, status: StatusCode, body: &str) -> BackendError {
    let detail = format!("{} returned {}: {}", provider, status, truncate_str(body, 300));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(detail),
        _ => BackendError::RequestFailed(detail),
    }
}

pub(crate) fn from_transport(provider: &str, err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::RequestFailed(format!("{}: {}", provider, err))
    }
}
