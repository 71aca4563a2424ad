//! Webhook notifier: POSTs the scan output as JSON.

use log::{debug, error};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

use crate::error::NotificationError;

const USER_AGENT: &str = concat!("syncable-iac-scan/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

/// POST `payload` to `url`, authenticating with `token` when set.
///
/// 200, 201 and 202 are successes; any other status is an error.
pub fn send<T: Serialize + ?Sized>(url: &str, token: &str, payload: &T) -> Result<(), NotificationError> {
    let body = serde_json::to_vec(payload)?;
    let client = Client::builder().timeout(TIMEOUT).user_agent(USER_AGENT).build()?;

    let mut request = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body);
    if !token.is_empty() {
        request = request.bearer_auth(token);
    }

    let response = request.send().map_err(|e| {
        error!("failed to send webhook notification. error: '{}'", e);
        NotificationError::Request(e)
    })?;

    match response.status() {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
            debug!("sent webhook notification to {}", url);
            Ok(())
        }
        status => {
            error!("webhook notification to {} failed with status code {}", url, status);
            Err(NotificationError::Status(status.as_u16()))
        }
    }
}
