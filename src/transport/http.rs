//! HTTP broker client.
//!
//! Implements the broker contract: `POST /publish/start`, `PUT <uploadUrl>`,
//! `GET /publish/status`, `POST /publish/cancel`. Every request carries the
//! device-token header. Response bodies are deserialized into explicit wire
//! structs; anything that does not fit the schema is a protocol error, never
//! silently coerced.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BrokerSettings;
use crate::error::{Result, ShipError};
use crate::transport::{
    CancelResponse, PublishStatus, StartRequest, StartResponse, StatusResponse, Transport,
    TransportKind,
};

const DEVICE_TOKEN_HEADER: &str = "x-device-token";
const USER_AGENT: &str = "shipkit";

/// Error code a broker returns on 503 when it is itself unconfigured, as
/// opposed to being merely unavailable.
const BROKER_UNCONFIGURED_CODE: &str = "broker_unconfigured";

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    device_token: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
            device_token: settings.device_token.clone(),
        }
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<(u16, String)> {
        let response = request
            .header(DEVICE_TOKEN_HEADER, &self.device_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .map_err(|err| ShipError::ServiceUnavailable(format!("broker request failed: {err}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| ShipError::Protocol(format!("reading broker response: {err}")))?;
        Ok((status, body))
    }

    fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|err| {
            ShipError::Protocol(format!("broker response did not match schema: {err}"))
        })
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    fn start(&self, request: &StartRequest) -> Result<StartResponse> {
        let url = format!("{}/publish/start", self.base_url);
        let body = StartBody {
            owner_id: request.owner_id,
            bundle_hash: &request.content_hash,
            bundle_size: request.size_bytes,
            owner_name: request.owner_name.as_deref(),
        };

        debug!(url = %url, owner_id = request.owner_id, "starting publish job");
        let (status, text) = self.send(self.client.post(&url).json(&body))?;
        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &text));
        }

        let wire: StartWire = Self::parse_body(&text)?;
        Ok(StartResponse {
            job_id: wire.job_id,
            status: wire.status,
            upload_url: wire.upload_url,
        })
    }

    fn status(&self, job_id: &str) -> Result<StatusResponse> {
        let url = format!("{}/publish/status", self.base_url);
        let (status, text) = self.send(self.client.get(&url).query(&[("jobId", job_id)]))?;
        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &text));
        }

        let wire: StatusWire = Self::parse_body(&text)?;
        Ok(StatusResponse {
            status: wire.status,
            progress_percent: wire.progress,
            message: wire.message,
            live_url: wire.url,
            error_message: wire.error,
        })
    }

    fn cancel(&self, job_id: &str) -> Result<CancelResponse> {
        let url = format!("{}/publish/cancel", self.base_url);
        let body = CancelBody { job_id };

        let (status, text) = self.send(self.client.post(&url).json(&body))?;
        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &text));
        }

        let wire: CancelWire = Self::parse_body(&text)?;
        Ok(CancelResponse {
            success: wire.success,
            status: wire.status,
        })
    }

    fn upload(&self, upload_url: &str, archive_path: &Path) -> Result<()> {
        let file = File::open(archive_path).map_err(|err| {
            ShipError::Upload(format!(
                "cannot read archive {}: {err}",
                archive_path.display()
            ))
        })?;

        debug!(url = %upload_url, archive = %archive_path.display(), "uploading archive");
        let (status, text) = self.send(
            self.client
                .put(upload_url)
                .header("Content-Type", "application/octet-stream")
                .body(file),
        )?;

        if !(200..300).contains(&status) {
            let detail = failure_detail(status, &text);
            warn!(status, "archive upload rejected");
            return Err(ShipError::Upload(detail));
        }
        Ok(())
    }
}

// --- Wire schema ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBody<'a> {
    owner_id: i64,
    bundle_hash: &'a str,
    bundle_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_name: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartWire {
    job_id: String,
    status: PublishStatus,
    upload_url: Option<String>,
}

#[derive(Deserialize)]
struct StatusWire {
    status: PublishStatus,
    progress: Option<u8>,
    message: Option<String>,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody<'a> {
    job_id: &'a str,
}

#[derive(Deserialize)]
struct CancelWire {
    success: bool,
    status: PublishStatus,
}

/// Structured error body brokers return on failure.
#[derive(Deserialize, Default)]
struct BrokerErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn failure_detail(status: u16, body: &str) -> String {
    let parsed: BrokerErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}

/// Classify a non-2xx broker response into the transport error taxonomy.
fn classify_failure(status: u16, body: &str) -> ShipError {
    let parsed: BrokerErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = failure_detail(status, body);

    match status {
        401 => ShipError::AuthenticationFailed(detail),
        403 => ShipError::AccessDenied(detail),
        404 => ShipError::NotFound(detail),
        429 => ShipError::RateLimited(detail),
        503 if parsed.error.as_deref() == Some(BROKER_UNCONFIGURED_CODE) => {
            ShipError::BrokerMisconfigured(detail)
        }
        500..=599 => ShipError::ServiceUnavailable(detail),
        _ => ShipError::UnknownBroker(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_and_permission_failures() {
        assert!(matches!(
            classify_failure(401, "{}"),
            ShipError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_failure(403, "{}"),
            ShipError::AccessDenied(_)
        ));
        assert!(matches!(classify_failure(404, "{}"), ShipError::NotFound(_)));
        assert!(matches!(
            classify_failure(429, "{}"),
            ShipError::RateLimited(_)
        ));
    }

    #[test]
    fn distinguishes_misconfigured_broker_from_unavailable() {
        let misconfigured =
            classify_failure(503, r#"{"error":"broker_unconfigured","message":"no storage"}"#);
        assert!(matches!(misconfigured, ShipError::BrokerMisconfigured(_)));
        assert!(misconfigured.to_string().contains("no storage"));

        assert!(matches!(
            classify_failure(503, r#"{"message":"maintenance"}"#),
            ShipError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_failure(500, "oops"),
            ShipError::ServiceUnavailable(_)
        ));
    }

    #[test]
    fn unexpected_statuses_are_unknown_broker_errors() {
        assert!(matches!(
            classify_failure(302, ""),
            ShipError::UnknownBroker(_)
        ));
        assert!(matches!(
            classify_failure(418, "teapot"),
            ShipError::UnknownBroker(_)
        ));
    }

    #[test]
    fn failure_detail_prefers_structured_message() {
        assert_eq!(
            failure_detail(403, r#"{"error":"denied","message":"not your app"}"#),
            "HTTP 403: not your app"
        );
        assert_eq!(
            failure_detail(500, r#"{"error":"boom"}"#),
            "HTTP 500: boom"
        );
        assert_eq!(failure_detail(502, "bad gateway"), "HTTP 502: bad gateway");
        assert_eq!(failure_detail(500, ""), "HTTP 500");
    }

    #[test]
    fn start_body_serializes_broker_contract_fields() {
        let body = StartBody {
            owner_id: 4,
            bundle_hash: "abc",
            bundle_size: 512,
            owner_name: Some("demo"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ownerId"], 4);
        assert_eq!(json["bundleHash"], "abc");
        assert_eq!(json["bundleSize"], 512);
        assert_eq!(json["ownerName"], "demo");
    }

    #[test]
    fn start_wire_rejects_missing_job_id() {
        let result: std::result::Result<StartWire, _> =
            serde_json::from_str(r#"{"status":"queued"}"#);
        assert!(result.is_err());
    }
}
