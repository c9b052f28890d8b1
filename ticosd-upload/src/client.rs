// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The HTTP client ticosd's upload engine drives. Grounded on
//! `libdd-http-client/src/client.rs`'s `HttpClient` (builder pattern, a single
//! blocking `reqwest::Client`, one `send`-style method per request shape) and on
//! `ticosd.c`'s `prv_ticosd_process_tx_queue`, which picks the request shape from
//! the queued record's type: a plain JSON POST for reboot events, a three-legged
//! presigned-URL upload for coredumps, and a JSON PATCH for attributes.

use crate::error::UploadError;
use crate::result::{classify_status, classify_transport_failure, NetworkResult};
use serde::Deserialize;
use serde_json::json;

const ACCEPT_HEADER: &str = "application/json";
const PROJECT_KEY_HEADER: &str = "Ticos-Project-Key";

/// The presigned URL a coredump body gets streamed to, returned by the
/// `fileUrl` leg of the three-legged upload (spec.md §4.8, Open Question (a):
/// this crate adopts the `/chunks/{device_id}/fileUrl` + presigned PUT +
/// `/api/v0/upload/elf_coredump` commit shape, not the generic
/// `/api/v0/upload` + token variant also present in the original source).
#[derive(Debug, Deserialize)]
struct FileUrlResponse {
    upload_url: String,
}

/// Talks to the Ticos ingest backend. One instance is shared by the whole
/// supervisor loop; it is stateless other than the underlying connection pool
/// `reqwest::blocking::Client` keeps internally.
pub struct UploadClient {
    http: reqwest::blocking::Client,
    base_url: String,
    project_key: String,
}

impl UploadClient {
    pub fn builder() -> UploadClientBuilder {
        UploadClientBuilder::default()
    }

    /// `POST {base_url}{path}` with a JSON body, used for reboot/crash events.
    pub fn post_event(&self, path: &str, body: &serde_json::Value) -> Result<NetworkResult, UploadError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Accept", ACCEPT_HEADER)
            .header(PROJECT_KEY_HEADER, &self.project_key)
            .json(body)
            .send();
        Ok(self.classify(response)?)
    }

    /// `PATCH {base_url}/api/v0/attributes?device_serial=...&captured_date=...`,
    /// matching the query-string-addressed PATCH in `prv_ticosd_process_tx_queue`.
    pub fn patch_attributes(
        &self,
        device_serial: &str,
        captured_date: &str,
        json_body: &serde_json::Value,
    ) -> Result<NetworkResult, UploadError> {
        let response = self
            .http
            .patch(format!("{}/api/v0/attributes", self.base_url))
            .query(&[("device_serial", device_serial), ("captured_date", captured_date)])
            .header("Accept", ACCEPT_HEADER)
            .header(PROJECT_KEY_HEADER, &self.project_key)
            .json(json_body)
            .send();
        Ok(self.classify(response)?)
    }

    /// The three-legged coredump upload (spec.md §4.8, §8 S3-S5):
    /// 1. `POST /chunks/{device_id}/fileUrl?type=Coredump&hardwareVersion=...` ->
    ///    `{"upload_url": "<presigned>"}`.
    /// 2. `PUT` the (possibly gzip-compressed) file body directly to that URL.
    /// 3. `POST /api/v0/upload/elf_coredump` with `{"url", "kind", "size"}` to
    ///    commit, so the backend attaches the upload to the device's timeline.
    pub fn upload_coredump(
        &self,
        device_id: &str,
        hardware_version: &str,
        software_type: &str,
        software_version: &str,
        gzip_encoded: bool,
        bytes: &[u8],
    ) -> Result<NetworkResult, UploadError> {
        let file_url_response = self
            .http
            .post(format!("{}/chunks/{device_id}/fileUrl", self.base_url))
            .query(&[
                ("type", "Coredump"),
                ("hardwareVersion", hardware_version),
                ("softwareType", software_type),
                ("softwareVersion", software_version),
            ])
            .header("Accept", ACCEPT_HEADER)
            .header(PROJECT_KEY_HEADER, &self.project_key)
            .send();

        let file_url_response = match file_url_response {
            Ok(r) => r,
            Err(e) => return Ok(self.transport_failure(&e)),
        };
        let status = file_url_response.status().as_u16();
        if !(200..300).contains(&status) {
            return Ok(classify_status(status));
        }
        let prepared: FileUrlResponse = match file_url_response.json() {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, "prepare-leg response was not the expected JSON shape");
                return Ok(NetworkResult::ErrorNoRetry);
            }
        };

        let mut put_request = self.http.put(&prepared.upload_url).body(bytes.to_vec());
        if gzip_encoded {
            put_request = put_request.header("Content-Encoding", "gzip");
        }
        let put_response = put_request.send();
        let put_result = self.classify(put_response)?;
        if put_result != NetworkResult::Ok {
            return Ok(put_result);
        }

        let commit_response = self
            .http
            .post(format!("{}/api/v0/upload/elf_coredump", self.base_url))
            .header("Accept", ACCEPT_HEADER)
            .header(PROJECT_KEY_HEADER, &self.project_key)
            .json(&json!({
                "url": prepared.upload_url,
                "kind": "COREDUMP",
                "size": bytes.len(),
            }))
            .send();
        Ok(self.classify(commit_response)?)
    }

    fn classify(&self, response: reqwest::Result<reqwest::blocking::Response>) -> Result<NetworkResult, UploadError> {
        match response {
            Ok(resp) => Ok(classify_status(resp.status().as_u16())),
            Err(e) => Ok(self.transport_failure(&e)),
        }
    }

    fn transport_failure(&self, e: &reqwest::Error) -> NetworkResult {
        tracing::debug!(error = %e, "transport-level failure, treating as retryable");
        classify_transport_failure()
    }
}

#[derive(Default)]
pub struct UploadClientBuilder {
    base_url: Option<String>,
    project_key: Option<String>,
    timeout: Option<std::time::Duration>,
}

impl UploadClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn project_key(mut self, project_key: impl Into<String>) -> Self {
        self.project_key = Some(project_key.into());
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<UploadClient, UploadError> {
        let base_url = self
            .base_url
            .ok_or_else(|| UploadError::InvalidConfig("base_url is required".into()))?;
        let project_key = self
            .project_key
            .ok_or_else(|| UploadError::InvalidConfig("project_key is required".into()))?;

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;

        Ok(UploadClient {
            http,
            base_url,
            project_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_base_url_and_project_key() {
        let err = UploadClient::builder().build().unwrap_err();
        assert!(matches!(err, UploadError::InvalidConfig(_)));
    }

    #[test]
    fn builder_succeeds_with_required_fields() {
        let client = UploadClient::builder()
            .base_url("https://ingest.ticos.io")
            .project_key("proj-key")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn post_event_reports_retry_later_when_server_is_unreachable() {
        let client = UploadClient::builder()
            .base_url("http://127.0.0.1:1") // nothing listens here
            .project_key("proj-key")
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let result = client.post_event("/api/v0/events", &json!({"reason": 3})).unwrap();
        assert_eq!(result, NetworkResult::ErrorRetryLater);
    }
}
