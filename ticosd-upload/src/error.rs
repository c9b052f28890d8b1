// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Grounded on `libdd-http-client/src/error.rs`'s `HttpClientError`: one error enum
//! covering the ways a request can fail to even produce a classifiable response.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("request timed out")]
    TimedOut,

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UploadError::TimedOut
        } else if e.is_connect() {
            UploadError::ConnectionFailed(e.to_string())
        } else {
            UploadError::ConnectionFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        assert_eq!(UploadError::TimedOut.to_string(), "request timed out");
        assert_eq!(
            UploadError::InvalidConfig("missing base_url".into()).to_string(),
            "invalid client configuration: missing base_url"
        );
    }
}
