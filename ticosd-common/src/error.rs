// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors shared by more than one ticosd crate.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("config key {key} has the wrong type, expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
