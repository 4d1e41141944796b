// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("unknown concept '{0}'")]
    UnknownConcept(String),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("concept '{0}' already exists")]
    DuplicateConcept(String),

    #[error("concept '{concept}' is a {actual}, expected {expected}")]
    KindMismatch {
        concept: String,
        expected: String,
        actual: String,
    },
}
