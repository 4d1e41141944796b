// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Malformed rule definitions, caught when an `InferenceRule` is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule '{rule}' has an empty body")]
    EmptyBody { rule: String },

    #[error("rule '{rule}' concludes `{head}`, only relation and ownership heads are allowed")]
    UnsupportedHead { rule: String, head: String },

    #[error("rule '{rule}' head variable {variable} is not bound by the body")]
    UnboundHeadVariable { rule: String, variable: String },

    #[error("rule '{rule}' references unknown label '{label}'")]
    UnknownLabel { rule: String, label: String },

    #[error("rule '{rule}' head must be typed")]
    UntypedHead { rule: String },
}
