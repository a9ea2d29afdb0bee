//! Error types for expression classification and domain transforms.
//!
//! Application layers (parsing, the analyzer, the CLI) work with
//! `anyhow::Result`; the expression core reports the two conditions below
//! explicitly so callers can tell a missing rule apart from a broken tree.

use thiserror::Error;

use crate::domain::Domain;

/// Result type alias using [`ExpressionError`].
pub type TransformResult<T> = std::result::Result<T, ExpressionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// No closed-form rewrite rule matches the node shape
    #[error("Unknown {target}-domain transform for {node}: {reason}")]
    UnknownTransform {
        node: String,
        target: Domain,
        reason: String,
    },

    /// Time- and frequency-domain terms combined under one node
    #[error("Domain mismatch in {node}: cannot combine {first} and {second} terms")]
    DomainMismatch {
        node: String,
        first: Domain,
        second: Domain,
    },
}

impl ExpressionError {
    /// Create an unknown-transform error
    pub fn unknown_transform(node: impl Into<String>, target: Domain, reason: impl Into<String>) -> Self {
        Self::UnknownTransform {
            node: node.into(),
            target,
            reason: reason.into(),
        }
    }

    /// Create a domain mismatch error
    pub fn domain_mismatch(node: impl Into<String>, first: Domain, second: Domain) -> Self {
        Self::DomainMismatch {
            node: node.into(),
            first,
            second,
        }
    }

    pub fn is_unknown_transform(&self) -> bool {
        matches!(self, Self::UnknownTransform { .. })
    }

    pub fn is_domain_mismatch(&self) -> bool {
        matches!(self, Self::DomainMismatch { .. })
    }
}
