// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Instance domain validator.
//!
//! Syntactic pre-filter applied before any registry lookup or upstream call:
//! - one or more labels joined by single dots
//! - each label 1-63 characters of `[A-Za-z0-9-]`
//! - no label starts or ends with a hyphen

use thiserror::Error;
use tracing::debug;

/// Longest hostname accepted, in characters.
pub const MAX_DOMAIN_LEN: usize = 253;

/// Longest single label, in characters.
pub const MAX_LABEL_LEN: usize = 63;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Domain is empty")]
    Empty,

    #[error("Domain is {len} characters long, maximum is 253")]
    TooLong { len: usize },

    #[error("Domain contains an empty label")]
    EmptyLabel,

    #[error("Label {label:?} exceeds 63 characters")]
    LabelTooLong { label: String },

    #[error("Invalid character {ch:?} in domain")]
    InvalidCharacter { ch: char },

    #[error("Label {label:?} starts or ends with a hyphen")]
    HyphenAtLabelEdge { label: String },
}

/// Result of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Domain is well formed
    Valid,
    /// Domain is malformed
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(e) => Some(e),
        }
    }
}

/// Check a candidate instance domain against the hostname grammar.
pub fn validate_domain(candidate: &str) -> ValidationResult {
    match check_domain(candidate) {
        Ok(()) => ValidationResult::Valid,
        Err(err) => {
            debug!(domain = %candidate, error = %err, "Domain rejected");
            ValidationResult::Invalid(err)
        }
    }
}

/// `true` when `candidate` is a syntactically valid instance domain.
pub fn is_valid_instance_domain(candidate: &str) -> bool {
    validate_domain(candidate).is_valid()
}

fn check_domain(candidate: &str) -> Result<(), ValidationError> {
    if candidate.is_empty() {
        return Err(ValidationError::Empty);
    }

    if let Some(ch) = candidate
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
    {
        return Err(ValidationError::InvalidCharacter { ch });
    }

    // Only ASCII past this point, so byte length equals character count.
    if candidate.len() > MAX_DOMAIN_LEN {
        return Err(ValidationError::TooLong {
            len: candidate.len(),
        });
    }

    for label in candidate.split('.') {
        check_label(label)?;
    }

    Ok(())
}

fn check_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::EmptyLabel);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong {
            label: label.to_string(),
        });
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(ValidationError::HyphenAtLabelEdge {
            label: label.to_string(),
        });
    }
    Ok(())
}
