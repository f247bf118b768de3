// ABOUTME: Validated name of an install target (the run name).
// ABOUTME: Used as machine-name prefix, so it follows RFC 1123 label rules.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Room left for the `-<n>` machine suffix within a 63 character label.
const MAX_LEN: usize = 56;

#[derive(Debug, Error)]
pub enum TargetNameError {
    #[error("target name cannot be empty")]
    Empty,

    #[error("target name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("target name must start with a lowercase letter")]
    BadStart,

    #[error("target name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("invalid character in target name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TargetName(String);

impl TargetName {
    pub fn new(value: &str) -> Result<Self, TargetNameError> {
        let Some(first) = value.chars().next() else {
            return Err(TargetNameError::Empty);
        };
        if value.len() > MAX_LEN {
            return Err(TargetNameError::TooLong);
        }
        if !first.is_ascii_lowercase() {
            return Err(TargetNameError::BadStart);
        }
        if value.ends_with('-') {
            return Err(TargetNameError::EndsWithHyphen);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
        {
            return Err(TargetNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TargetName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
