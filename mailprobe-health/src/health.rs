//! Health check results

use std::{collections::BTreeMap, error::Error};

use serde::{Deserialize, Serialize};

use crate::Status;

/// Detail key holding `<host>:<port>`.
pub const LOCATION: &str = "location";

/// Detail key holding the failure message of a DOWN result.
pub const ERROR: &str = "error";

/// The outcome of a single health check.
///
/// Built fresh for every check and not modified after it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    status: Status,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    details: BTreeMap<String, String>,
}

impl Health {
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn up() -> Self {
        Self::new(Status::Up)
    }

    #[must_use]
    pub const fn down() -> Self {
        Self::new(Status::Down)
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Marks the result DOWN and records `error` (with its sources) under
    /// [`ERROR`].
    #[must_use]
    pub fn with_error(mut self, error: &(dyn Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            // Wrappers that render their source inline would otherwise repeat it.
            let cause_message = cause.to_string();
            if !message.ends_with(&cause_message) {
                message.push_str(": ");
                message.push_str(&cause_message);
            }
            source = cause.source();
        }

        self.status = Status::Down;
        self.with_detail(ERROR, message)
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub const fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn with_error_forces_down_and_flattens_sources() {
        let err = Outer(std::io::Error::other("inner"));
        let health = Health::up().with_detail(LOCATION, "mx:25").with_error(&err);

        assert_eq!(health.status(), Status::Down);
        assert_eq!(health.detail(ERROR), Some("outer: inner"));
        assert_eq!(health.detail(LOCATION), Some("mx:25"));
    }

    #[test]
    fn serializes_with_upper_case_status() {
        let health = Health::up().with_detail(LOCATION, "smtp.acme.org:25");
        assert_eq!(
            serde_json::to_string(&health).unwrap(),
            r#"{"status":"UP","details":{"location":"smtp.acme.org:25"}}"#
        );
        assert_eq!(
            serde_json::to_string(&Health::down()).unwrap(),
            r#"{"status":"DOWN"}"#
        );
    }
}
