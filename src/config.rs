//! Runtime configuration.
//!
//! Defaults suit an embedded store. Configuration can be loaded from JSON or
//! layered from `CRAFTABLE_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CRAFTABLE_TRANSACTION_MAX_ATTEMPTS` | `transaction_max_attempts` |
//! | `CRAFTABLE_CONTROL_QUEUE_CAPACITY` | `subscriptions.control_queue_capacity` |
//! | `CRAFTABLE_STREAM_CAPACITY` | `subscriptions.stream_capacity` |
//! | `CRAFTABLE_REDELIVERY_INTERVAL_MS` | `subscriptions.redelivery_interval_ms` |
//! | `CRAFTABLE_MAX_TITLE_LEN` | `limits.max_title_len` |
//! | `CRAFTABLE_MAX_TEXT_LEN` | `limits.max_text_len` |
//! | `CRAFTABLE_MAX_NAME_LEN` | `limits.max_name_len` |
//! | `CRAFTABLE_MAX_IMAGE_BYTES` | `limits.max_image_bytes` |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::storage::DEFAULT_MAX_ATTEMPTS;
use crate::subscription::SubscriptionConfig;

/// Size limits for user-supplied content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentLimits {
    /// Post titles, in bytes.
    pub max_title_len: usize,
    /// Post descriptions and comment text, in bytes.
    pub max_text_len: usize,
    /// Usernames and board names, in bytes.
    pub max_name_len: usize,
    /// Base64 image payloads, in bytes.
    pub max_image_bytes: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            max_title_len: 200,
            max_text_len: 16 * 1024,
            max_name_len: 100,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ContentLimits {
    /// A required field must be non-blank and at most `max` bytes.
    ///
    /// # Errors
    /// `MissingField` or `FieldTooLong`.
    pub fn check_required(&self, field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: field.to_string(),
            });
        }
        Self::check_len(field, value, max)
    }

    /// An optional field may be empty but not longer than `max` bytes.
    ///
    /// # Errors
    /// `FieldTooLong`.
    pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
        if value.len() > max {
            return Err(ValidationError::FieldTooLong {
                field: field.to_string(),
                max_length: max,
            });
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftConfig {
    /// How many times a transaction body may run before the store gives up.
    pub transaction_max_attempts: u32,
    pub subscriptions: SubscriptionConfig,
    pub limits: ContentLimits,
}

impl Default for CraftConfig {
    fn default() -> Self {
        Self {
            transaction_max_attempts: DEFAULT_MAX_ATTEMPTS,
            subscriptions: SubscriptionConfig::default(),
            limits: ContentLimits::default(),
        }
    }
}

impl CraftConfig {
    /// Reject values that would make the store unusable.
    ///
    /// # Errors
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidConfig {
            reason: reason.to_string(),
        };
        if self.transaction_max_attempts == 0 {
            return Err(invalid("transaction_max_attempts must be at least 1"));
        }
        if self.subscriptions.control_queue_capacity == 0 {
            return Err(invalid("subscriptions.control_queue_capacity must be at least 1"));
        }
        if self.subscriptions.stream_capacity == 0 {
            return Err(invalid("subscriptions.stream_capacity must be at least 1"));
        }
        if self.subscriptions.redelivery_interval_ms == 0 {
            return Err(invalid("subscriptions.redelivery_interval_ms must be at least 1"));
        }
        let limits = &self.limits;
        if limits.max_title_len == 0 || limits.max_text_len == 0 || limits.max_name_len == 0 || limits.max_image_bytes == 0
        {
            return Err(invalid("content limits must be positive"));
        }
        Ok(self)
    }

    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// `InvalidConfig` if the JSON does not parse or fails validation.
    pub fn from_json_str(raw: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        cfg.validate()
    }

    /// Defaults overridden by `CRAFTABLE_*` environment variables.
    ///
    /// # Errors
    /// `InvalidConfig` if a variable does not parse or the result fails validation.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// # Errors
    /// `InvalidConfig` if a variable does not parse or the result fails validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let mut cfg = Self::default();
        override_from(&lookup, "CRAFTABLE_TRANSACTION_MAX_ATTEMPTS", &mut cfg.transaction_max_attempts)?;
        override_from(
            &lookup,
            "CRAFTABLE_CONTROL_QUEUE_CAPACITY",
            &mut cfg.subscriptions.control_queue_capacity,
        )?;
        override_from(&lookup, "CRAFTABLE_STREAM_CAPACITY", &mut cfg.subscriptions.stream_capacity)?;
        override_from(
            &lookup,
            "CRAFTABLE_REDELIVERY_INTERVAL_MS",
            &mut cfg.subscriptions.redelivery_interval_ms,
        )?;
        override_from(&lookup, "CRAFTABLE_MAX_TITLE_LEN", &mut cfg.limits.max_title_len)?;
        override_from(&lookup, "CRAFTABLE_MAX_TEXT_LEN", &mut cfg.limits.max_text_len)?;
        override_from(&lookup, "CRAFTABLE_MAX_NAME_LEN", &mut cfg.limits.max_name_len)?;
        override_from(&lookup, "CRAFTABLE_MAX_IMAGE_BYTES", &mut cfg.limits.max_image_bytes)?;
        cfg.validate()
    }
}

fn override_from<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ValidationError>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|e| ValidationError::InvalidConfig {
        reason: format!("{key}={raw}: {e}"),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = CraftConfig::default().validate().unwrap();
        assert_eq!(cfg.transaction_max_attempts, 25);
        assert_eq!(cfg.limits.max_title_len, 200);
        assert_eq!(cfg.subscriptions.stream_capacity, 256);
    }

    #[test]
    fn test_from_json_partial() {
        let cfg = CraftConfig::from_json_str(r#"{"transaction_max_attempts": 5, "limits": {"max_title_len": 80}}"#)
            .unwrap();
        assert_eq!(cfg.transaction_max_attempts, 5);
        assert_eq!(cfg.limits.max_title_len, 80);
        assert_eq!(cfg.limits.max_text_len, 16 * 1024);
    }

    #[test]
    fn test_from_json_rejects_zero_attempts() {
        let err = CraftConfig::from_json_str(r#"{"transaction_max_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
        assert!(CraftConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CRAFTABLE_TRANSACTION_MAX_ATTEMPTS", "7"),
            ("CRAFTABLE_STREAM_CAPACITY", " 16 "),
        ]
        .into_iter()
        .collect();
        let cfg = CraftConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.transaction_max_attempts, 7);
        assert_eq!(cfg.subscriptions.stream_capacity, 16);
        assert_eq!(cfg.subscriptions.control_queue_capacity, 1024);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = CraftConfig::from_lookup(|k| (k == "CRAFTABLE_MAX_TEXT_LEN").then(|| "lots".to_string())).unwrap_err();
        match err {
            ValidationError::InvalidConfig { reason } => assert!(reason.contains("CRAFTABLE_MAX_TEXT_LEN")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_content_limits() {
        let limits = ContentLimits::default();
        assert!(limits.check_required("text", "hi", 10).is_ok());
        assert!(matches!(
            limits.check_required("text", "   ", 10),
            Err(ValidationError::MissingField { .. })
        ));
        assert!(matches!(
            ContentLimits::check_len("text", "12345", 4),
            Err(ValidationError::FieldTooLong { max_length: 4, .. })
        ));
        assert!(ContentLimits::check_len("description", "", 4).is_ok());
    }
}
