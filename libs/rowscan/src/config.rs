use std::path::Path;

use serde::Deserialize;

use crate::error::ScanError;
use crate::row::Limit;

pub const DEFAULT_ROW_BUFFER: usize = 1024;
pub const DEFAULT_GROWTH_CHUNK: usize = 16 * 1024;
pub const DEFAULT_MAX_FANOUT: usize = 16;
pub const DEFAULT_WORK_QUEUE: usize = 1024;

/// What a decode call does when one row fails to convert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorPolicy {
    /// Stop at the first failing row and return its error.
    #[default]
    Abort,
    /// Leave the row out, record it in the outcome and continue.
    Skip,
}

/// Tuning of a [`Scanner`](crate::Scanner).
///
/// Every field has a default, so an empty `[scan]` table is valid:
///
/// ```toml
/// [scan]
/// fanout = 4
/// limit = 1000
/// on_row_error = "skip"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Capacity of the channel between the cursor producer and the decoder.
    #[serde(default = "default_row_buffer")]
    pub row_buffer: usize,

    /// Elements reserved at a time when a growable destination is full.
    #[serde(default = "default_growth_chunk")]
    pub growth_chunk: usize,

    /// Decode workers for collection destinations. 1 decodes on the
    /// calling thread.
    #[serde(default = "default_fanout")]
    pub fanout: usize,

    /// Upper bound applied to `fanout`.
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Capacity of the queue feeding decode workers.
    #[serde(default = "default_work_queue")]
    pub work_queue: usize,

    /// Rows per call. Negative or absent is unbounded, 0 takes nothing.
    #[serde(default)]
    pub limit: Limit,

    #[serde(default)]
    pub on_row_error: RowErrorPolicy,
}

fn default_row_buffer() -> usize {
    DEFAULT_ROW_BUFFER
}

fn default_growth_chunk() -> usize {
    DEFAULT_GROWTH_CHUNK
}

fn default_fanout() -> usize {
    1
}

fn default_max_fanout() -> usize {
    DEFAULT_MAX_FANOUT
}

fn default_work_queue() -> usize {
    DEFAULT_WORK_QUEUE
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            row_buffer: default_row_buffer(),
            growth_chunk: default_growth_chunk(),
            fanout: default_fanout(),
            max_fanout: default_max_fanout(),
            work_queue: default_work_queue(),
            limit: Limit::default(),
            on_row_error: RowErrorPolicy::default(),
        }
    }
}

impl ScanConfig {
    /// Load from a TOML file holding the fields at top level.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::Config {
            context: "read",
            detail: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ScanError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ScanError::Config { context: "parse", detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        let sizes = [
            ("row_buffer", self.row_buffer),
            ("growth_chunk", self.growth_chunk),
            ("fanout", self.fanout),
            ("max_fanout", self.max_fanout),
            ("work_queue", self.work_queue),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ScanError::Config {
                    context: "validate",
                    detail: format!("{name} must be at least 1"),
                });
            }
        }
        Ok(())
    }

    /// `fanout` clamped to `max_fanout`.
    pub fn effective_fanout(&self) -> usize {
        if self.fanout > self.max_fanout {
            tracing::warn!(
                requested = self.fanout,
                max = self.max_fanout,
                "fanout above maximum, clamping"
            );
            return self.max_fanout;
        }
        self.fanout
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = limit.into();
        self
    }

    pub fn with_policy(mut self, policy: RowErrorPolicy) -> Self {
        self.on_row_error = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ScanConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.row_buffer, 1024);
        assert_eq!(config.growth_chunk, 16384);
        assert_eq!(config.fanout, 1);
        assert_eq!(config.limit, Limit::Unbounded);
        assert_eq!(config.on_row_error, RowErrorPolicy::Abort);
    }

    #[test]
    fn parses_all_fields() {
        let config = ScanConfig::from_toml_str(
            r#"
            row_buffer = 8
            growth_chunk = 4
            fanout = 4
            max_fanout = 8
            work_queue = 32
            limit = 100
            on_row_error = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(config.row_buffer, 8);
        assert_eq!(config.fanout, 4);
        assert_eq!(config.work_queue, 32);
        assert_eq!(config.limit, Limit::Rows(100));
        assert_eq!(config.on_row_error, RowErrorPolicy::Skip);
    }

    #[test]
    fn negative_limit_is_unbounded() {
        let config = ScanConfig::from_toml_str("limit = -1").unwrap();
        assert_eq!(config.limit, Limit::Unbounded);
    }

    #[test]
    fn rejects_zero_sizes_and_unknown_keys() {
        let err = ScanConfig::from_toml_str("fanout = 0").unwrap_err();
        assert!(err.to_string().contains("fanout must be at least 1"));
        assert!(ScanConfig::from_toml_str("fan_out = 2").is_err());
        assert!(ScanConfig::from_toml_str(r#"on_row_error = "retry""#).is_err());
    }

    #[test]
    fn fanout_is_clamped() {
        let config = ScanConfig { max_fanout: 4, ..ScanConfig::default() }.with_fanout(64);
        assert_eq!(config.effective_fanout(), 4);
        assert_eq!(ScanConfig::default().with_fanout(3).effective_fanout(), 3);
    }
}
