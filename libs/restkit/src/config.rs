use serde::{Deserialize, Serialize};

/// Tunables of the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
    /// Mount point of all resource routes. Must start with `/`.
    pub path_prefix: String,
    /// Page size used by readList when `limit` is missing or invalid.
    pub default_limit: usize,
    /// Upper bound on create/update bodies.
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/api".to_string(),
            default_limit: 100,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    /// Prefix without a trailing slash, empty for the root.
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.path_prefix.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_normalization() {
        let mut cfg = ApiConfig::default();
        assert_eq!(cfg.normalized_prefix(), "/api");
        cfg.path_prefix = "rest/".into();
        assert_eq!(cfg.normalized_prefix(), "/rest");
        cfg.path_prefix = "/".into();
        assert_eq!(cfg.normalized_prefix(), "");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let cfg: ApiConfig = serde_json::from_str(r#"{"default_limit": 25}"#).unwrap();
        assert_eq!(cfg.default_limit, 25);
        assert_eq!(cfg.path_prefix, "/api");
        assert!(serde_json::from_str::<ApiConfig>(r#"{"bogus": 1}"#).is_err());
    }
}
