//! Pipeline configuration.
//!
//! Every field has a default, so a JSON document only has to name what it
//! changes.

use serde::{Deserialize, Serialize};

use crate::component::StyleMode;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Binding mode for component styles that do not declare one.
    pub default_style_mode: StyleMode,
    /// Fail fast on fragments or components that include themselves.
    pub detect_cycles: bool,
    /// Deepest allowed chain of nested includes.
    pub max_depth: usize,
    /// Emit `<!DOCTYPE html>` before page markup.
    pub doctype: bool,
    /// Extension of page sources picked up by `compile_all_pages`.
    pub page_extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_style_mode: StyleMode::Inline,
            detect_cycles: true,
            max_depth: 64,
            doctype: true,
            page_extension: "html".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn missing_fields_take_defaults() {
        let config = PipelineConfig::from_json(r#"{"defaultStyleMode": "link", "maxDepth": 8}"#)
            .unwrap();
        assert_eq!(config.default_style_mode, StyleMode::Link);
        assert_eq!(config.max_depth, 8);
        assert!(config.detect_cycles);
        assert_eq!(config.page_extension, "html");
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = PipelineConfig::from_json(r#"{"maxDepth": "deep"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
