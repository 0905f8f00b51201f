//! Call warnings.

use serde::{Deserialize, Serialize};

/// A non-fatal problem with a call, e.g. a setting the vendor ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallWarning {
    UnsupportedSetting {
        setting: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    UnsupportedTool {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    Other {
        message: String,
    },
}

impl CallWarning {
    pub fn unsupported_setting(setting: impl Into<String>) -> Self {
        CallWarning::UnsupportedSetting {
            setting: setting.into(),
            details: None,
        }
    }

    pub fn unsupported_setting_with(setting: impl Into<String>, details: impl Into<String>) -> Self {
        CallWarning::UnsupportedSetting {
            setting: setting.into(),
            details: Some(details.into()),
        }
    }

    pub fn unsupported_tool(tool: impl Into<String>) -> Self {
        CallWarning::UnsupportedTool {
            tool: tool.into(),
            details: None,
        }
    }
}
