//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。缺省字段取默认值。

use contracts::{ContractError, EngineConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 根据格式解析配置
pub(crate) fn parse(content: &str, format: ConfigFormat) -> Result<EngineConfig, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ContractError::ConfigParse {
            message: format!("TOML parse error: {e}"),
            source: Some(Box::new(e)),
        }),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
                message: format!("JSON parse error: {e}"),
                source: Some(Box::new(e)),
            })
        }
    }
}
