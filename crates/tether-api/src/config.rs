//! Plugin configuration files
//!
//! The host stores one JSON document per plugin. Keys are the host's on-disk
//! names and must not change.

use crate::types::ConfigMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tether_core::Result;

/// A plugin's entry in the host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(rename = "名称", default)]
    pub name: String,
    #[serde(rename = "描述", default)]
    pub description: String,
    #[serde(rename = "作者", default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(rename = "来源", default)]
    pub source: String,
    #[serde(rename = "是否禁用", default)]
    pub disable: bool,
    #[serde(rename = "版本", default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "配置", default)]
    pub config: ConfigMap,

    /// Where the file was loaded from. Not part of the document.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl PluginConfig {
    /// Load a config file, remembering its absolute path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let content = std::fs::read_to_string(&path)?;
        let mut config: PluginConfig = serde_json::from_str(&content)?;
        config.path = Some(path);
        Ok(config)
    }

    /// File this config was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
