//! Output helpers for plugins

use crate::config::PluginConfig;
use crate::frame::{BasicPlugin, Frame};
use crate::modules::{LoggerModule, TerminalModule, get_module, names};
use crate::types::{ConfigMap, Level};
use std::sync::Arc;
use tether_core::Result;
use tracing::debug;

/// Terminal and logger output prefixed with the plugin's configured name.
///
/// Output silently goes nowhere when the host does not offer the module.
pub struct PluginTool {
    frame: Option<Arc<dyn Frame>>,
    plugin_id: String,
    config: PluginConfig,
    terminal: Option<Arc<dyn TerminalModule>>,
    logger: Option<Arc<dyn LoggerModule>>,
}

impl PluginTool {
    /// Resolve the terminal, the logger and this plugin's config through `frame`.
    pub async fn new(frame: Arc<dyn Frame>, plugin_id: &str) -> Result<Self> {
        let config = frame.get_plugin_config(plugin_id).await?.unwrap_or_default();
        let terminal = get_module::<Arc<dyn TerminalModule>>(frame.as_ref(), names::TERMINAL).await?;
        let logger = get_module::<Arc<dyn LoggerModule>>(frame.as_ref(), names::LOGGER).await?;
        debug!(
            plugin = plugin_id,
            terminal = terminal.is_some(),
            logger = logger.is_some(),
            "plugin tool ready"
        );
        Ok(Self {
            frame: Some(frame),
            plugin_id: plugin_id.to_string(),
            config,
            terminal,
            logger,
        })
    }

    /// Build from an initialized [`BasicPlugin`]. Before `init` the tool is inert.
    pub async fn for_plugin(plugin: &BasicPlugin) -> Result<Self> {
        match plugin.frame() {
            Some(frame) => Self::new(frame, &plugin.id()).await,
            None => Ok(Self {
                frame: None,
                plugin_id: plugin.id(),
                config: PluginConfig::default(),
                terminal: None,
                logger: None,
            }),
        }
    }

    /// The configured plugin name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// This plugin's entry in the host config.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Print to the terminal under the plugin's name.
    pub async fn print(&self, level: Level, msg: &str) {
        if let Some(terminal) = &self.terminal {
            terminal.print(level, self.name(), msg).await;
        }
    }

    pub async fn color_trans_ansi(&self, msg: &str) -> String {
        match &self.terminal {
            Some(terminal) => terminal.color_trans_ansi(msg).await,
            None => msg.to_string(),
        }
    }

    pub async fn info(&self, msg: &str) {
        self.print(Level::Info, msg).await
    }

    pub async fn warn(&self, msg: &str) {
        self.print(Level::Warn, msg).await
    }

    pub async fn error(&self, msg: &str) {
        self.print(Level::Error, msg).await
    }

    pub async fn success(&self, msg: &str) {
        self.print(Level::Success, msg).await
    }

    /// Write to the persistent log under the plugin's name.
    pub async fn log(&self, level: Level, msg: &str) {
        if let Some(logger) = &self.logger {
            logger.log(self.name(), level, msg).await;
        }
    }

    pub async fn log_info(&self, msg: &str) {
        self.log(Level::Info, msg).await
    }

    pub async fn log_warn(&self, msg: &str) {
        self.log(Level::Warn, msg).await
    }

    pub async fn log_error(&self, msg: &str) {
        self.log(Level::Error, msg).await
    }

    pub async fn log_success(&self, msg: &str) {
        self.log(Level::Success, msg).await
    }

    /// Persist a new `配置` section for this plugin. A no-op before `init`.
    pub async fn upgrade_plugin_config(&self, config: ConfigMap) -> Result<()> {
        match &self.frame {
            Some(frame) if !self.plugin_id.is_empty() => {
                frame.upgrade_plugin_config(&self.plugin_id, config).await
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for PluginTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginTool")
            .field("plugin_id", &self.plugin_id)
            .field("name", &self.config.name)
            .field("terminal", &self.terminal.is_some())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Module;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LoggerModule for Recorder {
        fn name(&self) -> &str {
            names::LOGGER
        }

        async fn log(&self, scope: &str, level: Level, msg: &str) {
            self.lines.lock().unwrap().push(format!("[{level}] {scope}: {msg}"));
        }
    }

    struct OneModuleFrame {
        logger: Arc<Recorder>,
    }

    #[async_trait]
    impl Frame for OneModuleFrame {
        async fn list_modules(&self) -> Result<Vec<String>> {
            Ok(vec![names::LOGGER.to_string()])
        }

        async fn get_module(&self, name: &str) -> Result<Option<Module>> {
            Ok((name == names::LOGGER)
                .then(|| Module::from(self.logger.clone() as Arc<dyn LoggerModule>)))
        }

        async fn get_plugin_config(&self, id: &str) -> Result<Option<PluginConfig>> {
            Ok(Some(PluginConfig {
                name: format!("{id}-display"),
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn test_output_is_prefixed_with_plugin_name() -> anyhow::Result<()> {
        let logger = Arc::new(Recorder::default());
        let frame = Arc::new(OneModuleFrame {
            logger: logger.clone(),
        });
        let tool = PluginTool::new(frame, "hello").await?;

        tool.log_warn("careful").await;
        // No terminal module: printing is a no-op.
        tool.info("ignored").await;
        assert_eq!(tool.color_trans_ansi("§a").await, "§a");

        assert_eq!(
            *logger.lines.lock().unwrap(),
            vec!["[WARN] hello-display: careful".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_uninitialized_plugin_tool_is_inert() -> anyhow::Result<()> {
        let tool = PluginTool::for_plugin(&BasicPlugin::new()).await?;
        assert_eq!(tool.name(), "");
        tool.upgrade_plugin_config(ConfigMap::new()).await?;
        Ok(())
    }
}
