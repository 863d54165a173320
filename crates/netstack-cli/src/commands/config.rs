//! Effective configuration display

use anyhow::Result;

use netstack_core::NetstackConfig;

use crate::output::OutputFormat;

pub struct ConfigCommand {
    config: NetstackConfig,
}

impl ConfigCommand {
    pub fn new(config: NetstackConfig) -> Self {
        Self { config }
    }

    /// Configuration with credentials masked
    fn redacted(&self) -> NetstackConfig {
        let mut config = self.config.clone();
        for token in [&mut config.address_pool.token, &mut config.port_plugin.token] {
            if token.is_some() {
                *token = Some("********".to_string());
            }
        }
        config
    }

    pub fn show(&self, format: OutputFormat) -> Result<String> {
        if format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(&self.redacted())?);
        }

        let config = &self.config;
        let path = |p: &Option<std::path::PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(memory)".to_string())
        };

        let mut out = String::new();
        out.push_str("[manager]\n");
        out.push_str(&format!("  use_ipv6          {}\n", config.manager.use_ipv6));
        out.push_str(&format!(
            "  call_timeout_secs {}\n",
            config
                .manager
                .call_timeout_secs
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));

        out.push_str("[address_pool]\n");
        out.push_str(&format!("  backend           {:?}\n", config.address_pool.backend));
        out.push_str(&format!(
            "  url               {}\n",
            config.address_pool.url.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!("  storage_path      {}\n", path(&config.address_pool.storage_path)));

        out.push_str("[port_plugin]\n");
        out.push_str(&format!("  backend           {:?}\n", config.port_plugin.backend));
        out.push_str(&format!(
            "  url               {}\n",
            config.port_plugin.url.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!("  default_tenant    {}\n", config.port_plugin.default_tenant));
        out.push_str(&format!("  storage_path      {}\n", path(&config.port_plugin.storage_path)));

        out.push_str("[repository]\n");
        out.push_str(&format!("  storage_path      {}\n", path(&config.repository.storage_path)));

        Ok(out)
    }
}
