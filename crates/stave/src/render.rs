use crate::config::Config;
use crate::error::{PluginResult, Result};
use crate::item::Item;
use crate::pipeline::Plugin;
use crate::sandbox::Sandbox;
use tracing::debug;

/// Renders an item through the sandboxed template it names.
pub struct RenderPlugin {
    sandbox: Sandbox,
}

impl RenderPlugin {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Sandbox::from_dir(&config.build.template_dir)?))
    }
}

impl Plugin for RenderPlugin {
    fn name(&self) -> &'static str {
        "render"
    }

    fn run(&self, item: &Item, items: &[Item], _config: &Config) -> PluginResult<Item> {
        let name = item.template();
        if name.is_empty() || !self.sandbox.has_template(name) {
            debug!(path = %item.path().display(), template = name, "no template to render");
            return Ok(item.clone());
        }

        let content = self.sandbox.render(name, item, items)?;
        Ok(item.clone().with_content(content))
    }
}
