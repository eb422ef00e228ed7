use crate::config::Config;
use crate::error::{Result, StaveError};
use crate::metadata::MetadataPlugin;
use crate::outline::OutlinePlugin;
use crate::pipeline::Plugin;
use crate::render::RenderPlugin;

pub const METADATA: &str = "metadata";
pub const OUTLINE: &str = "org";
pub const RENDER: &str = "render";

pub fn create(name: &str, config: &Config) -> Result<Box<dyn Plugin>> {
    match name {
        METADATA => Ok(Box::new(MetadataPlugin::default())),
        OUTLINE | "outline" => Ok(Box::new(OutlinePlugin::from_config(config)?)),
        RENDER => Ok(Box::new(RenderPlugin::from_config(config)?)),
        _ => Err(StaveError::UnknownPlugin {
            name: name.to_string(),
        }),
    }
}

/// Plugins named by `build.plugins`, in order.
pub fn from_config(config: &Config) -> Result<Vec<Box<dyn Plugin>>> {
    config
        .build
        .plugins
        .iter()
        .map(|name| create(name, config))
        .collect()
}
