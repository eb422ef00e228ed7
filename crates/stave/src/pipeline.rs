use crate::config::Config;
use crate::error::{PluginResult, Result, StaveError};
use crate::item::Item;
use crate::plugins;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// A single stage of the item pipeline.
///
/// `run` receives the item being processed together with the collection
/// as it stood before the current pass, and returns a new item. Returning
/// a clone of `item` is the no-op case.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn available(&self) -> bool {
        true
    }

    fn run(&self, item: &Item, items: &[Item], config: &Config) -> PluginResult<Item>;
}

pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(plugins::from_config(config)?))
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn run(&self, mut items: Vec<Item>, config: &Config) -> Result<Vec<Item>> {
        for plugin in &self.plugins {
            if !plugin.available() {
                warn!(plugin = plugin.name(), "plugin unavailable, skipping");
                continue;
            }

            info!(plugin = plugin.name(), items = items.len(), "running plugin");
            items = run_pass(plugin.as_ref(), &items, config)?;
        }

        debug!(items = items.len(), "pipeline finished");
        Ok(items)
    }
}

fn run_pass(plugin: &dyn Plugin, snapshot: &[Item], config: &Config) -> Result<Vec<Item>> {
    snapshot
        .par_iter()
        .map(|item| {
            plugin
                .run(item, snapshot, config)
                .map_err(|source| StaveError::Plugin {
                    plugin: plugin.name(),
                    path: item.path().to_path_buf(),
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Append(&'static str);

    impl Plugin for Append {
        fn name(&self) -> &'static str {
            "append"
        }

        fn run(&self, item: &Item, _items: &[Item], _config: &Config) -> PluginResult<Item> {
            let content = format!("{}{}", item.content(), self.0);
            Ok(item.clone().with_content(content))
        }
    }

    struct SiblingTitles;

    impl Plugin for SiblingTitles {
        fn name(&self) -> &'static str {
            "siblings"
        }

        fn run(&self, item: &Item, items: &[Item], _config: &Config) -> PluginResult<Item> {
            let contents: Vec<&str> = items.iter().map(|other| other.content()).collect();
            Ok(item.clone().with_title(contents.join(",")))
        }
    }

    struct Unavailable {
        checks: Arc<AtomicUsize>,
    }

    impl Plugin for Unavailable {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        fn available(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            false
        }

        fn run(&self, _item: &Item, _items: &[Item], _config: &Config) -> PluginResult<Item> {
            panic!("unavailable plugin must not run");
        }
    }

    struct FailOn(&'static str);

    impl Plugin for FailOn {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn run(&self, item: &Item, _items: &[Item], _config: &Config) -> PluginResult<Item> {
            if item.path() == Path::new(self.0) {
                return Err(PluginError::Conversion {
                    output: "broken document".to_string(),
                });
            }
            Ok(item.clone())
        }
    }

    fn items() -> Vec<Item> {
        vec![Item::new("a.org"), Item::new("b.org"), Item::new("c.org")]
    }

    #[test]
    fn test_plugins_run_in_order() {
        let pipeline = Pipeline::new(vec![Box::new(Append("1")), Box::new(Append("2"))]);
        let result = pipeline.run(items(), &Config::default()).unwrap();

        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|item| item.content() == "12"));
        assert_eq!(result[1].path(), Path::new("b.org"));
    }

    #[test]
    fn test_siblings_see_previous_pass() {
        let pipeline = Pipeline::new(vec![Box::new(Append("x")), Box::new(SiblingTitles)]);
        let result = pipeline.run(items(), &Config::default()).unwrap();

        for item in &result {
            assert_eq!(item.title(), "x,x,x");
        }
    }

    #[test]
    fn test_unavailable_plugin_is_skipped_once() {
        let checks = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(vec![
            Box::new(Unavailable {
                checks: checks.clone(),
            }),
            Box::new(Append("ok")),
        ]);
        let result = pipeline.run(items(), &Config::default()).unwrap();

        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert!(result.iter().all(|item| item.content() == "ok"));
    }

    #[test]
    fn test_error_aborts_with_item_path() {
        let pipeline = Pipeline::new(vec![Box::new(FailOn("b.org")), Box::new(Append("never"))]);
        let error = pipeline.run(items(), &Config::default()).unwrap_err();

        match error {
            StaveError::Plugin { plugin, path, .. } => {
                assert_eq!(plugin, "fail");
                assert_eq!(path, std::path::PathBuf::from("b.org"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_pipeline_returns_items() {
        let pipeline = Pipeline::new(Vec::new());
        assert_eq!(pipeline.run(items(), &Config::default()).unwrap(), items());
    }
}
