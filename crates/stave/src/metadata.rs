//! Filesystem and version-control metadata.
//!
//! Modification times are always set. Author and commit dates come from
//! the first commit touching the file and its directory, when there is one.

use crate::config::Config;
use crate::error::PluginResult;
use crate::git::{GitCommand, GitMetadata};
use crate::item::Item;
use crate::pipeline::Plugin;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

pub struct MetadataPlugin {
    git: Box<dyn GitMetadata>,
}

impl Default for MetadataPlugin {
    fn default() -> Self {
        Self::new(Box::new(GitCommand::default()))
    }
}

impl MetadataPlugin {
    pub fn new(git: Box<dyn GitMetadata>) -> Self {
        Self { git }
    }
}

impl Plugin for MetadataPlugin {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn run(&self, item: &Item, _items: &[Item], _config: &Config) -> PluginResult<Item> {
        let path = item.path();
        let parent = parent_dir(path);

        let mut evolved = item
            .clone()
            .with_mtime(modified(path)?)
            .with_dir_mtime(modified(parent)?);

        let (file_date, author) = self.git.first_commit(path);
        if file_date > 0.0 {
            let (dir_date, _) = self.git.first_commit(parent);
            evolved = evolved
                .with_author(author)
                .with_file_date(file_date)
                .with_dir_date(dir_date);
        }

        Ok(evolved)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn modified(path: &Path) -> PluginResult<f64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0))
}
