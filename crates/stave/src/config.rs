use crate::error::{Result, StaveError};
use crate::item::Item;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use syntect::highlighting::ThemeSet;

pub const INPUT_PLACEHOLDER: &str = "{input}";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_collection_dir")]
    pub collection_dir: PathBuf,
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_highlight")]
    pub highlight: String,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default = "default_converter")]
    pub converter: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            collection_dir: default_collection_dir(),
            template_dir: default_template_dir(),
            highlight: default_highlight(),
            plugins: Vec::new(),
            converter: default_converter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default)]
    pub template: String,
    pub paths: Vec<String>,
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

impl CollectionConfig {
    /// A fresh item for a document discovered in this collection.
    pub fn item(&self, path: impl Into<PathBuf>) -> Item {
        Item::new(path).with_template(self.template.clone())
    }
}

pub fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

pub fn default_collection_dir() -> PathBuf {
    PathBuf::from("collections")
}

pub fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

pub fn default_highlight() -> String {
    "InspiredGitHub".to_string()
}

pub fn default_converter() -> Vec<String> {
    [
        "emacs",
        "--batch",
        "--quick",
        INPUT_PLACEHOLDER,
        "--eval",
        "(princ (org-export-as 'html nil nil t))",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|error| StaveError::TomlParse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.build.collection_dir.is_dir() {
            return Err(StaveError::config(
                "build.collection-dir",
                "expected a directory",
            ));
        }

        if !self.build.template_dir.is_dir() {
            return Err(StaveError::config(
                "build.template-dir",
                "expected a directory",
            ));
        }

        let themes = ThemeSet::load_defaults();
        if !themes.themes.contains_key(&self.build.highlight) {
            return Err(StaveError::config(
                "build.highlight",
                "expected a highlighting theme",
            ));
        }

        if self.build.converter.is_empty() {
            return Err(StaveError::config(
                "build.converter",
                "expected a program and its arguments",
            ));
        }

        for (index, collection) in self.collections.iter().enumerate() {
            if collection.name.is_empty() {
                return Err(StaveError::config(
                    format!("collections.{index}.name"),
                    "expected a non-empty string",
                ));
            }
        }

        Ok(())
    }
}
