use serde::Serialize;
use std::path::{Path, PathBuf};

/// One source document on its way through the plugin pipeline.
///
/// Items are never edited in place. Every `with_*` method consumes the
/// item and returns a new one, so a stage that wants to change a field
/// clones the item it was handed and evolves the clone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    path: PathBuf,
    content: String,
    title: String,
    author: String,
    date: String,
    keywords: String,
    template: String,
    mtime: f64,
    dir_mtime: f64,
    file_date: f64,
    dir_date: f64,
}

impl Item {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn mtime(&self) -> f64 {
        self.mtime
    }

    pub fn dir_mtime(&self) -> f64 {
        self.dir_mtime
    }

    pub fn file_date(&self) -> f64 {
        self.file_date
    }

    pub fn dir_date(&self) -> f64 {
        self.dir_date
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_mtime(mut self, mtime: f64) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_dir_mtime(mut self, dir_mtime: f64) -> Self {
        self.dir_mtime = dir_mtime;
        self
    }

    pub fn with_file_date(mut self, file_date: f64) -> Self {
        self.file_date = file_date;
        self
    }

    pub fn with_dir_date(mut self, dir_date: f64) -> Self {
        self.dir_date = dir_date;
        self
    }
}
