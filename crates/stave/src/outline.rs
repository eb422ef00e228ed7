//! Org documents: inline options, delegated conversion and post-processing.

use crate::config::Config;
use crate::converter::{CommandConverter, Converter};
use crate::error::{PluginError, PluginResult, Result, StaveError};
use crate::highlight::Highlighter;
use crate::item::Item;
use crate::pipeline::Plugin;
use chrono::NaiveDate;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#\+(author|title|date):\s*(\S.*?)\s*$").unwrap());

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*+\s").unwrap());

static TOP_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\s+(\S.*?)\s*$").unwrap());

static DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static BLOCK_BEGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*#\+begin_src\b").unwrap());

static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*#\+end_src\b").unwrap());

static INLINE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[\([^()\s\]]+\)\]\]").unwrap());

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutlineOptions {
    pub author: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
}

pub struct OutlinePlugin {
    converter: Box<dyn Converter>,
    highlighter: Highlighter,
}

impl OutlinePlugin {
    pub fn new(converter: Box<dyn Converter>, highlighter: Highlighter) -> Self {
        Self {
            converter,
            highlighter,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let converter = CommandConverter::from_command_line(&config.build.converter)
            .ok_or_else(|| {
                StaveError::config("build.converter", "expected a program and its arguments")
            })?;

        Ok(Self::new(
            Box::new(converter),
            Highlighter::new(&config.build.highlight),
        ))
    }

    /// Converts an org document already read from `item`'s path.
    pub fn transform(&self, item: &Item, source: &str) -> PluginResult<Item> {
        let options = parse_options(source);
        let file_date = options.date.as_deref().map(parse_date).transpose()?;

        let (title, document) = match options.title {
            Some(title) => (Some(title), source.to_string()),
            None => match first_heading(source) {
                Some((line, heading)) => (Some(heading), remove_line(source, line)),
                None => (None, source.to_string()),
            },
        };

        let content = if document.trim().is_empty() {
            String::new()
        } else {
            let converted = self.converter.convert(&protect_references(&document))?;
            self.highlighter.process(&converted)
        };

        let mut evolved = item.clone().with_content(content);
        if let Some(author) = options.author {
            evolved = evolved.with_author(author);
        }
        if let Some(title) = title {
            evolved = evolved.with_title(title);
        }
        if let (Some(date), Some(file_date)) = (options.date, file_date) {
            evolved = evolved.with_date(date).with_file_date(file_date);
        }

        Ok(evolved)
    }
}

impl Plugin for OutlinePlugin {
    fn name(&self) -> &'static str {
        "org"
    }

    fn available(&self) -> bool {
        self.converter.available()
    }

    fn run(&self, item: &Item, _items: &[Item], _config: &Config) -> PluginResult<Item> {
        if !is_outline(item.path()) {
            debug!(path = %item.path().display(), "not an org document");
            return Ok(item.clone());
        }

        let source = fs::read_to_string(item.path())?;
        self.transform(item, &source)
    }
}

pub fn is_outline(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("org"))
}

/// Options from the lines before the first heading; the last occurrence wins.
pub fn parse_options(source: &str) -> OutlineOptions {
    let mut options = OutlineOptions::default();

    for line in source.lines() {
        if HEADING.is_match(line) {
            break;
        }

        let Some(captures) = OPTION.captures(line) else {
            continue;
        };
        let value = captures[2].to_string();

        match captures[1].to_ascii_lowercase().as_str() {
            "author" => options.author = Some(value),
            "title" => options.title = Some(value),
            "date" => options.date = Some(value),
            _ => {}
        }
    }

    options
}

/// Seconds since the Unix epoch at UTC midnight of a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> PluginResult<f64> {
    let malformed = || PluginError::MalformedOption {
        key: "date".to_string(),
        value: value.to_string(),
    };

    if !DATE.is_match(value) {
        return Err(malformed());
    }

    let midnight = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| malformed())?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(malformed)?;

    Ok(midnight.and_utc().timestamp() as f64)
}

/// Line index and text of the first top-level heading outside source blocks.
pub fn first_heading(source: &str) -> Option<(usize, String)> {
    let mut in_block = false;

    for (index, line) in source.lines().enumerate() {
        if in_block {
            in_block = !BLOCK_END.is_match(line);
            continue;
        }
        if BLOCK_BEGIN.is_match(line) {
            in_block = true;
            continue;
        }
        if let Some(captures) = TOP_HEADING.captures(line) {
            return Some((index, captures[1].to_string()));
        }
    }

    None
}

fn remove_line(source: &str, removed: usize) -> String {
    source
        .split_inclusive('\n')
        .enumerate()
        .filter(|(index, _)| *index != removed)
        .map(|(_, line)| line)
        .collect()
}

/// Wraps inline code references outside source blocks in HTML export
/// snippets so the converter copies them into its output verbatim.
fn protect_references(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut in_block = false;

    for line in source.split_inclusive('\n') {
        if in_block {
            in_block = !BLOCK_END.is_match(line);
            output.push_str(line);
        } else if BLOCK_BEGIN.is_match(line) {
            in_block = true;
            output.push_str(line);
        } else {
            output.push_str(&INLINE_REF.replace_all(line, "@@html:${0}@@"));
        }
    }

    output
}
