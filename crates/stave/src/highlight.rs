use regex::{Captures, Regex};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::debug;

static SOURCE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<pre class="src(?: src-([^"\s]*))?((?:\s[^"]*)?)"([^>]*)>(.*?)</pre>"#)
        .unwrap()
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static REF_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(ref:([^()\s]+)\)\s*$").unwrap());

static INLINE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[\(([^()\s\]]+)\)\]\]").unwrap());

/// Post-processes converted markup: highlights source blocks and links
/// code references to the lines that define them.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

struct SourceBlock<'a> {
    range: Range<usize>,
    language: Option<&'a str>,
    classes: &'a str,
    attributes: &'a str,
    inner: &'a str,
    code: String,
}

impl SourceBlock<'_> {
    fn labels(&self) -> impl Iterator<Item = &str> {
        self.code.lines().filter_map(|line| {
            REF_MARKER
                .captures(line)
                .and_then(|captures| captures.get(1))
                .map(|label| label.as_str())
        })
    }
}

impl Highlighter {
    pub fn new(theme: &str) -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = themes
            .remove(theme)
            .or_else(|| themes.remove("InspiredGitHub"))
            .unwrap_or_default();

        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
        }
    }

    pub fn supports(&self, language: &str) -> bool {
        self.find_syntax(language).is_some()
    }

    fn find_syntax(&self, language: &str) -> Option<&SyntaxReference> {
        self.syntax_set.find_syntax_by_token(language)
    }

    pub fn process(&self, body: &str) -> String {
        let blocks = find_blocks(body);

        let mut definitions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, block) in blocks.iter().enumerate() {
            for label in block.labels() {
                let defining = definitions.entry(label).or_default();
                if defining.last() != Some(&index) {
                    defining.push(index);
                }
            }
        }

        let mut output = String::with_capacity(body.len());
        let mut position = 0;

        for (index, block) in blocks.iter().enumerate() {
            let text = &body[position..block.range.start];
            output.push_str(&resolve_references(text, position, &blocks, &definitions));
            output.push_str(&self.render_block(index, block));
            position = block.range.end;
        }

        output.push_str(&resolve_references(
            &body[position..],
            position,
            &blocks,
            &definitions,
        ));

        output
    }

    fn render_block(&self, index: usize, block: &SourceBlock) -> String {
        let syntax = block.language.and_then(|language| self.find_syntax(language));

        let mut class = String::from("src");
        if let Some(language) = block.language {
            class.push_str(" src-");
            class.push_str(language);
        }
        class.push_str(block.classes);

        let mut highlighter = syntax.map(|syntax| HighlightLines::new(syntax, &self.theme));
        if highlighter.is_some() {
            class.push_str(" highlight");
        } else if let Some(language) = block.language {
            debug!(language, "no highlighter for language");
        }

        let mut html = format!("<pre class=\"{}\"{}>", class, block.attributes);

        match highlighter.as_mut() {
            Some(highlighter) => {
                for line in LinesWithEndings::from(&block.code) {
                    let rendered = highlighter
                        .highlight_line(line, &self.syntax_set)
                        .and_then(|regions| {
                            styled_line_to_highlighted_html(&regions[..], IncludeBackground::No)
                        })
                        .unwrap_or_else(|_| escape_html(line));
                    push_line(&mut html, index, line, &rendered);
                }
            }
            // Unhighlighted blocks keep the converter's markup as is.
            None => {
                for markup in LinesWithEndings::from(block.inner) {
                    let line = unescape_html(&TAG.replace_all(markup, ""));
                    push_line(&mut html, index, &line, markup);
                }
            }
        }

        html.push_str("</pre>");
        html
    }
}

/// Appends one rendered line, wrapped in its anchor when `line` defines a
/// code reference.
fn push_line(html: &mut String, block: usize, line: &str, rendered: &str) {
    match REF_MARKER.captures(line).and_then(|captures| captures.get(1)) {
        Some(label) => html.push_str(&format!(
            "<span id=\"{}\" class=\"coderef-target\">{}</span>",
            anchor_id(block, label.as_str()),
            rendered
        )),
        None => html.push_str(rendered),
    }
}

fn find_blocks(body: &str) -> Vec<SourceBlock<'_>> {
    SOURCE_BLOCK
        .captures_iter(body)
        .filter_map(|captures| {
            let range = captures.get(0)?.range();
            let language = captures
                .get(1)
                .map(|language| language.as_str())
                .filter(|language| !language.is_empty() && *language != "nil");
            let classes = captures.get(2).map_or("", |classes| classes.as_str());
            let attributes = captures.get(3).map_or("", |attributes| attributes.as_str());
            let inner = captures.get(4).map_or("", |inner| inner.as_str());

            Some(SourceBlock {
                range,
                language,
                classes,
                attributes,
                inner,
                code: unescape_html(&TAG.replace_all(inner, "")),
            })
        })
        .collect()
}

fn resolve_references(
    text: &str,
    offset: usize,
    blocks: &[SourceBlock],
    definitions: &HashMap<&str, Vec<usize>>,
) -> String {
    INLINE_REF
        .replace_all(text, |captures: &Captures| {
            let Some(found) = captures.get(1) else {
                return String::new();
            };
            let label = found.as_str();
            let position = offset + found.start();

            match closest_definition(label, position, blocks, definitions) {
                Some(index) => format!(
                    "<a href=\"#{}\" class=\"coderef\">{}</a>",
                    anchor_id(index, label),
                    escape_html(label)
                ),
                None => {
                    debug!(label, "unresolved code reference");
                    escape_html(label)
                }
            }
        })
        .into_owned()
}

/// Block defining `label` nearest to `position`; the earlier block wins a tie.
fn closest_definition(
    label: &str,
    position: usize,
    blocks: &[SourceBlock],
    definitions: &HashMap<&str, Vec<usize>>,
) -> Option<usize> {
    definitions.get(label)?.iter().copied().min_by_key(|&index| {
        let range = &blocks[index].range;
        if range.end <= position {
            position - range.end
        } else {
            range.start.saturating_sub(position)
        }
    })
}

pub fn anchor_id(block: usize, label: &str) -> String {
    let label: String = label
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '-' || character == '_' {
                character
            } else {
                '-'
            }
        })
        .collect();
    format!("coderef-{}-{}", block, label)
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_html(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
