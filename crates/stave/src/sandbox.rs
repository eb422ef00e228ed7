//! A tera environment that only evaluates an allow-listed subset of the
//! template language.
//!
//! Every template is checked against the allow-list once tera has parsed
//! it, by walking the syntax tree tera will later evaluate. Anything
//! outside the allow-list is recorded against the template and reported
//! as a security violation as soon as that template, or one it pulls in
//! with `include`, `extends` or `import`, is asked to render. Nothing of a
//! rejected template is ever evaluated.

use crate::error::{PluginError, PluginResult, Result, StaveError};
use crate::item::Item;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tera::ast::{Expr, ExprVal, FunctionCall, Node};
use tera::{Context, Tera};
use tracing::{debug, warn};
use walkdir::WalkDir;

const FILTERS: &[&str] = &[
    "abs",
    "addslashes",
    "as_str",
    "capitalize",
    "concat",
    "date",
    "default",
    "escape",
    "escape_xml",
    "filesizeformat",
    "filter",
    "first",
    "float",
    "group_by",
    "indent",
    "int",
    "join",
    "json_encode",
    "last",
    "length",
    "linebreaksbr",
    "lower",
    "map",
    "nth",
    "pluralize",
    "replace",
    "reverse",
    "round",
    "safe",
    "slice",
    "slugify",
    "sort",
    "spaceless",
    "split",
    "striptags",
    "title",
    "trim",
    "trim_end",
    "trim_end_matches",
    "trim_start",
    "trim_start_matches",
    "truncate",
    "unique",
    "upper",
    "urlencode",
    "urlencode_strict",
    "wordcount",
];

const TESTS: &[&str] = &[
    "containing",
    "defined",
    "divisibleby",
    "ending_with",
    "even",
    "iterable",
    "matching",
    "number",
    "object",
    "odd",
    "starting_with",
    "string",
    "undefined",
];

const FUNCTIONS: &[&str] = &["range"];

#[derive(Debug, Default)]
struct Manifest {
    violations: Vec<String>,
    dependencies: Vec<String>,
}

pub struct Sandbox {
    tera: Tera,
    manifests: HashMap<String, Manifest>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());

        Self {
            tera,
            manifests: HashMap::new(),
        }
    }

    /// Loads every file below `template_dir`, named by its relative path.
    pub fn from_dir(template_dir: &Path) -> Result<Self> {
        let mut templates = Vec::new();

        for entry in WalkDir::new(template_dir).min_depth(1) {
            let entry = entry.map_err(|error| StaveError::WalkDir {
                path: template_dir.to_path_buf(),
                message: error.to_string(),
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path
                .strip_prefix(template_dir)
                .map_err(|_| StaveError::WalkDir {
                    path: path.to_path_buf(),
                    message: "outside of the template directory".to_string(),
                })?;
            let name = relative.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(path)?));
        }

        let mut sandbox = Self::new();
        sandbox.add_raw_templates(templates)?;
        Ok(sandbox)
    }

    pub fn add_raw_templates(&mut self, templates: Vec<(String, String)>) -> Result<()> {
        let names: Vec<String> = templates.iter().map(|(name, _)| name.clone()).collect();
        self.tera.add_raw_templates(templates)?;

        for name in names {
            let manifest = scan(&self.tera.get_template(&name)?.ast);
            if !manifest.violations.is_empty() {
                warn!(
                    template = %name,
                    violations = manifest.violations.len(),
                    "template uses disallowed constructs"
                );
            }
            self.manifests.insert(name, manifest);
        }

        Ok(())
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.manifests.contains_key(name)
    }

    /// Fails if `name` or anything it includes, extends or imports was
    /// rejected by the scanner.
    pub fn check(&self, name: &str) -> PluginResult<()> {
        let mut pending = vec![name.to_string()];
        let mut seen = HashSet::new();

        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }

            let Some(manifest) = self.manifests.get(&current) else {
                continue;
            };

            if let Some(reason) = manifest.violations.first() {
                return Err(PluginError::SecurityViolation {
                    template: current,
                    reason: reason.clone(),
                });
            }

            pending.extend(manifest.dependencies.iter().cloned());
        }

        Ok(())
    }

    pub fn render(&self, name: &str, item: &Item, items: &[Item]) -> PluginResult<String> {
        self.check(name)?;

        let mut context = Context::new();
        context.insert("item", item);
        context.insert("items", items);

        debug!(template = name, path = %item.path().display(), "rendering");
        Ok(self.tera.render(name, &context)?)
    }
}

fn scan(nodes: &[Node]) -> Manifest {
    let mut manifest = Manifest::default();
    manifest.check_nodes(nodes);
    manifest
}

impl Manifest {
    fn reject(&mut self, reason: String) {
        self.violations.push(reason);
    }

    fn check_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.check_node(node);
        }
    }

    fn check_node(&mut self, node: &Node) {
        match node {
            Node::VariableBlock(_, expr) => self.check_expr(expr),
            Node::MacroDefinition(_, definition, _) => {
                for default in definition.args.values().flatten() {
                    self.check_expr(default);
                }
                self.check_nodes(&definition.body);
            }
            Node::Extends(_, parent) => self.dependencies.push(parent.clone()),
            Node::Include(_, names, _) => self.dependencies.extend(names.iter().cloned()),
            Node::ImportMacro(_, file, _) => self.dependencies.push(file.clone()),
            Node::Set(_, set) => {
                self.check_name(&set.key);
                self.check_expr(&set.value);
            }
            Node::FilterSection(_, section, _) => {
                self.check_filter(&section.filter);
                self.check_nodes(&section.body);
            }
            Node::Block(_, block, _) => self.check_nodes(&block.body),
            Node::Forloop(_, forloop, _) => {
                if let Some(key) = &forloop.key {
                    self.check_name(key);
                }
                self.check_name(&forloop.value);
                self.check_expr(&forloop.container);
                self.check_nodes(&forloop.body);
                if let Some(empty) = &forloop.empty_body {
                    self.check_nodes(empty);
                }
            }
            Node::If(branches, _) => {
                for (_, condition, body) in &branches.conditions {
                    self.check_expr(condition);
                    self.check_nodes(body);
                }
                if let Some((_, body)) = &branches.otherwise {
                    self.check_nodes(body);
                }
            }
            Node::Super
            | Node::Text(_)
            | Node::Raw(..)
            | Node::Break(_)
            | Node::Continue(_)
            | Node::Comment(..) => {}
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        self.check_value(&expr.val);
        for filter in &expr.filters {
            self.check_filter(filter);
        }
    }

    fn check_value(&mut self, value: &ExprVal) {
        match value {
            ExprVal::Ident(path) => self.check_name(path),
            ExprVal::Math(math) => {
                self.check_expr(&math.lhs);
                self.check_expr(&math.rhs);
            }
            ExprVal::Logic(logic) => {
                self.check_expr(&logic.lhs);
                self.check_expr(&logic.rhs);
            }
            ExprVal::In(contains) => {
                self.check_expr(&contains.lhs);
                self.check_expr(&contains.rhs);
            }
            ExprVal::Test(test) => {
                self.check_name(&test.ident);
                if !TESTS.contains(&test.name.as_str()) {
                    self.reject(format!("test `{}` is not allowed", test.name));
                }
                for argument in &test.args {
                    self.check_expr(argument);
                }
            }
            ExprVal::MacroCall(call) => {
                for argument in call.args.values() {
                    self.check_expr(argument);
                }
            }
            ExprVal::FunctionCall(call) => {
                if !FUNCTIONS.contains(&call.name.as_str()) {
                    self.reject(format!("calling function `{}` is not allowed", call.name));
                }
                for argument in call.args.values() {
                    self.check_expr(argument);
                }
            }
            ExprVal::Array(values) => {
                for value in values {
                    self.check_expr(value);
                }
            }
            ExprVal::StringConcat(concat) => {
                for value in &concat.values {
                    self.check_value(value);
                }
            }
            ExprVal::String(_) | ExprVal::Int(_) | ExprVal::Float(_) | ExprVal::Bool(_) => {}
        }
    }

    fn check_filter(&mut self, filter: &FunctionCall) {
        if !FILTERS.contains(&filter.name.as_str()) {
            self.reject(format!("filter `{}` is not allowed", filter.name));
        }

        for (key, argument) in &filter.args {
            if let ("attribute" | "key", ExprVal::String(name)) = (key.as_str(), &argument.val) {
                self.check_name(name);
            }
            self.check_expr(argument);
        }
    }

    /// Rejects any segment of a dotted or subscripted path that starts
    /// with an underscore.
    fn check_name(&mut self, path: &str) {
        let private = path
            .split(['.', '[', ']', '"', '\'', '`'])
            .map(str::trim)
            .find(|segment| segment.starts_with('_'));

        if let Some(segment) = private {
            self.reject(format!("access to private name `{segment}`"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox(templates: &[(&str, &str)]) -> Sandbox {
        let mut sandbox = Sandbox::new();
        sandbox
            .add_raw_templates(
                templates
                    .iter()
                    .map(|(name, source)| (name.to_string(), source.to_string()))
                    .collect(),
            )
            .unwrap();
        sandbox
    }

    fn item() -> Item {
        Item::new("foo.org").with_content("abc").with_title("Foo")
    }

    fn violation(source: &str) -> String {
        match sandbox(&[("template", source)]).check("template") {
            Err(PluginError::SecurityViolation { reason, .. }) => reason,
            other => panic!("expected a violation in {source:?}, got {other:?}"),
        }
    }

    fn allowed(source: &str) -> bool {
        sandbox(&[("template", source)]).check("template").is_ok()
    }

    fn rendered(source: &str, items: &[Item]) -> String {
        sandbox(&[("template", source)])
            .render("template", &item(), items)
            .unwrap()
    }

    #[test]
    fn test_calling_injected_function_is_rejected() {
        let mut sandbox = sandbox(&[("template", "before {{ func() }} after")]);
        sandbox.tera.register_function(
            "func",
            |_: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
                Ok(tera::Value::from(123))
            },
        );

        let error = sandbox.render("template", &item(), &[]).unwrap_err();
        assert!(error.is_security_violation());
        assert!(error.to_string().contains("func"));
    }

    #[test]
    fn test_host_functions_are_rejected() {
        assert!(violation("{{ get_env(name=\"HOME\") }}").contains("get_env"));
        assert!(violation("{{ now() }}").contains("now"));
        assert!(violation("{% set r = get_random(end=10) %}{{ r }}").contains("get_random"));
    }

    #[test]
    fn test_private_names_are_rejected() {
        assert!(violation("{{ item.__class__ }}").contains("__class__"));
        assert!(violation("{{ item[\"_path\"] }}").contains("_path"));
        assert!(violation("{{ items | map(attribute=\"_x\") }}").contains("_x"));
    }

    #[test]
    fn test_quotes_in_comments_do_not_hide_calls() {
        let source = "{# \" #}{{ get_env(name=\"HOME\") }}{# \" #}";
        assert!(violation(source).contains("get_env"));

        let sandbox = sandbox(&[("template", source)]);
        let error = sandbox.render("template", &item(), &[]).unwrap_err();
        assert!(error.is_security_violation());
    }

    #[test]
    fn test_disallowed_filters_and_tests() {
        assert!(violation("{{ item.content | sha256 }}").contains("sha256"));
        assert!(violation("{% if item.title is shady %}x{% endif %}").contains("shady"));
        assert!(violation("{% filter shout %}x{% endfilter %}").contains("shout"));
        assert!(violation("{{ [1, now()] | length }}").contains("now"));
    }

    #[test]
    fn test_calling_values_does_not_parse() {
        for source in ["{{ item.title() }}", "{{ items[0]() }}"] {
            let mut sandbox = Sandbox::new();
            let loaded =
                sandbox.add_raw_templates(vec![("template".to_string(), source.to_string())]);
            assert!(loaded.is_err(), "{source:?} should not load");
            assert!(!sandbox.has_template("template"));
        }
    }

    #[test]
    fn test_grouping_and_macros_are_not_calls() {
        assert!(allowed("{% if not (item.title or item.author) %}x{% endif %}"));
        assert!(allowed("{% macro hello(name) %}hi{% endmacro hello %}"));
        assert!(allowed("{% block body %}{{ super() }}{% endblock body %}"));
        assert!(allowed("{{ item.title is not defined }}"));
        assert!(allowed("{# {{ get_env(name=\"HOME\") }} #}"));
        assert!(allowed("{% raw %}{{ get_env(name=\"HOME\") }}{% endraw %}"));
    }

    #[test]
    fn test_violation_in_included_template() {
        let sandbox = sandbox(&[
            ("page", "{% include \"partial\" %}"),
            ("partial", "{{ get_env(name=\"HOME\") }}"),
        ]);

        match sandbox.render("page", &item(), &[]) {
            Err(PluginError::SecurityViolation { template, .. }) => {
                assert_eq!(template, "partial")
            }
            other => panic!("expected a security violation, got {other:?}"),
        }
    }

    #[test]
    fn test_render_item() {
        assert_eq!(rendered("x {{ item.content }} y", &[]), "x abc y");
        assert_eq!(rendered("{{ item.title | upper }}", &[]), "FOO");
    }

    #[test]
    fn test_render_items() {
        let items = vec![
            Item::new("a.org").with_title("A"),
            Item::new("b.org").with_title("B"),
        ];
        let template = concat!(
            "{% for other in items %}{{ other.title }}",
            "{% if not loop.last %},{% endif %}{% endfor %}",
            " ({{ items | length }})"
        );
        let output = rendered(template, &items);
        assert_eq!(output, "A,B (2)");
    }

    #[test]
    fn test_allowed_constructs() {
        assert_eq!(rendered("{% for i in range(end=3) %}{{ i }}{% endfor %}", &[]), "012");
        assert_eq!(rendered("{% if item.title is defined %}ok{% endif %}", &[]), "ok");
        assert_eq!(rendered("{% filter upper %}abc{% endfilter %}", &[]), "ABC");
        assert_eq!(rendered("{# {{ func() }} #}done", &[]), "done");
        assert_eq!(rendered("{% raw %}{{ func() }}{% endraw %}", &[]), "{{ func() }}");
        assert_eq!(rendered("{{ \"(x)\" | default(value=\"y\") }}", &[]), "(x)");
        assert_eq!(rendered("<p>{{ \"<b>\" }}</p>", &[]), "<p><b></p>");
    }

    #[test]
    fn test_macros_render() {
        let sandbox = sandbox(&[
            ("macros", "{% macro hello(name) %}hi {{ name }}{% endmacro hello %}"),
            ("page", "{% import \"macros\" as m %}{{ m::hello(name=item.title) }}"),
        ]);
        assert_eq!(sandbox.render("page", &item(), &[]).unwrap(), "hi Foo");
    }

    #[test]
    fn test_from_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::write(
            dir.path().join("page.html"),
            "{% include \"partials/nav.html\" %}|{{ item.content }}",
        )
        .unwrap();
        fs::write(dir.path().join("partials/nav.html"), "nav").unwrap();

        let sandbox = Sandbox::from_dir(dir.path()).unwrap();
        assert!(sandbox.has_template("page.html"));
        assert!(sandbox.has_template("partials/nav.html"));
        assert!(!sandbox.has_template("missing.html"));
        assert_eq!(sandbox.render("page.html", &item(), &[]).unwrap(), "nav|abc");
    }
}
