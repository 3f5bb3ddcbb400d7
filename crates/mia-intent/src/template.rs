//! Shell action templates.
//!
//! Templates are minijinja strings such as `mkdir -p {{ path | quote }}`.
//! Undefined variables render as empty strings; the catalog rejects
//! templates that reference undeclared parameters at load time and the
//! dispatcher checks required parameters before rendering, so that
//! leniency only ever applies to optional parameters without a default.

use std::collections::{BTreeMap, BTreeSet};

use minijinja::{Environment, Value};

/// Characters that never need quoting in a POSIX shell word.
fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote `value` as a single shell word.
///
/// A leading `~/` stays outside the quotes so the shell still expands it.
pub fn shell_quote(value: &str) -> String {
    if value == "~" {
        return value.to_owned();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return format!("~/{}", quote_word(rest));
    }
    quote_word(value)
}

fn quote_word(value: &str) -> String {
    if value.is_empty() {
        return "''".to_owned();
    }
    if value.chars().all(is_shell_safe) {
        return value.to_owned();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_filter(value: Value) -> String {
    shell_quote(&value.to_string())
}

/// Compiles and renders shell templates.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("quote", quote_filter);
        Self { env }
    }

    /// Compile `source` and return the top-level variables it reads.
    pub fn variables(&self, source: &str) -> Result<BTreeSet<String>, minijinja::Error> {
        let template = self.env.template_from_str(source)?;
        Ok(template.undeclared_variables(false).into_iter().collect())
    }

    /// Render `source` with `params` as the context.
    pub fn render(
        &self,
        source: &str,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<String, minijinja::Error> {
        let template = self.env.template_from_str(source)?;
        let rendered = template.render(params)?;
        Ok(rendered.trim().to_owned())
    }
}
