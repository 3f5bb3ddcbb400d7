//! Pure text edits behind `files.edit_file`.
//!
//! Three ways to pick what gets replaced:
//!
//! - [`EditTarget::Markers`] -- everything between a start and end marker
//!   (the markers themselves are kept).
//! - [`EditTarget::Keyword`] -- a whole `def`/`class` block named by the
//!   keyword, decorators included; failing that, any line consisting of
//!   exactly the keyword.
//! - [`EditTarget::WholeFile`] -- the entire content.
//!
//! Nothing here touches the filesystem.

use regex::{NoExpand, Regex};

/// Diff lines shown before the preview is cut off.
pub const DIFF_PREVIEW_LINES: usize = 20;

/// What part of a file an edit replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    Markers { start: String, end: String },
    Keyword(String),
    WholeFile,
}

impl EditTarget {
    /// Short label for logs and tool output.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Markers { .. } => "markers",
            Self::Keyword(_) => "keyword",
            Self::WholeFile => "whole_file",
        }
    }
}

/// Apply `new_content` to `before`.  Returns `None` when the target does
/// not occur in the text.
pub fn apply_edit(before: &str, target: &EditTarget, new_content: &str) -> Option<String> {
    match target {
        EditTarget::Markers { start, end } => replace_between(before, start, end, new_content),
        EditTarget::Keyword(keyword) => replace_block(before, keyword, new_content)
            .or_else(|| replace_line(before, keyword, new_content)),
        EditTarget::WholeFile => Some(format!("{}\n", new_content.trim_end())),
    }
}

fn replace_between(before: &str, start: &str, end: &str, new_content: &str) -> Option<String> {
    let re = Regex::new(&format!(
        "(?s){}(.*?){}",
        regex::escape(start),
        regex::escape(end)
    ))
    .ok()?;
    if !re.is_match(before) {
        return None;
    }
    let replacement = format!("{start}\n{}\n{end}", new_content.trim_end());
    Some(re.replace_all(before, NoExpand(&replacement)).into_owned())
}

/// Name of the block a keyword refers to: `"def load(x)"` names `load`.
fn block_name(keyword: &str) -> &str {
    let mut name = keyword.trim();
    for prefix in ["async ", "def ", "class "] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest.trim_start();
        }
    }
    name.split(['(', ':']).next().unwrap_or_default().trim()
}

fn leading_ws(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

fn replace_block(before: &str, keyword: &str, new_content: &str) -> Option<String> {
    let name = block_name(keyword);
    if name.is_empty() {
        return None;
    }
    let header = Regex::new(&format!(
        r"^([ \t]*)(?:async[ \t]+)?(?:def|class)[ \t]+{}\b",
        regex::escape(name)
    ))
    .ok()?;

    let lines: Vec<&str> = before.split_inclusive('\n').collect();
    let header_idx = lines.iter().position(|l| header.is_match(l))?;
    let base_indent = leading_ws(lines[header_idx]);

    // Decorators directly above the header belong to the block.
    let mut start = header_idx;
    while start > 0 && lines[start - 1].trim_start().starts_with('@') {
        start -= 1;
    }

    // The block ends at the first non-blank line indented no deeper than
    // the header.  Blank lines before that stay outside the block.
    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(header_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if leading_ws(line).len() <= base_indent.len() {
            end = i;
            break;
        }
    }
    while end > header_idx + 1 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }

    let mut out = String::with_capacity(before.len() + new_content.len());
    lines[..start].iter().for_each(|l| out.push_str(l));
    out.push_str(&reindent(new_content, base_indent));
    lines[end..].iter().for_each(|l| out.push_str(l));
    Some(out)
}

fn replace_line(before: &str, keyword: &str, new_content: &str) -> Option<String> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }
    let re = Regex::new(&format!(r"(?m)^[ \t]*{}[ \t]*$", regex::escape(keyword))).ok()?;
    if !re.is_match(before) {
        return None;
    }
    Some(re.replace_all(before, NoExpand(new_content)).into_owned())
}

/// Strip the common indentation of `content` and indent it by `base`
/// instead.  Relative indentation inside the block is preserved.
pub fn reindent(content: &str, base: &str) -> String {
    let lines: Vec<&str> = content.trim_matches('\n').lines().collect();
    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading_ws(l).len())
        .min()
        .unwrap_or(0);

    let mut out = String::new();
    for line in lines {
        if !line.trim().is_empty() {
            out.push_str(base);
            out.push_str(line[common..].trim_end());
        }
        out.push('\n');
    }
    out
}

/// Changed lines between two texts, `-` for removed and `+` for added,
/// cut off after `max_lines`.
pub fn diff_preview(before: &str, after: &str, max_lines: usize) -> String {
    let mut changed = Vec::new();
    // A trailing newline would otherwise show up as an extra empty line.
    let (before, after) = (before.trim_end_matches('\n'), after.trim_end_matches('\n'));
    for result in diff::lines(before, after) {
        match result {
            diff::Result::Left(line) => changed.push(format!("-{line}")),
            diff::Result::Right(line) => changed.push(format!("+{line}")),
            diff::Result::Both(..) => {}
        }
    }
    let total = changed.len();
    changed.truncate(max_lines);
    if total > max_lines {
        changed.push(format!("... diff truncated ({total} changed lines)"));
    }
    changed.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
import os

@cache
@log
def load(path):
    with open(path) as f:
        return f.read()


class Store:
    def get(self, key):
        return self.data[key]

    def put(self, key, value):
        self.data[key] = value

MAX = 10
";

    fn keyword(k: &str) -> EditTarget {
        EditTarget::Keyword(k.into())
    }

    #[test]
    fn block_name_strips_signature() {
        assert_eq!(block_name("load"), "load");
        assert_eq!(block_name("def load(path):"), "load");
        assert_eq!(block_name("async def fetch(url)"), "fetch");
        assert_eq!(block_name("class Store:"), "Store");
    }

    #[test]
    fn keyword_replaces_function_with_decorators() {
        let after = apply_edit(
            SOURCE,
            &keyword("load"),
            "def load(path):\n    return open(path).read()\n",
        )
        .unwrap();
        assert!(!after.contains("@cache"));
        assert!(!after.contains("with open"));
        assert!(after.contains("import os\n\ndef load(path):\n    return open(path).read()\n\n\nclass Store:"));
    }

    #[test]
    fn keyword_replaces_nested_method_with_class_indent() {
        let after = apply_edit(
            SOURCE,
            &keyword("get"),
            "def get(self, key, default=None):\n    return self.data.get(key, default)",
        )
        .unwrap();
        assert!(after.contains(
            "    def get(self, key, default=None):\n        return self.data.get(key, default)\n\n    def put"
        ));
        assert!(!after.contains("return self.data[key]\n"));
        assert!(after.contains("self.data[key] = value"));
    }

    #[test]
    fn keyword_class_block_spans_methods() {
        let after = apply_edit(SOURCE, &keyword("Store"), "class Store:\n    pass").unwrap();
        assert!(after.contains("class Store:\n    pass\n\nMAX = 10\n"));
        assert!(!after.contains("def put"));
    }

    #[test]
    fn keyword_falls_back_to_whole_line() {
        let after = apply_edit(SOURCE, &keyword("MAX = 10"), "MAX = 20").unwrap();
        assert!(after.ends_with("MAX = 20\n"));
    }

    #[test]
    fn keyword_without_match_is_none() {
        assert!(apply_edit(SOURCE, &keyword("missing"), "x").is_none());
    }

    #[test]
    fn markers_keep_markers() {
        let before = "a\n# BEGIN\nold\n# END\nb\n";
        let target = EditTarget::Markers {
            start: "# BEGIN".into(),
            end: "# END".into(),
        };
        let after = apply_edit(before, &target, "new $1 text\n").unwrap();
        assert_eq!(after, "a\n# BEGIN\nnew $1 text\n# END\nb\n");
    }

    #[test]
    fn markers_missing_is_none() {
        let target = EditTarget::Markers {
            start: "<<".into(),
            end: ">>".into(),
        };
        assert!(apply_edit("nothing here", &target, "x").is_none());
    }

    #[test]
    fn whole_file_normalises_trailing_newline() {
        assert_eq!(
            apply_edit("old", &EditTarget::WholeFile, "new\n\n\n").unwrap(),
            "new\n"
        );
    }

    #[test]
    fn reindent_preserves_relative_indent() {
        let out = reindent("    if x:\n        y()\n\n    z()", "  ");
        assert_eq!(out, "  if x:\n      y()\n\n  z()\n");
    }

    #[test]
    fn diff_preview_lists_changes_only() {
        let preview = diff_preview("a\nb\nc\n", "a\nB\nc\n", 20);
        assert_eq!(preview, "-b\n+B");
    }

    #[test]
    fn diff_preview_truncates() {
        let before: String = (0..30).map(|i| format!("{i}\n")).collect();
        let preview = diff_preview(&before, "", 5);
        assert_eq!(preview.lines().count(), 6);
        assert!(preview.ends_with("... diff truncated (30 changed lines)"));
    }

    #[test]
    fn clearing_a_file_lists_only_real_lines() {
        let preview = diff_preview("a\nb\n", "", 20);
        assert_eq!(preview, "-a\n-b");
        assert!(!preview.lines().any(|l| l == "-" || l == "+"));
        assert_eq!(diff_preview("a\n", "a", 20), "");
    }
}
