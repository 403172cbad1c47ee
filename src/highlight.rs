use std::collections::HashSet;
use std::fmt::Write as _;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

const THEME: &str = "InspiredGitHub";

/// Wraps the bundled syntax definitions and renders snippet bodies as
/// line-numbered HTML. Loading the defaults is slow, so one instance lives
/// in `AppState` for the life of the process.
pub struct Highlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
}

/// One entry of the language registry, derived from a syntax definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub slug: String,
    pub lexer: String,
}

impl Highlighter {
    pub fn new() -> Self {
        let syntaxes = SyntaxSet::load_defaults_newlines();
        let theme = ThemeSet::load_defaults()
            .themes
            .get(THEME)
            .cloned()
            .unwrap_or_default();
        Self { syntaxes, theme }
    }

    /// Render `body` as highlighted HTML with one numbered row per line.
    /// Never fails: unresolvable lexers fall back to plain text and a line
    /// that the parser chokes on is emitted escaped.
    pub fn render(&self, body: &str, lexer: &str) -> String {
        let syntax = self.resolve(lexer);
        let mut lines = HighlightLines::new(syntax, &self.theme);
        let mut out = String::with_capacity(body.len() * 2);
        out.push_str("<pre class=\"highlight\"><code>");
        for (idx, line) in LinesWithEndings::from(body).enumerate() {
            let html = match lines.highlight_line(line, &self.syntaxes) {
                Ok(regions) => styled_line_to_highlighted_html(&regions, IncludeBackground::No)
                    .unwrap_or_else(|_| escape_html(line)),
                Err(_) => escape_html(line),
            };
            let _ = write!(
                out,
                "<span class=\"line\"><span class=\"lineno\">{}</span>{}</span>",
                idx + 1,
                html
            );
        }
        out.push_str("</code></pre>");
        out
    }

    fn resolve(&self, lexer: &str) -> &SyntaxReference {
        self.syntaxes
            .find_syntax_by_name(lexer)
            .or_else(|| self.syntaxes.find_syntax_by_token(lexer))
            .or_else(|| self.syntaxes.find_syntax_by_extension(lexer))
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text())
    }

    /// All visible syntaxes as registry entries, slug-deduplicated (first
    /// name wins) and sorted by name.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries: Vec<CatalogEntry> = Vec::new();
        for syntax in self.syntaxes.syntaxes() {
            if syntax.hidden {
                continue;
            }
            let slug = slugify(&syntax.name);
            if slug.is_empty() || !seen.insert(slug.clone()) {
                continue;
            }
            entries.push(CatalogEntry {
                name: syntax.name.clone(),
                slug,
                lexer: syntax.name.clone(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

/// URL slug for a syntax name. Names whose punctuation carries meaning get
/// explicit spellings; the rest collapse to lowercase-and-dashes.
fn slugify(name: &str) -> String {
    match name {
        "C++" => return "cpp".into(),
        "C#" => return "csharp".into(),
        "Objective-C++" => return "objective-cpp".into(),
        _ => {}
    }
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
