//! Text builder used by every emission step
//!
//! Code fragments are usually built with `quote!` and appended as token
//! streams; hand written lines, comments and custom snippets go through the
//! indentation aware line API. The final source is parsed with `syn` and
//! printed with `prettyplease`, which also validates the emitted code.

use proc_macro2::{TokenStream, TokenTree};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

/// First line of every generated file
pub const GENERATED_HEADER: &str = "// Code generated by dmlgen. DO NOT EDIT.";

const INDENT: &str = "  ";

/// The generated source did not parse
///
/// Carries the unformatted source so that the offending emission can be
/// inspected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("formatting generated code failed: {message}")]
pub struct FormatError {
    /// Parser message
    pub message: String,
    /// The source handed to the formatter
    pub source_code: String,
}

/// Indentation aware source builder
#[derive(Debug, Default, Clone)]
pub struct Emitter {
    buf: String,
    level: usize,
}

impl Emitter {
    /// Create an empty emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one line at the current indentation
    pub fn pln(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if !line.is_empty() {
            for _ in 0..self.level {
                self.buf.push_str(INDENT);
            }
            self.buf.push_str(line);
        }
        self.buf.push('\n');
    }

    /// Increase the indentation
    pub fn indent(&mut self) {
        self.level += 1;
    }

    /// Decrease the indentation
    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Write `text` as `///` doc comment wrapped at 80 columns
    pub fn doc(&mut self, text: &str) {
        self.comment("///", text);
    }

    /// Write `text` as `//!` module doc wrapped at 80 columns
    pub fn module_doc(&mut self, text: &str) {
        self.comment("//!", text);
    }

    fn comment(&mut self, prefix: &str, text: &str) {
        let width = 76usize.saturating_sub(self.level * INDENT.len()).max(20);
        for line in wrap_comment(text, width) {
            if line.is_empty() {
                self.pln(prefix);
            } else {
                self.pln(format!("{} {}", prefix, line));
            }
        }
    }

    /// Append a token stream as one item
    pub fn tokens(&mut self, ts: TokenStream) {
        if ts.is_empty() {
            return;
        }
        let _ = writeln!(self.buf, "{}", ts);
    }

    /// Append code verbatim, e.g. a custom snippet
    pub fn raw(&mut self, code: &str) {
        self.buf.push_str(code);
        if !code.ends_with('\n') {
            self.buf.push('\n');
        }
    }

    /// A `pub const` block, one constant per entry
    pub fn const_block<'a>(
        &mut self,
        doc: &str,
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let mut wrote_doc = false;
        for (name, value) in entries {
            if !wrote_doc {
                self.doc(doc);
                wrote_doc = true;
            }
            self.pln(format!("pub const {}: &str = {:?};", name, value));
        }
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The source written so far
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Consume the emitter returning the raw source
    pub fn finish(self) -> String {
        self.buf
    }
}

/// Wrap `text` into lines of at most `width` characters
///
/// Existing line breaks are kept, words longer than `width` get a line of
/// their own.
pub fn wrap_comment(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// An import emitted only when its identifier is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Import {
    /// Identifier searched in the body
    pub ident: &'static str,
    /// Full path of the `use` statement
    pub path: &'static str,
}

impl Import {
    const fn new(ident: &'static str, path: &'static str) -> Self {
        Import { ident, path }
    }
}

/// Imports the generated code may need
pub const CANDIDATE_IMPORTS: &[Import] = &[
    Import::new("HashSet", "std::collections::HashSet"),
    Import::new("ColumnMap", "dml::ColumnMap"),
    Import::new("ColumnMapMode", "dml::ColumnMapMode"),
    Import::new("ColumnMapper", "dml::ColumnMapper"),
    Import::new("Serialize", "serde::Serialize"),
    Import::new("Deserialize", "serde::Deserialize"),
    Import::new("Decimal", "rust_decimal::Decimal"),
    Import::new("NaiveDate", "chrono::NaiveDate"),
    Import::new("NaiveDateTime", "chrono::NaiveDateTime"),
    Import::new("NaiveTime", "chrono::NaiveTime"),
];

/// Identifiers appearing anywhere in `source`, doc comments excluded
///
/// Returns an empty set when the source does not lex, formatting reports
/// that error later.
pub fn referenced_idents(source: &str) -> BTreeSet<String> {
    fn walk(ts: TokenStream, out: &mut BTreeSet<String>) {
        for tt in ts {
            match tt {
                TokenTree::Ident(i) => {
                    out.insert(i.to_string());
                }
                TokenTree::Group(g) => walk(g.stream(), out),
                TokenTree::Punct(_) | TokenTree::Literal(_) => {}
            }
        }
    }
    let mut out = BTreeSet::new();
    if let Ok(ts) = TokenStream::from_str(source) {
        walk(ts, &mut out);
    }
    out
}

/// `use` lines for the candidates referenced by `body`, sorted by path
pub fn imports_for(body: &str, candidates: &[Import]) -> Vec<String> {
    let idents = referenced_idents(body);
    let mut paths: Vec<&str> = candidates
        .iter()
        .filter(|imp| idents.contains(imp.ident))
        .map(|imp| imp.path)
        .collect();
    paths.sort_unstable();
    paths.dedup();
    paths.into_iter().map(|p| format!("use {};", p)).collect()
}

/// Parse and pretty print generated source
pub fn format_source(source: String) -> Result<String, FormatError> {
    match syn::parse_file(&source) {
        Ok(file) => Ok(prettyplease::unparse(&file)),
        Err(e) => Err(FormatError {
            message: e.to_string(),
            source_code: source,
        }),
    }
}

/// Prefix formatted source with the generated header and build tag lines
pub fn with_header(formatted: &str, build_tags: &[String]) -> String {
    let mut out = String::with_capacity(formatted.len() + 128);
    out.push_str(GENERATED_HEADER);
    out.push('\n');
    for tag in build_tags {
        out.push_str(tag);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(formatted);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quote::quote;

    #[test]
    fn test_lines_and_indentation() {
        let mut e = Emitter::new();
        e.pln("message A {");
        e.indent();
        e.pln("uint32 id = 1;");
        e.pln("");
        e.dedent();
        e.dedent();
        e.pln("}");
        assert_eq!(e.finish(), "message A {\n  uint32 id = 1;\n\n}\n");
    }

    #[test]
    fn test_wrap_comment() {
        let lines = wrap_comment("one two three four five six", 9);
        assert_eq!(lines, vec!["one two", "three", "four five", "six"]);
        assert_eq!(wrap_comment("a\n\nb", 80), vec!["a", "", "b"]);
        assert_eq!(wrap_comment("", 80), vec![""]);
        assert_eq!(wrap_comment("averyveryverylongword x", 5), vec!["averyveryverylongword", "x"]);
    }

    #[test]
    fn test_doc_comment() {
        let mut e = Emitter::new();
        e.doc("CoreConfigData represents a single row.\nSecond line.");
        assert_eq!(
            e.as_str(),
            "/// CoreConfigData represents a single row.\n/// Second line.\n"
        );
    }

    #[test]
    fn test_const_block() {
        let mut e = Emitter::new();
        e.const_block("Table names", [("TABLE_NAME_A", "a"), ("TABLE_NAME_B", "b")]);
        assert_eq!(
            e.as_str(),
            "/// Table names\npub const TABLE_NAME_A: &str = \"a\";\npub const TABLE_NAME_B: &str = \"b\";\n"
        );
        let mut empty = Emitter::new();
        empty.const_block("nothing", std::iter::empty());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_imports_only_for_used_idents() {
        let body = quote! {
            /// HashSet in a comment does not count
            pub struct A { pub d: Option<Decimal>, pub t: NaiveDateTime }
            impl ColumnMapper for A {}
        }
        .to_string();
        assert_eq!(
            imports_for(&body, CANDIDATE_IMPORTS),
            vec![
                "use chrono::NaiveDateTime;",
                "use dml::ColumnMapper;",
                "use rust_decimal::Decimal;",
            ]
        );
    }

    #[test]
    fn test_format_source() {
        let mut e = Emitter::new();
        e.tokens(quote! { pub struct A { pub id: u32 } });
        let out = format_source(e.finish()).unwrap();
        assert_eq!(out, "pub struct A {\n    pub id: u32,\n}\n");
    }

    #[test]
    fn test_format_error_keeps_source() {
        let err = format_source("pub struct A {".to_string()).unwrap_err();
        assert_eq!(err.source_code, "pub struct A {");
        assert!(err.to_string().starts_with("formatting generated code failed"));
    }

    #[test]
    fn test_header() {
        let out = with_header("pub struct A;\n", &["#![cfg(feature = \"db\")]".to_string()]);
        assert_eq!(
            out,
            "// Code generated by dmlgen. DO NOT EDIT.\n#![cfg(feature = \"db\")]\n\npub struct A;\n"
        );
    }
}
