//! Document metadata and text normalisation.
//!
//! Metadata comes from conventional Markdown lines rather than front-matter:
//!
//! | Field    | Source                                             |
//! |----------|----------------------------------------------------|
//! | title    | first `# Heading` (default `Document`)             |
//! | author   | a `**Author**: Name` line                          |
//! | email    | a `**Email**: addr` line                           |
//! | abstract | text after `## Abstract` up to the next heading    |
//!
//! Only prose is searched: a `# comment` inside a shell code block is never
//! mistaken for the title, and list normalisation never rewrites code.

use crate::output::{DocumentMetadata, DEFAULT_TITLE};
use crate::pipeline::fence;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ ]{0,3}#[ \t]+(.+)$").unwrap());

static RE_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\*\*Author(?:\*\*:|:\*\*)[ \t]*(.*?)[ \t]*\r?$\n?").unwrap()
});

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\*\*E-?mail(?:\*\*:|:\*\*)[ \t]*(.*?)[ \t]*\r?$\n?").unwrap()
});

static RE_ABSTRACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^##[ \t]*Abstract[ \t]*\r?\n+([^#]+)").unwrap());

static RE_LIST_AFTER_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":[ \t]+(\d+\.[ \t]+)").unwrap());

static RE_LIST_INLINE_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\s\d])[ \t]+(\d+\.[ \t]+)").unwrap());

/// Metadata plus the body text that should be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub metadata: DocumentMetadata,
    pub body: String,
}

/// Pull metadata out of `text`.
///
/// With `strip_lines`, the first `**Author**:` and `**Email**:` lines are
/// blanked in the returned body so they are not printed twice. The line
/// breaks stay, so line numbers in the body still match the source.
pub fn extract(text: &str, strip_lines: bool) -> Extracted {
    let scanned = fence::scan(text);

    let mut title = None;
    let mut author = None;
    let mut email = None;
    let mut abstract_text = None;
    let mut word_count = 0;

    for prose in scanned.prose() {
        word_count += prose.split_whitespace().count();
        if title.is_none() {
            title = RE_TITLE
                .captures(prose)
                .map(|c| clean_heading(&c[1]))
                .filter(|t| !t.is_empty());
        }
        if author.is_none() {
            author = capture_value(&RE_AUTHOR, prose);
        }
        if email.is_none() {
            email = capture_value(&RE_EMAIL, prose);
        }
        if abstract_text.is_none() {
            abstract_text = RE_ABSTRACT
                .captures(prose)
                .map(|c| c[1].trim().to_string())
                .filter(|a| !a.is_empty());
        }
    }

    let body = if strip_lines && (author.is_some() || email.is_some()) {
        strip_first_matches(text)
    } else {
        text.to_string()
    };

    Extracted {
        metadata: DocumentMetadata {
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            author,
            email,
            abstract_text,
            diagram_count: scanned.diagram_count(),
            word_count,
        },
        body,
    }
}

/// Put inline numbered lists on their own lines.
///
/// `"Steps: 1. Install 2. Run"` becomes `"Steps:\n\n1. Install\n2. Run"`.
/// Fenced blocks are left alone.
pub fn normalize_lists(text: &str) -> String {
    fence::rewrite_prose(text, |prose| {
        let s = RE_LIST_AFTER_COLON.replace_all(prose, ":\n\n$1");
        RE_LIST_INLINE_ITEM.replace_all(&s, "$1\n$2").into_owned()
    })
}

fn capture_value(re: &Regex, prose: &str) -> Option<String> {
    re.captures(prose)
        .map(|c| c[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Strip an ATX closing sequence (`# Title ##`) and surrounding whitespace.
fn clean_heading(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_hashes = trimmed.trim_end_matches('#');
    if without_hashes.len() != trimmed.len()
        && (without_hashes.is_empty() || without_hashes.ends_with([' ', '\t']))
    {
        without_hashes.trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

fn strip_first_matches(text: &str) -> String {
    let mut author_done = false;
    let mut email_done = false;
    fence::rewrite_prose(text, |prose| {
        let mut s = prose.to_string();
        if !author_done && RE_AUTHOR.is_match(&s) {
            s = RE_AUTHOR.replace(&s, keep_line_break).into_owned();
            author_done = true;
        }
        if !email_done && RE_EMAIL.is_match(&s) {
            s = RE_EMAIL.replace(&s, keep_line_break).into_owned();
            email_done = true;
        }
        s
    })
}

fn keep_line_break(caps: &Captures<'_>) -> String {
    if caps[0].ends_with('\n') {
        "\n".to_string()
    } else {
        String::new()
    }
}
