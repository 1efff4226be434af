use std::{path::Path, sync::LazyLock};

use indexmap::IndexSet;
use regex::Regex;

pub const IDENT: &str = r"[A-Z0-9][A-Z0-9\-]*";

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i){IDENT}")).expect("valid identifier regex"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[A-Z0-9$#@\-]+").expect("valid token regex"));

static PROGRAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9$#@]+").expect("valid program regex"));

/// Uppercases and removes every whitespace character.
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Keeps only the first identifier-shaped substring of `value`, uppercased.
///
/// `LONCTX FILE STATUS IS WS-STAT` becomes `LONCTX`; an input with no
/// identifier characters becomes the empty string.
pub fn sanitize_token(value: &str) -> String {
    TOKEN_RE
        .find(value)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default()
}

/// Every identifier referenced in `text`, uppercased, in first-seen order.
/// Pure numeric literals are not identifiers.
pub fn identifiers_in(text: &str) -> IndexSet<String> {
    IDENT_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('-').to_uppercase())
        .filter(|ident| !ident.is_empty() && !ident.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// Program name inferred from a source file name: its leading
/// identifier-shaped prefix (`ACCTUPD.cbl` -> `ACCTUPD`).
pub fn program_name_from_file(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let base = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| path.to_uppercase());
    PROGRAM_RE
        .find(&base)
        .map(|m| m.as_str().to_owned())
        .unwrap_or(base)
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn join_list<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_first_token() {
        assert_eq!(sanitize_token("lonctx file status is ws-stat"), "LONCTX");
        assert_eq!(sanitize_token("  'ACCTDD'."), "ACCTDD");
        assert_eq!(sanitize_token("..."), "");
    }

    #[test]
    fn identifiers_skip_numbers() {
        let ids = identifiers_in("WS-TOTAL + ws-fee * 100 - 2.5");
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["WS-TOTAL".to_owned(), "WS-FEE".to_owned()]
        );
    }

    #[test]
    fn program_name_is_leading_prefix() {
        assert_eq!(program_name_from_file("src/cobol/acctupd.v2.cbl"), "ACCTUPD");
        assert_eq!(program_name_from_file(""), "");
    }

    #[test]
    fn list_round_trip() {
        let items = split_list(" A ; ;B;");
        assert_eq!(items, vec!["A".to_owned(), "B".to_owned()]);
        assert_eq!(join_list(&items), "A;B");
    }
}
