//! Import rewriting for flattened bundles.
//!
//! Every `import` line is rewritten so its path literal points at the flat
//! name of the file it referenced: `import {A} from "../lib/A.sol";` becomes
//! `import {A} from "./A.sol";`. The rewrite is line-oriented, so braced
//! imports spanning several lines are first collapsed onto one line with
//! [`collapse_multiline_imports`].
//!
//! The path literal is located by a small backward scanner starting at the
//! last `.sol` on the line: [`PATH_SEPARATORS`] split segments,
//! [`LITERAL_DELIMITERS`] end the literal.

use crate::disambiguate::NameAssignment;

/// Characters separating segments inside a path literal.
pub const PATH_SEPARATORS: &[char] = &['/', '\\'];

/// Characters marking the start of a path literal when scanning backward.
pub const LITERAL_DELIMITERS: &[char] = &['"', '\'', ' ', '\t'];

const IMPORT_KEYWORD: &str = "import";
const FROM_KEYWORD: &str = "from";
const SOURCE_EXTENSION: &str = ".sol";

/// What the backward scanner does with one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Part of the current segment.
    Take,
    /// Segment boundary; keep scanning.
    Split,
    /// Literal boundary; stop.
    Stop,
}

fn classify(c: char) -> Scan {
    if PATH_SEPARATORS.contains(&c) {
        Scan::Split
    } else if LITERAL_DELIMITERS.contains(&c) {
        Scan::Stop
    } else {
        Scan::Take
    }
}

/// Location and segments of the path literal on an import line.
#[derive(Debug, PartialEq, Eq)]
struct PathLiteral<'a> {
    /// Byte offset of the first character inside the literal.
    start: usize,
    /// Byte offset just past `.sol`.
    end: usize,
    /// Meaningful segments, without `.`, `..` or empty parts.
    segments: Vec<&'a str>,
}

fn scan_path_literal(line: &str) -> Option<PathLiteral<'_>> {
    let ext_pos = line.rfind(SOURCE_EXTENSION)?;
    let end = ext_pos + SOURCE_EXTENSION.len();
    let bytes = line.as_bytes();

    let mut segments = Vec::new();
    let mut segment_end = end;
    let mut i = ext_pos;
    let start = loop {
        // Running off column 0 means there was no opening delimiter.
        if i == 0 {
            return None;
        }
        i -= 1;
        // Delimiters are ASCII, so multi-byte characters always classify as Take.
        match classify(bytes[i] as char) {
            Scan::Take => {}
            Scan::Split => {
                segments.push(&line[i + 1..segment_end]);
                segment_end = i;
            }
            Scan::Stop => {
                segments.push(&line[i + 1..segment_end]);
                break i + 1;
            }
        }
    };

    segments.reverse();
    segments.retain(|s| !s.is_empty() && *s != "." && *s != "..");
    if segments.is_empty() {
        return None;
    }
    Some(PathLiteral {
        start,
        end,
        segments,
    })
}

/// Whether the line, after leading whitespace, starts with the `import` keyword.
pub fn is_import_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix(IMPORT_KEYWORD) {
        Some(rest) => rest
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '{' | '*')),
        None => false,
    }
}

fn target_name<'a>(segments: &[&'a str], assignment: Option<&'a NameAssignment>) -> &'a str {
    let own = segments[segments.len() - 1];
    let Some(assignment) = assignment else {
        return own;
    };
    // Already-flat references stay put so rewriting is idempotent.
    if segments.len() == 1 && assignment.has_flat_name(own) {
        return own;
    }
    assignment.resolve(segments).unwrap_or(own)
}

/// Rewrite one import line, or `None` if it has no usable path literal.
pub fn rewrite_import_line(line: &str, assignment: Option<&NameAssignment>) -> Option<String> {
    let literal = scan_path_literal(line)?;
    let name = target_name(&literal.segments, assignment);
    Some(format!(
        "{}./{}{}",
        &line[..literal.start],
        name,
        &line[literal.end..]
    ))
}

/// Rewrite every import line of `source` to reference flat names.
///
/// Without an assignment, each import keeps only its own last path segment.
/// Non-import lines, and import lines without a recognizable `.sol` literal,
/// are copied unchanged. Line breaks are preserved exactly.
pub fn rewrite_imports(source: &str, assignment: Option<&NameAssignment>) -> String {
    source
        .split('\n')
        .map(|line| {
            if is_import_line(line) {
                rewrite_import_line(line, assignment).unwrap_or_else(|| line.to_string())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Collapse `import { ... } from` statements spanning several lines onto one.
///
/// Line breaks between the keyword and the start of the path literal become
/// spaces. Anything not shaped like a braced import is left as is.
pub fn collapse_multiline_imports(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut copied = 0;
    let mut search_from = 0;

    while let Some(rel) = source[search_from..].find(IMPORT_KEYWORD) {
        let keyword = search_from + rel;
        let after_keyword = keyword + IMPORT_KEYWORD.len();
        search_from = after_keyword;

        if keyword > 0 && is_ident_byte(bytes[keyword - 1]) {
            continue;
        }
        let open = skip_whitespace(bytes, after_keyword);
        if bytes.get(open) != Some(&b'{') {
            continue;
        }
        let Some(close) = source[open..].find('}').map(|r| open + r) else {
            break;
        };
        let from = skip_whitespace(bytes, close + 1);
        if !source[from..].starts_with(FROM_KEYWORD) {
            continue;
        }
        let end = skip_whitespace(bytes, from + FROM_KEYWORD.len());

        out.push_str(&source[copied..after_keyword]);
        out.extend(
            source[after_keyword..end]
                .chars()
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c }),
        );
        copied = end;
        search_from = end;
    }

    out.push_str(&source[copied..]);
    out
}
