//! Text utilities for C# declarations
//!
//! Delimiter matching, top-level splitting and comment stripping all skip
//! over string and character literals. Scanning is byte-based: every
//! delimiter is ASCII, so multi-byte characters never match by accident.

/// Contextual and reserved words that need an `@` prefix as identifiers
const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

pub fn is_keyword(word: &str) -> bool {
    CSHARP_KEYWORDS.contains(&word)
}

/// If a string or char literal starts at `i`, return the index just past it
fn skip_literal(bytes: &[u8], i: usize) -> Option<usize> {
    let len = bytes.len();
    let mut start = i;
    let mut verbatim = false;
    // Prefixes: @"..", $"..", $@"..", @$".."
    while start < len && (bytes[start] == b'@' || bytes[start] == b'$') {
        verbatim |= bytes[start] == b'@';
        start += 1;
    }
    if start >= len {
        return None;
    }
    let quote = bytes[start];
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    if start != i && quote == b'\'' {
        return None;
    }

    let mut j = start + 1;
    while j < len {
        let b = bytes[j];
        if verbatim {
            if b == b'"' {
                if j + 1 < len && bytes[j + 1] == b'"' {
                    j += 2;
                    continue;
                }
                return Some(j + 1);
            }
        } else if b == b'\\' {
            j += 2;
            continue;
        } else if b == quote {
            return Some(j + 1);
        } else if b == b'\n' {
            // Unterminated literal; stop at end of line
            return Some(j);
        }
        j += 1;
    }
    Some(len)
}

/// Find the position of the matching closing delimiter
///
/// `text` starts just after the opening delimiter; the returned index is the
/// closer at depth 0. Nested `()`, `[]` and `{}` are tracked, and `<>` too
/// when `open` is `<`.
pub fn find_closing(text: &str, open: u8, close: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let angles = open == b'<';
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_literal(bytes, i) {
            i = next;
            continue;
        }
        let b = bytes[i];
        if b == close && depth == 0 {
            return Some(i);
        }
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'<' if angles => depth += 1,
            b'>' if angles => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return None;
        }
        i += 1;
    }
    None
}

/// Find the position of matching closing paren
pub fn find_matching_paren(text: &str) -> Option<usize> {
    find_closing(text, b'(', b')')
}

/// Index of the first `needle` at depth 0, outside literals
pub fn find_top_level(text: &str, needle: u8, angles: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_literal(bytes, i) {
            i = next;
            continue;
        }
        let b = bytes[i];
        if b == needle && depth == 0 {
            return Some(i);
        }
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'<' if angles => depth += 1,
            b'>' if angles => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on `separator` at depth 0, trimming pieces and dropping empty ones
pub fn split_top_level(text: &str, separator: u8, angles: bool) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_literal(bytes, i) {
            i = next;
            continue;
        }
        let b = bytes[i];
        if b == separator && depth == 0 {
            parts.push(&text[start..i]);
            start = i + 1;
        } else {
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'<' if angles => depth += 1,
                b'>' if angles => depth -= 1,
                _ => {}
            }
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split on whitespace at depth 0 (generic arguments and tuples stay whole)
pub fn split_words(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut words = Vec::new();
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_literal(bytes, i) {
            start.get_or_insert(i);
            i = next;
            continue;
        }
        let b = bytes[i];
        match b {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' | b'>' => depth -= 1,
            _ => {}
        }
        if b.is_ascii_whitespace() && depth <= 0 {
            if let Some(s) = start.take() {
                words.push(&text[s..i]);
            }
        } else {
            start.get_or_insert(i);
        }
        i += 1;
    }
    if let Some(s) = start {
        words.push(&text[s..]);
    }
    words
}

/// Replace comments with spaces, keeping newlines so line numbers survive
pub fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut copied = 0;
    while i < bytes.len() {
        if let Some(next) = skip_literal(bytes, i) {
            i = next;
            continue;
        }
        if bytes[i] == b'/' && i + 1 < bytes.len() {
            let end = match bytes[i + 1] {
                b'/' => text[i..].find('\n').map_or(bytes.len(), |n| i + n),
                b'*' => text[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2),
                _ => {
                    i += 1;
                    continue;
                }
            };
            out.push_str(&text[copied..i]);
            for ch in text[i..end].chars() {
                out.push(if ch == '\n' { '\n' } else { ' ' });
            }
            copied = end;
            i = end;
            continue;
        }
        i += 1;
    }
    out.push_str(&text[copied..]);
    out
}

pub fn is_identifier(text: &str) -> bool {
    let text = text.strip_prefix('@').unwrap_or(text);
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Turn an arbitrary symbol into a usable C# identifier
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c == '_' || c.is_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if is_keyword(&out) {
        out.insert(0, '@');
    }
    out
}

/// `___Foo` with marker `___` -> `Foo`
pub fn split_marker<'a>(name: &'a str, marker: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(marker)?;
    let starts_ok = rest.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_');
    (starts_ok && is_identifier(rest)).then_some(rest)
}

/// 1-based line of byte `offset` in `text`
pub fn line_of(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use crate::naming::*;

    #[test]
    fn test_find_matching_paren() {
        assert_eq!(find_matching_paren("abc)"), Some(3));
        assert_eq!(find_matching_paren("(inner))"), Some(7));
        assert_eq!(find_matching_paren("a, b, (c, d))"), Some(12));
        assert_eq!(find_matching_paren("s = \")\")"), Some(7));
        assert_eq!(find_matching_paren("c = ')')"), Some(7));
        assert_eq!(find_matching_paren("no close paren"), None);
    }

    #[test]
    fn test_find_closing_angles() {
        assert_eq!(find_closing("Dictionary<int, string>>", b'<', b'>'), Some(23));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("int a, Dictionary<int, string> b, string c = \"x, y\"", b',', true),
            vec!["int a", "Dictionary<int, string> b", "string c = \"x, y\""]
        );
        assert_eq!(split_top_level("  ", b',', false), Vec::<&str>::new());
    }

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words("public static  Dictionary<int, string> Map"),
            vec!["public", "static", "Dictionary<int, string>", "Map"]
        );
    }

    #[test]
    fn test_strip_comments() {
        let text = "int a, // first\n/* block\n */ string b = \"// not a comment\"";
        let stripped = strip_comments(text);
        assert_eq!(stripped.lines().count(), 3);
        assert!(!stripped.contains("first"));
        assert!(!stripped.contains("block"));
        assert!(stripped.contains("\"// not a comment\""));
    }

    #[test]
    fn test_verbatim_strings() {
        assert_eq!(find_matching_paren("@\"a\"\")\")"), Some(7));
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("my-func"), "my_func");
        assert_eq!(sanitize_identifier("2d"), "_2d");
        assert_eq!(sanitize_identifier("string"), "@string");
        assert_eq!(sanitize_identifier("Combine"), "Combine");
    }

    #[test]
    fn test_split_marker() {
        assert_eq!(split_marker("___Foo", "___"), Some("Foo"));
        assert_eq!(split_marker("___", "___"), None);
        assert_eq!(split_marker("Foo", "___"), None);
        assert_eq!(split_marker("___1Foo", "___"), None);
    }

    #[test]
    fn test_line_of() {
        let text = "a\nb\nc";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, 2), 2);
        assert_eq!(line_of(text, 4), 3);
    }
}
