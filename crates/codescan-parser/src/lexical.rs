// ABOUTME: Lexical helpers shared by the analyzers and line rules.
// ABOUTME: Masks comments and string bodies, and infers block extents by braces or indentation.
use codescan_core::Language;
use regex::{Captures, Match, Regex};
use tracing::warn;

/// Signatures spread over more lines than this are not followed.
const MAX_SIGNATURE_LINES: usize = 12;

/// A built-in regex. An invalid pattern is logged and never matches.
#[derive(Debug, Clone)]
pub struct Pattern(Option<Regex>);

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => Pattern(Some(re)),
            Err(e) => {
                warn!("invalid built-in pattern {}: {}", pattern, e);
                Pattern(None)
            }
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.as_ref().map(|re| re.is_match(text)).unwrap_or(false)
    }

    pub fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        self.0.as_ref().and_then(|re| re.captures(text))
    }

    pub fn captures_all<'t>(&self, text: &'t str) -> Vec<Captures<'t>> {
        match &self.0 {
            Some(re) => re.captures_iter(text).collect(),
            None => Vec::new(),
        }
    }

    pub fn find<'t>(&self, text: &'t str) -> Option<Match<'t>> {
        self.0.as_ref().and_then(|re| re.find(text))
    }

    pub fn find_all<'t>(&self, text: &'t str) -> Vec<Match<'t>> {
        match &self.0 {
            Some(re) => re.find_iter(text).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Syntax {
    slash_comments: bool,
    hash_comments: bool,
    triple_quotes: bool,
    quotes: &'static [char],
}

impl Syntax {
    fn for_language(language: Language) -> Self {
        match language {
            Language::Python => Syntax {
                slash_comments: false,
                hash_comments: true,
                triple_quotes: true,
                quotes: &['"', '\''],
            },
            Language::Ruby => Syntax {
                slash_comments: false,
                hash_comments: true,
                triple_quotes: false,
                quotes: &['"', '\''],
            },
            Language::Shell => Syntax {
                slash_comments: false,
                hash_comments: true,
                triple_quotes: false,
                quotes: &['"', '\'', '`'],
            },
            Language::Php => Syntax {
                slash_comments: true,
                hash_comments: true,
                triple_quotes: false,
                quotes: &['"', '\''],
            },
            Language::TypeScript | Language::JavaScript | Language::Go => Syntax {
                slash_comments: true,
                hash_comments: false,
                triple_quotes: false,
                quotes: &['"', '\'', '`'],
            },
            Language::Rust => Syntax {
                slash_comments: true,
                hash_comments: false,
                triple_quotes: false,
                quotes: &['"'],
            },
            _ => Syntax {
                slash_comments: true,
                hash_comments: false,
                triple_quotes: false,
                quotes: &['"', '\''],
            },
        }
    }
}

fn blank(out: &mut String, c: char) {
    out.push(if c == '\n' { '\n' } else { ' ' });
}

/// Replaces comment text and string-literal bodies with spaces. Quote characters
/// and newlines are kept, so line numbers and character columns still line up.
pub fn mask(content: &str, language: Language) -> String {
    let syntax = Syntax::for_language(language);
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let line_comment = (syntax.hash_comments && c == '#')
            || (syntax.slash_comments && c == '/' && next == Some('/'));
        if line_comment {
            while i < chars.len() && chars[i] != '\n' {
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if syntax.slash_comments && c == '/' && next == Some('*') {
            blank(&mut out, chars[i]);
            blank(&mut out, chars[i + 1]);
            i += 2;
            while i < chars.len() {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    out.push_str("  ");
                    i += 2;
                    break;
                }
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if syntax.triple_quotes
            && (c == '"' || c == '\'')
            && next == Some(c)
            && chars.get(i + 2) == Some(&c)
        {
            out.extend([c, c, c]);
            i += 3;
            while i < chars.len() {
                if chars[i] == '\\' {
                    blank(&mut out, chars[i]);
                    if let Some(&escaped) = chars.get(i + 1) {
                        blank(&mut out, escaped);
                    }
                    i += 2;
                    continue;
                }
                if chars[i] == c && chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    out.extend([c, c, c]);
                    i += 3;
                    break;
                }
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if syntax.quotes.contains(&c) {
            out.push(c);
            i += 1;
            let multiline = c == '`';
            while i < chars.len() {
                let ch = chars[i];
                if ch == '\\' && !(multiline && language == Language::Go) {
                    blank(&mut out, ch);
                    if let Some(&escaped) = chars.get(i + 1) {
                        blank(&mut out, escaped);
                    }
                    i += 2;
                    continue;
                }
                if ch == c {
                    out.push(c);
                    i += 1;
                    break;
                }
                if ch == '\n' && !multiline {
                    // unterminated literal ends at the line break
                    break;
                }
                blank(&mut out, ch);
                i += 1;
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Indentation width with tabs counted as four columns.
pub fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Index of the line closing the brace block opened at or after `start`.
/// Returns `None` when a `;` terminates the declaration before any `{`
/// (abstract or interface methods, forward declarations).
pub fn brace_block_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => {
                    depth -= 1;
                    if opened && depth <= 0 {
                        return Some(idx);
                    }
                    if !opened {
                        depth = 0;
                    }
                }
                ';' if !opened && depth == 0 => return None,
                _ => {}
            }
        }
        if !opened && idx >= start + MAX_SIGNATURE_LINES {
            return None;
        }
    }

    if opened {
        Some(lines.len().saturating_sub(1))
    } else {
        None
    }
}

/// Last line of the indentation block headed by `start`. The header may
/// continue over several lines while brackets are open.
pub fn indent_block_end(lines: &[&str], start: usize) -> usize {
    if start >= lines.len() {
        return start;
    }
    let base = indent_width(lines[start]);

    let mut header_end = start;
    let mut balance: i32 = 0;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '(' | '[' | '{' => balance += 1,
                ')' | ']' | '}' => balance -= 1,
                _ => {}
            }
        }
        header_end = idx;
        if balance <= 0 || idx >= start + MAX_SIGNATURE_LINES {
            break;
        }
    }

    let mut end = header_end;
    for (idx, line) in lines.iter().enumerate().skip(header_end + 1) {
        if is_blank(line) {
            continue;
        }
        if indent_width(line) <= base {
            break;
        }
        end = idx;
    }
    end
}

/// Number of lines that contain code after masking.
pub fn code_line_count(masked: &str) -> usize {
    masked.lines().filter(|l| !is_blank(l)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_comments_and_strings_preserving_lines() {
        let src = "let a = \"if (x)\"; // if here\n/* while\n */ if (b) {}\n";
        let masked = mask(src, Language::TypeScript);
        assert_eq!(masked.lines().count(), src.lines().count());
        assert!(!masked.contains("while"));
        assert_eq!(masked.matches("if").count(), 1);
        assert!(masked.contains("\"      \""));
    }

    #[test]
    fn masks_python_docstrings_and_hash_comments() {
        let src = "def f():\n    \"\"\"if and or\"\"\"\n    return 1  # or\n";
        let masked = mask(src, Language::Python);
        assert!(!masked.contains(" or"));
        assert!(masked.contains("def f():"));
    }

    #[test]
    fn brace_block_spans_nested_braces() {
        let lines = vec!["function f() {", "  if (x) {", "  }", "}", "g();"];
        assert_eq!(brace_block_end(&lines, 0), Some(3));
        let abstract_method = vec!["abstract void run();", "int x;"];
        assert_eq!(brace_block_end(&abstract_method, 0), None);
    }

    #[test]
    fn indent_block_skips_blank_lines() {
        let lines = vec!["def f(a,", "      b):", "    x = 1", "", "    return x", "y = 2"];
        assert_eq!(indent_block_end(&lines, 0), 4);
    }
}
