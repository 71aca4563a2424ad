//! Tokenizer for Go templates.
//!
//! Splits a template into text and actions, applying `{{-` / `-}}` trim
//! markers and dropping comments, then tokenizes action contents.

use super::TemplateError;

/// A token of the template stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw text outside of template delimiters
    Text(String),
    /// Template action: {{ ... }}
    Action { content: String, line: usize },
}

/// A token inside an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionToken {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    /// `.a.b`; `.` alone is an empty path
    Field(Vec<String>),
    /// `$x.a.b`; `$` alone is the root variable
    Var(String, Vec<String>),
    Ident(String),
    /// Field chain directly after a closing paren: `(...).a.b`
    Chain(Vec<String>),
    LParen,
    RParen,
    Pipe,
    Declare,
    Assign,
    Comma,
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// Find the `}}` closing an action that starts at `from`, skipping quoted text
/// and comments.
fn find_action_end(src: &str, from: usize) -> Option<usize> {
    let rest = &src[from..];
    let lead = rest.len() - rest.trim_start().len();
    if rest[lead..].starts_with("/*") {
        let close = rest.find("*/")?;
        return rest[close..].find("}}").map(|i| from + close + i);
    }

    let bytes = src.as_bytes();
    let mut i = from;
    let mut quote: Option<u8> = None;
    while i + 1 < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' || b == b'\'' => quote = Some(b),
            None if b == b'}' && bytes[i + 1] == b'}' => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

/// Split template source into text and action tokens.
pub fn lex(src: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut line = 1usize;
    let mut pending_text = String::new();

    while let Some(offset) = src[pos..].find("{{") {
        let start = pos + offset;
        let mut inner = start + 2;
        let trim_left = src[inner..].starts_with('-')
            && src[inner + 1..].starts_with(|c: char| c.is_whitespace());
        if trim_left {
            inner += 1;
        }

        pending_text.push_str(&src[pos..start]);
        line += newlines(&src[pos..start]);
        if trim_left {
            pending_text.truncate(pending_text.trim_end().len());
        }
        if !pending_text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut pending_text)));
        }

        let action_line = line;
        let end = find_action_end(src, inner).ok_or_else(|| TemplateError {
            message: "unclosed action".to_string(),
            line: action_line,
        })?;
        let mut content = &src[inner..end];
        let trim_right = content.ends_with('-')
            && content[..content.len() - 1].ends_with(|c: char| c.is_whitespace());
        if trim_right {
            content = &content[..content.len() - 1];
        }
        line += newlines(&src[start..end + 2]);
        pos = end + 2;

        let content = content.trim();
        if !content.starts_with("/*") {
            tokens.push(Token::Action {
                content: content.to_string(),
                line: action_line,
            });
        }

        if trim_right {
            let rest = &src[pos..];
            let skipped = rest.len() - rest.trim_start().len();
            line += newlines(&rest[..skipped]);
            pos += skipped;
        }
    }

    pending_text.push_str(&src[pos..]);
    if !pending_text.is_empty() {
        tokens.push(Token::Text(pending_text));
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Read `.a.b.c` starting at a `.`; returns the path and the index after it.
fn read_path(chars: &[char], mut i: usize) -> (Vec<String>, usize) {
    let mut path = Vec::new();
    while i < chars.len() && chars[i] == '.' {
        let start = i + 1;
        let mut end = start;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        if end == start {
            // lone `.`
            i = end;
            break;
        }
        path.push(chars[start..end].iter().collect());
        i = end;
    }
    (path, i)
}

fn read_quoted(chars: &[char], start: usize, line: usize) -> Result<(String, usize), TemplateError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' && quote == '"' && i + 1 < chars.len() {
            i += 1;
            out.push(match chars[i] {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
        } else {
            out.push(c);
        }
        i += 1;
    }
    Err(TemplateError {
        message: "unterminated quoted string".to_string(),
        line,
    })
}

/// Tokenize the contents of one action.
pub fn tokenize_action(content: &str, line: usize) -> Result<Vec<ActionToken>, TemplateError> {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(ActionToken::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(ActionToken::RParen);
                i += 1;
                if i < chars.len() && chars[i] == '.' {
                    let (path, next) = read_path(&chars, i);
                    tokens.push(ActionToken::Chain(path));
                    i = next;
                }
            }
            '|' => {
                tokens.push(ActionToken::Pipe);
                i += 1;
            }
            ',' => {
                tokens.push(ActionToken::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ActionToken::Declare);
                i += 2;
            }
            '=' => {
                tokens.push(ActionToken::Assign);
                i += 1;
            }
            '"' | '`' => {
                let (s, next) = read_quoted(&chars, i, line)?;
                tokens.push(ActionToken::Str(s));
                i = next;
            }
            '\'' => {
                // rune literal
                let (s, next) = read_quoted(&chars, i, line)?;
                let code = s.chars().next().map(|c| c as i64).unwrap_or_default();
                tokens.push(ActionToken::Int(code));
                i = next;
            }
            '.' => {
                let (path, next) = read_path(&chars, i);
                tokens.push(ActionToken::Field(path));
                i = next;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = std::iter::once('$').chain(chars[start..end].iter().copied()).collect();
                let (path, next) = read_path(&chars, end);
                tokens.push(ActionToken::Var(name, path));
                i = next;
            }
            c if c.is_ascii_digit() || ((c == '-' || c == '+') && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                tokens.push(parse_number(&text).ok_or_else(|| TemplateError {
                    message: format!("bad number syntax: {}", text),
                    line,
                })?);
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => ActionToken::Bool(true),
                    "false" => ActionToken::Bool(false),
                    "nil" => ActionToken::Nil,
                    _ => ActionToken::Ident(word),
                });
            }
            other => {
                return Err(TemplateError {
                    message: format!("unexpected {:?} in action", other),
                    line,
                });
            }
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> Option<ActionToken> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.trim_start_matches('+')),
    };
    let lower = digits.to_ascii_lowercase();
    let int = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    };
    if let Some(n) = int {
        return Some(ActionToken::Int(if negative { -n } else { n }));
    }
    lower
        .parse::<f64>()
        .ok()
        .map(|f| ActionToken::Float(if negative { -f } else { f }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_text_and_actions() {
        let tokens = lex("name: {{ .Values.name }}\nport: {{ .Values.port }}").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], Token::Text("name: ".to_string()));
        assert_eq!(
            tokens[3],
            Token::Action {
                content: ".Values.port".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn test_trim_markers_and_comments() {
        let tokens = lex("a:\n  {{- /* note */ -}}\n  b\n{{- if .x }}y{{ end -}}\n z").unwrap();
        let text: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, vec!["a:", "b", "y", "z"]);
    }

    #[test]
    fn test_braces_inside_strings() {
        let tokens = lex(r#"{{ printf "}}%s" .x }}"#).unwrap();
        assert_eq!(
            tokens[0],
            Token::Action {
                content: r#"printf "}}%s" .x"#.to_string(),
                line: 1
            }
        );
    }

    #[test]
    fn test_unclosed_action() {
        let err = lex("a\nb {{ .x ").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_tokenize_action() {
        let tokens = tokenize_action(r#"$v := default "x" .Values.a | quote"#, 1).unwrap();
        assert_eq!(
            tokens,
            vec![
                ActionToken::Var("$v".into(), vec![]),
                ActionToken::Declare,
                ActionToken::Ident("default".into()),
                ActionToken::Str("x".into()),
                ActionToken::Field(vec!["Values".into(), "a".into()]),
                ActionToken::Pipe,
                ActionToken::Ident("quote".into()),
            ]
        );

        let tokens = tokenize_action("(index . 0).name -1 1.5 $", 1).unwrap();
        assert!(tokens.contains(&ActionToken::Chain(vec!["name".into()])));
        assert!(tokens.contains(&ActionToken::Int(-1)));
        assert!(tokens.contains(&ActionToken::Float(1.5)));
        assert!(tokens.contains(&ActionToken::Var("$".into(), vec![])));
        assert!(tokens.contains(&ActionToken::Field(vec![])));
    }
}
