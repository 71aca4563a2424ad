//! Dockerfile parser using nom.
//!
//! Produces one [`Instruction`] per logical line (continuations joined) and
//! keeps every comment so directives can be read from them.

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{space0, space1},
    combinator::rest,
    sequence::{terminated, tuple},
};

/// Instructions accepted in a Dockerfile.
pub const COMMANDS: &[&str] = &[
    "add",
    "arg",
    "cmd",
    "copy",
    "entrypoint",
    "env",
    "expose",
    "from",
    "healthcheck",
    "label",
    "maintainer",
    "onbuild",
    "run",
    "shell",
    "stopsignal",
    "user",
    "volume",
    "workdir",
];

/// One instruction of a Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Lowercase command, e.g. `from`.
    pub cmd: String,
    /// Arguments joined by single spaces; JSON form is flattened.
    pub value: String,
    /// 1-based line where the instruction starts.
    pub line: usize,
}

/// A parsed Dockerfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dockerfile {
    pub instructions: Vec<Instruction>,
    /// Every comment line, `#` included, one per line.
    pub comments: String,
}

/// Parse error information.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    /// Line number where the error occurred (1-indexed).
    pub line: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

fn keyword(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphabetic())(input)
}

/// `KEYWORD args...`
fn instruction_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (cmd, _)) = tuple((keyword, space1))(input)?;
    let (input, args) = terminated(rest, space0)(input)?;
    Ok((input, (cmd, args)))
}

/// Flatten the JSON (exec) form, otherwise normalize whitespace.
fn argument_value(args: &str) -> String {
    let trimmed = args.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items.join(" ");
        }
    }
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Parse Dockerfile content.
pub fn parse_dockerfile(input: &str) -> Result<Dockerfile, ParseError> {
    let mut dockerfile = Dockerfile::default();
    let lines: Vec<&str> = input.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let start_line = i + 1;
        let line = lines[i];

        if is_comment(line) {
            dockerfile.comments.push_str(line.trim());
            dockerfile.comments.push('\n');
            i += 1;
            continue;
        }

        // Collect lines with continuations; comments inside them are dropped
        let mut combined = String::new();
        loop {
            let current = lines.get(i).copied().unwrap_or_default();
            i += 1;
            let trimmed = current.trim_end();
            match trimmed.strip_suffix('\\') {
                Some(head) => {
                    combined.push_str(head);
                    combined.push(' ');
                    while i < lines.len() && (is_comment(lines[i]) || lines[i].trim().is_empty()) {
                        i += 1;
                    }
                    if i >= lines.len() {
                        break;
                    }
                }
                None => {
                    combined.push_str(trimmed);
                    break;
                }
            }
        }

        let combined = combined.trim();
        if combined.is_empty() {
            continue;
        }

        let (cmd, args) = match instruction_line(combined) {
            Ok((_, parsed)) => parsed,
            Err(_) => (combined, ""),
        };
        let cmd = cmd.to_ascii_lowercase();
        if !COMMANDS.contains(&cmd.as_str()) {
            return Err(ParseError {
                message: format!("unknown instruction: {}", cmd.to_ascii_uppercase()),
                line: start_line,
            });
        }
        if args.trim().is_empty() {
            return Err(ParseError {
                message: format!("{} requires at least one argument", cmd.to_ascii_uppercase()),
                line: start_line,
            });
        }

        dockerfile.instructions.push(Instruction {
            cmd,
            value: argument_value(args),
            line: start_line,
        });
    }

    Ok(dockerfile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instructions() {
        let content = r#"# syntax=docker/dockerfile:1
#ts:skip=AC_DOCKER_0041 base image is pinned upstream
FROM node:18-alpine AS build
RUN apk add --no-cache git \
    # inline comment
    && npm ci
CMD ["node", "server.js"]
"#;
        let parsed = parse_dockerfile(content).unwrap();
        assert_eq!(parsed.instructions.len(), 3);
        assert_eq!(parsed.instructions[0].cmd, "from");
        assert_eq!(parsed.instructions[0].value, "node:18-alpine AS build");
        assert_eq!(parsed.instructions[0].line, 3);
        assert_eq!(parsed.instructions[1].value, "apk add --no-cache git && npm ci");
        assert_eq!(parsed.instructions[1].line, 4);
        assert_eq!(parsed.instructions[2].value, "node server.js");
        assert_eq!(parsed.instructions[2].line, 7);
        assert!(parsed.comments.contains("#ts:skip=AC_DOCKER_0041"));
    }

    #[test]
    fn test_lowercase_keywords_and_errors() {
        let parsed = parse_dockerfile("from alpine\nworkdir /app\n").unwrap();
        assert_eq!(parsed.instructions[1].cmd, "workdir");

        let err = parse_dockerfile("FROM alpine\nFOO bar\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("FOO"));

        assert!(parse_dockerfile("FROM\n").is_err());
    }
}
