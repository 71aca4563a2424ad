//! Builds a node tree from the token stream.

use std::collections::HashMap;

use super::TemplateError;
use super::lexer::{ActionToken, Token, lex, tokenize_action};

/// An operand or call inside a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(serde_json::Value),
    Field(Vec<String>),
    Var(String, Vec<String>),
    /// Function name; called with the remaining operands of the command
    Ident(String),
    Sub(Box<Pipeline>, Vec<String>),
}

/// Operands of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Expr>,
}

/// `$a, $b := cmd | cmd`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    pub decl: Vec<String>,
    /// `=` rather than `:=`
    pub assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    If,
    With,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action { pipe: Pipeline, line: usize },
    Cond {
        kind: Branch,
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
        line: usize,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    Template {
        name: String,
        pipe: Option<Pipeline>,
        line: usize,
    },
}

/// A parsed template: its top-level nodes plus every `define` it declares.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub root: Vec<Node>,
    pub defines: HashMap<String, Vec<Node>>,
}

enum Stop {
    Eof,
    End,
    Else,
    ElseIf(Pipeline),
    ElseWith(Pipeline),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    defines: HashMap<String, Vec<Node>>,
    line: usize,
}

/// Parse template source.
pub fn parse(src: &str) -> Result<Parsed, TemplateError> {
    let mut parser = Parser {
        tokens: lex(src)?,
        pos: 0,
        defines: HashMap::new(),
        line: 1,
    };
    let (root, stop) = parser.parse_list()?;
    match stop {
        Stop::Eof => Ok(Parsed {
            root,
            defines: parser.defines,
        }),
        _ => Err(parser.error("unexpected {{end}} or {{else}}")),
    }
}

fn split_keyword(content: &str) -> (&str, &str) {
    match content.split_once(|c: char| c.is_whitespace()) {
        Some((word, rest)) => (word, rest.trim()),
        None => (content, ""),
    }
}

impl Parser {
    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError {
            message: message.into(),
            line: self.line,
        }
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();

        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            let (content, line) = match token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Token::Action { content, line } => (content, line),
            };
            self.line = line;

            let (keyword, rest) = split_keyword(&content);
            match keyword {
                "end" => return Ok((nodes, Stop::End)),
                "else" => {
                    let (next, cond) = split_keyword(rest);
                    return Ok((
                        nodes,
                        match next {
                            "" => Stop::Else,
                            "if" => Stop::ElseIf(self.pipeline(cond)?),
                            "with" => Stop::ElseWith(self.pipeline(cond)?),
                            other => return Err(self.error(format!("unexpected \"{}\" after else", other))),
                        },
                    ));
                }
                "if" => nodes.push(self.parse_cond(Branch::If, rest, line)?),
                "with" => nodes.push(self.parse_cond(Branch::With, rest, line)?),
                "range" => {
                    let pipe = self.pipeline(rest)?;
                    let (body, stop) = self.parse_list()?;
                    let otherwise = match stop {
                        Stop::End => Vec::new(),
                        Stop::Else => self.parse_until_end()?,
                        _ => return Err(self.error("unexpected EOF in range")),
                    };
                    nodes.push(Node::Range {
                        pipe,
                        body,
                        otherwise,
                        line,
                    });
                }
                "define" => {
                    let (name, _) = self.template_name(rest)?;
                    let body = self.parse_until_end()?;
                    self.defines.insert(name, body);
                }
                "block" => {
                    let (name, pipe) = self.template_name(rest)?;
                    let body = self.parse_until_end()?;
                    self.defines.insert(name.clone(), body);
                    nodes.push(Node::Template { name, pipe, line });
                }
                "template" => {
                    let (name, pipe) = self.template_name(rest)?;
                    nodes.push(Node::Template { name, pipe, line });
                }
                _ => nodes.push(Node::Action {
                    pipe: self.pipeline(&content)?,
                    line,
                }),
            }
        }

        Ok((nodes, Stop::Eof))
    }

    fn parse_until_end(&mut self) -> Result<Vec<Node>, TemplateError> {
        match self.parse_list()? {
            (body, Stop::End) => Ok(body),
            _ => Err(self.error("expected {{end}}")),
        }
    }

    fn parse_cond(&mut self, kind: Branch, cond: &str, line: usize) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut pipe = self.pipeline(cond)?;
        loop {
            let (body, stop) = self.parse_list()?;
            branches.push((pipe, body));
            match stop {
                Stop::End => {
                    return Ok(Node::Cond {
                        kind,
                        branches,
                        otherwise: Vec::new(),
                        line,
                    });
                }
                Stop::Else => {
                    let otherwise = self.parse_until_end()?;
                    return Ok(Node::Cond {
                        kind,
                        branches,
                        otherwise,
                        line,
                    });
                }
                Stop::ElseIf(next) if kind == Branch::If => pipe = next,
                Stop::ElseWith(next) if kind == Branch::With => pipe = next,
                Stop::Eof => return Err(self.error("unexpected EOF, missing {{end}}")),
                _ => return Err(self.error("mismatched else branch")),
            }
        }
    }

    /// `"name" [pipeline]`
    fn template_name(&self, rest: &str) -> Result<(String, Option<Pipeline>), TemplateError> {
        let tokens = tokenize_action(rest, self.line)?;
        let Some(ActionToken::Str(name)) = tokens.first() else {
            return Err(self.error("template name must be a string"));
        };
        let pipe = if tokens.len() > 1 {
            Some(self.pipeline_tokens(&tokens[1..])?)
        } else {
            None
        };
        Ok((name.clone(), pipe))
    }

    fn pipeline(&self, content: &str) -> Result<Pipeline, TemplateError> {
        let tokens = tokenize_action(content, self.line)?;
        if tokens.is_empty() {
            return Err(self.error("missing value for command"));
        }
        self.pipeline_tokens(&tokens)
    }

    fn pipeline_tokens(&self, tokens: &[ActionToken]) -> Result<Pipeline, TemplateError> {
        let mut pipe = Pipeline::default();
        let mut rest = tokens;

        // declarations: `$x :=`, `$x =`, `$i, $v :=`
        let mut names = Vec::new();
        let mut i = 0;
        while let Some(ActionToken::Var(name, path)) = rest.get(i) {
            if !path.is_empty() {
                break;
            }
            names.push(name.clone());
            match rest.get(i + 1) {
                Some(ActionToken::Comma) => i += 2,
                Some(ActionToken::Declare) | Some(ActionToken::Assign) => {
                    pipe.assign = rest[i + 1] == ActionToken::Assign;
                    pipe.decl = std::mem::take(&mut names);
                    rest = &rest[i + 2..];
                    break;
                }
                _ => break,
            }
        }

        for stage in split_stages(rest) {
            if stage.is_empty() {
                return Err(self.error("missing command in pipeline"));
            }
            pipe.cmds.push(self.command(stage)?);
        }
        if pipe.cmds.is_empty() {
            return Err(self.error("missing value for command"));
        }
        Ok(pipe)
    }

    fn command(&self, tokens: &[ActionToken]) -> Result<Command, TemplateError> {
        let mut args = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let expr = match &tokens[i] {
                ActionToken::Str(s) => Expr::Literal(serde_json::Value::String(s.clone())),
                ActionToken::Int(n) => Expr::Literal(serde_json::Value::from(*n)),
                ActionToken::Float(f) => Expr::Literal(serde_json::Value::from(*f)),
                ActionToken::Bool(b) => Expr::Literal(serde_json::Value::Bool(*b)),
                ActionToken::Nil => Expr::Literal(serde_json::Value::Null),
                ActionToken::Field(path) => Expr::Field(path.clone()),
                ActionToken::Var(name, path) => Expr::Var(name.clone(), path.clone()),
                ActionToken::Ident(name) => Expr::Ident(name.clone()),
                ActionToken::LParen => {
                    let close = matching_paren(tokens, i).ok_or_else(|| self.error("unclosed left paren"))?;
                    let inner = self.pipeline_tokens(&tokens[i + 1..close])?;
                    i = close;
                    let chain = match tokens.get(i + 1) {
                        Some(ActionToken::Chain(path)) => {
                            i += 1;
                            path.clone()
                        }
                        _ => Vec::new(),
                    };
                    Expr::Sub(Box::new(inner), chain)
                }
                other => return Err(self.error(format!("unexpected {:?} in operand", other))),
            };
            args.push(expr);
            i += 1;
        }
        Ok(Command { args })
    }
}

fn matching_paren(tokens: &[ActionToken], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            ActionToken::LParen => depth += 1,
            ActionToken::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split at `|` outside parentheses.
fn split_stages(tokens: &[ActionToken]) -> Vec<&[ActionToken]> {
    let mut stages = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            ActionToken::LParen => depth += 1,
            ActionToken::RParen => depth -= 1,
            ActionToken::Pipe if depth == 0 => {
                stages.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() || !stages.is_empty() {
        stages.push(&tokens[start..]);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_flow() {
        let parsed = parse(
            r#"{{ define "name" }}{{ .Chart.Name }}{{ end }}
{{- if .Values.a }}a{{ else if .Values.b }}b{{ else }}c{{ end }}
{{ range $i, $v := .Values.list }}{{ $v }}{{ end }}"#,
        )
        .unwrap();
        assert!(parsed.defines.contains_key("name"));

        let cond = parsed
            .root
            .iter()
            .find_map(|n| match n {
                Node::Cond { branches, otherwise, .. } => Some((branches.len(), otherwise.len())),
                _ => None,
            })
            .unwrap();
        assert_eq!(cond, (2, 1));

        let range = parsed.root.iter().find_map(|n| match n {
            Node::Range { pipe, .. } => Some(pipe.decl.clone()),
            _ => None,
        });
        assert_eq!(range, Some(vec!["$i".to_string(), "$v".to_string()]));
    }

    #[test]
    fn test_parse_pipeline() {
        let parsed = parse(r#"{{ (index .Values "x").y | default "z" | quote }}"#).unwrap();
        let Node::Action { pipe, .. } = &parsed.root[0] else {
            panic!("expected action");
        };
        assert_eq!(pipe.cmds.len(), 3);
        assert!(matches!(&pipe.cmds[0].args[0], Expr::Sub(_, chain) if chain == &vec!["y".to_string()]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("{{ if .x }}no end").is_err());
        assert!(parse("{{ end }}").is_err());
        assert!(parse("{{ template .x }}").is_err());
        assert!(parse("{{ .a | }}").is_err());
    }
}
