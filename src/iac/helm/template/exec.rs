//! Template execution.

use serde_json::Value;
use std::collections::HashMap;

use super::TemplateError;
use super::funcs::{self, to_text, truthy};
use super::parse::{Branch, Command, Expr, Node, Pipeline, parse};

/// Nesting limit for `include`, `template` and `tpl`.
const MAX_INCLUDE_DEPTH: usize = 100;

/// A set of named templates shared by every file of a chart.
#[derive(Debug, Default)]
pub struct Engine {
    defines: HashMap<String, Vec<Node>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `src`, register its `define`s and return its top-level nodes.
    pub fn add(&mut self, src: &str) -> Result<Vec<Node>, TemplateError> {
        let parsed = parse(src)?;
        self.defines.extend(parsed.defines);
        Ok(parsed.root)
    }

    /// Execute `nodes` with `data` as both `.` and `$`.
    pub fn render(&self, nodes: &[Node], data: &Value) -> Result<String, TemplateError> {
        let mut exec = Exec {
            engine: self,
            vars: vec![("$".to_string(), data.clone())],
            depth: 0,
            line: 1,
        };
        let mut out = String::new();
        exec.walk(nodes, data, &mut out)?;
        Ok(out)
    }
}

struct Exec<'a> {
    engine: &'a Engine,
    vars: Vec<(String, Value)>,
    depth: usize,
    line: usize,
}

/// Follow a field path; missing keys yield nil.
fn lookup(value: &Value, path: &[String]) -> Value {
    let mut current = value;
    for key in path {
        match current.get(key.as_str()) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

impl<'a> Exec<'a> {
    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError {
            message: message.into(),
            line: self.line,
        }
    }

    fn walk(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action { pipe, line } => {
                    self.line = *line;
                    let value = self.pipeline(pipe, dot)?;
                    if pipe.decl.is_empty() {
                        out.push_str(&to_text(&value));
                    }
                }
                Node::Cond {
                    kind,
                    branches,
                    otherwise,
                    line,
                } => {
                    self.line = *line;
                    let mark = self.vars.len();
                    let mut taken = false;
                    for (pipe, body) in branches {
                        let value = self.pipeline(pipe, dot)?;
                        if truthy(&value) {
                            match kind {
                                Branch::If => self.walk(body, dot, out)?,
                                Branch::With => self.walk(body, &value, out)?,
                            }
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.walk(otherwise, dot, out)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                    line,
                } => {
                    self.line = *line;
                    self.range(pipe, body, otherwise, dot, out)?;
                }
                Node::Template { name, pipe, line } => {
                    self.line = *line;
                    let data = match pipe {
                        Some(pipe) => self.pipeline(pipe, dot)?,
                        None => Value::Null,
                    };
                    out.push_str(&self.include(name, &data)?);
                }
            }
        }
        Ok(())
    }

    fn range(
        &mut self,
        pipe: &Pipeline,
        body: &[Node],
        otherwise: &[Node],
        dot: &Value,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let items: Vec<(Value, Value)> = match self.commands(&pipe.cmds, dot)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => funcs::sorted(&map)
                .into_iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect(),
            Value::Number(n) if n.is_i64() || n.is_u64() => (0..funcs::as_i64(&Value::Number(n)))
                .map(|i| (Value::from(i), Value::from(i)))
                .collect(),
            Value::Null => Vec::new(),
            other => return Err(self.error(format!("range can't iterate over {}", to_text(&other)))),
        };

        if items.is_empty() {
            self.walk(otherwise, dot, out)?;
        }
        for (key, item) in items {
            let scope = self.vars.len();
            match pipe.decl.as_slice() {
                [] => {}
                [value] => self.vars.push((value.clone(), item.clone())),
                [index, value, ..] => {
                    self.vars.push((index.clone(), key));
                    self.vars.push((value.clone(), item.clone()));
                }
            }
            self.walk(body, &item, out)?;
            self.vars.truncate(scope);
        }
        self.vars.truncate(mark);
        Ok(())
    }

    fn pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let value = self.commands(&pipe.cmds, dot)?;
        let line = self.line;
        for name in &pipe.decl {
            if pipe.assign {
                let slot = self
                    .vars
                    .iter_mut()
                    .rev()
                    .find(|(n, _)| n == name)
                    .ok_or_else(|| TemplateError {
                        message: format!("undefined variable: {}", name),
                        line,
                    })?;
                slot.1 = value.clone();
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn commands(&mut self, cmds: &[Command], dot: &Value) -> Result<Value, TemplateError> {
        let mut piped = None;
        for cmd in cmds {
            piped = Some(self.command(cmd, dot, piped)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(&mut self, cmd: &Command, dot: &Value, piped: Option<Value>) -> Result<Value, TemplateError> {
        let Some(head) = cmd.args.first() else {
            return Ok(Value::Null);
        };

        let mut args = Vec::with_capacity(cmd.args.len());
        for expr in &cmd.args[1..] {
            args.push(self.expr(expr, dot)?);
        }
        let has_args = !args.is_empty() || piped.is_some();
        args.extend(piped);

        match head {
            Expr::Ident(name) => self.call(name, args),
            _ if !has_args => self.expr(head, dot),
            // method call on a field, e.g. `.Capabilities.APIVersions.Has "x"`
            Expr::Field(path) | Expr::Var(_, path) if !path.is_empty() => {
                let (parent, method) = path.split_at(path.len() - 1);
                let receiver = match head {
                    Expr::Var(name, _) => lookup(&self.var(name)?, parent),
                    _ => lookup(dot, parent),
                };
                self.method(&receiver, &method[0], &args)
            }
            _ => Err(self.error("can't give argument to non-function")),
        }
    }

    fn method(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, TemplateError> {
        let first = args.first().map(to_text).unwrap_or_default();
        match (name, receiver) {
            ("Has", Value::Array(items)) => Ok(Value::Bool(items.iter().any(|i| to_text(i) == first))),
            // chart files are not read while scanning
            ("Get" | "AsConfig" | "AsSecrets", _) => Ok(Value::String(String::new())),
            ("Glob", _) => Ok(Value::Object(serde_json::Map::new())),
            ("Lines", _) => Ok(Value::Array(Vec::new())),
            _ => Err(self.error(format!("can't call method {} on {}", name, to_text(receiver)))),
        }
    }

    fn var(&self, name: &str) -> Result<Value, TemplateError> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| self.error(format!("undefined variable: {}", name)))
    }

    fn expr(&mut self, expr: &Expr, dot: &Value) -> Result<Value, TemplateError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Field(path) => Ok(lookup(dot, path)),
            Expr::Var(name, path) => Ok(lookup(&self.var(name)?, path)),
            Expr::Ident(name) => self.call(name, Vec::new()),
            Expr::Sub(pipe, chain) => {
                let value = self.pipeline(pipe, dot)?;
                Ok(lookup(&value, chain))
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, TemplateError> {
        match name {
            "include" => {
                let template = args.first().map(to_text).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or(Value::Null);
                self.include(&template, &data).map(Value::String)
            }
            "tpl" => {
                let src = args.first().map(to_text).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or(Value::Null);
                let parsed = parse(&src)?;
                self.nested(&parsed.root, &data).map(Value::String)
            }
            "required" => {
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                match &value {
                    Value::Null => Err(self.error(args.first().map(to_text).unwrap_or_default())),
                    Value::String(s) if s.is_empty() => Err(self.error(args.first().map(to_text).unwrap_or_default())),
                    _ => Ok(value),
                }
            }
            "fail" => Err(self.error(args.first().map(to_text).unwrap_or_default())),
            _ => funcs::call(name, &args).map_err(|message| self.error(message)),
        }
    }

    fn include(&mut self, name: &str, data: &Value) -> Result<String, TemplateError> {
        let engine = self.engine;
        let nodes = engine
            .defines
            .get(name)
            .ok_or_else(|| self.error(format!("no template \"{}\" associated with template", name)))?;
        self.nested(nodes, data)
    }

    /// Run `nodes` in a fresh variable scope.
    fn nested(&mut self, nodes: &[Node], data: &Value) -> Result<String, TemplateError> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(self.error("rendering template has a nested reference depth limit exceeded"));
        }
        let saved = std::mem::replace(&mut self.vars, vec![("$".to_string(), data.clone())]);
        let line = self.line;
        self.depth += 1;
        let mut out = String::new();
        let result = self.walk(nodes, data, &mut out);
        self.depth -= 1;
        self.vars = saved;
        self.line = line;
        result.map(|_| out)
    }
}
