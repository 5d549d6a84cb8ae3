// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Naming templates: turning a service into the DNS name its records live under.
//!
//! Templates use the Go `text/template` action syntax, restricted to what a
//! naming rule needs:
//!
//! | Action | Renders |
//! |--------|---------|
//! | `{{.Service.Name}}` | service name |
//! | `{{.Service.Namespace}}` | service namespace |
//! | `{{.Service.Labels.app}}` | value of label `app` |
//! | `{{.Label "app.kubernetes.io/name"}}` | value of any label |
//! | `{{index .Service.Labels "app"}}` | value of any label |
//! | `{{"-"}}` | the string constant |
//!
//! `{{-` and `-}}` trim the surrounding whitespace. Missing labels render as an
//! empty string. Unknown fields are only detected when rendering, so a template
//! that parsed at startup may still fail for a given service.
//!
//! # Example
//!
//! ```rust
//! use svc2dns::service::ServiceDescriptor;
//! use svc2dns::template::Template;
//!
//! let template = Template::parse("{{.Service.Name}}.svc.{{.Service.Namespace}}").unwrap();
//! let service = ServiceDescriptor::new("prod", "web");
//! assert_eq!(template.render(&service).unwrap(), "web.svc.prod");
//! ```

use crate::errors::TemplateError;
use crate::service::ServiceDescriptor;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const RIGHT_TRIM_DELIM: &str = "-}}";

/// A parsed naming template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Action(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    /// `.A.B.C`
    Field(Vec<String>),
    /// `.Label "key"`
    Label(String),
    /// `index .A.B "key"`
    Index { path: Vec<String>, key: String },
    /// `"text"` or `` `text` ``
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Dot,
    Field(Vec<String>),
    Ident(String),
    Str(String),
}

impl Template {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] on malformed syntax: unclosed actions,
    /// empty actions, unterminated strings or unknown functions.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut pos = 0;
        let mut trim_next = false;

        while pos <= text.len() {
            let rest = &text[pos..];
            let Some(start) = rest.find(LEFT_DELIM) else {
                let literal = if trim_next { rest.trim_start() } else { rest };
                push_text(&mut nodes, literal);
                break;
            };

            let mut literal = &rest[..start];
            if trim_next {
                literal = literal.trim_start();
            }

            let action_offset = pos + start;
            let mut body_start = action_offset + LEFT_DELIM.len();
            let after_open = &text[body_start..];
            if after_open.starts_with('-')
                && after_open[1..].starts_with(|c: char| c.is_ascii_whitespace())
            {
                literal = literal.trim_end();
                body_start += 1;
            }
            push_text(&mut nodes, literal);

            let (tokens, consumed, trim_right) = scan_action(&text[body_start..], action_offset)?;
            nodes.push(Node::Action(build_expr(tokens, action_offset)?));

            pos = body_start + consumed;
            trim_next = trim_right;
        }

        Ok(Self {
            source: text.to_string(),
            nodes,
        })
    }

    /// Original template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the DNS name for a service.
    ///
    /// The output only depends on the template and the service's name, namespace
    /// and labels.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UndefinedField`] when the template references a
    /// field a service doesn't have, and [`TemplateError::BadCall`] when a function
    /// is applied to the wrong kind of value.
    pub fn render(&self, service: &ServiceDescriptor) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(expr) => out.push_str(expr.evaluate(service)?),
            }
        }
        Ok(out)
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Expr {
    fn evaluate<'a>(&'a self, service: &'a ServiceDescriptor) -> Result<&'a str, TemplateError> {
        match self {
            Self::Literal(text) => Ok(text),
            Self::Field(path) => resolve_field(path, service),
            Self::Label(key) => Ok(label(service, key)),
            Self::Index { path, key } => {
                if is_labels_path(path) {
                    Ok(label(service, key))
                } else {
                    Err(TemplateError::BadCall {
                        function: "index".to_string(),
                        reason: format!("can't index item {}", dotted(path)),
                    })
                }
            }
        }
    }
}

fn resolve_field<'a>(path: &[String], service: &'a ServiceDescriptor) -> Result<&'a str, TemplateError> {
    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
    match segments.as_slice() {
        ["Service", "Name"] => Ok(&service.name),
        ["Service", "Namespace"] => Ok(&service.namespace),
        ["Service", "Labels", key] => Ok(label(service, key)),
        ["Label"] => Err(TemplateError::BadCall {
            function: "Label".to_string(),
            reason: "wrong number of args: want 1 got 0".to_string(),
        }),
        _ => Err(TemplateError::UndefinedField {
            field: dotted(path),
        }),
    }
}

fn label<'a>(service: &'a ServiceDescriptor, key: &str) -> &'a str {
    service.labels.get(key).map_or("", String::as_str)
}

fn is_labels_path(path: &[String]) -> bool {
    path.len() == 2 && path[0] == "Service" && path[1] == "Labels"
}

fn dotted(path: &[String]) -> String {
    format!(".{}", path.join("."))
}

fn push_text(nodes: &mut Vec<Node>, literal: &str) {
    if !literal.is_empty() {
        nodes.push(Node::Text(literal.to_string()));
    }
}

fn parse_error(offset: usize, reason: impl Into<String>) -> TemplateError {
    TemplateError::Parse {
        offset,
        reason: reason.into(),
    }
}

/// Tokenize an action body up to and including its closing delimiter.
///
/// Returns the tokens, the number of bytes consumed and whether the action ended
/// with `-}}`.
fn scan_action(input: &str, offset: usize) -> Result<(Vec<Token>, usize, bool), TemplateError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &input[pos..];
        let Some(c) = rest.chars().next() else {
            return Err(parse_error(offset, "unclosed action"));
        };

        if rest.starts_with(RIGHT_DELIM) {
            return Ok((tokens, pos + RIGHT_DELIM.len(), false));
        }

        if c.is_ascii_whitespace() {
            let after_ws = rest.trim_start_matches(|ch: char| ch.is_ascii_whitespace());
            if after_ws.starts_with(RIGHT_TRIM_DELIM) {
                let consumed = pos + (rest.len() - after_ws.len()) + RIGHT_TRIM_DELIM.len();
                return Ok((tokens, consumed, true));
            }
            pos += rest.len() - after_ws.len();
            continue;
        }

        match c {
            '.' => {
                let len = rest[1..]
                    .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '.'))
                    .map_or(rest.len(), |i| i + 1);
                let word = &rest[1..len];
                if word.is_empty() {
                    tokens.push(Token::Dot);
                } else {
                    let path: Vec<String> = word.split('.').map(str::to_string).collect();
                    if path.iter().any(String::is_empty) {
                        return Err(parse_error(offset, format!("bad field path '.{word}'")));
                    }
                    tokens.push(Token::Field(path));
                }
                pos += len;
            }
            '"' => {
                let (value, len) = scan_quoted(&rest[1..], offset)?;
                tokens.push(Token::Str(value));
                pos += len + 1;
            }
            '`' => {
                let Some(end) = rest[1..].find('`') else {
                    return Err(parse_error(offset, "unterminated raw quoted string"));
                };
                tokens.push(Token::Str(rest[1..=end].to_string()));
                pos += end + 2;
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(rest[..len].to_string()));
                pos += len;
            }
            other => {
                return Err(parse_error(
                    offset,
                    format!("unexpected {other:?} in action"),
                ));
            }
        }
    }
}

/// Scan a double-quoted string body (after the opening quote).
///
/// Returns the unescaped value and the number of bytes consumed, closing quote included.
fn scan_quoted(input: &str, offset: usize) -> Result<(String, usize), TemplateError> {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, i + 1)),
            '\\' => match chars.next() {
                Some((_, '"')) => value.push('"'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => {
                    return Err(parse_error(offset, format!("unknown escape sequence \\{other}")));
                }
                None => break,
            },
            '\n' => break,
            _ => value.push(c),
        }
    }

    Err(parse_error(offset, "unterminated quoted string"))
}

fn build_expr(tokens: Vec<Token>, offset: usize) -> Result<Expr, TemplateError> {
    let mut tokens = tokens.into_iter();
    let Some(head) = tokens.next() else {
        return Err(parse_error(offset, "missing value for command"));
    };
    let args: Vec<Token> = tokens.collect();

    match head {
        Token::Field(path) if path.len() == 1 && path[0] == "Label" => match args.as_slice() {
            [] => Ok(Expr::Field(path)),
            [Token::Str(key)] => Ok(Expr::Label(key.clone())),
            _ => Err(parse_error(offset, "Label takes exactly one string argument")),
        },
        Token::Field(path) => {
            if args.is_empty() {
                Ok(Expr::Field(path))
            } else {
                Err(parse_error(
                    offset,
                    format!("{} is not a function and takes no arguments", dotted(&path)),
                ))
            }
        }
        Token::Ident(name) if name == "index" => match args.as_slice() {
            [Token::Field(path), Token::Str(key)] => Ok(Expr::Index {
                path: path.clone(),
                key: key.clone(),
            }),
            _ => Err(parse_error(
                offset,
                "index takes a field and one string key",
            )),
        },
        Token::Ident(name) => Err(parse_error(offset, format!("function {name:?} not defined"))),
        Token::Dot => Err(parse_error(offset, "'.' cannot be rendered as a name")),
        Token::Str(text) if args.is_empty() => Ok(Expr::Literal(text)),
        Token::Str(_) => Err(parse_error(offset, "can't give argument to non-function")),
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod template_tests;
