use crate::ast::{normalized, Comparator, Condition, Expression, Property, Query};
use schema::{Node, TypeRegistry};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of query")]
    UnexpectedEnd,
    #[error("unexpected {found:?}, expected {expected}")]
    Unexpected { found: String, expected: String },
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("unknown property {0:?}")]
    UnknownProperty(String),
    #[error("invalid number {0:?}")]
    BadNumber(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    // Bare identifiers, numbers and dotted paths; classified in context.
    Word(String),
    // Quoted literal, quotes stripped.
    Quoted(String),
    Sym(&'static str),
}

impl Tok {
    fn text(&self) -> String {
        match self {
            Tok::Word(w) => w.clone(),
            Tok::Quoted(q) => format!("'{q}'"),
            Tok::Sym(s) => s.to_string(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Tok>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => return Err(ParseError::UnexpectedEnd),
                    }
                }
                toks.push(Tok::Quoted(s));
            }
            '(' => {
                chars.next();
                toks.push(Tok::Sym("("));
            }
            ')' => {
                chars.next();
                toks.push(Tok::Sym(")"));
            }
            ',' => {
                chars.next();
                toks.push(Tok::Sym(","));
            }
            '=' => {
                chars.next();
                toks.push(Tok::Sym("="));
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some('=') => toks.push(Tok::Sym("!=")),
                    other => {
                        return Err(ParseError::Unexpected {
                            found: format!("!{}", other.map(String::from).unwrap_or_default()),
                            expected: "!=".to_string(),
                        })
                    }
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Sym("<="));
                } else {
                    toks.push(Tok::Sym("<"));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Sym(">="));
                } else {
                    toks.push(Tok::Sym(">"));
                }
            }
            // A lone star is the select-all projection; stars inside words
            // (wildcard literals) are collected below.
            '*' => {
                chars.next();
                toks.push(Tok::Sym("*"));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' => {
                let mut w = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' || c == '*' {
                        w.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Word(w));
            }
            other => {
                return Err(ParseError::Unexpected {
                    found: other.to_string(),
                    expected: "a token".to_string(),
                })
            }
        }
    }
    Ok(toks)
}

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    registry: &'a TypeRegistry,
    root_type: String,
    root: Option<Arc<Node>>,
}

pub(crate) fn parse(text: &str, registry: &TypeRegistry) -> Result<Query, ParseError> {
    let mut p = Parser {
        toks: tokenize(text)?,
        pos: 0,
        registry,
        root_type: String::new(),
        root: None,
    };
    p.query(text)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Result<Tok, ParseError> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok.ok_or(ParseError::UnexpectedEnd)
    }

    fn keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        match self.next()? {
            Tok::Word(w) if w.eq_ignore_ascii_case(kw) => Ok(()),
            other => Err(ParseError::Unexpected {
                found: other.text(),
                expected: kw.to_string(),
            }),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn query(&mut self, text: &str) -> Result<Query, ParseError> {
        self.keyword("select")?;

        let mut projection = Vec::new();
        if matches!(self.peek(), Some(Tok::Sym("*"))) {
            self.next()?;
        } else {
            loop {
                match self.next()? {
                    Tok::Word(w) => projection.push(w),
                    other => {
                        return Err(ParseError::Unexpected {
                            found: other.text(),
                            expected: "a property".to_string(),
                        })
                    }
                }
                if matches!(self.peek(), Some(Tok::Sym(","))) {
                    self.next()?;
                } else {
                    break;
                }
            }
        }

        self.keyword("from")?;
        let raw_type = match self.next()? {
            Tok::Word(w) => w,
            other => {
                return Err(ParseError::Unexpected {
                    found: other.text(),
                    expected: "a type name".to_string(),
                })
            }
        };
        self.root_type = self
            .registry
            .resolve_type(&raw_type)
            .ok_or(ParseError::UnknownType(raw_type))?;
        self.root = self.registry.node(&self.root_type).ok();

        let properties = projection
            .iter()
            .map(|p| {
                self.resolve_property(p)
                    .ok_or_else(|| ParseError::UnknownProperty(p.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut criteria = None;
        if self.at_keyword("where") {
            self.next()?;
            criteria = Some(self.expression()?);
        }

        let mut sort_by = String::new();
        if self.at_keyword("sortby") {
            self.next()?;
            let field = match self.next()? {
                Tok::Word(w) => w,
                other => {
                    return Err(ParseError::Unexpected {
                        found: other.text(),
                        expected: "a sort field".to_string(),
                    })
                }
            };
            sort_by = self
                .registry
                .resolve_attr(&self.root_type, &field)
                .ok_or(ParseError::UnknownProperty(field))?;
        }

        let mut descending = false;
        if self.at_keyword("descending") {
            self.next()?;
            descending = true;
        }

        let mut limit = 0;
        if self.at_keyword("limit") {
            self.next()?;
            limit = self.number()?;
        }

        let mut page = 0;
        if self.at_keyword("page") {
            self.next()?;
            page = self.number()?;
        }

        if let Some(tok) = self.peek() {
            return Err(ParseError::Unexpected {
                found: tok.text(),
                expected: "end of query".to_string(),
            });
        }

        Ok(Query {
            root_type: self.root_type.clone(),
            properties,
            criteria,
            sort_by,
            descending,
            limit,
            page,
            text: normalized(text),
        })
    }

    fn number(&mut self) -> Result<u32, ParseError> {
        match self.next()? {
            Tok::Word(w) => w.parse().map_err(|_| ParseError::BadNumber(w)),
            other => Err(ParseError::BadNumber(other.text())),
        }
    }

    fn expression(&mut self) -> Result<Expression, ParseError> {
        let mut expr = if matches!(self.peek(), Some(Tok::Sym("("))) {
            self.next()?;
            let inner = self.expression()?;
            match self.next()? {
                Tok::Sym(")") => inner,
                other => {
                    return Err(ParseError::Unexpected {
                        found: other.text(),
                        expected: ")".to_string(),
                    })
                }
            }
        } else {
            Expression {
                condition: Condition {
                    comparator: self.comparator()?,
                    operator: String::new(),
                    next: None,
                },
                operator: String::new(),
                next: None,
            }
        };

        if self.at_keyword("and") || self.at_keyword("or") {
            let op = match self.next()? {
                Tok::Word(w) => w.to_lowercase(),
                _ => unreachable!(),
            };
            let next = self.expression()?;
            append(&mut expr, op, next);
        }
        Ok(expr)
    }

    fn comparator(&mut self) -> Result<Comparator, ParseError> {
        let (left_raw, left_quoted) = self.operand()?;
        let operator = match self.next()? {
            Tok::Sym(op @ ("=" | "!=" | "<" | ">" | "<=" | ">=")) => op.to_string(),
            other => {
                return Err(ParseError::Unexpected {
                    found: other.text(),
                    expected: "a comparison operator".to_string(),
                })
            }
        };
        let (right_raw, right_quoted) = self.operand()?;

        let left_property = (!left_quoted)
            .then(|| self.resolve_property(&left_raw))
            .flatten();
        let right_property = (!right_quoted)
            .then(|| self.resolve_property(&right_raw))
            .flatten();

        Ok(Comparator {
            left: left_property
                .as_ref()
                .map(|p| p.field_name.clone())
                .unwrap_or(left_raw),
            operator,
            right: right_property
                .as_ref()
                .map(|p| p.field_name.clone())
                .unwrap_or(right_raw),
            left_property,
            right_property,
        })
    }

    fn operand(&mut self) -> Result<(String, bool), ParseError> {
        match self.next()? {
            Tok::Word(w) => Ok((w, false)),
            Tok::Quoted(q) => Ok((q, true)),
            other => Err(ParseError::Unexpected {
                found: other.text(),
                expected: "a property or literal".to_string(),
            }),
        }
    }

    /// Resolve a dotted path case-insensitively against the root type.
    /// Returns None when any segment fails to resolve, in which case the
    /// operand is a literal.
    fn resolve_property(&self, path_text: &str) -> Option<Property> {
        let root = self.root.as_ref()?;
        let mut node: &Node = root;
        let mut path = Vec::new();
        let segments: Vec<&str> = path_text.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            let name = self.registry.resolve_attr(&node.type_name, segment)?;
            let attr = node.attributes.get(&name)?;
            path.push(name);
            if i + 1 < segments.len() {
                if !attr.is_struct {
                    return None;
                }
                node = attr;
            } else {
                return Some(Property {
                    parent_type: node.type_name.clone(),
                    field_name: attr.field_name.clone(),
                    type_name: attr.type_name.clone(),
                    path,
                });
            }
        }
        None
    }
}

// Attach `next` at the tail of the chain, joining with `op`. Parenthesized
// groups flatten into the chain; every nested expression is re-wrapped in
// parentheses when rendered to SQL.
fn append(expr: &mut Expression, op: String, next: Expression) {
    let mut tail = expr;
    while tail.next.is_some() {
        tail = tail.next.as_mut().unwrap();
    }
    tail.operator = op;
    tail.next = Some(Box::new(next));
}
