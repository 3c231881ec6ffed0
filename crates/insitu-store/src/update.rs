//! Update-expression evaluation for stores that apply updates locally
//!
//! Supports the subset of the DynamoDB update grammar the workspace relies on:
//!
//! ```text
//! SET path = operand [+|- operand], ...
//! ADD path :number, ...
//! REMOVE path, ...
//! operand := path | :value | if_not_exists(path, operand)
//! path    := name | #placeholder
//! ```
//!
//! Paths are top-level attribute names. All operands are evaluated against
//! the item as it was before the update, and a path may appear only once.

use crate::error::{Result, StoreError};
use crate::value::{AttributeValue, Item};
use std::collections::{HashMap, HashSet};

/// A parsed update expression with placeholders resolved
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Set { path: String, value: SetValue },
    Add { path: String, operand: AttributeValue },
    Remove { path: String },
}

#[derive(Debug, Clone, PartialEq)]
enum SetValue {
    Operand(Operand),
    Plus(Operand, Operand),
    Minus(Operand, Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(String),
    Value(AttributeValue),
    IfNotExists(String, Box<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Name(String),
    Placeholder(String),
    Equals,
    Plus,
    Minus,
    Comma,
    LParen,
    RParen,
}

fn expression_error(message: impl Into<String>) -> StoreError {
    StoreError::Expression(message.into())
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            },
            '=' | '+' | '-' | ',' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '=' => Token::Equals,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            },
            '#' | ':' => {
                chars.next();
                let mut word = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if word.is_empty() {
                    return Err(expression_error(format!("dangling '{}'", c)));
                }
                tokens.push(if c == '#' {
                    Token::Name(format!("#{}", word))
                } else {
                    Token::Placeholder(format!(":{}", word))
                });
            },
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(word));
            },
            other => return Err(expression_error(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a HashMap<String, String>,
    values: &'a HashMap<String, AttributeValue>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(expression_error(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn path(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(Token::Name(placeholder)) => self
                .names
                .get(&placeholder)
                .cloned()
                .ok_or_else(|| expression_error(format!("undefined name {}", placeholder))),
            other => Err(expression_error(format!("expected attribute path, found {:?}", other))),
        }
    }

    fn value(&mut self, placeholder: &str) -> Result<AttributeValue> {
        self.values
            .get(placeholder)
            .cloned()
            .ok_or_else(|| expression_error(format!("undefined value {}", placeholder)))
    }

    fn operand(&mut self) -> Result<Operand> {
        match self.peek().cloned() {
            Some(Token::Placeholder(placeholder)) => {
                self.pos += 1;
                Ok(Operand::Value(self.value(&placeholder)?))
            },
            Some(Token::Ident(ref word)) if word.eq_ignore_ascii_case("if_not_exists") => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                let path = self.path()?;
                self.expect(Token::Comma)?;
                let fallback = self.operand()?;
                self.expect(Token::RParen)?;
                Ok(Operand::IfNotExists(path, Box::new(fallback)))
            },
            _ => Ok(Operand::Path(self.path()?)),
        }
    }

    fn set_action(&mut self) -> Result<Action> {
        let path = self.path()?;
        self.expect(Token::Equals)?;
        let left = self.operand()?;
        let value = match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                SetValue::Plus(left, self.operand()?)
            },
            Some(Token::Minus) => {
                self.pos += 1;
                SetValue::Minus(left, self.operand()?)
            },
            _ => SetValue::Operand(left),
        };
        Ok(Action::Set { path, value })
    }

    fn add_action(&mut self) -> Result<Action> {
        let path = self.path()?;
        match self.next() {
            Some(Token::Placeholder(placeholder)) => Ok(Action::Add {
                path,
                operand: self.value(&placeholder)?,
            }),
            other => Err(expression_error(format!(
                "ADD expects a value placeholder, found {:?}",
                other
            ))),
        }
    }

    fn clause(&mut self, keyword: &str, actions: &mut Vec<Action>) -> Result<()> {
        loop {
            let action = match keyword {
                "SET" => self.set_action()?,
                "ADD" => self.add_action()?,
                "REMOVE" => Action::Remove { path: self.path()? },
                other => return Err(expression_error(format!("unsupported clause {}", other))),
            };
            actions.push(action);

            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                return Ok(());
            }
        }
    }
}

impl UpdatePlan {
    /// Parse an expression, resolving `#name` and `:value` placeholders
    pub fn parse(
        expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, AttributeValue>,
    ) -> Result<Self> {
        let mut parser = Parser {
            tokens: tokenize(expression)?,
            pos: 0,
            names,
            values,
        };
        let mut actions = Vec::new();

        while let Some(token) = parser.next() {
            let keyword = match token {
                Token::Ident(keyword) => keyword,
                other => {
                    return Err(expression_error(format!(
                        "expected clause keyword, found {:?}",
                        other
                    )))
                },
            };
            parser.clause(&keyword.to_uppercase(), &mut actions)?;
        }

        if actions.is_empty() {
            return Err(expression_error("empty update expression"));
        }

        let mut seen = HashSet::new();
        for path in actions.iter().map(Action::path) {
            if !seen.insert(path) {
                return Err(expression_error(format!("path '{}' is updated more than once", path)));
            }
        }

        Ok(Self { actions })
    }

    /// Attribute names written or removed by this plan
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(Action::path)
    }

    /// Apply the plan to `item` in place
    pub fn apply(&self, item: &mut Item) -> Result<()> {
        let before = item.clone();

        for action in &self.actions {
            match action {
                Action::Set { path, value } => {
                    let new_value = match value {
                        SetValue::Operand(op) => resolve(op, &before)?,
                        SetValue::Plus(a, b) => {
                            let (a, b) = numbers(resolve(a, &before)?, resolve(b, &before)?)?;
                            AttributeValue::N(a + b)
                        },
                        SetValue::Minus(a, b) => {
                            let (a, b) = numbers(resolve(a, &before)?, resolve(b, &before)?)?;
                            AttributeValue::N(a - b)
                        },
                    };
                    item.insert(path.clone(), new_value);
                },
                Action::Add { path, operand } => {
                    let increment = operand.as_number().ok_or_else(|| {
                        expression_error(format!(
                            "ADD on '{}' needs a number, got {}",
                            path,
                            operand.type_name()
                        ))
                    })?;
                    let total = match before.get(path) {
                        None => increment.clone(),
                        Some(AttributeValue::N(current)) => current + increment,
                        Some(other) => {
                            return Err(expression_error(format!(
                                "ADD on '{}' needs a number attribute, found {}",
                                path,
                                other.type_name()
                            )))
                        },
                    };
                    item.insert(path.clone(), AttributeValue::N(total));
                },
                Action::Remove { path } => {
                    item.remove(path);
                },
            }
        }

        Ok(())
    }
}

impl Action {
    fn path(&self) -> &str {
        match self {
            Action::Set { path, .. } | Action::Add { path, .. } | Action::Remove { path } => path,
        }
    }
}

fn resolve(operand: &Operand, item: &Item) -> Result<AttributeValue> {
    match operand {
        Operand::Value(value) => Ok(value.clone()),
        Operand::Path(path) => item.get(path).cloned().ok_or_else(|| {
            expression_error(format!("attribute '{}' does not exist in the item", path))
        }),
        Operand::IfNotExists(path, fallback) => match item.get(path) {
            Some(value) => Ok(value.clone()),
            None => resolve(fallback, item),
        },
    }
}

fn numbers(
    a: AttributeValue,
    b: AttributeValue,
) -> Result<(bigdecimal::BigDecimal, bigdecimal::BigDecimal)> {
    match (a, b) {
        (AttributeValue::N(a), AttributeValue::N(b)) => Ok((a, b)),
        (a, b) => Err(expression_error(format!(
            "arithmetic needs numbers, got {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}
