//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, loosest first: sequence (`;`), assignment and arrow
//! functions, conditional, `??`, `||`, `&&`, equality, relational, additive,
//! multiplicative, prefix unary, postfix update, member access and calls.

use std::rc::Rc;

use crate::error::CompileError;

use super::ast::{AssignOp, BinaryOp, Expr, LogicalOp, UnaryOp};
use super::lexer::{tokenize, Punct, Token, TokenKind};

/// Parse a complete expression.
pub fn parse(src: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.sequence()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        other => Err(parser.error(format!("Unexpected {}", describe(other)))),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(_) => "number".to_string(),
        TokenKind::String(_) => "string".to_string(),
        TokenKind::Ident(name) => format!("identifier '{name}'"),
        TokenKind::Punct(p) => format!("token {p:?}"),
        TokenKind::Eof => "end of input".to_string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.offset())
    }

    fn check(&self, punct: Punct) -> bool {
        *self.peek() == TokenKind::Punct(punct)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct) -> Result<(), CompileError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected {punct:?}, found {}",
                describe(self.peek())
            )))
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements and assignment
    // ═══════════════════════════════════════════════════════════════════

    fn sequence(&mut self) -> Result<Expr, CompileError> {
        let mut items = vec![self.assignment()?];
        while self.eat(Punct::Semicolon) {
            if matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            items.push(self.assignment()?);
        }
        Ok(match items.len() {
            1 => items.remove(0),
            _ => Expr::Sequence(items),
        })
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        if let Some(params) = self.arrow_params() {
            let body = self.assignment()?;
            return Ok(Expr::Arrow {
                params,
                body: Rc::new(body),
            });
        }

        let offset = self.offset();
        let target = self.conditional()?;

        let op = match self.peek() {
            TokenKind::Punct(Punct::Assign) => AssignOp::Assign,
            TokenKind::Punct(Punct::PlusAssign) => AssignOp::Add,
            TokenKind::Punct(Punct::MinusAssign) => AssignOp::Sub,
            TokenKind::Punct(Punct::StarAssign) => AssignOp::Mul,
            TokenKind::Punct(Punct::SlashAssign) => AssignOp::Div,
            TokenKind::Punct(Punct::PercentAssign) => AssignOp::Rem,
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(CompileError::new("Invalid assignment target", offset));
        }
        self.advance();

        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// Consume an arrow-function head if one starts here.
    fn arrow_params(&mut self) -> Option<Vec<String>> {
        if let TokenKind::Ident(name) = self.peek() {
            if *self.peek_at(1) == TokenKind::Punct(Punct::Arrow) {
                let name = name.clone();
                self.pos += 2;
                return Some(vec![name]);
            }
            return None;
        }

        if !self.check(Punct::LParen) {
            return None;
        }

        let mut params = Vec::new();
        let mut ahead = 1;
        loop {
            match self.peek_at(ahead) {
                TokenKind::Punct(Punct::RParen) => break,
                TokenKind::Ident(name) => {
                    params.push(name.clone());
                    ahead += 1;
                    match self.peek_at(ahead) {
                        TokenKind::Punct(Punct::Comma) => ahead += 1,
                        TokenKind::Punct(Punct::RParen) => break,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }

        if *self.peek_at(ahead + 1) != TokenKind::Punct(Punct::Arrow) {
            return None;
        }
        self.pos += ahead + 2;
        Some(params)
    }

    fn conditional(&mut self) -> Result<Expr, CompileError> {
        let test = self.binary(0)?;
        if !self.eat(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect(Punct::Colon)?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Binary operators
    // ═══════════════════════════════════════════════════════════════════

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, CompileError> {
        let mut left = self.unary()?;

        while let Some((precedence, op)) = self.binary_operator() {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.binary(precedence + 1)?;
            left = match op {
                Operator::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    fn binary_operator(&self) -> Option<(u8, Operator)> {
        let TokenKind::Punct(punct) = self.peek() else {
            return None;
        };
        Some(match punct {
            Punct::Nullish => (0, Operator::Logical(LogicalOp::Nullish)),
            Punct::OrOr => (1, Operator::Logical(LogicalOp::Or)),
            Punct::AndAnd => (2, Operator::Logical(LogicalOp::And)),
            Punct::EqEq => (3, Operator::Binary(BinaryOp::LooseEq)),
            Punct::NotEq => (3, Operator::Binary(BinaryOp::LooseNe)),
            Punct::EqEqEq => (3, Operator::Binary(BinaryOp::StrictEq)),
            Punct::NotEqEq => (3, Operator::Binary(BinaryOp::StrictNe)),
            Punct::Lt => (4, Operator::Binary(BinaryOp::Lt)),
            Punct::Le => (4, Operator::Binary(BinaryOp::Le)),
            Punct::Gt => (4, Operator::Binary(BinaryOp::Gt)),
            Punct::Ge => (4, Operator::Binary(BinaryOp::Ge)),
            Punct::Plus => (5, Operator::Binary(BinaryOp::Add)),
            Punct::Minus => (5, Operator::Binary(BinaryOp::Sub)),
            Punct::Star => (6, Operator::Binary(BinaryOp::Mul)),
            Punct::Slash => (6, Operator::Binary(BinaryOp::Div)),
            Punct::Percent => (6, Operator::Binary(BinaryOp::Rem)),
            _ => return None,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Unary, postfix and member access
    // ═══════════════════════════════════════════════════════════════════

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::Not),
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            TokenKind::Ident(name) if name == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        if self.check(Punct::PlusPlus) || self.check(Punct::MinusMinus) {
            let increment = self.check(Punct::PlusPlus);
            self.advance();
            let offset = self.offset();
            let target = self.unary()?;
            if !target.is_assignable() {
                return Err(CompileError::new("Invalid update target", offset));
            }
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        let expr = self.call_member()?;
        if self.check(Punct::PlusPlus) || self.check(Punct::MinusMinus) {
            if !expr.is_assignable() {
                return Err(CompileError::new("Invalid update target", offset));
            }
            let increment = self.check(Punct::PlusPlus);
            self.advance();
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn call_member(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;

        loop {
            if self.eat(Punct::Dot) {
                let property = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat(Punct::OptionalDot) {
                if self.eat(Punct::LBracket) {
                    let index = self.sequence()?;
                    self.expect(Punct::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    };
                } else if self.eat(Punct::LParen) {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else {
                    let property = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat(Punct::LBracket) {
                let index = self.sequence()?;
                self.expect(Punct::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.eat(Punct::LParen) {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn property_name(&mut self) -> Result<String, CompileError> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(self.error(format!(
                "Expected property name, found {}",
                describe(&other)
            ))),
        }
    }

    /// Arguments after `(`, through the closing `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        while !self.eat(Punct::RParen) {
            args.push(self.assignment()?);
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Primaries
    // ═══════════════════════════════════════════════════════════════════

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::String(s) => Ok(Expr::String(Rc::from(s))),
            TokenKind::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                "undefined" => Expr::Undefined,
                "this" => Expr::This,
                _ => Expr::Ident(name),
            }),
            TokenKind::Punct(Punct::LParen) => {
                let inner = self.sequence()?;
                self.expect(Punct::RParen)?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBracket) => {
                let mut items = Vec::new();
                while !self.eat(Punct::RBracket) {
                    items.push(self.assignment()?);
                    if !self.eat(Punct::Comma) {
                        self.expect(Punct::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            TokenKind::Punct(Punct::LBrace) => self.object_literal(),
            TokenKind::Eof => Err(CompileError::new("Unexpected end of input", offset)),
            other => Err(CompileError::new(
                format!("Unexpected {}", describe(&other)),
                offset,
            )),
        }
    }

    /// Object literal body after `{`. Keys are identifiers, strings or
    /// numbers; `{ name }` is shorthand for `{ name: name }`.
    fn object_literal(&mut self) -> Result<Expr, CompileError> {
        let mut entries = Vec::new();
        while !self.eat(Punct::RBrace) {
            let offset = self.offset();
            let key = match self.advance() {
                TokenKind::Ident(name) => name,
                TokenKind::String(s) => s,
                TokenKind::Number(n) => crate::store::format_number(n),
                other => {
                    return Err(CompileError::new(
                        format!("Expected property key, found {}", describe(&other)),
                        offset,
                    ))
                }
            };

            let value = if self.eat(Punct::Colon) {
                self.assignment()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));

            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace)?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}
