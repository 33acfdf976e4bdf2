//! Pratt parser turning a token stream into an `Ast`, grounded on a standard
//! binding-power table rather than any teacher source — the teacher has no
//! expression language, so this is built from general recursive-descent
//! practice rather than adapted from pack code.

use super::ast::{Ast, BinOp, UnOp};
use super::lexer::{tokenize, Token};
use crate::error::{Error, Result};

pub fn parse(input: &str) -> Result<Ast> {
    let tokens = tokenize(input)?;
    let mut p = Parser { tokens, pos: 0 };
    let ast = p.parse_expr(0)?;
    p.expect(&Token::Eof)?;
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: &Token) -> Result<()> {
        if self.peek() == t {
            self.advance();
            Ok(())
        } else {
            Err(Error::ExpressionParse(format!(
                "expected {t:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Ast> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let (op, lbp, rbp) = match binop_for(self.peek()) {
                Some(t) => t,
                None => break,
            };
            if lbp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(rbp)?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Ast> {
        match self.advance() {
            Token::Minus => Ok(Ast::Unary(UnOp::Neg, Box::new(self.parse_expr(9)?))),
            Token::Bang => Ok(Ast::Unary(UnOp::Not, Box::new(self.parse_expr(9)?))),
            Token::Int(v) => Ok(Ast::Int(v)),
            Token::Float(v) => Ok(Ast::Float(v)),
            Token::Str(s) => Ok(Ast::Str(s)),
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if *self.peek() == Token::Comma {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Ast::Call(name, args))
                } else {
                    Ok(Ast::Ident(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(Error::ExpressionParse(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }
}

/// Binding power table: `(op, left_bp, right_bp)`. Higher binds tighter.
fn binop_for(t: &Token) -> Option<(BinOp, u8, u8)> {
    Some(match t {
        Token::OrOr => (BinOp::Or, 1, 2),
        Token::AndAnd => (BinOp::And, 3, 4),
        Token::EqEq => (BinOp::Eq, 5, 6),
        Token::NotEq => (BinOp::Ne, 5, 6),
        Token::Lt => (BinOp::Lt, 5, 6),
        Token::Le => (BinOp::Le, 5, 6),
        Token::Gt => (BinOp::Gt, 5, 6),
        Token::Ge => (BinOp::Ge, 5, 6),
        Token::PipeEq => (BinOp::PipeMatch, 5, 6),
        Token::AmpEq => (BinOp::AmpMatch, 5, 6),
        Token::Plus => (BinOp::Add, 7, 8),
        Token::Minus => (BinOp::Sub, 7, 8),
        Token::Star => (BinOp::Mul, 9, 10),
        Token::Slash => (BinOp::Div, 9, 10),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let ast = parse("1 + 2 * 3").expect("parse");
        match ast {
            Ast::Binary(BinOp::Add, lhs, rhs) => {
                assert!(matches!(*lhs, Ast::Int(1)));
                assert!(matches!(*rhs, Ast::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_custom_operators_and_calls() {
        let ast = parse(r#"alt |= "A" && ishomref(gt)"#).expect("parse");
        assert!(matches!(ast, Ast::Binary(BinOp::And, _, _)));
    }

    #[test]
    fn rejects_single_equals() {
        assert!(parse("a = 1").is_err());
    }
}
