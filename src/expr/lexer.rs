//! Tokenizer for filter expressions.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    PipeEq,
    AmpEq,
    LParen,
    RParen,
    Comma,
    Eof,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(Error::ExpressionParse(format!(
                        "unexpected '=' at position {i}, did you mean '=='?"
                    )));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => match chars.get(i + 1) {
                Some('&') => {
                    tokens.push(Token::AndAnd);
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::AmpEq);
                    i += 2;
                }
                _ => return Err(Error::ExpressionParse(format!("unexpected '&' at position {i}"))),
            },
            '|' => match chars.get(i + 1) {
                Some('|') => {
                    tokens.push(Token::OrOr);
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::PipeEq);
                    i += 2;
                }
                _ => return Err(Error::ExpressionParse(format!("unexpected '|' at position {i}"))),
            },
            '"' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '"' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(Error::ExpressionParse("unterminated string literal".into()));
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                let mut is_float = false;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    if chars[j] == '.' {
                        is_float = true;
                    }
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                if is_float {
                    let v: f64 = text
                        .parse()
                        .map_err(|_| Error::ExpressionParse(format!("bad float literal {text}")))?;
                    tokens.push(Token::Float(v));
                } else {
                    let v: i64 = text
                        .parse()
                        .map_err(|_| Error::ExpressionParse(format!("bad integer literal {text}")))?;
                    tokens.push(Token::Int(v));
                }
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                tokens.push(Token::Ident(chars[start..j].iter().collect()));
                i = j;
            }
            other => {
                return Err(Error::ExpressionParse(format!(
                    "unexpected character '{other}' at position {i}"
                )))
            }
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}
