//! # Kyra Lexer
//!
//! Hand-written tokenizer for Kyra source. See spec.md §4.4.
//!
//! Skips whitespace and `#` line comments (the pragma scanner reads those
//! same comment lines separately, over the raw source, before this runs).
//! Tokens: `IDENT`, `NUMBER` (decimal or `0x`-prefixed hex, optional leading
//! `-`), single-quoted `STRING` with escapes `\\ \' \n \r \t \xHH`, and the
//! punctuation set `()[]{},=:`.

pub mod cursor;
pub mod token;

use crate::error::{LexError, LexErrorKind, Span};
use cursor::Cursor;
use token::{Token, TokenKind};

pub struct LexResult {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

#[must_use]
pub fn tokenize(source: &str) -> LexResult {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    loop {
        match lex_token(&mut cursor) {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => {
                if cursor.is_at_end() {
                    break;
                }
            }
            Err(err) => errors.push(err),
        }
    }

    let (b, l, c) = cursor.current_pos();
    tokens.push(Token { kind: TokenKind::Eof, lexeme: String::new(), span: Span { start: b, end: b, line: l, col: c } });

    LexResult { tokens, errors }
}

fn lex_token(cursor: &mut Cursor) -> Result<Option<Token>, LexError> {
    loop {
        match cursor.peek() {
            Some(' ' | '\t' | '\n' | '\r') => {
                cursor.advance();
            }
            Some('#') => {
                while !matches!(cursor.peek(), None | Some('\n')) {
                    cursor.advance();
                }
            }
            _ => break,
        }
    }

    if cursor.is_at_end() {
        return Ok(None);
    }

    let (sb, sl, sc) = cursor.current_pos();
    let ch = cursor.peek().unwrap();

    let simple = match ch {
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        '[' => Some(TokenKind::LBracket),
        ']' => Some(TokenKind::RBracket),
        '{' => Some(TokenKind::LBrace),
        '}' => Some(TokenKind::RBrace),
        ',' => Some(TokenKind::Comma),
        '=' => Some(TokenKind::Equals),
        ':' => Some(TokenKind::Colon),
        _ => None,
    };
    if let Some(kind) = simple {
        cursor.advance();
        return Ok(Some(Token { kind, lexeme: ch.to_string(), span: cursor.make_span(sb, sl, sc) }));
    }

    match ch {
        '\'' => lex_string(cursor, sb, sl, sc),
        '-' | '0'..='9' => lex_number(cursor, sb, sl, sc),
        c if c.is_ascii_alphabetic() || c == '_' => Ok(Some(lex_ident(cursor, sb, sl, sc))),
        _ => {
            cursor.advance();
            Err(LexError {
                kind: LexErrorKind::UnexpectedCharacter,
                message: format!("unexpected character '{ch}'"),
                span: cursor.make_span(sb, sl, sc),
            })
        }
    }
}

fn lex_ident(cursor: &mut Cursor, sb: usize, sl: usize, sc: usize) -> Token {
    let mut word = String::new();
    while matches!(cursor.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
        word.push(cursor.advance().unwrap());
    }
    Token { kind: TokenKind::Ident(word.clone()), lexeme: word, span: cursor.make_span(sb, sl, sc) }
}

fn lex_number(cursor: &mut Cursor, sb: usize, sl: usize, sc: usize) -> Result<Option<Token>, LexError> {
    let mut raw = String::new();
    let mut negative = false;
    if cursor.peek() == Some('-') {
        negative = true;
        raw.push(cursor.advance().unwrap());
    }

    if cursor.peek() == Some('0') && matches!(cursor.peek_at(1), Some('x' | 'X')) {
        raw.push(cursor.advance().unwrap());
        raw.push(cursor.advance().unwrap());
        let mut digits = String::new();
        while matches!(cursor.peek(), Some(c) if c.is_ascii_hexdigit()) {
            let c = cursor.advance().unwrap();
            digits.push(c);
            raw.push(c);
        }
        if digits.is_empty() {
            return Err(LexError {
                kind: LexErrorKind::UnexpectedCharacter,
                message: "expected hex digits after 0x".to_string(),
                span: cursor.make_span(sb, sl, sc),
            });
        }
        let value = i64::from_str_radix(&digits, 16).map_err(|_| LexError {
            kind: LexErrorKind::UnexpectedCharacter,
            message: format!("invalid hex literal: {raw}"),
            span: cursor.make_span(sb, sl, sc),
        })?;
        let value = if negative { -value } else { value };
        return Ok(Some(Token { kind: TokenKind::Number(value), lexeme: raw, span: cursor.make_span(sb, sl, sc) }));
    }

    let mut digits = String::new();
    while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
        let c = cursor.advance().unwrap();
        digits.push(c);
        raw.push(c);
    }
    if digits.is_empty() {
        return Err(LexError {
            kind: LexErrorKind::UnexpectedCharacter,
            message: "expected digits".to_string(),
            span: cursor.make_span(sb, sl, sc),
        });
    }
    let value: i64 = raw.parse().map_err(|_| LexError {
        kind: LexErrorKind::UnexpectedCharacter,
        message: format!("invalid decimal literal: {raw}"),
        span: cursor.make_span(sb, sl, sc),
    })?;
    Ok(Some(Token { kind: TokenKind::Number(value), lexeme: raw, span: cursor.make_span(sb, sl, sc) }))
}

fn lex_string(cursor: &mut Cursor, sb: usize, sl: usize, sc: usize) -> Result<Option<Token>, LexError> {
    cursor.advance();
    let mut processed = String::new();
    let mut raw = String::from("'");

    loop {
        match cursor.peek() {
            None => {
                return Err(LexError {
                    kind: LexErrorKind::UnterminatedString,
                    message: "unterminated string literal".to_string(),
                    span: cursor.make_span(sb, sl, sc),
                })
            }
            Some('\'') => {
                cursor.advance();
                raw.push('\'');
                break;
            }
            Some('\\') => {
                cursor.advance();
                raw.push('\\');
                match cursor.peek() {
                    Some('\\') => {
                        processed.push('\\');
                        raw.push(cursor.advance().unwrap());
                    }
                    Some('\'') => {
                        processed.push('\'');
                        raw.push(cursor.advance().unwrap());
                    }
                    Some('n') => {
                        processed.push('\n');
                        raw.push(cursor.advance().unwrap());
                    }
                    Some('r') => {
                        processed.push('\r');
                        raw.push(cursor.advance().unwrap());
                    }
                    Some('t') => {
                        processed.push('\t');
                        raw.push(cursor.advance().unwrap());
                    }
                    Some('x') => {
                        raw.push(cursor.advance().unwrap());
                        let hi = cursor.peek().filter(char::is_ascii_hexdigit).ok_or_else(|| LexError {
                            kind: LexErrorKind::InvalidEscape,
                            message: "invalid \\x escape".to_string(),
                            span: cursor.make_span(sb, sl, sc),
                        })?;
                        raw.push(cursor.advance().unwrap());
                        let lo = cursor.peek().filter(char::is_ascii_hexdigit).ok_or_else(|| LexError {
                            kind: LexErrorKind::InvalidEscape,
                            message: "invalid \\x escape".to_string(),
                            span: cursor.make_span(sb, sl, sc),
                        })?;
                        raw.push(cursor.advance().unwrap());
                        let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16).unwrap();
                        processed.push(byte as char);
                    }
                    _ => {
                        return Err(LexError {
                            kind: LexErrorKind::InvalidEscape,
                            message: "invalid escape sequence".to_string(),
                            span: cursor.make_span(sb, sl, sc),
                        })
                    }
                }
            }
            Some(c) => {
                processed.push(c);
                raw.push(cursor.advance().unwrap());
            }
        }
    }

    Ok(Some(Token { kind: TokenKind::StringLit(processed), lexeme: raw, span: cursor.make_span(sb, sl, sc) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_strings_decl() {
        let toks = kinds("strings = {\n    s000: 'hi',\n}\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("strings".into()),
                TokenKind::Equals,
                TokenKind::LBrace,
                TokenKind::Ident("s000".into()),
                TokenKind::Colon,
                TokenKind::StringLit("hi".into()),
                TokenKind::Comma,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let toks = kinds("# a comment\nfoo(1)\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("foo".into()),
                TokenKind::LParen,
                TokenKind::Number(1),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_hex_and_negative_numbers() {
        assert_eq!(kinds("0x1a"), vec![TokenKind::Number(26), TokenKind::Eof]);
        assert_eq!(kinds("-5"), vec![TokenKind::Number(-5), TokenKind::Eof]);
    }

    #[test]
    fn decodes_string_escapes() {
        let toks = tokenize("'a\\nb\\x41'").tokens;
        assert_eq!(toks[0].kind, TokenKind::StringLit("a\nbA".into()));
    }

    #[test]
    fn rejects_unterminated_string() {
        let result = tokenize("'abc");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn rejects_bad_escape() {
        let result = tokenize("'\\q'");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::InvalidEscape);
    }
}
