//! Recursive-descent parser for Kyra source. See spec.md §4.5.
//!
//! Unlike line-oriented assembly, Kyra statements are delimited by explicit
//! punctuation, so the parser walks the token stream directly rather than
//! grouping by line first.

pub mod ast;

use crate::error::{Error, ParseError, ParseErrorKind, Span};
use crate::lexer::token::{Token, TokenKind};
use ast::{Arg, Call, GlobalEntry, SourceFile, Stmt};

pub fn parse(tokens: &[Token]) -> Result<SourceFile, Error> {
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_source_file()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, kind: ParseErrorKind, message: impl Into<String>) -> Error {
        ParseError { kind, message: message.into(), span: self.span() }.into()
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<(), Error> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.err(ParseErrorKind::UnexpectedToken, message))
        }
    }

    fn expect_ident(&mut self, message: &str) -> Result<String, Error> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.err(ParseErrorKind::UnexpectedToken, message)),
        }
    }

    fn parse_source_file(&mut self) -> Result<SourceFile, Error> {
        let strings = self.parse_strings_decl()?;

        let globals = if self.at_ident("globals") || self.at_ident("entries") {
            Some(self.parse_globals_decl()?)
        } else {
            None
        };

        let mut statements = Vec::new();
        while *self.peek() != TokenKind::Eof {
            statements.push(self.parse_statement()?);
        }

        Ok(SourceFile { strings, globals, statements })
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(n) if n == name)
    }

    fn parse_strings_decl(&mut self) -> Result<Vec<(String, String)>, Error> {
        let name = self.expect_ident("expected `strings` declaration")?;
        if name != "strings" {
            return Err(self.err(ParseErrorKind::UnexpectedToken, "expected `strings` declaration"));
        }
        self.expect(TokenKind::Equals, "expected `=` after `strings`")?;
        self.expect(TokenKind::LBrace, "expected `{` to open `strings` block")?;

        let mut entries = Vec::new();
        while *self.peek() != TokenKind::RBrace {
            let key = self.expect_ident("expected a string key")?;
            if entries.iter().any(|(k, _): &(String, String)| k == &key) {
                return Err(self.err(ParseErrorKind::DuplicateLabel, format!("duplicate string key `{key}`")));
            }
            self.expect(TokenKind::Colon, "expected `:` after string key")?;
            let value = match self.peek().clone() {
                TokenKind::StringLit(s) => {
                    self.advance();
                    s
                }
                _ => return Err(self.err(ParseErrorKind::UnexpectedToken, "expected a string literal value")),
            };
            entries.push((key, value));
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "expected `}` to close `strings` block")?;
        Ok(entries)
    }

    fn parse_globals_decl(&mut self) -> Result<Vec<GlobalEntry>, Error> {
        self.advance(); // `globals` or `entries`
        self.expect(TokenKind::Equals, "expected `=` after `globals`")?;
        self.expect(TokenKind::LBracket, "expected `[` to open `globals` list")?;

        let mut entries = Vec::new();
        while *self.peek() != TokenKind::RBracket {
            match self.peek().clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    entries.push(GlobalEntry::Name(name));
                }
                TokenKind::Number(n) => {
                    self.advance();
                    entries.push(GlobalEntry::Number(n));
                }
                _ => return Err(self.err(ParseErrorKind::UnexpectedToken, "expected a label name or PC number")),
            }
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "expected `]` to close `globals` list")?;
        Ok(entries)
    }

    fn parse_statement(&mut self) -> Result<Stmt, Error> {
        let start_span = self.span();

        if self.at_ident("label") {
            self.advance();
            let name = self.expect_ident("expected a label name after `label`")?;
            return Ok(Stmt::Label { name, span: start_span });
        }

        if self.at_ident("return") {
            self.advance();
            let expr = self.parse_arg()?;
            let drop = if *self.peek() == TokenKind::Comma {
                self.advance();
                let name = self.expect_ident("expected `drop` after `,`")?;
                if name != "drop" {
                    return Err(self.err(ParseErrorKind::UnexpectedToken, "expected `drop(N)` after `,`"));
                }
                self.expect(TokenKind::LParen, "expected `(` after `drop`")?;
                let n = self.expect_number("expected a drop count")?;
                self.expect(TokenKind::RParen, "expected `)` after drop count")?;
                Some(n)
            } else {
                None
            };
            return Ok(Stmt::Return { expr, drop, span: start_span });
        }

        let name = self.expect_ident("expected a label or call")?;

        if *self.peek() == TokenKind::Colon {
            self.advance();
            return Ok(Stmt::Label { name, span: start_span });
        }

        let args = self.parse_call_args()?;
        Ok(Stmt::Call(Call { name, args, span: start_span }))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Arg>, Error> {
        self.expect(TokenKind::LParen, "expected `(` to open argument list")?;
        let mut args = Vec::new();
        while *self.peek() != TokenKind::RParen {
            args.push(self.parse_arg()?);
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "expected `)` to close argument list")?;
        Ok(args)
    }

    fn parse_arg(&mut self) -> Result<Arg, Error> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Arg::Number(n))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if *self.peek() == TokenKind::LParen {
                    let args = self.parse_call_args()?;
                    Ok(Arg::Call(Call { name, args, span: self.span() }))
                } else {
                    Ok(Arg::Ident(name))
                }
            }
            _ => Err(self.err(ParseErrorKind::UnexpectedToken, "expected a number, identifier, or call")),
        }
    }

    fn expect_number(&mut self, message: &str) -> Result<i64, Error> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.err(ParseErrorKind::UnexpectedToken, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> SourceFile {
        let lexed = tokenize(src);
        assert!(lexed.errors.is_empty(), "lex errors: {:?}", lexed.errors);
        parse(&lexed.tokens).unwrap()
    }

    #[test]
    fn parses_empty_program() {
        let file = parse_src("strings = {}\n\nglobals = [global_0]\n\nlabel global_0\njmp(0, global_0)\n");
        assert_eq!(file.strings, vec![]);
        assert_eq!(file.globals, Some(vec![GlobalEntry::Name("global_0".into())]));
        assert_eq!(file.statements.len(), 2);
    }

    #[test]
    fn parses_strings_and_call_with_string_key() {
        let file = parse_src("strings = {\n    s_hi: 'Hello',\n}\n\nspeak(0x01, 0x02, s_hi)\n");
        assert_eq!(file.strings, vec![("s_hi".to_string(), "Hello".to_string())]);
        match &file.statements[0] {
            Stmt::Call(call) => {
                assert_eq!(call.name, "speak");
                assert_eq!(call.args, vec![Arg::Number(1), Arg::Number(2), Arg::Ident("s_hi".into())]);
            }
            _ => panic!("expected a call statement"),
        }
    }

    #[test]
    fn parses_return_with_drop() {
        let file = parse_src("strings = {}\n\nreturn acc, drop(3)\n");
        match &file.statements[0] {
            Stmt::Return { expr, drop, .. } => {
                assert_eq!(*expr, Arg::Ident("acc".into()));
                assert_eq!(*drop, Some(3));
            }
            _ => panic!("expected a return statement"),
        }
    }

    #[test]
    fn rejects_duplicate_string_keys() {
        let lexed = tokenize("strings = {\n    s0: 'a',\n    s0: 'b',\n}\n");
        assert!(parse(&lexed.tokens).is_err());
    }
}
