//! Recursive-descent parser over the lexer's token stream.
//!
//! Grammar (§4.2):
//! ```text
//! program   := statement*
//! statement := resource | variable | data | output | module
//! resource  := "resource" STRING STRING "{" attr* "}"
//! data      := "data"     STRING STRING "{" attr* "}"
//! variable  := "variable" STRING        "{" attr* "}"
//! module    := "module"   STRING        "{" attr* "}"
//! output    := "output"   STRING        "{" "value" "=" value "}"
//! attr      := IDENT "=" value
//! value     := STRING | NUMBER | BOOL | reference | list | map
//! reference := IDENT ("." IDENT)+
//! list      := "[" (value ("," value)*)? "]"
//! map       := "{" (mapentry)* "}"
//! ```
//! The parser is pure: the same token stream always yields the same AST.

use crate::ast::*;
use crate::error::{MiniformError, Result};
use crate::lexer::{Token, TokenKind};

pub fn parse(tokens: &[Token]) -> Result<Program> {
    let mut p = Parser { tokens, pos: 0 };
    let mut program = Vec::new();
    while !p.at_eof() {
        program.push(p.statement()?);
    }
    Ok(program)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> MiniformError {
        let tok = self.peek();
        MiniformError::ParseError {
            line: tok.line,
            col: tok.col,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err(format!(
                "expected {:?}, found {:?}",
                kind,
                self.peek().kind
            )))
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.err(format!("expected string literal, found {:?}", other))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.err(format!("expected identifier, found {:?}", other))),
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        match self.peek().kind.clone() {
            TokenKind::Resource => self.resource(),
            TokenKind::Data => self.data(),
            TokenKind::Variable => self.variable(),
            TokenKind::Module => self.module(),
            TokenKind::Output => self.output(),
            other => Err(self.err(format!(
                "expected a top-level block (resource/variable/data/module/output), found {:?}",
                other
            ))),
        }
    }

    fn resource(&mut self) -> Result<Statement> {
        self.expect(&TokenKind::Resource)?;
        let resource_type = self.expect_string()?;
        let name = self.expect_string()?;
        let attrs = self.attr_block()?;
        Ok(Statement::Resource(ResourceStmt {
            resource_type,
            name,
            attrs,
        }))
    }

    fn data(&mut self) -> Result<Statement> {
        self.expect(&TokenKind::Data)?;
        let data_type = self.expect_string()?;
        let name = self.expect_string()?;
        let attrs = self.attr_block()?;
        Ok(Statement::Data(DataStmt {
            data_type,
            name,
            attrs,
        }))
    }

    fn variable(&mut self) -> Result<Statement> {
        self.expect(&TokenKind::Variable)?;
        let name = self.expect_string()?;
        let attrs = self.attr_block()?;
        Ok(Statement::Variable(VariableStmt { name, attrs }))
    }

    fn module(&mut self) -> Result<Statement> {
        self.expect(&TokenKind::Module)?;
        let name = self.expect_string()?;
        let attrs = self.attr_block()?;
        Ok(Statement::Module(ModuleStmt { name, attrs }))
    }

    fn output(&mut self) -> Result<Statement> {
        self.expect(&TokenKind::Output)?;
        let name = self.expect_string()?;
        self.expect(&TokenKind::LBrace)?;
        let value_ident = self.expect_ident()?;
        if value_ident != "value" {
            return Err(self.err(format!(
                "output block must contain exactly 'value = ...', found '{}'",
                value_ident
            )));
        }
        self.expect(&TokenKind::Equals)?;
        let value = self.value()?;
        self.expect(&TokenKind::RBrace)?;
        Ok(Statement::Output(OutputStmt { name, value }))
    }

    fn attr_block(&mut self) -> Result<Attributes> {
        self.expect(&TokenKind::LBrace)?;
        let mut attrs = Attributes::new();
        while !matches!(self.peek().kind, TokenKind::RBrace) {
            let (key, value) = self.attr()?;
            attrs.insert(key, value);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(attrs)
    }

    fn attr(&mut self) -> Result<(String, Expression)> {
        let key = self.expect_ident()?;
        self.expect(&TokenKind::Equals)?;
        let value = self.value()?;
        Ok((key, value))
    }

    fn value(&mut self) -> Result<Expression> {
        match self.peek().kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(Expression::String(s))
            }
            TokenKind::Number(n) => {
                self.advance();
                let parsed: f64 = n
                    .parse()
                    .map_err(|_| self.err(format!("invalid number literal '{}'", n)))?;
                Ok(Expression::Number(parsed))
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expression::Boolean(b))
            }
            TokenKind::Ident(_) => self.reference(),
            TokenKind::LBracket => self.list(),
            TokenKind::LBrace => self.map(),
            other => Err(self.err(format!("expected a value, found {:?}", other))),
        }
    }

    fn reference(&mut self) -> Result<Expression> {
        let first = self.expect_ident()?;
        let mut parts = vec![first];
        if !matches!(self.peek().kind, TokenKind::Dot) {
            return Err(self.err(
                "a bare identifier is not a valid value; references must have at least one '.'",
            ));
        }
        while matches!(self.peek().kind, TokenKind::Dot) {
            self.advance();
            parts.push(self.expect_ident()?);
        }
        Ok(Expression::Reference(parts))
    }

    fn list(&mut self) -> Result<Expression> {
        self.expect(&TokenKind::LBracket)?;
        let mut items = Vec::new();
        if !matches!(self.peek().kind, TokenKind::RBracket) {
            items.push(self.value()?);
            while matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
                if matches!(self.peek().kind, TokenKind::RBracket) {
                    break;
                }
                items.push(self.value()?);
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expression::List(items))
    }

    fn map(&mut self) -> Result<Expression> {
        self.expect(&TokenKind::LBrace)?;
        let mut entries = std::collections::HashMap::new();
        while !matches!(self.peek().kind, TokenKind::RBrace) {
            let key = match self.peek().kind.clone() {
                TokenKind::Ident(s) => {
                    self.advance();
                    s
                }
                TokenKind::String(s) => {
                    self.advance();
                    s
                }
                other => {
                    return Err(self.err(format!("expected map key, found {:?}", other)));
                }
            };
            self.expect(&TokenKind::Equals)?;
            let value = self.value()?;
            entries.insert(key, value);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expression::Map(entries))
    }
}
