//! Tokeniser for the `.mf` configuration language.
//!
//! Produces a flat, position-tagged token stream. No escape processing inside
//! string literals beyond what a plain scan captures — the raw text between
//! quotes is the value.

use crate::error::{MiniformError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Resource,
    Variable,
    Output,
    Module,
    Data,
    Ident(String),
    String(String),
    Number(String),
    Boolean(bool),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Dot,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

pub fn lex(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut col = 1usize;

    let advance = |i: &mut usize, line: &mut usize, col: &mut usize, chars: &[char]| {
        if chars[*i] == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
        *i += 1;
    };

    while i < chars.len() {
        let c = chars[i];

        // whitespace
        if c.is_whitespace() {
            advance(&mut i, &mut line, &mut col, &chars);
            continue;
        }

        // comments: # ... EOL  or // ... EOL
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                advance(&mut i, &mut line, &mut col, &chars);
            }
            continue;
        }
        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            while i < chars.len() && chars[i] != '\n' {
                advance(&mut i, &mut line, &mut col, &chars);
            }
            continue;
        }

        let start_line = line;
        let start_col = col;

        match c {
            '{' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::LBrace,
                    line: start_line,
                    col: start_col,
                });
            }
            '}' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::RBrace,
                    line: start_line,
                    col: start_col,
                });
            }
            '[' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::LBracket,
                    line: start_line,
                    col: start_col,
                });
            }
            ']' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::RBracket,
                    line: start_line,
                    col: start_col,
                });
            }
            '=' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::Equals,
                    line: start_line,
                    col: start_col,
                });
            }
            '.' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::Dot,
                    line: start_line,
                    col: start_col,
                });
            }
            ',' => {
                advance(&mut i, &mut line, &mut col, &chars);
                tokens.push(Token {
                    kind: TokenKind::Comma,
                    line: start_line,
                    col: start_col,
                });
            }
            '"' => {
                advance(&mut i, &mut line, &mut col, &chars); // opening quote
                let mut s = String::new();
                while i < chars.len() && chars[i] != '"' {
                    s.push(chars[i]);
                    advance(&mut i, &mut line, &mut col, &chars);
                }
                if i >= chars.len() {
                    return Err(MiniformError::LexError {
                        line: start_line,
                        col: start_col,
                        ch: '"',
                    });
                }
                advance(&mut i, &mut line, &mut col, &chars); // closing quote
                tokens.push(Token {
                    kind: TokenKind::String(s),
                    line: start_line,
                    col: start_col,
                });
            }
            _ if c.is_ascii_digit() => {
                let mut s = String::new();
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    s.push(chars[i]);
                    advance(&mut i, &mut line, &mut col, &chars);
                }
                tokens.push(Token {
                    kind: TokenKind::Number(s),
                    line: start_line,
                    col: start_col,
                });
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    s.push(chars[i]);
                    advance(&mut i, &mut line, &mut col, &chars);
                }
                let kind = match s.as_str() {
                    "resource" => TokenKind::Resource,
                    "variable" => TokenKind::Variable,
                    "output" => TokenKind::Output,
                    "module" => TokenKind::Module,
                    "data" => TokenKind::Data,
                    "true" => TokenKind::Boolean(true),
                    "false" => TokenKind::Boolean(false),
                    _ => TokenKind::Ident(s),
                };
                tokens.push(Token {
                    kind,
                    line: start_line,
                    col: start_col,
                });
            }
            other => {
                return Err(MiniformError::LexError {
                    line: start_line,
                    col: start_col,
                    ch: other,
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
        col,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_empty_source() {
        let tokens = lex("").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn skips_comments_and_whitespace() {
        let tokens = lex("# a comment\n// another\n  \n").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn lexes_a_resource_block() {
        let src = r#"resource "local_file" "a" { path = "/tmp/a" }"#;
        let tokens = lex(src).unwrap();
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &TokenKind::Resource,
                &TokenKind::String("local_file".to_string()),
                &TokenKind::String("a".to_string()),
                &TokenKind::LBrace,
                &TokenKind::Ident("path".to_string()),
                &TokenKind::Equals,
                &TokenKind::String("/tmp/a".to_string()),
                &TokenKind::RBrace,
                &TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_position_on_unknown_char() {
        let err = lex("resource @ ").unwrap_err();
        match err {
            MiniformError::LexError { line, col, ch } => {
                assert_eq!(line, 1);
                assert_eq!(col, 10);
                assert_eq!(ch, '@');
            }
            _ => panic!("expected LexError"),
        }
    }

    #[test]
    fn lexes_numbers_and_booleans() {
        let tokens = lex("42 true false").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number("42".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::Boolean(true));
        assert_eq!(tokens[2].kind, TokenKind::Boolean(false));
    }
}
