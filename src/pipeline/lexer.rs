//! Tokenizer for the pipeline configuration language.

use crate::utils::error::DocumentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Number(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semicolon,
    Colon,
    At,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, DocumentError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        let single = match c {
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ';' => Some(TokenKind::Semicolon),
            ':' => Some(TokenKind::Colon),
            '@' => Some(TokenKind::At),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, line });
            continue;
        }

        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            // commas between options are optional
            c if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                let start = line;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(DocumentError::Syntax {
                                line: start,
                                message: "unterminated string".to_string(),
                            });
                        }
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some('r') => value.push('\r'),
                            Some('"') => value.push('"'),
                            Some('\\') => value.push('\\'),
                            Some(other) => {
                                return Err(DocumentError::Syntax {
                                    line,
                                    message: format!("unknown escape sequence \\{other}"),
                                });
                            }
                            None => continue,
                        },
                        Some('\n') => {
                            line += 1;
                            value.push('\n');
                        }
                        Some(other) => value.push(other),
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    line: start,
                });
            }
            c if c.is_ascii_digit() => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        value.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' {
                        value.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(value),
                    line,
                });
            }
            other => {
                return Err(DocumentError::Syntax {
                    line,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}
