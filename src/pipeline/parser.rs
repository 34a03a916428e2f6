//! Recursive-descent parser for the configuration language.
//!
//! ```text
//! @version: 3.8
//! source zmq { zmqq(); };
//! destination file { file("/tmp/res"); };
//! log { source(zmq); destination(file); };
//! ```
//!
//! Driver calls are first read into a generic `Call` (positional values plus
//! named options) and then validated per driver. Option names treat `-` and
//! `_` as the same character.

use std::path::PathBuf;

use crate::pipeline::document::{
    DestinationDecl, DestinationDriver, Document, FileOptions, LogPath, SUPPORTED_MAJOR_VERSION,
    SourceDecl, SourceDriver, Version, ZmqDestinationOptions, ZmqSourceOptions,
    DEFAULT_DESTINATION_PORT,
};
use crate::pipeline::lexer::{Token, TokenKind, tokenize};
use crate::pipeline::template::{FILE_DEFAULT_TEMPLATE, Template, ZMQ_DEFAULT_TEMPLATE};
use crate::utils::error::DocumentError;

pub fn parse(text: &str) -> Result<Document, DocumentError> {
    let tokens = tokenize(text)?;
    let last_line = tokens.last().map(|t| t.line).unwrap_or(1);
    Parser {
        tokens,
        pos: 0,
        last_line,
    }
    .document()
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Number(String),
    Ident(String),
}

impl Value {
    fn text(&self) -> &str {
        match self {
            Value::Str(s) | Value::Number(s) | Value::Ident(s) => s,
        }
    }
}

#[derive(Debug)]
struct NamedOption {
    name: String,
    line: usize,
    values: Vec<Value>,
}

#[derive(Debug)]
struct Call {
    name: String,
    line: usize,
    positional: Vec<Value>,
    options: Vec<NamedOption>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    last_line: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn line(&self) -> usize {
        self.peek().map(|t| t.line).unwrap_or(self.last_line)
    }

    fn syntax(&self, message: impl Into<String>) -> DocumentError {
        DocumentError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<usize, DocumentError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                let line = token.line;
                self.pos += 1;
                Ok(line)
            }
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn ident(&mut self, what: &str) -> Result<(String, usize), DocumentError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name),
                line,
            }) => {
                let found = (name.clone(), *line);
                self.pos += 1;
                Ok(found)
            }
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn document(mut self) -> Result<Document, DocumentError> {
        let mut version = None;
        let mut sources: Vec<SourceDecl> = Vec::new();
        let mut destinations: Vec<DestinationDecl> = Vec::new();
        let mut log_paths = Vec::new();

        while let Some(token) = self.peek() {
            let line = token.line;
            match token.kind.clone() {
                TokenKind::At => {
                    let declared = self.version_decl()?;
                    if version.replace(declared).is_some() {
                        return Err(DocumentError::Syntax {
                            line,
                            message: "@version declared twice".to_string(),
                        });
                    }
                }
                TokenKind::Ident(keyword) if keyword == "source" => {
                    self.pos += 1;
                    let (name, line) = self.ident("source name")?;
                    if sources.iter().any(|s| s.name == name) {
                        return Err(DocumentError::Duplicate {
                            line,
                            kind: "source",
                            name,
                        });
                    }
                    let drivers = self
                        .block_calls()?
                        .into_iter()
                        .map(source_driver)
                        .collect::<Result<Vec<_>, _>>()?;
                    sources.push(SourceDecl { name, drivers });
                }
                TokenKind::Ident(keyword) if keyword == "destination" => {
                    self.pos += 1;
                    let (name, line) = self.ident("destination name")?;
                    if destinations.iter().any(|d| d.name == name) {
                        return Err(DocumentError::Duplicate {
                            line,
                            kind: "destination",
                            name,
                        });
                    }
                    let drivers = self
                        .block_calls()?
                        .into_iter()
                        .map(destination_driver)
                        .collect::<Result<Vec<_>, _>>()?;
                    destinations.push(DestinationDecl { name, drivers });
                }
                TokenKind::Ident(keyword) if keyword == "log" => {
                    self.pos += 1;
                    log_paths.push(self.log_path(line)?);
                }
                _ => return Err(self.syntax("expected source, destination, log or @version")),
            }
        }

        let version = version.ok_or(DocumentError::MissingVersion)?;
        if version.major != SUPPORTED_MAJOR_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: format!("{}.{}", version.major, version.minor),
                supported: SUPPORTED_MAJOR_VERSION,
            });
        }

        for path in &log_paths {
            if let Some(name) = path
                .sources
                .iter()
                .find(|name| !sources.iter().any(|s| &s.name == *name))
            {
                return Err(DocumentError::UndefinedReference {
                    line: path.line,
                    kind: "source",
                    name: name.clone(),
                });
            }
            if let Some(name) = path
                .destinations
                .iter()
                .find(|name| !destinations.iter().any(|d| &d.name == *name))
            {
                return Err(DocumentError::UndefinedReference {
                    line: path.line,
                    kind: "destination",
                    name: name.clone(),
                });
            }
        }

        Ok(Document {
            version,
            sources,
            destinations,
            log_paths,
        })
    }

    fn version_decl(&mut self) -> Result<Version, DocumentError> {
        self.expect(TokenKind::At, "@")?;
        let (directive, line) = self.ident("directive name")?;
        if directive != "version" {
            return Err(DocumentError::Syntax {
                line,
                message: format!("unknown directive @{directive}"),
            });
        }
        self.expect(TokenKind::Colon, "':' after @version")?;

        let number = match self.next() {
            Some(Token {
                kind: TokenKind::Number(n),
                ..
            }) => n,
            _ => {
                return Err(DocumentError::Syntax {
                    line,
                    message: "expected a version number such as 3.8".to_string(),
                });
            }
        };
        parse_version(&number).ok_or(DocumentError::Syntax {
            line,
            message: format!("malformed version '{number}'"),
        })
    }

    /// `{ call; call; ... };`
    fn block_calls(&mut self) -> Result<Vec<Call>, DocumentError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut calls = Vec::new();
        while !matches!(self.peek_kind_at(0), Some(TokenKind::RBrace)) {
            if self.peek().is_none() {
                return Err(self.syntax("unterminated block, expected '}'"));
            }
            calls.push(self.call()?);
            self.expect(TokenKind::Semicolon, "';' after driver")?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        self.expect(TokenKind::Semicolon, "';' after block")?;
        Ok(calls)
    }

    /// `name( value... option(value...)... )`
    fn call(&mut self) -> Result<Call, DocumentError> {
        let (name, line) = self.ident("driver name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut call = Call {
            name,
            line,
            positional: Vec::new(),
            options: Vec::new(),
        };

        loop {
            let Some(token) = self.next() else {
                return Err(self.syntax("unterminated argument list, expected ')'"));
            };
            match token.kind {
                TokenKind::RParen => break,
                TokenKind::Str(s) => call.positional.push(Value::Str(s)),
                TokenKind::Number(n) => call.positional.push(Value::Number(n)),
                TokenKind::Ident(option) if self.peek_kind_at(0) == Some(&TokenKind::LParen) => {
                    self.pos += 1;
                    let values = self.values()?;
                    call.options.push(NamedOption {
                        name: option.replace('-', "_"),
                        line: token.line,
                        values,
                    });
                }
                TokenKind::Ident(word) => call.positional.push(Value::Ident(word)),
                _ => {
                    return Err(DocumentError::Syntax {
                        line: token.line,
                        message: format!("unexpected token in {}()", call.name),
                    });
                }
            }
        }

        Ok(call)
    }

    /// Values up to and including the closing `)`.
    fn values(&mut self) -> Result<Vec<Value>, DocumentError> {
        let mut values = Vec::new();
        loop {
            match self.next() {
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => return Ok(values),
                Some(Token {
                    kind: TokenKind::Str(s),
                    ..
                }) => values.push(Value::Str(s)),
                Some(Token {
                    kind: TokenKind::Number(n),
                    ..
                }) => values.push(Value::Number(n)),
                Some(Token {
                    kind: TokenKind::Ident(i),
                    ..
                }) => values.push(Value::Ident(i)),
                _ => return Err(self.syntax("expected a value or ')'")),
            }
        }
    }

    /// `log { source(a); destination(b); };` after the `log` keyword.
    fn log_path(&mut self, line: usize) -> Result<LogPath, DocumentError> {
        let mut path = LogPath {
            sources: Vec::new(),
            destinations: Vec::new(),
            line,
        };

        for call in self.block_calls()? {
            if !call.options.is_empty() {
                return Err(DocumentError::Syntax {
                    line: call.line,
                    message: format!("{}() takes only names", call.name),
                });
            }
            let names = call.positional.iter().map(|v| v.text().to_string());
            match call.name.as_str() {
                "source" => path.sources.extend(names),
                "destination" => path.destinations.extend(names),
                other => {
                    return Err(DocumentError::Syntax {
                        line: call.line,
                        message: format!("unexpected {other}() in log statement"),
                    });
                }
            }
        }

        if path.sources.is_empty() || path.destinations.is_empty() {
            return Err(DocumentError::Syntax {
                line,
                message: "log statement needs at least one source and one destination"
                    .to_string(),
            });
        }
        Ok(path)
    }
}

fn parse_version(text: &str) -> Option<Version> {
    let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
    Some(Version {
        major: major.parse().ok()?,
        minor: minor.parse().ok()?,
    })
}

fn source_driver(call: Call) -> Result<SourceDriver, DocumentError> {
    match call.name.as_str() {
        "zmq" | "zmqq" => {
            reject_positional(&call)?;
            let mut options = ZmqSourceOptions::default();
            for option in &call.options {
                match option.name.as_str() {
                    "address" | "host" => options.address = single_string(option)?,
                    "port" => options.port = port(option)?,
                    _ => return Err(unknown_option(option, &call.name)),
                }
            }
            Ok(SourceDriver::Zmq(options))
        }
        _ => Err(DocumentError::UnknownDriver {
            line: call.line,
            kind: "source",
            name: call.name,
        }),
    }
}

fn destination_driver(call: Call) -> Result<DestinationDriver, DocumentError> {
    match call.name.as_str() {
        "file" => {
            let path = match call.positional.as_slice() {
                [Value::Str(path)] if !path.is_empty() => PathBuf::from(path),
                _ => {
                    return Err(DocumentError::InvalidOption {
                        line: call.line,
                        option: "file()".to_string(),
                        reason: "expects exactly one quoted, non-empty path".to_string(),
                    });
                }
            };
            let mut template = Template::compile(FILE_DEFAULT_TEMPLATE)?;
            for option in &call.options {
                match option.name.as_str() {
                    "template" => template = Template::compile(&single_string(option)?)?,
                    _ => return Err(unknown_option(option, &call.name)),
                }
            }
            Ok(DestinationDriver::File(FileOptions { path, template }))
        }
        "zmq" => {
            reject_positional(&call)?;
            let mut port_number = DEFAULT_DESTINATION_PORT;
            let mut template = Template::compile(ZMQ_DEFAULT_TEMPLATE)?;
            for option in &call.options {
                match option.name.as_str() {
                    "port" => port_number = port(option)?,
                    "template" => template = Template::compile(&single_string(option)?)?,
                    "socket_type" => {
                        let socket_type = single_string(option)?;
                        if socket_type != "push" {
                            return Err(DocumentError::InvalidOption {
                                line: option.line,
                                option: "socket-type".to_string(),
                                reason: format!("unsupported socket type '{socket_type}', only push is available"),
                            });
                        }
                    }
                    _ => return Err(unknown_option(option, &call.name)),
                }
            }
            Ok(DestinationDriver::Zmq(ZmqDestinationOptions {
                port: port_number,
                template,
            }))
        }
        _ => Err(DocumentError::UnknownDriver {
            line: call.line,
            kind: "destination",
            name: call.name,
        }),
    }
}

fn reject_positional(call: &Call) -> Result<(), DocumentError> {
    if call.positional.is_empty() {
        Ok(())
    } else {
        Err(DocumentError::InvalidOption {
            line: call.line,
            option: format!("{}()", call.name),
            reason: "takes named options only".to_string(),
        })
    }
}

fn unknown_option(option: &NamedOption, driver: &str) -> DocumentError {
    DocumentError::InvalidOption {
        line: option.line,
        option: option.name.clone(),
        reason: format!("not an option of {driver}()"),
    }
}

fn single_string(option: &NamedOption) -> Result<String, DocumentError> {
    match option.values.as_slice() {
        [value] => Ok(value.text().to_string()),
        _ => Err(DocumentError::InvalidOption {
            line: option.line,
            option: option.name.clone(),
            reason: "expects exactly one value".to_string(),
        }),
    }
}

fn port(option: &NamedOption) -> Result<u16, DocumentError> {
    let invalid = || DocumentError::InvalidOption {
        line: option.line,
        option: option.name.clone(),
        reason: "port must be an integer between 1 and 65535".to_string(),
    };
    match option.values.as_slice() {
        [Value::Number(n)] => match n.parse::<u16>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(port) => Ok(port),
        },
        _ => Err(invalid()),
    }
}
