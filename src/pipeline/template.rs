//! Output templates
//!
//! A template is literal text with `${NAME}` macros. Supported macros:
//! `MESSAGE` (alias `MSG`), `SOURCE`, `ISODATE`, `UNIXTIME`, `SEQNUM`, `MSGID`.
//! A `$` that does not open `${` is kept literally.

use chrono::SecondsFormat;

use crate::pipeline::message::LogMessage;
use crate::utils::error::DocumentError;

pub const FILE_DEFAULT_TEMPLATE: &str = "${MESSAGE}\n";
pub const ZMQ_DEFAULT_TEMPLATE: &str = "${MESSAGE}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Macro {
    Message,
    Source,
    IsoDate,
    UnixTime,
    SeqNum,
    MsgId,
}

impl Macro {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "MESSAGE" | "MSG" => Some(Macro::Message),
            "SOURCE" => Some(Macro::Source),
            "ISODATE" => Some(Macro::IsoDate),
            "UNIXTIME" => Some(Macro::UnixTime),
            "SEQNUM" => Some(Macro::SeqNum),
            "MSGID" => Some(Macro::MsgId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Macro(Macro),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn compile(text: &str) -> Result<Self, DocumentError> {
        let invalid = |reason: String| DocumentError::Template {
            template: text.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| invalid("unclosed ${".to_string()))?;
            let name = &after[..end];
            let found = Macro::lookup(name).ok_or_else(|| invalid(format!("unknown macro {name}")))?;

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Macro(found));
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            text: text.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn format(&self, msg: &LogMessage) -> String {
        let mut out = String::with_capacity(msg.message.len() + 16);
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Macro(Macro::Message) => out.push_str(&msg.message),
                Part::Macro(Macro::Source) => out.push_str(&msg.source),
                Part::Macro(Macro::IsoDate) => {
                    out.push_str(&msg.received_at.to_rfc3339_opts(SecondsFormat::Millis, true))
                }
                Part::Macro(Macro::UnixTime) => {
                    out.push_str(&msg.received_at.timestamp().to_string())
                }
                Part::Macro(Macro::SeqNum) => out.push_str(&msg.seq.to_string()),
                Part::Macro(Macro::MsgId) => out.push_str(&msg.id.to_string()),
            }
        }
        out
    }
}
