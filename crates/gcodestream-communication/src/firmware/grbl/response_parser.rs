//! GRBL response classification
//!
//! Sorts each inbound line into one of the categories the acknowledgment
//! matcher cares about. Anything that is not an acknowledgment, alarm, or
//! status report (welcome banners, `[MSG:...]`, setting echoes) is a message.

use super::error_decoder::{decode_alarm, decode_error};
use std::fmt;

/// One classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrblResponse {
    /// `ok`
    Ok,
    /// `error:N`, or `error:<text>` on firmware that reports words
    Error {
        /// Numeric code when present
        code: Option<u16>,
        /// Description
        text: String,
    },
    /// `ALARM:N`
    Alarm {
        /// Numeric code when present
        code: Option<u16>,
        /// Description
        text: String,
    },
    /// `<State|...>` status report, kept raw for the status parser
    Status(String),
    /// Anything else
    Message(String),
}

impl GrblResponse {
    /// Classify a line; blank lines yield `None`
    pub fn classify(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.eq_ignore_ascii_case("ok") {
            return Some(Self::Ok);
        }

        if let Some(rest) = strip_prefix_ignore_case(line, "error:") {
            let (code, text) = code_and_text(rest, decode_error);
            return Some(Self::Error { code, text });
        }

        if let Some(rest) = strip_prefix_ignore_case(line, "alarm:") {
            let (code, text) = code_and_text(rest, decode_alarm);
            return Some(Self::Alarm { code, text });
        }

        if line.starts_with('<') && line.contains('|') {
            return Some(Self::Status(line.to_string()));
        }

        Some(Self::Message(line.to_string()))
    }

    /// `ok` or `error:` resolves the oldest in-flight command
    pub fn is_acknowledgment(&self) -> bool {
        matches!(self, Self::Ok | Self::Error { .. })
    }
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error { code: Some(code), text } => write!(f, "error:{} - {}", code, text),
            Self::Error { code: None, text } => write!(f, "error:{}", text),
            Self::Alarm { code: Some(code), text } => write!(f, "ALARM:{} - {}", code, text),
            Self::Alarm { code: None, text } => write!(f, "ALARM:{}", text),
            Self::Status(raw) => write!(f, "{}", raw),
            Self::Message(msg) => write!(f, "{}", msg),
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

fn code_and_text(rest: &str, describe: fn(u16) -> String) -> (Option<u16>, String) {
    let rest = rest.trim();
    match rest.parse::<u16>() {
        Ok(code) => (Some(code), describe(code)),
        Err(_) => (None, rest.to_string()),
    }
}
