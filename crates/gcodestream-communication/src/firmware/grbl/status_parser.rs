//! GRBL status report parser
//!
//! Tolerant field extraction for `<State|MPos:x,y,z|FS:f,s|WCO:x,y,z|...>`.
//! Missing fields default to zero, a missing state to `"Unknown"`.
//! Firmware configured to report `WPos` instead of `MPos` gets its machine
//! position derived as `WPos + WCO`.

use gcodestream_core::{BufferReport, Position, StatusSnapshot};

/// Prefixes of the key/value fields that may follow the state
const DATA_FIELDS: &[&str] = &[
    "MPos:", "WPos:", "WCO:", "FS:", "F:", "Bf:", "Buf:", "Ov:", "Pn:", "Ln:", "A:",
];

/// Status report parsing
pub struct StatusParser;

impl StatusParser {
    /// Parse a status line; `None` when it is not a `<...|...>` report or
    /// carries no recognizable field at all
    pub fn parse(status_line: &str) -> Option<StatusSnapshot> {
        let body = Self::body(status_line)?;

        let state = body
            .split('|')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !Self::is_data_field(s))
            .map(str::to_string);
        let mpos = Self::extract_field(body, "MPos:").and_then(Position::parse);
        let wpos = Self::extract_field(body, "WPos:").and_then(Position::parse);
        let wco = Self::extract_field(body, "WCO:").and_then(Position::parse);
        let (feed_rate, spindle_speed) = Self::parse_feed_spindle(body);
        let buffer = Self::parse_buffer(body);

        if state.is_none()
            && mpos.is_none()
            && wpos.is_none()
            && wco.is_none()
            && feed_rate.is_none()
            && buffer.is_none()
        {
            return None;
        }

        let work_offset = wco.unwrap_or_default();
        let machine_position = match (mpos, wpos) {
            (Some(mpos), _) => mpos,
            (None, Some(wpos)) => wpos.offset_by(&work_offset),
            (None, None) => Position::default(),
        };

        Some(StatusSnapshot {
            state: state.unwrap_or_else(|| "Unknown".to_string()),
            machine_position,
            work_offset,
            feed_rate: feed_rate.unwrap_or(0.0),
            spindle_speed: spindle_speed.unwrap_or(0.0),
            buffer,
        })
    }

    /// `FS:feed,spindle`, or a lone `F:feed`
    fn parse_feed_spindle(body: &str) -> (Option<f64>, Option<f64>) {
        if let Some(fs) = Self::extract_field(body, "FS:") {
            let mut parts = fs.split(',').map(|p| p.trim().parse::<f64>().ok());
            let feed = parts.next().flatten();
            let spindle = parts.next().flatten();
            return (feed, spindle);
        }

        let feed = Self::extract_field(body, "F:").and_then(|f| f.trim().parse::<f64>().ok());
        (feed, None)
    }

    /// `Bf:blocks,bytes` (GRBL 1.1) or `Buf:blocks,bytes`
    fn parse_buffer(body: &str) -> Option<BufferReport> {
        let field =
            Self::extract_field(body, "Bf:").or_else(|| Self::extract_field(body, "Buf:"))?;
        let mut parts = field.split(',').map(|p| p.trim().parse::<u16>().ok());
        Some(BufferReport {
            planner_blocks: parts.next().flatten()?,
            rx_bytes: parts.next().flatten()?,
        })
    }

    fn is_data_field(field: &str) -> bool {
        DATA_FIELDS.iter().any(|prefix| field.starts_with(prefix))
    }

    fn body(status_line: &str) -> Option<&str> {
        let line = status_line.trim();
        let inner = line.strip_prefix('<')?;
        let inner = inner.strip_suffix('>').unwrap_or(inner);
        inner.contains('|').then_some(inner)
    }

    /// Field value between its prefix and the next `|`
    fn extract_field<'a>(body: &'a str, field_prefix: &str) -> Option<&'a str> {
        body.split('|')
            .find_map(|field| field.trim().strip_prefix(field_prefix))
    }
}
