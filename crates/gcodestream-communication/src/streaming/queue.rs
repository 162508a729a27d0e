//! Command queue
//!
//! Holds the sanitized lines of one job in send order together with their
//! per-line send, acknowledgment and retry bookkeeping.

use tokio::time::Instant;

/// One sanitized line of the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Position in the job, starting at zero
    pub sequence_index: usize,
    text: String,
    /// Text length plus one terminator byte
    pub byte_length: usize,
    /// When the line was last handed to the transport
    pub sent_at: Option<Instant>,
    /// Whether the controller answered `ok` or `error:`
    pub acknowledged: bool,
    /// Timeouts observed while this line was the oldest outstanding one
    pub retry_count: u32,
    /// Code from an `error:` acknowledgment
    pub error_code: Option<u16>,
}

impl Command {
    /// Create an unsent command
    pub fn new(sequence_index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            sequence_index,
            byte_length: text.len() + 1,
            text,
            sent_at: None,
            acknowledged: false,
            retry_count: 0,
            error_code: None,
        }
    }

    /// Line text without terminator
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sent and not yet acknowledged
    pub fn is_in_flight(&self) -> bool {
        self.sent_at.is_some() && !self.acknowledged
    }

    /// Record the send time
    pub fn mark_sent(&mut self, at: Instant) {
        self.sent_at = Some(at);
    }

    /// Record an `ok` (`None`) or `error:N` acknowledgment
    pub fn mark_acknowledged(&mut self, error_code: Option<u16>) {
        self.acknowledged = true;
        self.error_code = error_code;
    }

    /// Return the line to the pending part of the queue
    pub fn mark_unsent(&mut self) {
        self.sent_at = None;
        self.acknowledged = false;
    }

    fn reset(&mut self) {
        self.sent_at = None;
        self.acknowledged = false;
        self.retry_count = 0;
        self.error_code = None;
    }
}

/// Strip `;` and `( ... )` comments and surrounding whitespace
///
/// An unterminated `(` comments out the rest of the line.
pub fn sanitize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_paren = false;

    for c in line.chars() {
        match c {
            '(' if !in_paren => in_paren = true,
            ')' if in_paren => in_paren = false,
            ';' if !in_paren => break,
            _ if in_paren => {}
            _ => out.push(c),
        }
    }

    out.trim().to_string()
}

/// Ordered job lines plus the send cursor
#[derive(Debug, Default, Clone)]
pub struct CommandQueue {
    commands: Vec<Command>,
    cursor: usize,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with the non-empty sanitized lines of `raw`
    pub fn load(&mut self, raw: &str) -> usize {
        self.commands = raw
            .split(['\n', '\r'])
            .map(sanitize_line)
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(i, text)| Command::new(i, text))
            .collect();
        self.cursor = 0;
        self.commands.len()
    }

    /// Number of job lines
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if no lines are loaded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Line at `index`
    pub fn get(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    /// Mutable line at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Command> {
        self.commands.get_mut(index)
    }

    /// Iterate all lines in order
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Index of the next line to send
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Next line to send, if any
    pub fn next_unsent(&self) -> Option<&Command> {
        self.commands.get(self.cursor)
    }

    /// Every line has been handed to the transport
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.commands.len()
    }

    /// Move the cursor past the line just sent
    pub fn advance(&mut self) {
        if self.cursor < self.commands.len() {
            self.cursor += 1;
        }
    }

    /// Move the cursor back so `index` is sent next
    pub fn rewind_to(&mut self, index: usize) {
        self.cursor = index.min(self.cursor);
    }

    /// Clear send state for a fresh run of the same lines
    pub fn reset_progress(&mut self) {
        self.commands.iter_mut().for_each(Command::reset);
        self.cursor = 0;
    }

    /// Drop every line
    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
    }
}
