//! Client-facing event frames of the streaming endpoint.

/// Comment text of heartbeat frames.
pub const HEARTBEAT_COMMENT: &str = "hb";
/// Event name of the terminal frame.
pub const DONE_EVENT: &str = "done";
/// Data of the terminal frame.
pub const DONE_DATA: &str = "[DONE]";

/// One frame sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// An incremental piece of reply text.
    Fragment(String),
    /// Keeps intermediaries from closing an idle connection.
    Heartbeat,
    /// The reply is complete and persisted.
    Done,
}

impl RelayFrame {
    /// Wire form: `data: <fragment>\n\n`, `:hb\n\n`, or
    /// `event: done\ndata: [DONE]\n\n`.
    ///
    /// Multi-line fragments become one `data:` line per line, which SSE
    /// clients join back with `\n`.
    pub fn to_sse(&self) -> String {
        match self {
            RelayFrame::Fragment(text) => {
                let mut out = String::with_capacity(text.len() + 8);
                for line in text.split('\n') {
                    out.push_str("data: ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push('\n');
                out
            }
            RelayFrame::Heartbeat => format!(":{HEARTBEAT_COMMENT}\n\n"),
            RelayFrame::Done => format!("event: {DONE_EVENT}\ndata: {DONE_DATA}\n\n"),
        }
    }
}
