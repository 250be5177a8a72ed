//! Chunk classifier: strips the transport envelope from one line.

/// Literal end-of-stream marker used by event-stream dialects.
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// How lines are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events: only `data:` lines carry payload.
    EventStream,
    /// Newline-delimited JSON: every non-empty line is a document.
    Ndjson,
}

/// Zero-or-one JSON document candidate extracted from a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// Nothing to decode (blank line, comment, `event:` / `id:` / `retry:` field).
    Ignore,
    /// The sentinel terminator. Never JSON-parsed.
    Done,
    Document(&'a str),
}

pub fn classify(framing: Framing, line: &str) -> Chunk<'_> {
    match framing {
        Framing::EventStream => classify_sse(line),
        Framing::Ndjson => classify_ndjson(line),
    }
}

fn classify_sse(line: &str) -> Chunk<'_> {
    let Some(rest) = line.strip_prefix("data:") else {
        return Chunk::Ignore;
    };
    let payload = rest.trim();
    if payload.is_empty() {
        Chunk::Ignore
    } else if payload == SSE_DONE_SENTINEL {
        Chunk::Done
    } else {
        Chunk::Document(payload)
    }
}

fn classify_ndjson(line: &str) -> Chunk<'_> {
    let payload = line.trim();
    if payload.is_empty() {
        Chunk::Ignore
    } else {
        Chunk::Document(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_keeps_only_data_lines() {
        let f = Framing::EventStream;
        assert_eq!(classify(f, ""), Chunk::Ignore);
        assert_eq!(classify(f, ": keep-alive"), Chunk::Ignore);
        assert_eq!(classify(f, "event: message_start"), Chunk::Ignore);
        assert_eq!(classify(f, "id: 7"), Chunk::Ignore);
        assert_eq!(classify(f, "retry: 1000"), Chunk::Ignore);
        assert_eq!(classify(f, "data:"), Chunk::Ignore);
        assert_eq!(classify(f, "data: {\"a\":1}"), Chunk::Document("{\"a\":1}"));
        assert_eq!(classify(f, "data:{\"a\":1}"), Chunk::Document("{\"a\":1}"));
    }

    #[test]
    fn sse_sentinel_is_recognized_without_parsing() {
        assert_eq!(classify(Framing::EventStream, "data: [DONE]"), Chunk::Done);
        assert_eq!(classify(Framing::EventStream, "data:[DONE]  "), Chunk::Done);
    }

    #[test]
    fn ndjson_every_non_empty_line_is_a_candidate() {
        let f = Framing::Ndjson;
        assert_eq!(classify(f, "   "), Chunk::Ignore);
        assert_eq!(classify(f, "{\"done\":true}"), Chunk::Document("{\"done\":true}"));
        // Not the NDJSON terminator; the decoder decides.
        assert_eq!(classify(f, "[DONE]"), Chunk::Document("[DONE]"));
    }
}
