use async_trait::async_trait;

/// Practical per-message cap imposed by the downstream messaging endpoint.
/// Longer payloads must be chunked by the caller.
pub const MAX_PAYLOAD_CHARS: usize = 4000;

/// Outbound notification channel capability.
///
/// Implementations wrap one downstream messaging endpoint; the dispatcher
/// owns pacing and ordering, the sink owns transmission.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str, highlighted: bool) -> anyhow::Result<()>;
}

/// Split oversized text into ordered chunks of at most `limit` characters.
///
/// Splits on line boundaries where possible so a chunk never starts
/// mid-sentence; a single line longer than the limit is hard-split. The
/// concatenation of the chunks always equals the input.
pub fn split_payload(text: &str, limit: usize) -> Vec<String> {
    assert!(limit > 0, "payload limit must be non-zero");

    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if line_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }

            // Hard split: the line itself exceeds the transport cap.
            let mut piece = String::new();
            let mut piece_len = 0usize;
            for ch in line.chars() {
                piece.push(ch);
                piece_len += 1;
                if piece_len == limit {
                    chunks.push(std::mem::take(&mut piece));
                    piece_len = 0;
                }
            }
            if !piece.is_empty() {
                current = piece;
                current_len = piece_len;
            }
            continue;
        }

        if current_len + line_len > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
