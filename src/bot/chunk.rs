//! Splitting replies into Telegram-sized messages.

/// Maximum characters per outgoing message. Telegram allows 4096; the lower
/// limit leaves room for formatting and keeps messages readable.
pub const MAX_CHUNK_LEN: usize = 1900;

/// Split `text` into chunks of at most [`MAX_CHUNK_LEN`] characters.
pub fn chunk_message(text: &str) -> Vec<String> {
    chunk_with_limit(text, MAX_CHUNK_LEN)
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Lines are packed greedily and joined with `\n`. A line that alone exceeds
/// the limit is cut into fixed-width pieces with no regard for words.
/// Chunks holding only whitespace are dropped, since Telegram rejects them.
pub fn chunk_with_limit(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }

    // `None` means nothing accumulated yet, which differs from an
    // accumulated empty line.
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let fits = match &current {
            Some((_, len)) => len + 1 + line_len <= limit,
            None => line_len <= limit,
        };

        if fits {
            match current.as_mut() {
                Some((buf, len)) => {
                    buf.push('\n');
                    buf.push_str(line);
                    *len += 1 + line_len;
                }
                None => current = Some((line.to_string(), line_len)),
            }
            continue;
        }

        if let Some((buf, _)) = current.take() {
            push_chunk(&mut chunks, buf);
        }

        if line_len > limit {
            hard_split(line, limit, &mut chunks);
        } else {
            current = Some((line.to_string(), line_len));
        }
    }

    if let Some((buf, _)) = current {
        push_chunk(&mut chunks, buf);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, buf: String) {
    if !buf.trim().is_empty() {
        chunks.push(buf);
    }
}

fn hard_split(line: &str, limit: usize, chunks: &mut Vec<String>) {
    let mut piece = String::new();
    let mut count = 0;
    for c in line.chars() {
        piece.push(c);
        count += 1;
        if count == limit {
            chunks.push(std::mem::take(&mut piece));
            count = 0;
        }
    }
    if !piece.is_empty() {
        chunks.push(piece);
    }
}
