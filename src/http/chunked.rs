//! Chunked transfer decoding (RFC 7230 §4.1 subset)

/// Decode a chunked-framed body into a flat byte sequence.
///
/// Total function: malformed or truncated input yields whatever was decoded
/// before the problem, never an error. The body only arrives after the
/// connection closed, so a truncated chunk means the peer cut the stream
/// short and the prefix is all there is.
///
/// Size lines are read as their leading hex digits; chunk extensions and
/// trailing headers are discarded. A line with no leading hex digits is
/// skipped rather than aborting the decode.
pub fn decode_chunked(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0;

    loop {
        let Some(line_end) = find_crlf(&input[pos..]).map(|i| pos + i) else {
            // No size line left
            break;
        };

        let line = String::from_utf8_lossy(&input[pos..line_end]);
        let token = line.split(';').next().unwrap_or("").trim();
        let digits: String = token.chars().take_while(|c| c.is_ascii_hexdigit()).collect();

        let Ok(size) = usize::from_str_radix(&digits, 16) else {
            // Anomalous line, skip it and keep scanning
            pos = line_end + 2;
            continue;
        };

        if size == 0 {
            break;
        }

        let data_start = line_end + 2;
        let data_end = match data_start.checked_add(size) {
            Some(end) if end <= input.len() => end,
            // Chunk extends past the available bytes
            _ => break,
        };

        out.extend_from_slice(&input[data_start..data_end]);
        // Skip the terminator behind the chunk data
        pos = data_end + 2;
        if pos > input.len() {
            break;
        }
    }

    out
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    haystack.windows(2).position(|w| w == b"\r\n")
}
