use std::sync::Arc;

const REPLACEMENT_LEN: usize = char::REPLACEMENT_CHARACTER.len_utf8();

/// One invalid byte run and the U+FFFD that stands in for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Replacement {
    /// End of the replacement character in the decoded text
    decoded_end: usize,
    /// End of the invalid run in the raw input
    raw_end: usize,
}

/// Raw input decoded for producers.
///
/// Invalid UTF-8 runs are replaced the way `String::from_utf8_lossy` does it.
/// Offsets measured on the decoded text map back to the raw bytes through
/// [`SourceText::to_raw`].
#[derive(Debug, Clone)]
pub struct SourceText {
    text: Arc<str>,
    raw_len: usize,
    replacements: Arc<[Replacement]>,
}

impl SourceText {
    /// Decode raw bytes, recording every replaced run
    pub fn decode(raw: &[u8]) -> Self {
        let mut text = String::with_capacity(raw.len());
        let mut replacements = Vec::new();
        let mut rest = raw;
        let mut raw_pos = 0;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    let (valid, tail) = rest.split_at(valid_up_to);
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    let bad = err.error_len().unwrap_or(tail.len());

                    text.push(char::REPLACEMENT_CHARACTER);
                    raw_pos += valid_up_to + bad;
                    replacements.push(Replacement {
                        decoded_end: text.len(),
                        raw_end: raw_pos,
                    });
                    rest = &tail[bad..];
                }
            }
        }

        Self {
            text: Arc::from(text),
            raw_len: raw.len(),
            replacements: replacements.into(),
        }
    }

    /// Decoded text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length of the raw input in bytes
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Whether any bytes were replaced while decoding
    pub fn is_lossy(&self) -> bool {
        !self.replacements.is_empty()
    }

    /// Map a char-boundary offset in the decoded text to the raw input.
    ///
    /// An offset inside a replacement character maps to the start of its
    /// invalid run.
    pub fn to_raw(&self, decoded: usize) -> usize {
        let done = self
            .replacements
            .partition_point(|r| r.decoded_end <= decoded);
        let (decoded_base, raw_base) = match done.checked_sub(1) {
            Some(i) => (self.replacements[i].decoded_end, self.replacements[i].raw_end),
            None => (0, 0),
        };
        let decoded = match self.replacements.get(done) {
            Some(next) => decoded.min(next.decoded_end - REPLACEMENT_LEN),
            None => decoded,
        };
        (raw_base + decoded.saturating_sub(decoded_base)).min(self.raw_len)
    }
}

impl AsRef<str> for SourceText {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_utf8_maps_to_itself() {
        let source = SourceText::decode("héllo\n".as_bytes());
        assert!(!source.is_lossy());
        assert_eq!(source.as_str(), "héllo\n");
        assert_eq!(source.to_raw(3), 3);
        assert_eq!(source.to_raw(7), 7);
    }

    #[test]
    fn test_decoding_matches_lossy_conversion() {
        let raw = b"caf\xe9 latin1 text\nsecond \xff line\n\xf0\x9f";
        let source = SourceText::decode(raw);
        assert_eq!(source.as_str(), String::from_utf8_lossy(raw));
        assert_eq!(source.raw_len(), raw.len());
    }

    #[test]
    fn test_offsets_map_back_to_raw_bytes() {
        let raw = b"caf\xe9 one\ncaf\xe9 two\n";
        let source = SourceText::decode(raw);
        let text = source.as_str();
        assert!(source.is_lossy());

        let second_line = text.find("caf\u{fffd} two").unwrap();
        assert_eq!(source.to_raw(second_line), 9);
        assert_eq!(source.to_raw(text.len()), raw.len());
        assert_eq!(&raw[source.to_raw(second_line)..], b"caf\xe9 two\n");

        // after the replacement character on line one
        let after = text.find(" one").unwrap();
        assert_eq!(source.to_raw(after), 4);
        // inside the replacement character
        assert_eq!(source.to_raw(4), 3);
    }

    #[test]
    fn test_truncated_sequence_at_end() {
        let raw = b"ok\xf0\x9f";
        let source = SourceText::decode(raw);
        assert_eq!(source.as_str(), "ok\u{fffd}");
        assert_eq!(source.to_raw(source.as_str().len()), 4);
    }
}
