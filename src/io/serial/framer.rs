// src/io/serial/framer.rs
//
// Line-feed framing for the serial record stream.
// Bytes arrive in arbitrary read-sized chunks; the accumulator keeps the
// unterminated tail between reads and hands out complete records.

const LINE_FEED: u8 = b'\n';

/// Stateful line accumulator for one serial connection.
///
/// A record is everything up to (excluding) the next `\n`. Carriage returns and
/// surrounding whitespace are left in place for the parser to strip.
#[derive(Debug, Default)]
pub struct LineAccumulator {
    buffer: Vec<u8>,
    /// Maximum length of the unterminated tail (None = unbounded)
    max_pending: Option<usize>,
    /// Discarding bytes until the next line feed after an overflow
    resyncing: bool,
    overflows: u64,
}

impl LineAccumulator {
    /// Create an accumulator with no limit on the pending tail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accumulator that drops an unterminated tail longer than `max_pending`
    /// bytes and resynchronizes on the next line feed.
    pub fn with_max_pending(max_pending: Option<usize>) -> Self {
        LineAccumulator {
            max_pending,
            ..Self::default()
        }
    }

    /// Append raw bytes from one read.
    pub fn feed(&mut self, data: &[u8]) {
        let mut data = data;

        if self.resyncing {
            match data.iter().position(|&b| b == LINE_FEED) {
                Some(pos) => {
                    data = &data[pos + 1..];
                    self.resyncing = false;
                }
                None => return,
            }
        }

        self.buffer.extend_from_slice(data);

        if let Some(max) = self.max_pending {
            let tail_start = self
                .buffer
                .iter()
                .rposition(|&b| b == LINE_FEED)
                .map(|pos| pos + 1)
                .unwrap_or(0);

            if self.buffer.len() - tail_start > max {
                tlog!(
                    "[framer] Pending record exceeded {} bytes, dropping {} bytes and resynchronizing",
                    max,
                    self.buffer.len() - tail_start
                );
                self.buffer.truncate(tail_start);
                self.resyncing = true;
                self.overflows += 1;
            }
        }
    }

    /// Take every complete record out of the buffer, oldest first.
    /// The terminating line feeds are consumed; an unterminated tail stays buffered.
    pub fn drain_records(&mut self) -> Vec<Vec<u8>> {
        let Some(last) = self.buffer.iter().rposition(|&b| b == LINE_FEED) else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buffer.drain(..=last).collect();
        let mut records: Vec<Vec<u8>> = complete
            .split(|&b| b == LINE_FEED)
            .map(<[u8]>::to_vec)
            .collect();
        // split() yields an empty piece after the final line feed
        records.pop();
        records
    }

    /// Number of buffered bytes not yet returned as records.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// How many times the pending tail was dropped for exceeding the limit.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// Forget all buffered bytes. Called when the link (re)connects.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.resyncing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(acc: &mut LineAccumulator, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        for chunk in chunks {
            acc.feed(chunk);
            records.extend(acc.drain_records());
        }
        records
    }

    #[test]
    fn test_complete_records() {
        let mut acc = LineAccumulator::new();
        acc.feed(b"[ID 0x1]a\n[ID 0x2]b\n");

        let records = acc.drain_records();
        assert_eq!(records, vec![b"[ID 0x1]a".to_vec(), b"[ID 0x2]b".to_vec()]);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_partial_record_kept_across_feeds() {
        let mut acc = LineAccumulator::new();
        acc.feed(b"[ID 0x1");
        assert!(acc.drain_records().is_empty());
        assert_eq!(acc.pending_len(), 7);

        acc.feed(b"A2]temp\r\n[ID");
        assert_eq!(acc.drain_records(), vec![b"[ID 0x1A2]temp\r".to_vec()]);
        assert_eq!(acc.pending_len(), 3);
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut acc = LineAccumulator::new();
        acc.feed(b"one\ntwo");
        assert_eq!(acc.drain_records().len(), 1);
        assert!(acc.drain_records().is_empty());
        assert!(acc.drain_records().is_empty());
        assert_eq!(acc.pending_len(), 3);
    }

    #[test]
    fn test_empty_records_passed_through() {
        let mut acc = LineAccumulator::new();
        acc.feed(b"a\n\n\nb\n");
        assert_eq!(
            acc.drain_records(),
            vec![b"a".to_vec(), Vec::new(), Vec::new(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_chunking_invariance() {
        let stream: &[u8] = b"[ID 0x100]alpha\r\n\n[ID 0x200]beta\ngarbage\n[ID 0x3]";
        let expected: Vec<Vec<u8>> = {
            let mut acc = LineAccumulator::new();
            acc.feed(stream);
            acc.drain_records()
        };
        assert_eq!(expected.len(), 4);

        for chunk_size in 1..=stream.len() {
            let mut acc = LineAccumulator::new();
            let chunks: Vec<&[u8]> = stream.chunks(chunk_size).collect();
            let records = feed_all(&mut acc, &chunks);
            assert_eq!(records, expected, "chunk size {}", chunk_size);
            assert_eq!(acc.pending_len(), b"[ID 0x3]".len());
        }
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut acc = LineAccumulator::new();
        acc.feed(&vec![b'x'; 100_000]);
        assert_eq!(acc.pending_len(), 100_000);
        assert_eq!(acc.overflow_count(), 0);
    }

    #[test]
    fn test_overflow_drops_and_resyncs() {
        let mut acc = LineAccumulator::with_max_pending(Some(8));
        acc.feed(b"ok\n0123456789");
        assert_eq!(acc.overflow_count(), 1);
        assert_eq!(acc.drain_records(), vec![b"ok".to_vec()]);
        assert_eq!(acc.pending_len(), 0);

        // Rest of the overlong record is discarded up to its line feed
        acc.feed(b"abc");
        assert_eq!(acc.pending_len(), 0);
        acc.feed(b"def\nnext\n");
        assert_eq!(acc.drain_records(), vec![b"next".to_vec()]);
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut acc = LineAccumulator::new();
        acc.feed(b"half a rec");
        acc.reset();
        assert_eq!(acc.pending_len(), 0);
        acc.feed(b"ord\n");
        assert_eq!(acc.drain_records(), vec![b"ord".to_vec()]);
    }
}
