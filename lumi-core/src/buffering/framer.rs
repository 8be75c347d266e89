//! Capture-side framer: turns device callbacks of arbitrary length into
//! fixed-size [`PcmChunk`]s.
//!
//! Runs inside the real-time input callback. The internal buffer is
//! pre-sized and drained on every call, so after `push` returns it always
//! holds fewer than `chunk_size` samples.

use super::chunk::{PcmChunk, CHUNK_SIZE};

#[derive(Debug)]
pub struct CaptureFramer {
    buf: Vec<f32>,
    chunk_size: usize,
    sample_rate: u32,
}

impl CaptureFramer {
    /// Framer emitting `chunk_size`-sample chunks tagged with `sample_rate`.
    /// A `chunk_size` of zero is treated as one.
    pub fn new(chunk_size: usize, sample_rate: u32) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            // Room for one partial chunk plus a typical device block.
            buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            sample_rate,
        }
    }

    /// Framer with the standard 4096-sample chunk.
    pub fn with_default_chunk(sample_rate: u32) -> Self {
        Self::new(CHUNK_SIZE, sample_rate)
    }

    /// Append one device block and emit every complete chunk, oldest first.
    ///
    /// Returns the number of chunks emitted. An empty block is a no-op.
    pub fn push<F>(&mut self, block: &[f32], mut emit: F) -> usize
    where
        F: FnMut(PcmChunk),
    {
        if block.is_empty() {
            return 0;
        }

        self.buf.extend_from_slice(block);

        let mut start = 0;
        while self.buf.len() - start >= self.chunk_size {
            let end = start + self.chunk_size;
            emit(PcmChunk::new(&self.buf[start..end], self.sample_rate));
            start = end;
        }

        if start > 0 {
            self.buf.drain(..start);
        }
        start / self.chunk_size
    }

    /// Samples waiting for the next chunk boundary. Always `< chunk_size`.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drop the sub-chunk remainder (session teardown). Returns how many
    /// samples were discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn three_half_chunks_emit_one_chunk() {
        let mut framer = CaptureFramer::with_default_chunk(48_000);
        let mut emitted = Vec::new();

        for n in 0..3 {
            framer.push(&ramp(n * 2048, 2048), |c| emitted.push(c));
        }

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), 4096);
        assert_eq!(emitted[0].samples(), ramp(0, 4096).as_slice());
        assert_eq!(emitted[0].sample_rate(), 48_000);
        assert_eq!(framer.pending(), 2048);
    }

    #[test]
    fn emitted_chunks_are_prefix_of_input() {
        let mut framer = CaptureFramer::new(100, 16_000);
        let mut emitted: Vec<f32> = Vec::new();
        let mut fed: Vec<f32> = Vec::new();

        // Uneven block sizes, including some larger than a whole chunk.
        for (i, len) in [7usize, 93, 250, 1, 0, 399, 50].into_iter().enumerate() {
            let block = ramp(fed.len(), len);
            fed.extend_from_slice(&block);
            let n = framer.push(&block, |c| {
                assert_eq!(c.len(), 100);
                emitted.extend_from_slice(c.samples());
            });
            assert!(framer.pending() < 100, "block {i}: pending={}", framer.pending());
            assert_eq!(emitted.len() + framer.pending(), fed.len());
            assert!(n <= len / 100 + 1);
        }

        let whole = fed.len() / 100 * 100;
        assert_eq!(emitted, &fed[..whole]);
    }

    #[test]
    fn block_larger_than_several_chunks_drains_all() {
        let mut framer = CaptureFramer::new(10, 16_000);
        let mut count = 0;
        let n = framer.push(&ramp(0, 35), |_| count += 1);
        assert_eq!(n, 3);
        assert_eq!(count, 3);
        assert_eq!(framer.pending(), 5);
    }

    #[test]
    fn empty_block_is_noop() {
        let mut framer = CaptureFramer::with_default_chunk(16_000);
        let n = framer.push(&[], |_| panic!("nothing should be emitted"));
        assert_eq!(n, 0);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn discard_drops_remainder() {
        let mut framer = CaptureFramer::new(8, 16_000);
        framer.push(&ramp(0, 13), |_| {});
        assert_eq!(framer.discard(), 5);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn zero_chunk_size_clamped() {
        let framer = CaptureFramer::new(0, 16_000);
        assert_eq!(framer.chunk_size(), 1);
    }
}
