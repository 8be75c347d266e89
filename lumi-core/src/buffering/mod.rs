//! Lock-free SPSC rings between the real-time audio callbacks and the
//! control thread.
//!
//! Two rings exist per session:
//!
//! ```text
//! input callback ──(PcmChunk)──► chunk ring ──► pipeline thread
//! playback scheduler ──(f32)──► sample ring ──► output callback
//! ```
//!
//! Both use `ringbuf::HeapRb`, whose `try_push`/`push_slice`/`try_pop` are
//! wait-free and never allocate once the ring exists.

pub mod chunk;
pub mod framer;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

use chunk::PcmChunk;

/// Producer half for framed chunks, held by the input callback.
pub type ChunkProducer = ringbuf::HeapProd<PcmChunk>;

/// Consumer half for framed chunks, held by the pipeline thread.
pub type ChunkConsumer = ringbuf::HeapCons<PcmChunk>;

/// Producer half for playback samples, held by the playback scheduler.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half for playback samples, held by the output callback.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Default chunk ring depth: 64 × 4096 samples ≈ 5.5 s at 48 kHz.
pub const DEFAULT_CHUNK_CAPACITY: usize = 64;

/// Create a bounded chunk queue. `capacity` is clamped to at least 1.
pub fn create_chunk_ring(capacity: usize) -> (ChunkProducer, ChunkConsumer) {
    HeapRb::<PcmChunk>::new(capacity.max(1)).split()
}

/// Create a playback sample ring holding `capacity` mono samples.
pub fn create_sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(capacity.max(1)).split()
}
