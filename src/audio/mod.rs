//! # Audio Module
//!
//! Real-time audio handling for the voice bridge: frame ingestion,
//! chunk accumulation, PCM wire codec, and response emission.
//!
//! ## Key Components:
//! - **Frame Types**: Borrowed inbound frames and owned chunks (`frame`)
//! - **Frame Accumulator**: Downmix + bounded buffering into fixed chunks (`accumulator`)
//! - **PCM Codec**: 16-bit little-endian PCM encode/decode (`pcm`)
//! - **Response Emitter**: Encoded audio out to the transport (`emitter`)
//!
//! ## Audio Format Requirements:
//! - **Bit Depth**: 16-bit PCM
//! - **Encoding**: Little-endian signed integers
//! - **Internal Representation**: f32 samples in [-1.0, 1.0]

pub mod accumulator; // Frame buffering and chunk emission
pub mod emitter; // PCM encoding out to the transport
pub mod frame; // Frame and chunk types
pub mod pcm; // 16-bit PCM wire codec

pub use accumulator::{AccumulatorConfig, FrameAccumulator};
pub use emitter::{AudioSink, ResponseEmitter};
pub use frame::{AudioChunk, AudioFrame};
