//! Byte ring buffer that decouples audio producers and consumers working at
//! unrelated chunk sizes, plus the frame pipeline served by `frameringd`.

pub mod circular_buffer;
pub mod config;
pub mod denoise;
pub mod error;
pub mod pipeline;
pub mod sources;

pub use circular_buffer::CircularBuffer;
