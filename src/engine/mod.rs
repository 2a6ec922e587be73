//! Audio Engine Module
//!
//! Core audio plumbing shared by every stage:
//! - Audio buffer management
//! - Decoded clips and category libraries
//! - Cooperative cancellation
//! - File I/O operations

pub mod buffer;
pub mod cancel;
pub mod clip;
pub mod io;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use cancel::CancellationToken;
pub use clip::{CategoryClips, Clip};
pub use io::{export_wav, generate_test_tone, import_clip, load_category_dir, ExportFormat};
