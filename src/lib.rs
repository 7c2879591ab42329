//! # Retake
//!
//! A non-destructive range-editing core for voice conversion workflows.
//! Retake sits between a raw waveform and an external conversion backend:
//! the user converts arbitrary, possibly overlapping time ranges, every
//! prior attempt stays recoverable as a switchable version, overlapping
//! edits compose deterministically (last applied wins), and the result
//! renders at any zoom level through a min/max mipmap.
//!
//! ## Example
//!
//! ```no_run
//! use retake::{ApplyOptions, ConvertParams, EditingSession, MemoryStore};
//!
//! let source = vec![0.0_f32; 44100];
//! let mut session = EditingSession::new(source, 44100, Box::new(MemoryStore::new()));
//!
//! // Apply externally converted audio over one second.
//! let converted = vec![0.5_f32; 44100];
//! let id = session
//!     .apply_conversion(0, 44100, converted, ConvertParams::new(), ApplyOptions::default())
//!     .unwrap();
//!
//! // Every edit is undoable.
//! session.undo();
//! assert!(session.part(&id).is_none());
//! ```

pub mod audio;
pub mod cli;
pub mod compose;
pub mod convert;
pub mod error;
pub mod history;
pub mod mipmap;
pub mod part;
pub mod session;
pub mod store;

pub use compose::{Composer, FadeLaw};
pub use convert::{Converter, MockConverter};
pub use error::{Result, RetakeError};
pub use history::{HistoryManager, Snapshot};
pub use mipmap::Mipmap;
pub use part::{ConvertParams, PartGroup, Version};
pub use session::{ApplyOptions, ConvertOptions, EditingSession, Track};
pub use store::{DirStore, MemoryStore, VersionStore};
