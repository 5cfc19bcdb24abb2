//! 笔记存储

pub mod manager;
pub mod types;

pub use manager::{NoteManager, NoteOperation, NoteOperations, NoteReconciliation};
pub use types::{Note, NoteMetadata};
