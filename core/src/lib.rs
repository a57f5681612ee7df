pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod loader;
pub mod notes;
pub mod reorder;
pub mod tags;
pub mod thumbnail;

pub use db::{Attachment, Database, Note};
pub use error::{NotesError, NotesResult};
pub use notes::{NoteRepository, NoteUpdate, SavedNote};
