//! G-code interpreter
//!
//! Collapsed lines are scanned word by word into a [`ParserBlock`],
//! validated against the persistent [`ParserState`] and executed through
//! the motion layer. A line either runs completely or is rejected with a
//! [`GcodeError`] before anything changes.

pub mod block;
pub mod coords;
pub mod error;
mod execute;
pub mod line;
pub mod modal;
pub mod number;
pub mod parser;
pub mod state;
mod validate;
pub mod words;

pub use block::ParserBlock;
pub use coords::CoordinateTable;
pub use error::GcodeError;
pub use line::{LineBuffer, LineStatus};
pub use modal::ModalState;
pub use parser::Parser;
pub use state::ParserState;
