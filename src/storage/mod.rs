//! Storage module
//!
//! Piece assembly, whole-file assembly and output destinations.

pub mod assembly;
pub mod backend;
pub mod piece;

pub use assembly::FileAssembly;
pub use backend::{FileOutput, OutputWriter};
pub use piece::{BlockRequest, PieceAssembly, PieceJob};
