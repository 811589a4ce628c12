// Source discovery and project classification

mod framework;
mod scanner;

pub use framework::Framework;
pub use scanner::{Scanner, ScanStats, SourceFile, SourceFiles, MANIFEST_FILE};
