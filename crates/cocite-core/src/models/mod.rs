pub mod graph;
pub mod identifier;
pub mod record;

pub use graph::*;
pub use identifier::*;
pub use record::*;
