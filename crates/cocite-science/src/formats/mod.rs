pub mod ris;

pub use ris::{RisEntry, RisStats, extract_dois_from_ris, parse_ris};
