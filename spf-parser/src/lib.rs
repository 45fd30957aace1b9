mod error;
pub mod spf;

pub use error::*;
pub use spf::{SpfFile, SpfParser};
