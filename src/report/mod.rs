pub mod decode;

pub use decode::{decode_report, load_report};
