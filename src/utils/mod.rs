pub mod text;
pub mod time;

pub use text::{collapse_whitespace, decode_entities};
pub use time::{current_human_timestamp, current_rfc3339};
