pub mod prompts;
pub mod replies;
pub mod sanitize;

pub use sanitize::{clean_json, parse_reply, safe_parse};
