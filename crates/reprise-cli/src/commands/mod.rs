pub mod add;
pub mod clear;
pub mod common;
pub mod completions;
pub mod delete;
pub mod export;
pub mod import;
pub mod key;
pub mod list;
pub mod position;
pub mod sync;
pub mod watch;
