//! Control channel — s-expression requests against the running monitor.

pub mod dispatch;

pub use dispatch::{format_event, handle_message};
