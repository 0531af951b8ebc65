//! docrelay — watch-folder document-to-email relay core.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod route;
pub mod scan;
pub mod stats;
pub mod validate;
pub mod watch;
