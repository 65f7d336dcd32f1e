//! Background job queue sequencing file processing and reconciliation

pub mod handler;
pub mod job;
pub mod worker;

pub use handler::*;
pub use job::*;
pub use worker::*;
