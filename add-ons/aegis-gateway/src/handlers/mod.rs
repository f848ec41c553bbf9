pub mod chat;
pub mod privacy;
pub mod stats;
