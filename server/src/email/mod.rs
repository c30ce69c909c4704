pub mod client;
pub mod message;
pub mod outbound;
