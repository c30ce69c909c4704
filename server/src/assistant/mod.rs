pub mod gemini;
pub mod intent;
pub mod responder;

pub use responder::Assistant;
