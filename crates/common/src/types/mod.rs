pub mod chat;
pub mod outcome;

pub use chat::*;
pub use outcome::*;
