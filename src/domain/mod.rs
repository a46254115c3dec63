pub mod content;
pub mod social;
