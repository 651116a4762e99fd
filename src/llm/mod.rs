// LLM abstraction layer

pub mod provider;
pub mod openai_compat;

pub use provider::*;
