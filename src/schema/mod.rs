//! Wire schemas for both API dialects.
//!
//! - `openai`: what clients speak (Chat Completions)
//! - `anthropic`: what the upstream speaks (Messages)

pub mod anthropic;
pub mod openai;
