//! Wire schemas for the OpenAI and Anthropic API families.
//!
//! Builds request bodies from schema-independent attempts and extracts text from
//! responses. Everything here is pure: no I/O.

pub mod anthropic_types;
pub mod extract;
pub mod openai_types;
pub mod request;
