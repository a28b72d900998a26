// Cover letter generation: multipart intake, upload staging, and the assistant flow.
// All provider calls go through llm_client; no direct HTTP calls here.

pub mod generator;
pub mod handlers;
pub mod prompts;
