// JD generation engine.
// Schema contract, extraction, validation and the self-correcting orchestrator.
// All generator calls go through llm_client::TextGenerator.

pub mod extraction;
pub mod orchestrator;
pub mod prompts;
pub mod render;
pub mod schema;
pub mod validation;
