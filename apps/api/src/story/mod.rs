// Story generation: catalog normalisation, answer/narrative models, the quality
// evaluator and the bounded-retry narrative acquisition loop.
// All narrative-service calls go through llm_client; no direct Anthropic calls here.

pub mod catalog;
pub mod evaluator;
pub mod models;
pub mod narrative;
pub mod prompts;
