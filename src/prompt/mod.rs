//! Enriquecimento da instrução enviada ao modelo generativo.

mod enhancer;

pub use enhancer::{EnhancementSnapshot, PromptEnhancer};
