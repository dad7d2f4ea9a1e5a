//! Mineração de patterns textuais a partir do feedback médico.

mod dosage;
mod keywords;
mod miner;

pub use dosage::DosageExtractor;
pub use keywords::{KeywordCounter, Tokenizer};
pub use miner::{MiningReport, PatternMiner};
