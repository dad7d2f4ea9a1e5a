//! Amostras de aprendizado e exportação para fine-tuning.

mod export;
mod sample;

pub use export::{batch_tag, render, ExportReport, ExportRequest, TrainingExporter};
pub use sample::{LearningSample, SampleFilter};
