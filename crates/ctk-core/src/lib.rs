pub mod config;
pub mod describe;
pub mod error;
pub mod index;
pub mod ir;
pub mod parse;
pub mod snapshot;
pub mod synth;
pub mod transform;

pub use error::GeneratorError;

/// A generated artifact with its path relative to the output directory.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Trait for generators that produce artifacts from a normalized contract.
pub trait ArtifactGenerator {
    type Config;
    type Error: std::error::Error;
    fn generate(
        &self,
        ir: &ir::IrDocument,
        config: &Self::Config,
    ) -> Result<Vec<GeneratedFile>, Self::Error>;
}
