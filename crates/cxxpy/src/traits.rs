//! Trait for target-language writers.

use crate::error::TranslateError;
use crate::model::{DeclId, Model};
use crate::resolve::Resolutions;

/// A writer emits one module of a resolved model as target source code.
pub trait Writer: Send + Sync {
    /// Language identifier (e.g., "python").
    fn language(&self) -> &'static str;

    /// File extension for output (e.g., "py").
    fn extension(&self) -> &'static str;

    /// Emit `module` as source code. Fails on constructs the target cannot
    /// express.
    fn write(
        &self,
        model: &Model,
        resolutions: &Resolutions,
        module: DeclId,
    ) -> Result<String, TranslateError>;
}
