//! Source-to-source translation from a C++ subset to Python 3.
//!
//! `cxxpy` parses C++ declarations and function bodies into a declarative
//! model of modules, classes, functions, statements and expressions,
//! resolves every name reference across the module forest (synthesising the
//! imports the output needs), and pretty-prints each module as Python.
//!
//! # Architecture
//!
//! ```text
//! text ─> Preprocessor ─> Lexer/TokenStream ─> Parser <─> ScopeTracker
//!                                                │
//!                                                v
//!                        PythonWriter <─ Resolver <─ Model
//! ```
//!
//! # Example
//!
//! ```
//! use cxxpy::translate;
//!
//! let python = translate("main", &[("a.cpp", "int twice(int x) { return x * 2; }")])?;
//! assert_eq!(python, "def twice(x):\n    return x * 2\n");
//! # Ok::<(), cxxpy::TranslateError>(())
//! ```
//!
//! # Note on Translation Fidelity
//!
//! This is **surface-level** translation: templates are erased to duck-typed
//! code, pointers and references disappear, and integer semantics follow
//! Python rather than C++.

pub mod context;
pub mod error;
pub mod lexer;
pub mod model;
pub mod output;
pub mod parser;
pub mod preprocess;
pub mod registry;
pub mod resolve;
pub mod scope;
pub mod traits;

// Re-exports: driver
pub use context::{TranslationContext, translate};

// Re-exports: errors
pub use error::{
    Coord, LexError, PreprocessError, ScopeError, StructuralError, SyntaxError, TranslateError,
    UnresolvedNameError,
};

// Re-exports: phases
pub use lexer::{Lexer, Token, TokenKind};
pub use model::{DeclId, Model};
pub use preprocess::{Defines, Preprocessor};
pub use resolve::{Binding, Resolution, Resolutions, resolve};
pub use scope::ScopeTracker;

// Re-exports: traits and registry
pub use registry::{register_writer, writer_for_language, writers};
pub use traits::Writer;

// Re-exports: built-in writers
pub use output::python::PythonWriterImpl;
pub use output::{CodeWriter, PYTHON_WRITER, PythonWriter};
