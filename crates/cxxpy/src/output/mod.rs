//! Output writers - emit the model as source code.

pub mod python;
pub mod writer;

pub use python::{PYTHON_WRITER, PythonWriter, PythonWriterImpl};
pub use writer::CodeWriter;
