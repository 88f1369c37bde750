//! Registry for writers.

use crate::traits::Writer;
use std::sync::{OnceLock, RwLock};

/// Global writer registry.
static WRITERS: RwLock<Vec<&'static dyn Writer>> = RwLock::new(Vec::new());
static WRITERS_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Register a custom writer. Later registrations shadow earlier ones for
/// the same language.
pub fn register_writer(writer: &'static dyn Writer) {
    init_writers();
    WRITERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(0, writer);
}

fn init_writers() {
    WRITERS_INITIALIZED.get_or_init(|| {
        WRITERS
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(&crate::output::python::PYTHON_WRITER);
    });
}

/// Get a writer by language name.
pub fn writer_for_language(lang: &str) -> Option<&'static dyn Writer> {
    init_writers();
    WRITERS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .find(|w| w.language() == lang)
        .copied()
}

/// Get all registered writers.
pub fn writers() -> Vec<&'static dyn Writer> {
    init_writers();
    WRITERS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_writer_is_builtin() {
        let writer = writer_for_language("python").expect("python writer");
        assert_eq!(writer.language(), "python");
        assert_eq!(writer.extension(), "py");
        assert!(writers().iter().any(|w| w.language() == "python"));
    }

    #[test]
    fn unknown_language_has_no_writer() {
        assert!(writer_for_language("cobol").is_none());
    }
}
