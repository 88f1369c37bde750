//! Translation driver: parse every input, resolve once, render per module.

use crate::error::TranslateError;
use crate::model::Model;
use crate::output::python::PYTHON_WRITER;
use crate::parser::{Parser, ParserState};
use crate::preprocess::{Defines, Preprocessor};
use crate::resolve::{Resolutions, resolve};
use crate::traits::Writer;
use std::path::PathBuf;

/// Owns the module forest and everything that outlives a single file.
///
/// Files parsed into one context share their root module, macro table and
/// type-name classification, so a class declared in one file is known as a
/// type in the next.
pub struct TranslationContext {
    model: Model,
    state: ParserState,
    preprocessor: Preprocessor,
    resolutions: Resolutions,
    writer: &'static dyn Writer,
}

impl TranslationContext {
    pub fn new(root_name: &str) -> Self {
        Self::with_defines(root_name, Defines::new())
    }

    pub fn with_defines(root_name: &str, defines: Defines) -> Self {
        Self {
            model: Model::new(root_name),
            state: ParserState::default(),
            preprocessor: Preprocessor::new(defines),
            resolutions: Resolutions::default(),
            writer: &PYTHON_WRITER,
        }
    }

    /// Render with `writer` instead of the Python writer.
    pub fn with_writer(mut self, writer: &'static dyn Writer) -> Self {
        self.writer = writer;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Direct access to the builder operations.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn resolutions(&self) -> &Resolutions {
        &self.resolutions
    }

    /// Preprocess and parse one file into the root module.
    pub fn parse_source(&mut self, filename: &str, text: &str) -> Result<(), TranslateError> {
        let text = self.preprocessor.run(filename, text)?;
        let state = std::mem::take(&mut self.state);
        self.state = Parser::new(&mut self.model, filename, &text, state).parse_translation_unit()?;
        tracing::debug!("parsed {}", filename);
        Ok(())
    }

    /// Bind every name reference parsed so far. Returns how many references
    /// were newly resolved; a second call with nothing new parsed returns 0.
    pub fn resolve(&mut self) -> Result<usize, TranslateError> {
        Ok(resolve(&mut self.model, &mut self.resolutions)?)
    }

    /// Source text of the module at `module_path`.
    pub fn render(&self, module_path: &str) -> Result<String, TranslateError> {
        let module = self
            .model
            .module_by_path(module_path)
            .ok_or_else(|| TranslateError::UnknownModule(module_path.to_string()))?;
        self.writer.write(&self.model, &self.resolutions, module)
    }

    /// Dotted path of every module, root first.
    pub fn module_paths(&self) -> Vec<String> {
        self.model
            .modules()
            .into_iter()
            .map(|id| self.model.module_path(id).to_string())
            .collect()
    }

    /// Every module rendered, paired with the file it belongs in.
    ///
    /// The root module is `<root>.<ext>`; `a.b` is `a/b.<ext>`, or
    /// `a/b/__init__.<ext>` when it has submodules of its own.
    pub fn render_all(&self) -> Result<Vec<(PathBuf, String)>, TranslateError> {
        let root = self.model.root();
        let extension = self.writer.extension();
        let mut files = Vec::new();
        for id in self.model.modules() {
            let path = self.model.module_path(id);
            let mut file: PathBuf = path.split('.').collect();
            let is_package = id != root
                && self
                    .model
                    .module(id)
                    .is_some_and(|m| !m.submodules.is_empty());
            if is_package {
                file.push(format!("__init__.{}", extension));
            } else {
                file.set_extension(extension);
            }
            files.push((file, self.writer.write(&self.model, &self.resolutions, id)?));
        }
        Ok(files)
    }
}

/// Parse `files` into a fresh context rooted at `root`, resolve, and render
/// the root module.
pub fn translate(root: &str, files: &[(&str, &str)]) -> Result<String, TranslateError> {
    let mut context = TranslationContext::new(root);
    for (filename, text) in files {
        context.parse_source(filename, text)?;
    }
    context.resolve()?;
    context.render(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_carry_across_files() {
        let out = translate(
            "main",
            &[
                ("a.h", "class Point { public: int x; };"),
                ("b.cpp", "int use() { Point p; return p.x; }"),
            ],
        )
        .unwrap();
        assert!(out.contains("class Point:"));
        assert!(out.contains("    p = Point()\n"));
    }

    #[test]
    fn defines_apply_before_parsing() {
        let mut defines = Defines::new();
        defines.insert("LIMIT".to_string(), "10".to_string());
        let mut context = TranslationContext::with_defines("main", defines);
        context
            .parse_source("a.cpp", "// limit\nint limit = LIMIT;")
            .unwrap();
        context.resolve().unwrap();
        assert_eq!(context.render("main").unwrap(), "limit = 10\n");
    }

    #[test]
    fn module_paths_and_files() {
        let mut context = TranslationContext::new("main");
        context
            .parse_source("a.cpp", "namespace bar { namespace foo { int x; } int y; }")
            .unwrap();
        context.resolve().unwrap();
        assert_eq!(context.module_paths(), ["main", "bar", "bar.foo"]);
        let files: Vec<PathBuf> = context
            .render_all()
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(
            files,
            [
                PathBuf::from("main.py"),
                PathBuf::from("bar/__init__.py"),
                PathBuf::from("bar/foo.py"),
            ]
        );
    }

    #[test]
    fn unknown_module_is_an_error() {
        let context = TranslationContext::new("main");
        assert!(matches!(
            context.render("nope"),
            Err(TranslateError::UnknownModule(path)) if path == "nope"
        ));
    }

    #[test]
    fn second_resolve_finds_nothing_new() {
        let mut context = TranslationContext::new("main");
        context.parse_source("a.cpp", "int f(int a) { return a; }").unwrap();
        assert!(context.resolve().unwrap() > 0);
        assert_eq!(context.resolve().unwrap(), 0);
    }
}
