//! Type/non-type classification of names per lexical scope.
//!
//! The parser pushes a frame for every brace-delimited body and consults
//! [`ScopeTracker::is_type`] to decide whether `T * x;` declares a pointer or
//! multiplies two values.

use crate::error::ScopeError;
use std::collections::HashMap;

/// One brace level: name -> is_type.
#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    names: HashMap<String, bool>,
}

impl ScopeFrame {
    fn declare(&mut self, name: &str, is_type: bool) -> Result<(), ScopeError> {
        match self.names.get(name) {
            Some(&existing) if existing != is_type => Err(ScopeError::Redeclaration {
                name: name.to_string(),
                was: classification(existing),
                now: classification(is_type),
            }),
            _ => {
                self.names.insert(name.to_string(), is_type);
                Ok(())
            }
        }
    }
}

fn classification(is_type: bool) -> &'static str {
    if is_type { "type" } else { "non-type" }
}

/// Stack of scope frames. The root frame is never popped.
#[derive(Debug, Clone)]
pub struct ScopeTracker {
    frames: Vec<ScopeFrame>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_scope(&mut self) {
        self.frames.push(ScopeFrame::default());
    }

    pub fn pop_scope(&mut self) -> Result<(), ScopeError> {
        if self.frames.len() <= 1 {
            return Err(ScopeError::Underflow);
        }
        self.frames.pop();
        Ok(())
    }

    pub fn declare_type(&mut self, name: &str) -> Result<(), ScopeError> {
        self.current().declare(name, true)
    }

    pub fn declare_non_type(&mut self, name: &str) -> Result<(), ScopeError> {
        self.current().declare(name, false)
    }

    /// Innermost classification wins; unknown names are values.
    pub fn is_type(&self, name: &str) -> bool {
        self.classify(name).unwrap_or(false)
    }

    /// Classification of `name`, or `None` if no frame declares it.
    pub fn classify(&self, name: &str) -> Option<bool> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.names.get(name).copied())
    }

    fn current(&mut self) -> &mut ScopeFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_not_types() {
        let scopes = ScopeTracker::new();
        assert!(!scopes.is_type("Foo"));
    }

    #[test]
    fn inner_frames_shadow_outer() {
        let mut scopes = ScopeTracker::new();
        scopes.declare_type("T").unwrap();
        scopes.push_scope();
        scopes.declare_non_type("T").unwrap();
        assert!(!scopes.is_type("T"));
        scopes.pop_scope().unwrap();
        assert!(scopes.is_type("T"));
    }

    #[test]
    fn conflicting_classification_in_same_frame_fails() {
        let mut scopes = ScopeTracker::new();
        scopes.declare_type("Foo").unwrap();
        scopes.declare_type("Foo").unwrap();
        let err = scopes.declare_non_type("Foo").unwrap_err();
        assert!(matches!(err, ScopeError::Redeclaration { .. }));
    }

    #[test]
    fn root_frame_cannot_be_popped() {
        let mut scopes = ScopeTracker::new();
        scopes.push_scope();
        assert!(scopes.pop_scope().is_ok());
        assert_eq!(scopes.pop_scope(), Err(ScopeError::Underflow));
        assert_eq!(scopes.depth(), 1);
    }
}
