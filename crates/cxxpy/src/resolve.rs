//! Reference resolution.
//!
//! Every [`NameRef`] in the model is looked up once and the answer recorded
//! in a [`Resolutions`] side table. Lookups that cross a module boundary
//! register an import on the requesting module. Running the resolver again
//! only visits references it has not seen, so it is idempotent.

use crate::error::UnresolvedNameError;
use crate::model::{DeclId, DeclKind, Expr, Lookup, Model, NameRef, RefId, split_scoped, walk_block};
use std::collections::HashMap;

/// How a resolved name is spelled at the reference site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Parameter, local variable or class-body name: bare.
    Local,
    /// Variable of the requesting module: bare, and declared `global` by
    /// functions that assign it.
    Global,
    /// Instance attribute or method: `self.name`.
    Member,
    /// Declaration reached through its module: dotted path below the module.
    Declared,
    /// `Base::method` called from a subclass: `Base.method(self, ...)`.
    UnboundMethod,
    /// A namespace module used as a value.
    Module,
    /// Not declared in any translated file: bare.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Rendered name; dotted below the module for declared names.
    pub name: String,
    /// Path of the module the target lives in; empty for external names.
    pub module_path: String,
    pub binding: Binding,
}

impl Resolution {
    fn bare(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            module_path: String::new(),
            binding,
        }
    }
}

/// Resolution side table keyed by reference identity.
#[derive(Debug, Clone, Default)]
pub struct Resolutions {
    entries: HashMap<RefId, Resolution>,
}

impl Resolutions {
    pub fn get(&self, id: RefId) -> Option<&Resolution> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: RefId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Visit every expression owned directly by declaration `id`.
fn exprs_of<'a>(model: &'a Model, id: DeclId, visit: &mut dyn FnMut(&'a Expr)) {
    match model.kind(id) {
        DeclKind::Class(class) => {
            if let Some(superclass) = &class.superclass {
                visit(superclass);
            }
        }
        DeclKind::Function(f) | DeclKind::Method(f) | DeclKind::Constructor(f) | DeclKind::Destructor(f) => {
            for init in &f.initializers {
                init.args.iter().for_each(|arg| visit(arg));
            }
            if let Some(body) = &f.statements {
                walk_block(body, visit);
            }
        }
        DeclKind::Attribute(a) => {
            if let Some(value) = &a.value {
                visit(value);
            }
        }
        DeclKind::Variable(v) => {
            if let Some(value) = &v.value {
                visit(value);
            }
        }
        DeclKind::Parameter(p) => {
            if let Some(default) = &p.default {
                visit(default);
            }
        }
        DeclKind::Enumeration(e) => {
            for enumerator in &e.enumerators {
                if let Some(value) = &enumerator.value {
                    visit(value);
                }
            }
        }
        DeclKind::Module(_) => {}
    }
}

/// Resolve every reference not yet in `table`. Returns how many were added.
pub fn resolve(model: &mut Model, table: &mut Resolutions) -> Result<usize, UnresolvedNameError> {
    let mut pending: Vec<NameRef> = Vec::new();
    for id in model.ids() {
        exprs_of(model, id, &mut |expr| {
            expr.walk_names(&mut |name| {
                if !table.contains(name.id) {
                    pending.push(name.clone());
                }
            })
        });
    }

    let mut added = 0;
    for name in pending {
        if table.contains(name.id) {
            continue;
        }
        let resolution = resolve_name(model, &name)?;
        tracing::trace!("{}: `{}` -> {:?}", name.coord, name.raw, resolution);
        table.entries.insert(name.id, resolution);
        added += 1;
    }

    let root = model.root();
    let has_main = model
        .module(root)
        .and_then(|m| m.members.get("main"))
        .is_some_and(|id| matches!(model.kind(id), DeclKind::Function(_)));
    if has_main {
        if let Some(module) = model.module_mut(root) {
            module.add_import("sys", None);
        }
    }
    Ok(added)
}

fn resolve_name(model: &mut Model, name: &NameRef) -> Result<Resolution, UnresolvedNameError> {
    let requester = model.owning_module(name.scope);
    let segments = split_scoped(&name.raw);
    if let [single] = segments.as_slice() {
        return Ok(resolve_unqualified(model, requester, name.scope, single));
    }
    let found = model
        .lookup_qualified(name.scope, &segments)
        .map_err(|missing| UnresolvedNameError {
            name: name.raw.clone(),
            segment: missing.0,
            coord: name.coord.clone(),
        })?;
    Ok(match found {
        Lookup::Enumerator { enumeration, index } => enumerator(model, requester, enumeration, index),
        Lookup::Decl(id) => match target(model, requester, id) {
            Target::Module => module_value(model, requester, id),
            Target::Field => member(model, id),
            Target::Method => Resolution {
                binding: Binding::UnboundMethod,
                ..declared(model, requester, id)
            },
            Target::Global => global(model, id),
            Target::Other => declared(model, requester, id),
        },
    })
}

/// Innermost-to-outermost lookup of an unqualified name.
fn resolve_unqualified(model: &mut Model, requester: DeclId, scope: DeclId, name: &str) -> Resolution {
    let mut current = Some(scope);
    while let Some(context) = current {
        if let Some(found) = model.lookup_member(context, name) {
            return bind_lexical(model, requester, scope, context, found);
        }
        current = model.get(context).parent;
    }
    Resolution::bare(name, Binding::External)
}

fn bind_lexical(model: &mut Model, requester: DeclId, scope: DeclId, context: DeclId, found: Lookup) -> Resolution {
    let in_body = context == scope && model.class(context).is_some();
    match found {
        Lookup::Enumerator { enumeration, index } => {
            let enumerator_name = enumerator_name(model, enumeration, index);
            if context == enumeration {
                return Resolution::bare(enumerator_name, Binding::Local);
            }
            if in_body {
                let name = match model.name(enumeration) {
                    Some(enum_name) => format!("{}.{}", enum_name, enumerator_name),
                    None => enumerator_name,
                };
                return Resolution::bare(name, Binding::Local);
            }
            enumerator(model, requester, enumeration, index)
        }
        Lookup::Decl(id) => {
            let in_module = model.module(context).is_some();
            let in_class = model.class(context).is_some();
            match target(model, requester, id) {
                Target::Module if in_module => module_value(model, requester, id),
                Target::Global if in_module => global(model, id),
                Target::Field | Target::Method if in_class => member(model, id),
                _ if in_module || (in_class && !in_body) => declared(model, requester, id),
                _ => Resolution::bare(model.name(id).unwrap_or_default(), Binding::Local),
            }
        }
    }
}

/// What a found declaration is, as far as spelling it is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Module,
    /// Non-static attribute.
    Field,
    /// Non-static method.
    Method,
    /// Variable declared directly in the requesting module.
    Global,
    Other,
}

fn target(model: &Model, requester: DeclId, id: DeclId) -> Target {
    match model.kind(id) {
        DeclKind::Module(_) => Target::Module,
        DeclKind::Attribute(a) if !a.is_static => Target::Field,
        DeclKind::Method(f) if !f.is_static => Target::Method,
        DeclKind::Variable(v) if !v.is_alias && model.get(id).parent == Some(requester) => Target::Global,
        _ => Target::Other,
    }
}

fn member(model: &Model, id: DeclId) -> Resolution {
    Resolution {
        name: model.name(id).unwrap_or_default().to_string(),
        module_path: model.module_path(id).to_string(),
        binding: Binding::Member,
    }
}

fn global(model: &Model, id: DeclId) -> Resolution {
    Resolution {
        name: model.name(id).unwrap_or_default().to_string(),
        module_path: model.module_path(id).to_string(),
        binding: Binding::Global,
    }
}

/// Namespace module used as a value: imported whole, spelled by path.
fn module_value(model: &mut Model, requester: DeclId, id: DeclId) -> Resolution {
    let path = model.module_path(id).to_string();
    if id != requester {
        if let Some(module) = model.module_mut(requester) {
            module.add_import(&path, None);
        }
    }
    Resolution {
        name: path.clone(),
        module_path: path,
        binding: Binding::Module,
    }
}

/// Dotted path of `id` below its module, importing the first segment when
/// the module differs from the requester.
fn declared(model: &mut Model, requester: DeclId, id: DeclId) -> Resolution {
    let chain: Vec<String> = model
        .path_below_module(id)
        .into_iter()
        .filter_map(|decl| model.name(decl).map(str::to_string))
        .collect();
    let module = model.owning_module(id);
    let path = model.module_path(id).to_string();
    if module != requester {
        if let Some(first) = chain.first() {
            if let Some(m) = model.module_mut(requester) {
                m.add_import(&path, Some(first));
            }
        }
    }
    Resolution {
        name: chain.join("."),
        module_path: path,
        binding: Binding::Declared,
    }
}

fn enumerator_name(model: &Model, enumeration: DeclId, index: usize) -> String {
    model
        .enumeration(enumeration)
        .and_then(|e| e.enumerators.get(index))
        .map(|e| e.name.clone())
        .unwrap_or_default()
}

/// `Enum.NAME` for a named enumeration; an anonymous enumeration's
/// enumerators live directly in its enclosing module or class.
fn enumerator(model: &mut Model, requester: DeclId, enumeration: DeclId, index: usize) -> Resolution {
    let name = enumerator_name(model, enumeration, index);
    if model.name(enumeration).is_some() {
        let base = declared(model, requester, enumeration);
        return Resolution {
            name: format!("{}.{}", base.name, name),
            ..base
        };
    }
    let container = model.get(enumeration).parent.unwrap_or(requester);
    if model.module(container).is_some() {
        let path = model.module_path(container).to_string();
        if container != requester {
            if let Some(m) = model.module_mut(requester) {
                m.add_import(&path, Some(&name));
            }
        }
        return Resolution {
            name,
            module_path: path,
            binding: Binding::Declared,
        };
    }
    let base = declared(model, requester, container);
    Resolution {
        name: format!("{}.{}", base.name, name),
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolved(text: &str) -> (Model, Resolutions) {
        let mut model = Model::new("root");
        parse(&mut model, "test.cpp", text).unwrap();
        let mut table = Resolutions::default();
        resolve(&mut model, &mut table).unwrap();
        (model, table)
    }

    fn names(model: &Model, table: &Resolutions) -> Vec<(String, Binding)> {
        let mut out = Vec::new();
        for id in model.ids() {
            exprs_of(model, id, &mut |expr| {
                expr.walk_names(&mut |name| {
                    let r = table.get(name.id).unwrap();
                    out.push((r.name.clone(), r.binding));
                })
            });
        }
        out
    }

    #[test]
    fn nested_class_from_another_module() {
        let (model, table) = resolved(
            "namespace bar { namespace foo { class Outer { public: class Inner {}; }; } }
             bar::foo::Outer::Inner *make() { return new bar::foo::Outer::Inner(); }",
        );
        let root = model.module(model.root()).unwrap();
        assert_eq!(
            root.imports.get("bar.foo").map(|s| s.iter().cloned().collect::<Vec<_>>()),
            Some(vec!["Outer".to_string()])
        );
        assert!(names(&model, &table).contains(&("Outer.Inner".to_string(), Binding::Declared)));
    }

    #[test]
    fn members_locals_and_globals() {
        let (model, table) = resolved(
            "int total = 0;
             class Foo { int m_x; void set(int x) { int y = x; m_x = y; total = y; } };",
        );
        let found = names(&model, &table);
        assert!(found.contains(&("x".to_string(), Binding::Local)));
        assert!(found.contains(&("m_x".to_string(), Binding::Member)));
        assert!(found.contains(&("total".to_string(), Binding::Global)));
    }

    #[test]
    fn unknown_unqualified_names_stay_external() {
        let (model, table) = resolved("void f() { printf(\"hi\"); }");
        assert_eq!(names(&model, &table), vec![("printf".to_string(), Binding::External)]);
        assert!(model.module(model.root()).unwrap().imports.is_empty());
    }

    #[test]
    fn unknown_scope_is_an_error() {
        let mut model = Model::new("root");
        parse(&mut model, "test.cpp", "void f() { std::puts(\"x\"); }").unwrap();
        let err = resolve(&mut model, &mut Resolutions::default()).unwrap_err();
        assert_eq!(err.segment, "std");
    }

    #[test]
    fn unscoped_enumerators_are_qualified_by_their_enum() {
        let (model, table) = resolved("enum Bar { TOP, LEFT }; int f() { return LEFT; }");
        assert!(names(&model, &table).contains(&("Bar.LEFT".to_string(), Binding::Declared)));
    }

    #[test]
    fn base_method_call_is_unbound() {
        let (model, table) = resolved(
            "class A { public: void run() {} }; class B : public A { void run() { A::run(); } };",
        );
        assert!(names(&model, &table).contains(&("A.run".to_string(), Binding::UnboundMethod)));
    }

    #[test]
    fn resolving_twice_adds_nothing() {
        let mut model = Model::new("root");
        parse(
            &mut model,
            "test.cpp",
            "namespace n { class C {}; } n::C *g() { return new n::C(); }",
        )
        .unwrap();
        let mut table = Resolutions::default();
        let first = resolve(&mut model, &mut table).unwrap();
        let imports = model.module(model.root()).unwrap().imports.clone();
        assert_eq!(resolve(&mut model, &mut table).unwrap(), 0);
        assert!(first > 0);
        assert_eq!(model.module(model.root()).unwrap().imports, imports);
    }

    #[test]
    fn main_requests_sys() {
        let (model, _) = resolved("int main() { return 0; }");
        assert!(model.module(model.root()).unwrap().imports.contains_key("sys"));
    }
}
