//! Declarative model of the translated program.
//!
//! Declarations live in an arena owned by [`Model`] and are addressed by
//! [`DeclId`]. Each declaration has exactly one owner; `parent` and `root`
//! are non-owning back references used for name lookup and import
//! attribution. All mutation goes through the `add_*` builder operations,
//! which enforce the target language's structural rules.

pub mod ast;
mod enums;

pub use ast::{
    AssignOp, BinaryOp, Block, Expr, Literal, LiteralKind, NameRef, PrimitiveType, RefId, Stmt,
    SwitchCase, UnaryOp, walk_block,
};
pub use enums::{EnumValue, Enumeration, Enumerator, parse_int_literal};

use crate::error::{Coord, StructuralError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Stable index of a declaration in the model arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(u32);

impl DeclId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeclId({})", self.0)
    }
}

/// Insertion-ordered name table. Re-inserting a name replaces the entry in
/// its original position.
#[derive(Debug, Clone, Default)]
pub struct Members {
    order: Vec<DeclId>,
    names: HashMap<String, DeclId>,
}

impl Members {
    /// Insert `id`, returning the declaration it replaced.
    pub fn insert(&mut self, name: Option<&str>, id: DeclId) -> Option<DeclId> {
        let Some(name) = name else {
            self.order.push(id);
            return None;
        };
        match self.names.insert(name.to_string(), id) {
            Some(old) => {
                if let Some(slot) = self.order.iter_mut().find(|slot| **slot == old) {
                    *slot = id;
                }
                Some(old)
            }
            None => {
                self.order.push(id);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<DeclId> {
        self.names.get(name).copied()
    }

    /// Give an unnamed entry a name, dropping any entry it displaces.
    fn name_entry(&mut self, name: &str, id: DeclId) -> Option<DeclId> {
        let old = self.names.insert(name.to_string(), id)?;
        self.order.retain(|slot| *slot != old);
        Some(old)
    }

    pub fn iter(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Dotted import path.
    pub path: String,
    pub members: Members,
    pub submodules: Members,
    /// Import path -> symbols. An empty set imports the whole module.
    pub imports: BTreeMap<String, BTreeSet<String>>,
}

impl Module {
    pub fn add_import(&mut self, path: &str, symbol: Option<&str>) {
        let symbols = self.imports.entry(path.to_string()).or_default();
        if let Some(symbol) = symbol {
            symbols.insert(symbol.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Struct,
    Union,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub kind: ClassKind,
    /// Reference to the single base class, if any.
    pub superclass: Option<Expr>,
    /// Keyed by parameter-type signature, hence sorted.
    pub constructors: BTreeMap<Vec<String>, DeclId>,
    pub destructor: Option<DeclId>,
    /// Attributes, methods and nested types in declaration order.
    pub members: Members,
}

impl Class {
    pub fn new(kind: ClassKind) -> Self {
        Self {
            kind,
            superclass: None,
            constructors: BTreeMap::new(),
            destructor: None,
            members: Members::default(),
        }
    }
}

/// `name(args)` entry of a constructor's member initialiser list.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInit {
    pub name: String,
    pub args: Vec<Expr>,
    pub coord: Coord,
}

/// Body-carrying declaration: free function, method, constructor or
/// destructor.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub parameters: Vec<DeclId>,
    /// `None` until a body is supplied (forward declaration).
    pub statements: Option<Block>,
    /// Parameters and local variables.
    pub locals: Members,
    pub signature: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_pure: bool,
    pub initializers: Vec<MemberInit>,
}

#[derive(Debug, Clone, Default)]
pub struct Attribute {
    pub value: Option<Expr>,
    pub is_static: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Variable {
    pub value: Option<Expr>,
    /// `typedef`/`using` alias of a class type.
    pub is_alias: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Parameter {
    pub type_name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    Module(Module),
    Enumeration(Enumeration),
    Function(Function),
    Class(Class),
    Attribute(Attribute),
    Constructor(Function),
    Destructor(Function),
    Method(Function),
    Variable(Variable),
    Parameter(Parameter),
}

impl DeclKind {
    pub fn describe(&self) -> &'static str {
        match self {
            DeclKind::Module(_) => "module",
            DeclKind::Enumeration(_) => "enumeration",
            DeclKind::Function(_) => "function",
            DeclKind::Class(_) => "class",
            DeclKind::Attribute(_) => "attribute",
            DeclKind::Constructor(_) => "constructor",
            DeclKind::Destructor(_) => "destructor",
            DeclKind::Method(_) => "method",
            DeclKind::Variable(_) => "variable",
            DeclKind::Parameter(_) => "parameter",
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            DeclKind::Function(f)
            | DeclKind::Constructor(f)
            | DeclKind::Destructor(f)
            | DeclKind::Method(f) => Some(f),
            _ => None,
        }
    }

    fn as_function_mut(&mut self) -> Option<&mut Function> {
        match self {
            DeclKind::Function(f)
            | DeclKind::Constructor(f)
            | DeclKind::Destructor(f)
            | DeclKind::Method(f) => Some(f),
            _ => None,
        }
    }

    /// The context's own name table, if this kind owns nested declarations.
    pub fn members(&self) -> Option<&Members> {
        match self {
            DeclKind::Module(m) => Some(&m.members),
            DeclKind::Class(c) => Some(&c.members),
            DeclKind::Function(f)
            | DeclKind::Constructor(f)
            | DeclKind::Destructor(f)
            | DeclKind::Method(f) => Some(&f.locals),
            _ => None,
        }
    }

    fn members_mut(&mut self) -> Option<&mut Members> {
        match self {
            DeclKind::Module(m) => Some(&mut m.members),
            DeclKind::Class(c) => Some(&mut c.members),
            DeclKind::Function(f)
            | DeclKind::Constructor(f)
            | DeclKind::Destructor(f)
            | DeclKind::Method(f) => Some(&mut f.locals),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: Option<String>,
    pub parent: Option<DeclId>,
    /// Module that transitively owns this declaration.
    pub root: DeclId,
    pub coord: Coord,
    pub kind: DeclKind,
}

/// Parameter as parsed, before it becomes a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: Option<String>,
    pub type_name: String,
    pub default: Option<Expr>,
    pub coord: Coord,
}

/// Everything about a function declarator except its body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionSpec {
    pub params: Vec<ParamSpec>,
    pub return_type: String,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_pure: bool,
    pub has_body: bool,
}

impl FunctionSpec {
    pub fn signature(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|p| normalize_type_name(&p.type_name))
            .collect()
    }
}

/// Strip qualifier noise and collapse whitespace so that `const Foo &` and
/// `Foo&` compare equal.
pub fn normalize_type_name(raw: &str) -> String {
    const NOISE: &[&str] = &[
        "const", "volatile", "class", "struct", "union", "enum", "virtual", "typename",
    ];
    let mut spaced = String::with_capacity(raw.len() * 2);
    for ch in raw.replace("::", " :: ").chars() {
        if matches!(ch, '*' | '&' | '<' | '>' | ',') {
            spaced.push(' ');
            spaced.push(ch);
            spaced.push(' ');
        } else {
            spaced.push(ch);
        }
    }
    let mut out = String::new();
    let mut tokens = spaced.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if NOISE.contains(&token) {
            continue;
        }
        out.push_str(token);
        let glue = matches!(token, "::" | "<" | "*" | "&")
            || tokens
                .peek()
                .is_some_and(|next| matches!(*next, "::" | "<" | ">" | "*" | "&" | ","));
        if !glue && tokens.peek().is_some() {
            out.push(' ');
        }
    }
    out
}

/// Result of looking a name up in one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Decl(DeclId),
    Enumerator { enumeration: DeclId, index: usize },
}

/// Failed qualified lookup: the segment that was missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSegment(pub String);

/// Arena of declarations rooted at one top-level module.
#[derive(Debug, Clone)]
pub struct Model {
    decls: Vec<Declaration>,
    root: DeclId,
    next_ref: u32,
}

impl Model {
    pub fn new(root_name: &str) -> Self {
        let root = DeclId(0);
        let module = Module {
            path: root_name.to_string(),
            ..Module::default()
        };
        Self {
            decls: vec![Declaration {
                name: Some(root_name.to_string()),
                parent: None,
                root,
                coord: Coord::new(root_name, 0, None),
                kind: DeclKind::Module(module),
            }],
            root,
            next_ref: 0,
        }
    }

    /// Allocate a fresh name-reference identity.
    pub fn fresh_ref(&mut self) -> RefId {
        let id = RefId(self.next_ref);
        self.next_ref += 1;
        id
    }

    pub fn root(&self) -> DeclId {
        self.root
    }

    pub fn get(&self, id: DeclId) -> &Declaration {
        &self.decls[id.0 as usize]
    }

    fn get_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.0 as usize]
    }

    /// Every declaration id in creation order.
    pub fn ids(&self) -> impl Iterator<Item = DeclId> + use<> {
        (0..self.decls.len() as u32).map(DeclId)
    }

    /// Module that owns `id`, or `id` itself for a module.
    pub fn owning_module(&self, id: DeclId) -> DeclId {
        self.get(id).root
    }

    pub fn kind(&self, id: DeclId) -> &DeclKind {
        &self.get(id).kind
    }

    pub fn name(&self, id: DeclId) -> Option<&str> {
        self.get(id).name.as_deref()
    }

    pub fn module(&self, id: DeclId) -> Option<&Module> {
        match self.kind(id) {
            DeclKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn module_mut(&mut self, id: DeclId) -> Option<&mut Module> {
        match &mut self.get_mut(id).kind {
            DeclKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn class(&self, id: DeclId) -> Option<&Class> {
        match self.kind(id) {
            DeclKind::Class(c) => Some(c),
            _ => None,
        }
    }

    fn class_mut(&mut self, id: DeclId) -> Option<&mut Class> {
        match &mut self.get_mut(id).kind {
            DeclKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn function(&self, id: DeclId) -> Option<&Function> {
        self.kind(id).as_function()
    }

    pub fn enumeration(&self, id: DeclId) -> Option<&Enumeration> {
        match self.kind(id) {
            DeclKind::Enumeration(e) => Some(e),
            _ => None,
        }
    }

    /// Dotted path of the module that owns `id`.
    pub fn module_path(&self, id: DeclId) -> &str {
        let root = self.get(id).root;
        self.module(root).map(|m| m.path.as_str()).unwrap_or("")
    }

    /// Every module, depth first in creation order.
    pub fn modules(&self) -> Vec<DeclId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(module) = self.module(id) {
                let mut children: Vec<_> = module.submodules.iter().collect();
                children.reverse();
                stack.extend(children);
            }
        }
        out
    }

    pub fn module_by_path(&self, path: &str) -> Option<DeclId> {
        self.modules()
            .into_iter()
            .find(|id| self.module(*id).is_some_and(|m| m.path == path))
    }

    fn alloc(&mut self, parent: DeclId, name: Option<String>, coord: Coord, kind: DeclKind) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        let root = match kind {
            DeclKind::Module(_) => id,
            _ => self.get(parent).root,
        };
        self.decls.push(Declaration {
            name,
            parent: Some(parent),
            root,
            coord,
            kind,
        });
        id
    }

    /// Namespace module `name` under `parent`, created on first use.
    pub fn add_module(&mut self, parent: DeclId, name: &str, coord: Coord) -> DeclId {
        if let Some(existing) = self.module(parent).and_then(|m| m.submodules.get(name)) {
            return existing;
        }
        let path = if parent == self.root {
            name.to_string()
        } else {
            format!("{}.{}", self.module_path(parent), name)
        };
        let module = Module {
            path,
            ..Module::default()
        };
        let id = self.alloc(parent, Some(name.to_string()), coord, DeclKind::Module(module));
        if let Some(m) = self.module_mut(parent) {
            m.submodules.insert(Some(name), id);
        }
        id
    }

    /// Create a declaration and register it in `parent`'s name table.
    /// A same-named entry is replaced in place with a warning.
    pub fn add_declaration(
        &mut self,
        parent: DeclId,
        name: Option<&str>,
        kind: DeclKind,
        coord: Coord,
    ) -> DeclId {
        let is_named_enum = matches!(kind, DeclKind::Enumeration(_)) && name.is_some();
        let id = self.alloc(parent, name.map(str::to_string), coord.clone(), kind);
        let replaced = self
            .get_mut(parent)
            .kind
            .members_mut()
            .and_then(|members| members.insert(name, id));
        if let Some(old) = replaced {
            tracing::warn!(
                "{}: `{}` redeclared, replacing previous {}",
                coord,
                name.unwrap_or_default(),
                self.kind(old).describe()
            );
        }
        if is_named_enum {
            let module = self.get(id).root;
            if let Some(m) = self.module_mut(module) {
                m.add_import("enum", Some("Enum"));
            }
        }
        id
    }

    pub fn add_attribute(&mut self, class: DeclId, name: &str, attribute: Attribute, coord: Coord) -> DeclId {
        self.add_declaration(class, Some(name), DeclKind::Attribute(attribute), coord)
    }

    /// Register a parameter on a function-like declaration.
    pub fn add_parameter(&mut self, function: DeclId, spec: &ParamSpec, index: usize) -> DeclId {
        let name = spec.name.clone().unwrap_or_else(|| format!("arg{}", index));
        let param = Parameter {
            type_name: spec.type_name.clone(),
            default: spec.default.clone(),
        };
        let id = self.add_declaration(
            function,
            Some(&name),
            DeclKind::Parameter(param),
            spec.coord.clone(),
        );
        if let Some(f) = self.get_mut(function).kind.as_function_mut() {
            f.parameters.push(id);
        }
        id
    }

    /// Local variable of a function body; repeated names share one entry.
    pub fn add_local(&mut self, function: DeclId, name: &str, coord: Coord) -> DeclId {
        if let Some(existing) = self.kind(function).members().and_then(|m| m.get(name)) {
            return existing;
        }
        self.add_declaration(function, Some(name), DeclKind::Variable(Variable::default()), coord)
    }

    pub fn set_statements(&mut self, function: DeclId, statements: Block) {
        if let Some(f) = self.get_mut(function).kind.as_function_mut() {
            f.statements = Some(statements);
        }
    }

    fn build_function(spec: &FunctionSpec) -> Function {
        Function {
            signature: spec.signature(),
            return_type: spec.return_type.clone(),
            is_static: spec.is_static,
            is_virtual: spec.is_virtual,
            is_pure: spec.is_pure,
            ..Function::default()
        }
    }

    fn add_params(&mut self, id: DeclId, spec: &FunctionSpec) {
        for (index, param) in spec.params.iter().enumerate() {
            self.add_parameter(id, param, index);
        }
    }

    /// Replace a forward declaration's parameters and flags with those of
    /// its definition, keeping the node.
    fn complete_forward(&mut self, id: DeclId, spec: &FunctionSpec) {
        if let Some(f) = self.get_mut(id).kind.as_function_mut() {
            let was_static = f.is_static;
            let was_virtual = f.is_virtual;
            f.parameters.clear();
            f.locals = Members::default();
            f.is_static = was_static || spec.is_static;
            f.is_virtual = was_virtual || spec.is_virtual;
            f.is_pure = spec.is_pure;
        }
        self.add_params(id, spec);
    }

    /// Whether `existing` is a bodiless declaration with the same signature.
    fn is_forward_of(&self, existing: DeclId, spec: &FunctionSpec) -> bool {
        self.function(existing)
            .is_some_and(|f| f.statements.is_none() && f.signature == spec.signature())
    }

    fn function_like(
        &mut self,
        parent: DeclId,
        name: &str,
        spec: &FunctionSpec,
        coord: Coord,
        make: fn(Function) -> DeclKind,
    ) -> DeclId {
        let existing = self.kind(parent).members().and_then(|m| m.get(name));
        if let Some(existing) = existing {
            let same_kind = std::mem::discriminant(self.kind(existing))
                == std::mem::discriminant(&make(Function::default()));
            if same_kind && self.is_forward_of(existing, spec) {
                if spec.has_body {
                    self.complete_forward(existing, spec);
                }
                return existing;
            }
            if same_kind && !spec.has_body {
                let matches = self
                    .function(existing)
                    .is_some_and(|f| f.signature == spec.signature());
                if matches {
                    return existing;
                }
            }
        }
        let id = self.add_declaration(parent, Some(name), make(Self::build_function(spec)), coord);
        self.add_params(id, spec);
        id
    }

    /// Free function. A definition completes a matching forward declaration.
    pub fn add_function(&mut self, module: DeclId, name: &str, spec: &FunctionSpec, coord: Coord) -> DeclId {
        self.function_like(module, name, spec, coord, DeclKind::Function)
    }

    /// Method. Same-named methods overwrite earlier ones (with a warning)
    /// unless the new one completes a matching forward declaration.
    pub fn add_method(&mut self, class: DeclId, name: &str, spec: &FunctionSpec, coord: Coord) -> DeclId {
        self.function_like(class, name, spec, coord, DeclKind::Method)
    }

    /// Constructor keyed by its parameter-type signature.
    pub fn add_constructor(&mut self, class: DeclId, spec: &FunctionSpec, coord: Coord) -> DeclId {
        let signature = spec.signature();
        let existing = self
            .class(class)
            .and_then(|c| c.constructors.get(&signature).copied());
        if let Some(existing) = existing {
            let has_body = self
                .function(existing)
                .is_some_and(|f| f.statements.is_some());
            if !has_body {
                if spec.has_body {
                    self.complete_forward(existing, spec);
                }
                return existing;
            }
            if !spec.has_body {
                return existing;
            }
            tracing::warn!(
                "{}: duplicate constructor signature ({}), replacing previous definition",
                coord,
                signature.join(", ")
            );
        }
        let name = self.name(class).map(str::to_string);
        let id = self.alloc(class, name, coord, DeclKind::Constructor(Self::build_function(spec)));
        self.add_params(id, spec);
        if let Some(c) = self.class_mut(class) {
            c.constructors.insert(signature, id);
        }
        id
    }

    /// At most one destructor per class. A bodiless destructor may be
    /// replaced once by one with a body; two bodies is a hard error.
    pub fn add_destructor(
        &mut self,
        class: DeclId,
        spec: &FunctionSpec,
        coord: Coord,
    ) -> Result<DeclId, StructuralError> {
        let existing = self.class(class).and_then(|c| c.destructor);
        if let Some(existing) = existing {
            let has_body = self
                .function(existing)
                .is_some_and(|f| f.statements.is_some());
            match (has_body, spec.has_body) {
                (true, true) => {
                    return Err(StructuralError {
                        message: format!(
                            "cannot handle multiple destructors for `{}`",
                            self.name(class).unwrap_or_default()
                        ),
                        coord,
                    });
                }
                (false, true) => {
                    self.complete_forward(existing, spec);
                    return Ok(existing);
                }
                _ => return Ok(existing),
            }
        }
        let name = self.name(class).map(|n| format!("~{}", n));
        let id = self.alloc(class, name, coord, DeclKind::Destructor(Self::build_function(spec)));
        if let Some(c) = self.class_mut(class) {
            c.destructor = Some(id);
        }
        Ok(id)
    }

    /// Name a previously anonymous class or enumeration, as in
    /// `typedef struct { ... } Name;`.
    pub fn name_anonymous(&mut self, id: DeclId, name: &str) {
        self.get_mut(id).name = Some(name.to_string());
        let Some(parent) = self.get(id).parent else {
            return;
        };
        let displaced = self
            .get_mut(parent)
            .kind
            .members_mut()
            .and_then(|members| members.name_entry(name, id));
        if let Some(old) = displaced {
            tracing::warn!(
                "{}: `{}` redeclared, replacing previous {}",
                self.get(id).coord,
                name,
                self.kind(old).describe()
            );
        }
        if matches!(self.kind(id), DeclKind::Enumeration(_)) {
            let module = self.get(id).root;
            if let Some(m) = self.module_mut(module) {
                m.add_import("enum", Some("Enum"));
            }
        }
    }

    pub fn set_initializers(&mut self, function: DeclId, initializers: Vec<MemberInit>) {
        if let Some(f) = self.get_mut(function).kind.as_function_mut() {
            f.initializers = initializers;
        }
    }

    /// Move the members of an anonymous class or union into its owner, as
    /// for `union { int a; float b; };` inside a struct.
    pub fn dissolve_anonymous(&mut self, anonymous: DeclId) {
        let Some(owner) = self.get(anonymous).parent else {
            return;
        };
        let members: Vec<DeclId> = self
            .class(anonymous)
            .map(|c| c.members.iter().collect())
            .unwrap_or_default();
        if let Some(table) = self.get_mut(owner).kind.members_mut() {
            table.order.retain(|slot| *slot != anonymous);
        }
        for member in members {
            self.get_mut(member).parent = Some(owner);
            let name = self.get(member).name.clone();
            if let Some(table) = self.get_mut(owner).kind.members_mut() {
                table.insert(name.as_deref(), member);
            }
        }
    }

    pub fn set_superclass(&mut self, class: DeclId, superclass: Expr) {
        if let Some(c) = self.class_mut(class) {
            c.superclass = Some(superclass);
        }
    }

    /// Append an enumerator, applying the numbering law.
    pub fn add_enumerator(&mut self, enumeration: DeclId, name: &str, value: Option<Expr>, coord: Coord) {
        if let DeclKind::Enumeration(e) = &mut self.get_mut(enumeration).kind {
            e.push(name, value, coord);
        }
    }

    /// Give an existing attribute or variable its initial value (out-of-line
    /// static member definitions).
    pub fn set_value(&mut self, id: DeclId, value: Expr) {
        match &mut self.get_mut(id).kind {
            DeclKind::Attribute(a) => a.value = Some(value),
            DeclKind::Variable(v) => v.value = Some(value),
            _ => {}
        }
    }

    /// Base class declaration of `class`, found by looking the superclass
    /// name up from the class's enclosing context.
    pub fn superclass_of(&self, class: DeclId) -> Option<DeclId> {
        let superclass = self.class(class)?.superclass.as_ref()?;
        let name = match superclass {
            Expr::Variable(name) | Expr::Type(name) => name,
            _ => return None,
        };
        let parent = self.get(class).parent?;
        let segments = split_scoped(&name.raw);
        match self.lookup_qualified(parent, &segments).ok()? {
            Lookup::Decl(id) if id != class && self.class(id).is_some() => Some(id),
            _ => None,
        }
    }

    /// Look `name` up directly inside one context.
    pub fn lookup_member(&self, context: DeclId, name: &str) -> Option<Lookup> {
        self.lookup_member_depth(context, name, 0)
    }

    fn lookup_member_depth(&self, context: DeclId, name: &str, depth: usize) -> Option<Lookup> {
        match self.kind(context) {
            DeclKind::Enumeration(e) => e
                .index_of(name)
                .map(|index| Lookup::Enumerator { enumeration: context, index }),
            DeclKind::Module(m) => self
                .lookup_in_members(&m.members, name)
                .or_else(|| m.submodules.get(name).map(Lookup::Decl)),
            DeclKind::Class(c) => {
                if let Some(found) = self.lookup_in_members(&c.members, name) {
                    return Some(found);
                }
                if depth > 16 {
                    return None;
                }
                self.superclass_of(context)
                    .and_then(|base| self.lookup_member_depth(base, name, depth + 1))
            }
            kind => kind
                .members()
                .and_then(|members| members.get(name))
                .map(Lookup::Decl),
        }
    }

    /// Direct members, then enumerators of unscoped enumerations.
    fn lookup_in_members(&self, members: &Members, name: &str) -> Option<Lookup> {
        if let Some(id) = members.get(name) {
            return Some(Lookup::Decl(id));
        }
        members.iter().find_map(|id| match self.kind(id) {
            DeclKind::Enumeration(e) if !e.scoped => e
                .index_of(name)
                .map(|index| Lookup::Enumerator { enumeration: id, index }),
            _ => None,
        })
    }

    /// Innermost-to-outermost lexical lookup starting at `from`.
    pub fn lookup_lexical(&self, from: DeclId, name: &str) -> Option<Lookup> {
        let mut current = Some(from);
        while let Some(context) = current {
            if let Some(found) = self.lookup_member(context, name) {
                return Some(found);
            }
            current = self.get(context).parent;
        }
        None
    }

    /// Resolve `a::b::c`: the first segment lexically (or from the root for
    /// a leading `::`, given as an empty first segment), the rest as exact
    /// member lookups.
    pub fn lookup_qualified(&self, from: DeclId, segments: &[String]) -> Result<Lookup, MissingSegment> {
        let (first, rest) = match segments.split_first() {
            Some((first, rest)) if first.is_empty() => match rest.split_first() {
                Some((second, rest)) => (
                    self.lookup_member(self.root, second)
                        .ok_or_else(|| MissingSegment(second.clone()))?,
                    rest,
                ),
                None => return Err(MissingSegment(String::new())),
            },
            Some((first, rest)) => (
                self.lookup_lexical(from, first)
                    .ok_or_else(|| MissingSegment(first.clone()))?,
                rest,
            ),
            None => return Err(MissingSegment(String::new())),
        };
        let mut current = first;
        for segment in rest {
            current = match current {
                Lookup::Decl(id) => self
                    .lookup_member(id, segment)
                    .ok_or_else(|| MissingSegment(segment.clone()))?,
                Lookup::Enumerator { .. } => return Err(MissingSegment(segment.clone())),
            };
        }
        Ok(current)
    }

    /// Whether `segments` names a class, enumeration or class alias.
    pub fn names_type(&self, from: DeclId, segments: &[String]) -> bool {
        match self.lookup_qualified(from, segments) {
            Ok(Lookup::Decl(id)) => match self.kind(id) {
                DeclKind::Class(_) | DeclKind::Enumeration(_) => true,
                DeclKind::Variable(v) => v.is_alias,
                _ => false,
            },
            _ => false,
        }
    }

    /// Innermost enclosing class of a declaration (itself included).
    pub fn enclosing_class(&self, id: DeclId) -> Option<DeclId> {
        let mut current = Some(id);
        while let Some(decl) = current {
            match self.kind(decl) {
                DeclKind::Class(_) => return Some(decl),
                DeclKind::Module(_) => return None,
                _ => current = self.get(decl).parent,
            }
        }
        None
    }

    /// Declaration chain from the owning module (exclusive) down to `id`.
    pub fn path_below_module(&self, id: DeclId) -> Vec<DeclId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(decl) = current {
            if matches!(self.kind(decl), DeclKind::Module(_)) {
                break;
            }
            chain.push(decl);
            current = self.get(decl).parent;
        }
        chain.reverse();
        chain
    }
}

/// Split a raw scoped name into segments. A leading `::` yields an empty
/// first segment; template arguments are dropped.
pub fn split_scoped(raw: &str) -> Vec<String> {
    let mut stripped = String::new();
    let mut depth = 0usize;
    for ch in raw.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch),
            _ => {}
        }
    }
    let normalized = normalize_type_name(&stripped);
    normalized
        .split("::")
        .map(|s| s.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coord {
        Coord::new("t.cpp", 1, None)
    }

    fn spec(types: &[&str], has_body: bool) -> FunctionSpec {
        FunctionSpec {
            params: types
                .iter()
                .map(|t| ParamSpec {
                    name: None,
                    type_name: t.to_string(),
                    default: None,
                    coord: coord(),
                })
                .collect(),
            has_body,
            ..FunctionSpec::default()
        }
    }

    fn class(model: &mut Model, name: &str) -> DeclId {
        let root = model.root();
        model.add_declaration(root, Some(name), DeclKind::Class(Class::new(ClassKind::Class)), coord())
    }

    #[test]
    fn normalize_strips_noise_and_whitespace() {
        assert_eq!(normalize_type_name("const  Foo &"), "Foo&");
        assert_eq!(normalize_type_name("const class a :: B *"), "a::B*");
        assert_eq!(normalize_type_name("unsigned int"), "unsigned int");
    }

    #[test]
    fn split_scoped_drops_template_arguments() {
        assert_eq!(split_scoped("a::Foo<int, b::C>::Bar"), vec!["a", "Foo", "Bar"]);
        assert_eq!(split_scoped("::top"), vec!["", "top"]);
    }

    #[test]
    fn members_keep_original_position_on_overwrite() {
        let mut members = Members::default();
        members.insert(Some("a"), DeclId(1));
        members.insert(Some("b"), DeclId(2));
        assert_eq!(members.insert(Some("a"), DeclId(3)), Some(DeclId(1)));
        assert_eq!(members.iter().collect::<Vec<_>>(), vec![DeclId(3), DeclId(2)]);
    }

    #[test]
    fn forward_constructor_merges_with_definition() {
        let mut model = Model::new("test");
        let foo = class(&mut model, "Foo");
        let forward = model.add_constructor(foo, &spec(&["int"], false), coord());
        let mut definition = spec(&["int"], true);
        definition.params[0].name = Some("x".into());
        let defined = model.add_constructor(foo, &definition, coord());
        model.set_statements(defined, vec![]);

        assert_eq!(forward, defined);
        let c = model.class(foo).unwrap();
        assert_eq!(c.constructors.len(), 1);
        let f = model.function(defined).unwrap();
        assert_eq!(f.parameters.len(), 1);
        assert_eq!(model.name(f.parameters[0]), Some("x"));
        assert!(f.statements.is_some());
    }

    #[test]
    fn second_destructor_with_body_is_structural_error() {
        let mut model = Model::new("test");
        let foo = class(&mut model, "Foo");
        let forward = model.add_destructor(foo, &spec(&[], false), coord()).unwrap();
        let first = model.add_destructor(foo, &spec(&[], true), coord()).unwrap();
        assert_eq!(forward, first);
        model.set_statements(first, vec![]);
        let err = model.add_destructor(foo, &spec(&[], true), coord()).unwrap_err();
        assert!(err.message.contains("multiple destructors"));
    }

    #[test]
    fn later_method_overwrites_earlier_same_name() {
        let mut model = Model::new("test");
        let foo = class(&mut model, "Foo");
        let first = model.add_method(foo, "run", &spec(&["int"], true), coord());
        let second = model.add_method(foo, "run", &spec(&["float"], true), coord());
        assert_ne!(first, second);
        let members: Vec<_> = model.class(foo).unwrap().members.iter().collect();
        assert_eq!(members, vec![second]);
    }

    #[test]
    fn modules_are_created_lazily_and_reused() {
        let mut model = Model::new("test");
        let root = model.root();
        let bar = model.add_module(root, "bar", coord());
        let foo = model.add_module(bar, "foo", coord());
        assert_eq!(model.add_module(root, "bar", coord()), bar);
        assert_eq!(model.module(foo).unwrap().path, "bar.foo");
        assert_eq!(model.module_by_path("bar.foo"), Some(foo));
    }

    #[test]
    fn qualified_lookup_walks_segments() {
        let mut model = Model::new("test");
        let root = model.root();
        let bar = model.add_module(root, "bar", coord());
        let outer = model.add_declaration(
            bar,
            Some("Outer"),
            DeclKind::Class(Class::new(ClassKind::Class)),
            coord(),
        );
        let inner = model.add_declaration(
            outer,
            Some("Inner"),
            DeclKind::Class(Class::new(ClassKind::Class)),
            coord(),
        );
        let segments = split_scoped("bar::Outer::Inner");
        assert_eq!(model.lookup_qualified(root, &segments), Ok(Lookup::Decl(inner)));
        let missing = split_scoped("bar::Nope");
        assert_eq!(
            model.lookup_qualified(root, &missing),
            Err(MissingSegment("Nope".into()))
        );
    }

    #[test]
    fn named_enumeration_registers_enum_import() {
        let mut model = Model::new("test");
        let root = model.root();
        model.add_declaration(
            root,
            Some("Color"),
            DeclKind::Enumeration(Enumeration::new(false)),
            coord(),
        );
        let imports = &model.module(root).unwrap().imports;
        assert!(imports["enum"].contains("Enum"));
    }
}
