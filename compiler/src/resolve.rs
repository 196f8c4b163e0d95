// resolve.rs — Name resolution for kernel sources
//
// Walks the parsed translation unit, binds every variable reference to the
// declaration it names, indexes functions and struct definitions, and reports
// diagnostics for unknown or duplicate names.
//
// Preconditions: `unit` is a well-formed AST from the parser.
// Postconditions: returns resolution tables plus all accumulated diagnostics.
// Failure modes: unknown names, duplicate definitions and calls to undeclared
//                functions produce `Diagnostic` entries. Resolution continues
//                past errors.
// Side effects: none.

use std::collections::HashMap;

use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::id::{DeclId, FuncId, IdAllocator};

// ── Public types ────────────────────────────────────────────────────────────

/// Result of name resolution.
#[derive(Debug)]
pub struct ResolveResult {
    pub resolved: ResolvedUnit,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolution tables produced by name resolution.
/// Downstream phases use these alongside the original AST.
#[derive(Debug, Default)]
pub struct ResolvedUnit {
    /// Indexed by `DeclId`.
    pub decls: Vec<DeclInfo>,
    /// Identifier span (reference or declarator name) → declaration.
    pub bindings: HashMap<Span, DeclId>,
    /// Indexed by `FuncId`.
    pub functions: Vec<FuncInfo>,
    pub function_ids: HashMap<String, FuncId>,
    /// Struct name → item index in the translation unit.
    pub structs: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct DeclInfo {
    pub name: String,
    pub ty: CType,
    pub is_const: bool,
    pub role: DeclRole,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclRole {
    Global,
    Param { function: FuncId, index: usize },
    Local { function: FuncId },
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: String,
    /// Item index of the definition carrying a body.
    pub definition: Option<usize>,
    /// Item index of the first prototype.
    pub prototype: Option<usize>,
    pub span: Span,
}

impl ResolvedUnit {
    pub fn decl(&self, id: DeclId) -> &DeclInfo {
        &self.decls[id.0 as usize]
    }

    /// Declaration bound to the identifier at `span`.
    pub fn binding(&self, span: Span) -> Option<DeclId> {
        self.bindings.get(&span).copied()
    }

    pub fn func(&self, id: FuncId) -> &FuncInfo {
        &self.functions[id.0 as usize]
    }

    pub fn function_id(&self, name: &str) -> Option<FuncId> {
        self.function_ids.get(name).copied()
    }

    /// The definition of `id` if it has one, otherwise its prototype.
    pub fn function<'u>(&self, unit: &'u TranslationUnit, id: FuncId) -> Option<&'u Function> {
        let info = self.func(id);
        let index = info.definition.or(info.prototype)?;
        match &unit.items[index] {
            Item::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn struct_def<'u>(&self, unit: &'u TranslationUnit, name: &str) -> Option<&'u StructDef> {
        match &unit.items[*self.structs.get(name)?] {
            Item::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Parameter declarations of a function, in order.
    pub fn params_of(&self, function: FuncId) -> Vec<DeclId> {
        let mut params: Vec<(usize, DeclId)> = self
            .decls
            .iter()
            .enumerate()
            .filter_map(|(i, d)| match d.role {
                DeclRole::Param { function: f, index } if f == function => {
                    Some((index, DeclId(i as u32)))
                }
                _ => None,
            })
            .collect();
        params.sort();
        params.into_iter().map(|(_, id)| id).collect()
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve all names in a parsed translation unit.
pub fn resolve(unit: &TranslationUnit) -> ResolveResult {
    let mut ctx = ResolveCtx::new();

    // Pass 1: collect structs, functions and globals
    ctx.collect_globals(unit);

    // Pass 2: resolve references in function bodies
    ctx.resolve_bodies(unit);

    ResolveResult {
        resolved: ctx.resolved,
        diagnostics: ctx.diagnostics,
    }
}

// ── Internal context ────────────────────────────────────────────────────────

struct ResolveCtx {
    resolved: ResolvedUnit,
    diagnostics: Vec<Diagnostic>,
    globals: HashMap<String, DeclId>,
    /// Innermost scope last.
    scopes: Vec<HashMap<String, DeclId>>,
    id_alloc: IdAllocator,
}

impl ResolveCtx {
    fn new() -> Self {
        ResolveCtx {
            resolved: ResolvedUnit::default(),
            diagnostics: Vec::new(),
            globals: HashMap::new(),
            scopes: Vec::new(),
            id_alloc: IdAllocator::new(),
        }
    }

    fn declare(&mut self, name: &Ident, ty: &CType, is_const: bool, role: DeclRole) -> DeclId {
        let id = self.id_alloc.alloc_decl();
        self.resolved.decls.push(DeclInfo {
            name: name.name.clone(),
            ty: ty.clone(),
            is_const,
            role,
            span: name.span,
        });
        self.resolved.bindings.insert(name.span, id);
        id
    }

    // ── Pass 1: collect globals ─────────────────────────────────────────

    fn collect_globals(&mut self, unit: &TranslationUnit) {
        for (i, item) in unit.items.iter().enumerate() {
            match item {
                Item::Struct(s) => {
                    if self.resolved.structs.contains_key(&s.name.name) {
                        self.diagnostics.push(Diagnostic::error(
                            codes::DUPLICATE_DEFINITION,
                            s.name.span,
                            format!("duplicate struct '{}'", s.name.name),
                        ));
                    } else {
                        self.resolved.structs.insert(s.name.name.clone(), i);
                    }
                }
                Item::Function(f) => self.collect_function(f, i),
                Item::Global(decl) => {
                    for d in &decl.declarators {
                        if let Some(existing) = self.globals.get(&d.name.name) {
                            let first = self.resolved.decl(*existing).span;
                            self.diagnostics.push(
                                Diagnostic::error(
                                    codes::DUPLICATE_DEFINITION,
                                    d.name.span,
                                    format!("duplicate global '{}'", d.name.name),
                                )
                                .with_related(first, "first defined here"),
                            );
                            continue;
                        }
                        let id = self.declare(&d.name, &d.ty, decl.is_const, DeclRole::Global);
                        self.globals.insert(d.name.name.clone(), id);
                    }
                }
            }
        }
    }

    fn collect_function(&mut self, f: &Function, index: usize) {
        let id = match self.resolved.function_ids.get(&f.name.name) {
            Some(id) => *id,
            None => {
                let id = self.id_alloc.alloc_func();
                self.resolved.functions.push(FuncInfo {
                    name: f.name.name.clone(),
                    definition: None,
                    prototype: None,
                    span: f.name.span,
                });
                self.resolved.function_ids.insert(f.name.name.clone(), id);
                id
            }
        };
        let info = &mut self.resolved.functions[id.0 as usize];
        if f.body.is_some() {
            if info.definition.is_some() {
                let first = info.span;
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::DUPLICATE_DEFINITION,
                        f.name.span,
                        format!("duplicate function '{}'", f.name.name),
                    )
                    .with_related(first, "first defined here"),
                );
                return;
            }
            info.definition = Some(index);
            info.span = f.name.span;
        } else if info.prototype.is_none() {
            info.prototype = Some(index);
        }
    }

    // ── Pass 2: resolve references ──────────────────────────────────────

    fn resolve_bodies(&mut self, unit: &TranslationUnit) {
        for (i, item) in unit.items.iter().enumerate() {
            let Item::Function(f) = item else { continue };
            let Some(body) = &f.body else { continue };
            let Some(function) = self.resolved.function_id(&f.name.name) else {
                continue;
            };
            // Skip redefinitions already reported in pass 1.
            if self.resolved.func(function).definition != Some(i) {
                continue;
            }

            self.scopes.push(HashMap::new());
            for (index, p) in f.params.iter().enumerate() {
                self.declare_local(&p.name, &p.ty, p.is_const, DeclRole::Param { function, index });
            }
            self.resolve_block(body, function);
            self.scopes.pop();
        }
    }

    fn declare_local(&mut self, name: &Ident, ty: &CType, is_const: bool, role: DeclRole) {
        let duplicate = self
            .scopes
            .last()
            .and_then(|scope| scope.get(&name.name))
            .copied();
        if let Some(existing) = duplicate {
            let first = self.resolved.decl(existing).span;
            self.diagnostics.push(
                Diagnostic::error(
                    codes::DUPLICATE_DEFINITION,
                    name.span,
                    format!("'{}' is already declared in this scope", name.name),
                )
                .with_related(first, "first declared here"),
            );
            return;
        }
        let id = self.declare(name, ty, is_const, role);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.name.clone(), id);
        }
    }

    fn lookup(&self, name: &str) -> Option<DeclId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .or_else(|| self.globals.get(name).copied())
    }

    fn resolve_block(&mut self, block: &Block, function: FuncId) {
        self.scopes.push(HashMap::new());
        for stmt in &block.stmts {
            self.resolve_stmt(stmt, function);
        }
        self.scopes.pop();
    }

    fn resolve_stmt(&mut self, stmt: &Stmt, function: FuncId) {
        match &stmt.kind {
            StmtKind::Decl(decl) => self.resolve_decl(decl, function),
            StmtKind::Expr(e) => self.resolve_expr(e),
            StmtKind::Return(value) => {
                if let Some(e) = value {
                    self.resolve_expr(e);
                }
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                // The init declaration is scoped to the loop.
                self.scopes.push(HashMap::new());
                if let Some(init) = init {
                    self.resolve_stmt(init, function);
                }
                if let Some(cond) = cond {
                    self.resolve_expr(cond);
                }
                if let Some(step) = step {
                    self.resolve_expr(step);
                }
                self.resolve_stmt(body, function);
                self.scopes.pop();
            }
            StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
                self.resolve_expr(cond);
                self.resolve_stmt(body, function);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch, function);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch, function);
                }
            }
            StmtKind::Block(block) => self.resolve_block(block, function),
            StmtKind::Break | StmtKind::Pragma(_) | StmtKind::Empty => {}
        }
    }

    fn resolve_decl(&mut self, decl: &Declaration, function: FuncId) {
        for d in &decl.declarators {
            if let Some(init) = &d.init {
                self.resolve_initializer(init);
            }
            self.declare_local(&d.name, &d.ty, decl.is_const, DeclRole::Local { function });
        }
    }

    fn resolve_initializer(&mut self, init: &Initializer) {
        match init {
            Initializer::Expr(e) => self.resolve_expr(e),
            Initializer::Aggregate(items, _) => {
                for item in items {
                    self.resolve_initializer(item);
                }
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Var(id) => match self.lookup(&id.name) {
                Some(decl) => {
                    self.resolved.bindings.insert(id.span, decl);
                }
                None => self.diagnostics.push(Diagnostic::error(
                    codes::UNKNOWN_NAME,
                    id.span,
                    format!("unknown name '{}'", id.name),
                )),
            },
            ExprKind::Call { callee, args } => {
                if self.resolved.function_id(&callee.name).is_none() {
                    self.diagnostics.push(
                        Diagnostic::error(
                            codes::UNKNOWN_FUNCTION,
                            callee.span,
                            format!("call to undeclared function '{}'", callee.name),
                        )
                        .with_hint("declare a prototype before the call"),
                    );
                }
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Index { base, index } => {
                self.resolve_expr(base);
                self.resolve_expr(index);
            }
            ExprKind::Member { base, .. } => self.resolve_expr(base),
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::SizeOf(operand) => self.resolve_expr(operand),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs, .. }
            | ExprKind::Comma { lhs, rhs } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then_expr);
                self.resolve_expr(else_expr);
            }
            ExprKind::IntLit { .. }
            | ExprKind::FloatLit { .. }
            | ExprKind::BoolLit(_)
            | ExprKind::SizeOfType(_) => {}
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
