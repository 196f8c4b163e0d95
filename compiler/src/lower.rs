// lower.rs — Kernel lowering into the program graph
//
// Walks the top function and, breadth first, every function it calls, and
// records nodes plus deferred edge operations in a `Graph`. Loop, branch and
// call structure is expressed through marker edges (pre-loop, merge, revert,
// function start/return) that emission later resolves into concrete control
// flow.
//
// Preconditions: `unit` parsed and `resolved` produced without errors.
// Postconditions: `LoweredProgram` holds every listed node and edge in
//                 creation order, one record per reached function, and call
//                 statistics for each lowered function.
// Failure modes: any construct outside the kernel subset → one error
//                `Diagnostic` that aborts lowering.
// Side effects: none.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::ast::*;
use crate::deref::DerefTracker;
use crate::diag::{codes, Diagnostic};
use crate::factor::StackedFactor;
use crate::graph::{
    ArgLowering, ArithOp, CallArg, DerefLinks, EdgeId, EdgeOp, FnKey, Graph, IteratorBounds,
    Node, NodeId, NodeKind, NodeMeta,
};
use crate::id::{DeclId, FuncId};
use crate::options::EmitOptions;
use crate::pragma::AnnotationParser;
use crate::resolve::{DeclRole, ResolvedUnit};
use crate::types::TypeDesc;
use crate::vars::{scalar_type, StructDefs, VariableMapper, INLINE_ORDER, UNROLL_ORDER};

// ── Output types ────────────────────────────────────────────────────────────

/// Result of lowering.
pub struct LowerResult {
    pub lowered: Option<LoweredProgram>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LowerResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }
}

/// How often a function is reached: call count weighted by unrolling, and
/// the number of distinct call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallStats {
    pub calls: u64,
    pub sites: u32,
}

/// One function reached from the top function.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub name: String,
    /// `None` for helpers synthesized during lowering.
    pub func: Option<FuncId>,
    pub has_body: bool,
    pub function_id: u32,
    /// Call nodes targeting this function, in creation order.
    pub calls: Vec<NodeId>,
    pub start_edge: Option<EdgeId>,
    pub return_edge: Option<EdgeId>,
    pub lowered: bool,
    pub stats: Option<CallStats>,
}

/// The lowered kernel, ready for emission.
#[derive(Debug, Clone)]
pub struct LoweredProgram {
    pub graph: Graph,
    /// Indexed by `FnKey`.
    pub functions: Vec<FunctionRecord>,
    pub top: FnKey,
    pub external: NodeId,
    /// Lowering context at the end of the walk; emission-time nodes created
    /// without a state node inherit it.
    pub ambient: NodeMeta,
    pub bb_empty: bool,
    /// Interface port → bundle, from INTERFACE directives.
    pub ports: BTreeMap<String, String>,
}

impl LoweredProgram {
    pub fn function(&self, key: FnKey) -> &FunctionRecord {
        &self.functions[key.0 as usize]
    }

    pub fn function_named(&self, name: &str) -> Option<&FunctionRecord> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Name given to the helper that aggregate initializers call under the
/// ProGraML schema.
pub const MEMCOPY_NAME: &str = "memcpy";

// ── Public entry point ──────────────────────────────────────────────────────

/// Lower the function `top` and everything it calls.
pub fn lower(
    unit: &TranslationUnit,
    resolved: &ResolvedUnit,
    top: &str,
    options: &EmitOptions,
) -> LowerResult {
    let mut lowerer = Lowerer::new(unit, resolved, options);
    match lowerer.lower_program(top) {
        Ok(()) => LowerResult {
            lowered: Some(lowerer.finish()),
            diagnostics: Vec::new(),
        },
        Err(diag) => LowerResult {
            lowered: None,
            diagnostics: vec![diag],
        },
    }
}

// ── Lowering context ────────────────────────────────────────────────────────

struct LoopFrame {
    breaks: Vec<EdgeId>,
    /// Branch-arm depth when the loop opened; only arms above it belong to
    /// this loop.
    arm_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Both arms of an `if` broke out; the rest of the block is unreachable.
    Stop,
}

struct Lowerer<'a> {
    unit: &'a TranslationUnit,
    resolved: &'a ResolvedUnit,
    options: &'a EmitOptions,
    structs: StructDefs,
    graph: Graph,
    pragmas: AnnotationParser,
    vars: VariableMapper,
    derefs: DerefTracker,
    group: String,
    bb: u32,
    bb_empty: bool,
    function_id: u32,
    current: FnKey,
    /// Context forced onto nodes created while lowering a call argument.
    meta_override: Option<NodeMeta>,
    functions: Vec<FunctionRecord>,
    keys: HashMap<FuncId, FnKey>,
    memcopy: Option<FnKey>,
    queue: VecDeque<FnKey>,
    function_return: Option<NodeId>,
    returns: u32,
    loops: Vec<LoopFrame>,
    arm_breaks: Vec<bool>,
    inline_stack: Vec<FuncId>,
}

impl<'a> Lowerer<'a> {
    fn new(unit: &'a TranslationUnit, resolved: &'a ResolvedUnit, options: &'a EmitOptions) -> Self {
        let structs = unit
            .structs()
            .map(|s| (s.name.name.clone(), s.clone()))
            .collect();
        Lowerer {
            unit,
            resolved,
            options,
            structs,
            graph: Graph::new(),
            pragmas: AnnotationParser::new(),
            vars: VariableMapper::new(),
            derefs: DerefTracker::new(),
            group: String::new(),
            bb: 0,
            bb_empty: true,
            function_id: 0,
            current: FnKey(0),
            meta_override: None,
            functions: Vec::new(),
            keys: HashMap::new(),
            memcopy: None,
            queue: VecDeque::new(),
            function_return: None,
            returns: 0,
            loops: Vec::new(),
            arm_breaks: Vec::new(),
            inline_stack: Vec::new(),
        }
    }

    fn finish(self) -> LoweredProgram {
        let ambient = NodeMeta {
            group: self.group.clone(),
            bb: self.bb,
            function_id: self.function_id,
            function: self.current,
            unroll: self.unroll_snapshot(),
            tripcount: self.pragmas.tripcount(),
            pipelined: self.pragmas.pipelined(),
        };
        let external = self
            .graph
            .top_level()
            .nodes
            .first()
            .copied()
            .unwrap_or(NodeId(0));
        LoweredProgram {
            ports: self.pragmas.ports().clone(),
            graph: self.graph,
            functions: self.functions,
            top: FnKey(0),
            external,
            ambient,
            bb_empty: self.bb_empty,
        }
    }

    // ── Context helpers ─────────────────────────────────────────────────────

    fn new_bb(&mut self) {
        if !self.bb_empty {
            self.bb += 1;
        }
        self.bb_empty = true;
    }

    fn new_bb_programl(&mut self) {
        if self.options.proxy_programl {
            self.new_bb();
        }
    }

    /// Unroll factors for a new node. Inside a pipelined region the
    /// tripcount, scaled down by the pipelined loop's own tripcount, stands
    /// in for the unroll factor.
    fn unroll_snapshot(&self) -> StackedFactor {
        if !self.pragmas.previously_pipelined() {
            return self.pragmas.unroll();
        }
        let pipeline = self.pragmas.pipeline_tripcount();
        let mut factor = self.pragmas.tripcount();
        factor.full /= pipeline;
        factor.first /= pipeline;
        if factor.second > 1.0 {
            factor.second /= pipeline;
        }
        if factor.third > 1.0 {
            factor.third /= pipeline;
        }
        factor
    }

    fn meta(&mut self) -> NodeMeta {
        if let Some(meta) = &self.meta_override {
            return meta.clone();
        }
        self.bb_empty = false;
        NodeMeta {
            group: self.group.clone(),
            bb: self.bb,
            function_id: self.function_id,
            function: self.current,
            unroll: self.unroll_snapshot(),
            tripcount: self.pragmas.tripcount(),
            pipelined: self.pragmas.pipelined(),
        }
    }

    fn add(&mut self, kind: NodeKind, ty: Option<TypeDesc>, span: Span) -> NodeId {
        let meta = self.meta();
        self.graph.add_node(Node::new(kind, ty, meta, span))
    }

    fn constant(&mut self, value: impl Into<String>, ty: TypeDesc, span: Span) -> NodeId {
        self.add(
            NodeKind::Constant {
                value: value.into(),
                folded: false,
            },
            Some(ty),
            span,
        )
    }

    fn edge(&mut self, op: EdgeOp) -> EdgeId {
        self.graph.add_edge(op)
    }

    fn control(&mut self, dst: NodeId) -> EdgeId {
        self.edge(EdgeOp::ControlFlow { dst })
    }

    fn data(&mut self, src: NodeId, dst: NodeId, order: u32) -> EdgeId {
        self.edge(EdgeOp::DataFlow { src, dst, order })
    }

    fn type_of(&self, node: NodeId, span: Span) -> Result<TypeDesc, Diagnostic> {
        self.graph
            .value_type(node, self.options)
            .map_err(|e| Diagnostic::error(codes::UNTYPED_VALUE, span, e.0))
    }

    fn deref_links(&self, node: NodeId) -> DerefLinks {
        match &self.graph.node(node).kind {
            NodeKind::Deref(links) | NodeKind::StructAccess(links) => links.clone(),
            _ => DerefLinks::default(),
        }
    }

    fn with_iterator(&mut self, node: NodeId, f: impl FnOnce(&mut IteratorBounds)) {
        if let NodeKind::LocalScalar { iterator, .. } = &mut self.graph.node_mut(node).kind {
            f(iterator);
        }
    }

    fn record_mut(&mut self, key: FnKey) -> &mut FunctionRecord {
        &mut self.functions[key.0 as usize]
    }

    fn decl_of(&self, ident: &Ident) -> Result<DeclId, Diagnostic> {
        self.resolved.binding(ident.span).ok_or_else(|| {
            Diagnostic::error(
                codes::UNKNOWN_NAME,
                ident.span,
                format!("`{}` is not declared", ident.name),
            )
        })
    }

    fn key_for(&mut self, id: FuncId) -> FnKey {
        if let Some(key) = self.keys.get(&id) {
            return *key;
        }
        let info = self.resolved.func(id);
        let key = FnKey(self.functions.len() as u32);
        self.functions.push(FunctionRecord {
            name: info.name.clone(),
            func: Some(id),
            has_body: info.definition.is_some(),
            function_id: 0,
            calls: Vec::new(),
            start_edge: None,
            return_edge: None,
            lowered: false,
            stats: None,
        });
        self.keys.insert(id, key);
        key
    }

    fn memcopy_key(&mut self) -> FnKey {
        if let Some(key) = self.memcopy {
            return key;
        }
        let key = FnKey(self.functions.len() as u32);
        self.functions.push(FunctionRecord {
            name: MEMCOPY_NAME.to_string(),
            func: None,
            has_body: false,
            function_id: 0,
            calls: Vec::new(),
            start_edge: None,
            return_edge: None,
            lowered: false,
            stats: None,
        });
        self.memcopy = Some(key);
        key
    }

    // ── Program and functions ───────────────────────────────────────────────

    fn lower_program(&mut self, top: &str) -> Result<(), Diagnostic> {
        let Some(top_id) = self.resolved.function_id(top) else {
            return Err(Diagnostic::error(
                codes::UNKNOWN_TOP,
                self.unit.span,
                format!("top function `{}` is not defined", top),
            ));
        };
        let top_key = self.key_for(top_id);
        self.current = top_key;
        self.group = "External".to_string();
        let external = self.add(NodeKind::External, None, self.unit.span);
        self.new_bb();

        self.group = top.to_string();
        self.record_mut(top_key).lowered = true;
        log::debug!("lowering top function `{}`", top);
        self.lower_function(top_key, external)?;
        self.vars.finish_main();

        while let Some(key) = self.queue.pop_front() {
            self.current = key;
            if self.functions[key.0 as usize].lowered {
                continue;
            }
            self.function_id += 1;
            let function_id = self.function_id;
            let record = self.record_mut(key);
            record.lowered = true;
            record.function_id = function_id;
            let name = record.name.clone();
            log::debug!("lowering callee `{}` as function {}", name, function_id);
            self.group = name;
            self.lower_function(key, external)?;
        }

        self.mark_inlined_calls()?;
        self.count_calls(top_key);
        Ok(())
    }

    fn lower_function(&mut self, key: FnKey, external: NodeId) -> Result<(), Diagnostic> {
        let unit = self.unit;
        let resolved = self.resolved;
        let start = self.edge(EdgeOp::FunctionStart {
            external,
            function: key,
        });
        self.record_mut(key).start_edge = Some(start);

        let id = self.functions[key.0 as usize].func;
        let func = id.and_then(|id| resolved.function(unit, id));
        let end = match (id, func) {
            (Some(id), Some(func)) if func.body.is_some() => self
                .lower_body(id, func)
                .map_err(|d| d.with_cause(format!("function `{}`", func.name.name), Some(func.span)))?,
            _ => {
                let name = self.functions[key.0 as usize].name.clone();
                let function_id = self.function_id;
                self.edge(EdgeOp::UndefinedFunction {
                    function: key,
                    name,
                    function_id,
                })
            }
        };
        self.record_mut(key).return_edge = Some(end);
        self.control(external);
        Ok(())
    }

    fn lower_body(&mut self, id: FuncId, func: &Function) -> Result<EdgeId, Diagnostic> {
        let Some(body) = &func.body else {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_STATEMENT,
                func.span,
                format!("function `{}` has no body", func.name.name),
            ));
        };
        let resolved = self.resolved;
        self.pragmas.push_scope();
        self.pragmas.parse_block(body.pragmas())?;
        self.new_bb();

        for decl in resolved.params_of(id) {
            let info = resolved.decl(decl);
            let meta = self.meta();
            let param = self.vars.create_parameter(
                &mut self.graph,
                meta,
                decl,
                info,
                &mut self.pragmas,
                &self.structs,
            )?;
            self.edge(EdgeOp::ParameterInitialize { param });
        }

        self.function_return = None;
        self.returns = 0;
        self.lower_block(&body.stmts)?;
        self.pragmas.pop_scope();

        let value = self.function_return;
        let value_type = match value {
            Some(_) => scalar_type(&func.return_type, func.span)?,
            None => TypeDesc::void(),
        };
        let key = self.current;
        Ok(self.edge(EdgeOp::Return {
            function: key,
            value,
            value_type,
        }))
    }

    /// Attach inline markers to every call of a function whose body asks to
    /// be inlined.
    fn mark_inlined_calls(&mut self) -> Result<(), Diagnostic> {
        let unit = self.unit;
        let resolved = self.resolved;
        for index in 0..self.functions.len() {
            let record = &self.functions[index];
            if !record.lowered || record.calls.is_empty() {
                continue;
            }
            let Some(func) = record.func.and_then(|id| resolved.function(unit, id)) else {
                continue;
            };
            let Some(body) = &func.body else {
                continue;
            };
            if !AnnotationParser::requests_inline(body.pragmas())? {
                continue;
            }
            let calls = record.calls.clone();
            log::debug!("marking {} call(s) of `{}` as inlined", calls.len(), record.name);
            if self.options.absorb_pragmas {
                for call in calls {
                    self.graph.node_mut(call).inlined = true;
                }
                continue;
            }
            let meta = self.graph.node(calls[0]).meta.clone();
            let pragma = self.graph.add_node(Node::new(
                NodeKind::Pragma {
                    key: "inlinedFunction".to_string(),
                    factor: "0".to_string(),
                },
                None,
                meta,
                func.span,
            ));
            for call in calls {
                self.edge(EdgeOp::Pragma {
                    pragma,
                    target: call,
                    order: INLINE_ORDER,
                });
            }
        }
        Ok(())
    }

    fn count_calls(&mut self, top: FnKey) {
        for index in 0..self.functions.len() {
            let stats = if FnKey(index as u32) == top {
                CallStats { calls: 1, sites: 1 }
            } else if self.functions[index].lowered {
                let calls = &self.functions[index].calls;
                CallStats {
                    calls: calls
                        .iter()
                        .map(|c| self.graph.node(*c).meta.unroll.full.trunc() as u64)
                        .sum(),
                    sites: calls.len() as u32,
                }
            } else {
                continue;
            };
            self.functions[index].stats = Some(stats);
        }
    }

    // ── Statements ──────────────────────────────────────────────────────────

    fn lower_block(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        self.derefs.reset();
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Pragma(_) | StmtKind::Empty => {}
                StmtKind::Decl(decl) => self.lower_declaration(decl)?,
                StmtKind::Expr(expr) => {
                    self.eval(expr)?;
                }
                StmtKind::Return(value) => {
                    self.returns += 1;
                    if self.returns > 1 {
                        return Err(Diagnostic::error(
                            codes::MULTIPLE_RETURNS,
                            stmt.span,
                            "function has more than one return statement",
                        )
                        .with_hint("keep a single return at the end of the function"));
                    }
                    self.function_return = match value {
                        Some(expr) => self.eval(expr)?,
                        None => None,
                    };
                }
                StmtKind::For {
                    init,
                    cond,
                    step,
                    body,
                } => self.lower_for(init.as_deref(), cond.as_ref(), step.as_ref(), body, stmt.span)?,
                StmtKind::While { cond, body } => self.lower_while(cond, body)?,
                StmtKind::DoWhile { .. } => {
                    return Err(Diagnostic::error(
                        codes::DO_WHILE,
                        stmt.span,
                        "do-while loops are not supported",
                    )
                    .with_hint("rewrite the loop as a while loop"));
                }
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    if self.lower_if(cond, then_branch, else_branch.as_deref())? == Flow::Stop {
                        break;
                    }
                }
                StmtKind::Break => self.lower_break(stmt.span)?,
                StmtKind::Block(block) => self.lower_block(&block.stmts)?,
            }
        }
        Ok(())
    }

    fn lower_declaration(&mut self, decl: &Declaration) -> Result<(), Diagnostic> {
        for declarator in &decl.declarators {
            let id = self.decl_of(&declarator.name)?;
            self.make_variable(id)?;
            match &declarator.init {
                None => {}
                Some(Initializer::Expr(expr)) => {
                    let value = self.value(expr)?;
                    let write = self.write_declared(id, value, declarator.name.span)?;
                    self.control(write);
                }
                Some(Initializer::Aggregate(items, span)) => {
                    self.aggregate_init(id, items.len(), *span)?;
                }
            }
        }
        Ok(())
    }

    /// Create storage for a local the first time its declaration is reached.
    fn make_variable(&mut self, decl: DeclId) -> Result<(), Diagnostic> {
        if !self.vars.declare_once(decl) {
            return Ok(());
        }
        let resolved = self.resolved;
        let info = resolved.decl(decl);
        let meta = self.meta();
        let var = self
            .vars
            .create_local(&mut self.graph, meta, decl, info, &mut self.pragmas)?;
        self.edge(EdgeOp::VariableDeclare { var });
        Ok(())
    }

    fn aggregate_init(&mut self, decl: DeclId, count: usize, span: Span) -> Result<(), Diagnostic> {
        let var = self.read_variable(decl, span)?;
        if self.options.proxy_programl {
            let bitcast = self.add(NodeKind::Bitcast, None, span);
            self.control(bitcast);
            self.data(var, bitcast, 0);
            let key = self.memcopy_key();
            self.queue.push_back(key);
            let call = self.add(NodeKind::FunctionCall, Some(TypeDesc::int(64)), span);
            self.record_mut(key).calls.push(call);
            self.edge(EdgeOp::FunctionCall {
                call,
                callee: key,
                args: Vec::new(),
            });
            self.data(bitcast, call, 0);
            for (label, ty) in [
                ("Memcopy Bool", TypeDesc::int(1)),
                ("Memcopy Constant Pointer", TypeDesc::int(64)),
                ("Memcopy Input ?", TypeDesc::int(64)),
            ] {
                let arg = self.constant(label, ty, span);
                self.data(arg, call, 0);
            }
            return Ok(());
        }
        let ty = self.type_of(var, span)?;
        let init = self.constant("Array Initialization", ty, span);
        let write = self.write_declared(decl, init, span)?;
        self.graph.node_mut(write).meta.unroll.full *= count as f64;
        self.control(write);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        span: Span,
    ) -> Result<(), Diagnostic> {
        self.pragmas.push_scope();
        let Some(init) = init else {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_FOR_INIT,
                span,
                "for loop has no initializer",
            )
            .with_hint("declare or assign the loop iterator in the loop header"));
        };
        let iterator = self.iterator_from_init(init)?;
        self.with_iterator(iterator, |it| {
            it.has_init = true;
            it.in_bounds_region = true;
        });
        self.new_bb_programl();
        self.lower_block(std::slice::from_ref(init))?;
        self.with_iterator(iterator, |it| it.in_bounds_region = false);
        self.edge(EdgeOp::ProgramlBranch);

        self.loops.push(LoopFrame {
            breaks: Vec::new(),
            arm_depth: self.arm_breaks.len(),
        });
        self.pragmas.parse_block(stmt_pragmas(body))?;
        self.pragmas.enter_loop_condition();
        let pre_loop = self.edge(EdgeOp::PreLoop);
        self.new_bb();
        self.derefs.reset();

        let Some(cond) = cond else {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_STATEMENT,
                span,
                "for loop has no condition",
            ));
        };
        let (branch, comparison) = self.lower_condition(cond)?;
        self.process_comparison(iterator, comparison);
        self.pragmas.exit_loop_condition();
        self.unroll_pragma(comparison, cond.span);

        self.new_bb();
        self.lower_block(body.body_stmts())?;
        self.edge(EdgeOp::ProgramlBranch);

        if let Some(step) = step {
            self.pragmas.enter_loop_increment();
            self.with_iterator(iterator, |it| it.in_increment = true);
            self.new_bb_programl();
            self.eval(step)?;
            self.with_iterator(iterator, |it| it.in_increment = false);
            self.edge(EdgeOp::ProgramlBranch);
            self.pragmas.exit_loop_increment();
        }

        self.edge(EdgeOp::LoopBack { pre_loop, branch });
        self.pragmas.pop_scope();
        self.catch_breaks();
        self.new_bb();
        self.derefs.reset();
        Ok(())
    }

    /// The local scalar a for loop initializes.
    fn iterator_from_init(&mut self, init: &Stmt) -> Result<NodeId, Diagnostic> {
        let ident = match &init.kind {
            StmtKind::Decl(decl) => decl.declarators.first().map(|d| &d.name),
            StmtKind::Expr(expr) => assigned_var(expr),
            _ => None,
        };
        let not_iterator = || {
            Diagnostic::error(
                codes::UNSUPPORTED_FOR_INIT,
                init.span,
                "for loop initializer does not set a local scalar iterator",
            )
            .with_hint("write the header as `for (int i = 0; ...)` or `for (i = 0; ...)`")
        };
        let ident = ident.ok_or_else(not_iterator)?;
        let decl = self.decl_of(ident)?;
        if matches!(init.kind, StmtKind::Decl(_)) {
            self.make_variable(decl)?;
        }
        let node = self.vars.read_node(decl).ok_or_else(not_iterator)?;
        if !matches!(self.graph.node(node).kind, NodeKind::LocalScalar { .. }) {
            return Err(not_iterator());
        }
        Ok(node)
    }

    /// Record the constant side of the loop comparison as an iterator bound.
    fn process_comparison(&mut self, iterator: NodeId, comparison: NodeId) {
        self.with_iterator(iterator, |it| it.in_bounds_region = true);
        let refers_to_iterator = |graph: &Graph, node: NodeId| {
            node == iterator
                || matches!(graph.node(node).kind, NodeKind::Read { type_dep: Some(d) } if d == iterator)
        };
        let other = match self.graph.node(comparison).kind {
            NodeKind::Comparison { lhs, rhs } if refers_to_iterator(&self.graph, lhs) => Some(rhs),
            NodeKind::Comparison { lhs, rhs } if refers_to_iterator(&self.graph, rhs) => Some(lhs),
            _ => None,
        };
        match other {
            Some(node) => {
                let bound = self.graph.node(node).constant_value();
                self.with_iterator(iterator, |it| it.add_bound(bound));
            }
            None => self.with_iterator(iterator, |it| it.fixed = false),
        }
        self.with_iterator(iterator, |it| it.in_bounds_region = false);
    }

    fn unroll_pragma(&mut self, target: NodeId, span: Span) {
        let factor = self.pragmas.unroll().first;
        if factor > 1.0 {
            let pragma = self.add(
                NodeKind::Pragma {
                    key: "unroll".to_string(),
                    factor: format!("{}", factor as i64),
                },
                None,
                span,
            );
            self.edge(EdgeOp::Pragma {
                pragma,
                target,
                order: UNROLL_ORDER,
            });
        }
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt) -> Result<(), Diagnostic> {
        self.pragmas.push_scope();
        self.edge(EdgeOp::ProgramlBranch);
        let pre_loop = self.edge(EdgeOp::PreLoop);
        self.new_bb();
        let (branch, comparison) = self.lower_condition(cond)?;

        self.loops.push(LoopFrame {
            breaks: Vec::new(),
            arm_depth: self.arm_breaks.len(),
        });
        self.pragmas.parse_block(stmt_pragmas(body))?;
        self.unroll_pragma(comparison, cond.span);
        self.new_bb();
        self.lower_block(body.body_stmts())?;
        self.edge(EdgeOp::ProgramlBranch);

        self.edge(EdgeOp::LoopBack { pre_loop, branch });
        self.pragmas.pop_scope();
        self.catch_breaks();
        self.derefs.reset();
        Ok(())
    }

    fn catch_breaks(&mut self) {
        if let Some(frame) = self.loops.pop() {
            for start in frame.breaks {
                self.edge(EdgeOp::MergeEnd { start });
            }
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Flow, Diagnostic> {
        let (branch, _) = self.lower_condition(cond)?;
        self.new_bb();
        self.arm_breaks.push(false);
        self.lower_block(then_branch.body_stmts())?;
        let then_broke = self.arm_breaks.pop().unwrap_or(false);

        let mut merge = None;
        if !then_broke {
            self.edge(EdgeOp::ProgramlBranch);
            merge = Some(self.edge(EdgeOp::MergeStart));
        }
        self.edge(EdgeOp::Revert { node: branch });

        let mut else_broke = false;
        if let Some(else_branch) = else_branch {
            self.arm_breaks.push(false);
            self.new_bb();
            self.lower_block(else_branch.body_stmts())?;
            else_broke = self.arm_breaks.pop().unwrap_or(false);
            if !else_broke {
                self.edge(EdgeOp::ProgramlBranch);
            }
        }

        if then_broke && else_broke {
            return Ok(Flow::Stop);
        }
        if let Some(start) = merge {
            self.edge(EdgeOp::MergeEnd { start });
        }
        Ok(Flow::Continue)
    }

    fn lower_break(&mut self, span: Span) -> Result<(), Diagnostic> {
        let Some(arm_depth) = self.loops.last().map(|f| f.arm_depth) else {
            return Err(Diagnostic::error(
                codes::BREAK_OUTSIDE_LOOP,
                span,
                "break outside of a loop",
            ));
        };
        self.edge(EdgeOp::ProgramlBranch);
        if self.arm_breaks.len() > arm_depth {
            if let Some(flag) = self.arm_breaks.last_mut() {
                *flag = true;
            }
        }
        let start = self.edge(EdgeOp::MergeStart);
        if let Some(frame) = self.loops.last_mut() {
            frame.breaks.push(start);
        }
        Ok(())
    }

    /// Lower a branch condition; returns the branch and the value it tests.
    fn lower_condition(&mut self, cond: &Expr) -> Result<(NodeId, NodeId), Diagnostic> {
        let tested = match &cond.kind {
            ExprKind::Call { .. } | ExprKind::Var(_) => self.value(cond)?,
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.comparison(lhs, rhs, cond.span)?
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let input = self.value(operand)?;
                let ty = self.type_of(input, operand.span)?;
                let not = self.add(
                    NodeKind::UnaryOp {
                        op: "Not".to_string(),
                    },
                    Some(ty),
                    cond.span,
                );
                self.data(input, not, 0);
                not
            }
            ExprKind::Cast { operand, .. } => {
                let input = self.value(operand)?;
                self.zero_comparison(input, cond.span)?
            }
            ExprKind::Binary {
                op: BinaryOp::LogicalAnd | BinaryOp::LogicalOr,
                ..
            } => {
                return Err(Diagnostic::error(
                    codes::UNSUPPORTED_EXPRESSION,
                    cond.span,
                    format!("compound condition `{}` is not supported", cond),
                )
                .with_hint("split the condition into nested if statements"));
            }
            _ => {
                return Err(Diagnostic::error(
                    codes::UNSUPPORTED_EXPRESSION,
                    cond.span,
                    format!("unsupported condition `{}`", cond),
                ));
            }
        };
        self.control(tested);
        let branch = self.add(NodeKind::Branch, None, cond.span);
        self.data(tested, branch, 0);
        self.control(branch);
        Ok((branch, tested))
    }

    fn comparison(&mut self, lhs: &Expr, rhs: &Expr, span: Span) -> Result<NodeId, Diagnostic> {
        let rhs = self.value(rhs)?;
        let lhs = self.value(lhs)?;
        let unit = self.add(NodeKind::Comparison { lhs, rhs }, None, span);
        self.edge(EdgeOp::ArithmeticUnit { lhs, rhs, unit });
        Ok(unit)
    }

    /// `value != 0` for conditions that are not comparisons.
    fn zero_comparison(&mut self, lhs: NodeId, span: Span) -> Result<NodeId, Diagnostic> {
        let ty = self.type_of(lhs, span)?;
        let rhs = self.constant("0", ty, span);
        let unit = self.add(NodeKind::Comparison { lhs, rhs }, None, span);
        self.edge(EdgeOp::ArithmeticUnit { lhs, rhs, unit });
        Ok(unit)
    }

    // ── Expressions ─────────────────────────────────────────────────────────

    /// Lower an expression for its effects; the result is its value node,
    /// if it has one.
    fn eval(&mut self, expr: &Expr) -> Result<Option<NodeId>, Diagnostic> {
        match &expr.kind {
            ExprKind::Call { callee, args } => self.lower_call(callee, args, expr.span),
            _ => self.read(expr).map(Some),
        }
    }

    fn value(&mut self, expr: &Expr) -> Result<NodeId, Diagnostic> {
        self.eval(expr)?.ok_or_else(|| {
            Diagnostic::error(
                codes::NO_VALUE,
                expr.span,
                format!("`{}` produces no value", expr),
            )
        })
    }

    fn read(&mut self, expr: &Expr) -> Result<NodeId, Diagnostic> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Assign {
                op: AssignOp::Assign,
                lhs,
                rhs,
            } => {
                let value = self.value(rhs)?;
                let write = self.write_expr(lhs, value)?;
                self.control(write);
                Ok(value)
            }
            ExprKind::Assign { op, lhs, rhs } => {
                let arith = match op {
                    AssignOp::Add => ArithOp::Add,
                    AssignOp::Sub => ArithOp::Sub,
                    AssignOp::Mul => ArithOp::Mul,
                    AssignOp::Div => ArithOp::Div,
                    AssignOp::Or => ArithOp::Or,
                    AssignOp::Xor => ArithOp::Xor,
                    AssignOp::Shr => ArithOp::Shr,
                    AssignOp::Shl => ArithOp::Shl,
                    AssignOp::And => ArithOp::BitAnd,
                    AssignOp::Rem | AssignOp::Assign => return Err(unsupported(expr)),
                };
                let value = self.arithmetic(arith, lhs, rhs, span)?;
                let write = self.write_expr(lhs, value)?;
                self.control(write);
                Ok(write)
            }
            ExprKind::Var(ident) => self.read_var(ident),
            ExprKind::Index { .. } => self.read_index(expr),
            ExprKind::Unary { op, operand } => self.read_unary(*op, operand, expr),
            ExprKind::Binary { op, lhs, rhs } => {
                let arith = match op {
                    BinaryOp::Add => ArithOp::Add,
                    BinaryOp::Sub => ArithOp::Sub,
                    BinaryOp::Mul => ArithOp::Mul,
                    BinaryOp::Div => ArithOp::Div,
                    BinaryOp::Shl => ArithOp::Shl,
                    BinaryOp::Shr => ArithOp::Shr,
                    BinaryOp::BitAnd => ArithOp::BitAnd,
                    BinaryOp::BitXor => ArithOp::BitXor,
                    op if op.is_comparison() => {
                        let unit = self.comparison(lhs, rhs, span)?;
                        self.control(unit);
                        return Ok(unit);
                    }
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                        return Err(unsupported(expr)
                            .with_hint("split the condition into nested if statements"));
                    }
                    _ => return Err(unsupported(expr)),
                };
                self.arithmetic(arith, lhs, rhs, span)
            }
            ExprKind::IntLit {
                value,
                long,
                unsigned,
            } => {
                let bits = if *long { 64 } else { 32 };
                Ok(self.constant(
                    value.to_string(),
                    TypeDesc::int(bits).with_unsigned(*unsigned),
                    span,
                ))
            }
            ExprKind::FloatLit { value, single } => {
                let ty = if *single {
                    TypeDesc::float(32)
                } else {
                    TypeDesc::float(64)
                };
                Ok(self.constant(format!("{:.6}", value), ty, span))
            }
            ExprKind::BoolLit(value) => {
                Ok(self.constant(format!("Bool: {}", u8::from(*value)), TypeDesc::int(1), span))
            }
            ExprKind::Cast { ty, operand } => {
                let input = self.value(operand)?;
                if self.graph.node(input).kind.is_constant() {
                    let cast = scalar_type(ty, span)?;
                    self.graph.node_mut(input).ty = Some(cast);
                }
                Ok(input)
            }
            ExprKind::Member { .. } => self.read_member(expr),
            ExprKind::Comma { lhs, rhs } => {
                self.eval(lhs)?;
                self.value(rhs)
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.read_ternary(cond, then_expr, else_expr, span),
            ExprKind::SizeOf(inner) => self.size_of(inner, span),
            ExprKind::SizeOfType(_) => Err(Diagnostic::error(
                codes::UNSUPPORTED_SIZEOF,
                span,
                "sizeof on a type is not supported",
            )
            .with_hint("apply sizeof to an unsigned char array")),
            ExprKind::Call { .. } => self.value(expr),
        }
    }

    fn read_var(&mut self, ident: &Ident) -> Result<NodeId, Diagnostic> {
        let decl = self.decl_of(ident)?;
        let storage = self.read_variable(decl, ident.span)?;
        if self.vars.is_non_read(storage) {
            return Ok(storage);
        }
        let read = self.add(
            NodeKind::Read {
                type_dep: Some(storage),
            },
            None,
            ident.span,
        );
        self.control(read);
        self.edge(EdgeOp::ReadMemoryElement {
            element: storage,
            read,
        });
        Ok(read)
    }

    /// Storage node holding `decl`, creating constant global tables on
    /// first use.
    fn read_variable(&mut self, decl: DeclId, span: Span) -> Result<NodeId, Diagnostic> {
        if let Some(node) = self.vars.read_node(decl) {
            return Ok(node);
        }
        let resolved = self.resolved;
        let target = self.vars.underlying(decl);
        let info = resolved.decl(target);
        if info.role == DeclRole::Global && info.is_const && info.ty.is_array() {
            let elem = scalar_type(info.ty.base(), info.span)?;
            let node = self.add(
                NodeKind::GlobalArray {
                    name: info.name.clone(),
                    array_type: TypeDesc::opaque(info.ty.to_string()),
                },
                Some(elem),
                info.span,
            );
            self.vars.bind_global(target, node);
            return Ok(node);
        }
        let mut diag = Diagnostic::error(
            codes::MISSING_STORAGE,
            span,
            format!("`{}` has no storage in the graph", info.name),
        )
        .with_related(info.span, "declared here");
        if info.role == DeclRole::Global {
            diag = diag.with_hint("only constant global arrays are supported");
        }
        Err(diag)
    }

    fn write_storage(&self, ident: &Ident) -> Result<NodeId, Diagnostic> {
        let decl = self.decl_of(ident)?;
        self.vars.write_node(decl).ok_or_else(|| {
            Diagnostic::error(
                codes::MISSING_STORAGE,
                ident.span,
                format!("`{}` cannot be written", ident.name),
            )
            .with_hint("scalar parameters are read-only; copy the value into a local")
        })
    }

    fn write_declared(&mut self, decl: DeclId, value: NodeId, span: Span) -> Result<NodeId, Diagnostic> {
        let var = self.vars.write_node(decl).ok_or_else(|| {
            Diagnostic::error(
                codes::MISSING_STORAGE,
                span,
                format!("`{}` has no storage in the graph", self.resolved.decl(decl).name),
            )
        })?;
        Ok(self.add_write(var, value, var, span))
    }

    fn read_index(&mut self, expr: &Expr) -> Result<NodeId, Diagnostic> {
        let deref = self.get_deref(expr)?;
        let links = self.deref_links(deref);
        let element = links.element.ok_or_else(|| bad_index_base(expr))?;
        let resolved = self.edge(EdgeOp::ResolvedMemoryAddress {
            deref,
            dst: None,
            element,
        });
        let read = self.add(
            NodeKind::Read {
                type_dep: links.base_type_dep,
            },
            None,
            expr.span,
        );
        self.graph.set_resolved_target(resolved, read);
        self.control(read);
        self.edge(EdgeOp::ReadMemoryElement { element, read });
        Ok(read)
    }

    fn read_unary(&mut self, op: UnaryOp, operand: &Expr, expr: &Expr) -> Result<NodeId, Diagnostic> {
        let span = expr.span;
        match op {
            UnaryOp::Deref => {
                let ExprKind::Var(ident) = &operand.kind else {
                    return Err(unsupported(expr));
                };
                let decl = self.decl_of(ident)?;
                let var = self.read_variable(decl, ident.span)?;
                let read = self.add(NodeKind::Read { type_dep: Some(var) }, None, span);
                self.edge(EdgeOp::ParameterLoad { src: var, dst: read });
                self.control(read);
                self.edge(EdgeOp::ReadMemoryElement { element: var, read });
                Ok(read)
            }
            UnaryOp::PreInc | UnaryOp::PostInc | UnaryOp::PreDec | UnaryOp::PostDec => {
                let current = self.value(operand)?;
                let ty = self.type_of(current, operand.span)?;
                let step = match op {
                    UnaryOp::PreInc | UnaryOp::PostInc => "1",
                    _ => "-1",
                };
                let one = self.constant(step, ty, span);
                let sum = self.arith_node(ArithOp::Add, current, one, span);
                self.control(sum);
                let write = self.write_expr(operand, sum)?;
                self.control(write);
                Ok(write)
            }
            UnaryOp::Neg => {
                let input = self.value(operand)?;
                if let NodeKind::Constant { value, .. } = &mut self.graph.node_mut(input).kind {
                    *value = negate_literal(value);
                    return Ok(input);
                }
                if self.type_of(input, operand.span)?.is_float() {
                    let neg = self.add(NodeKind::FNeg, None, span);
                    self.data(input, neg, 0);
                    self.control(neg);
                    return Ok(neg);
                }
                Ok(input)
            }
            UnaryOp::Plus => self.value(operand),
            UnaryOp::AddressOf => match &operand.kind {
                ExprKind::Var(ident) => {
                    let decl = self.decl_of(ident)?;
                    self.read_variable(decl, ident.span)
                }
                ExprKind::Index { .. } => self.get_deref(operand),
                _ => Err(unsupported(expr)),
            },
            UnaryOp::Not | UnaryOp::BitNot => Err(unsupported(expr)),
        }
    }

    fn arithmetic(&mut self, op: ArithOp, lhs: &Expr, rhs: &Expr, span: Span) -> Result<NodeId, Diagnostic> {
        let lhs = self.value(lhs)?;
        let rhs = self.value(rhs)?;
        let folded = match (
            self.graph.node(lhs).constant_value(),
            self.graph.node(rhs).constant_value(),
        ) {
            (Some(a), Some(b)) => Some(self.fold(op, lhs, rhs, a, b, span)?),
            _ => None,
        };
        if let Some(node) = folded {
            return Ok(node);
        }
        let unit = self.arith_node(op, lhs, rhs, span);
        self.control(unit);
        Ok(unit)
    }

    fn arith_node(&mut self, op: ArithOp, lhs: NodeId, rhs: NodeId, span: Span) -> NodeId {
        let unit = self.add(NodeKind::Arithmetic { op, lhs, rhs }, None, span);
        self.edge(EdgeOp::ArithmeticUnit { lhs, rhs, unit });
        unit
    }

    /// Replace arithmetic on two constants by its result.
    ///
    /// The result type follows the unit rule, so a float operand on either
    /// side yields a float constant.
    fn fold(
        &mut self,
        op: ArithOp,
        lhs: NodeId,
        rhs: NodeId,
        a: f64,
        b: f64,
        span: Span,
    ) -> Result<NodeId, Diagnostic> {
        let operand_type =
            |id: NodeId| self.graph.node(id).ty.clone().unwrap_or_else(|| TypeDesc::int(32));
        let ty = TypeDesc::binary_result(&operand_type(lhs), &operand_type(rhs), 0);
        if op == ArithOp::Div && b == 0.0 && !ty.is_float() {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_EXPRESSION,
                span,
                format!("constant integer division `{} / 0`", a),
            )
            .with_hint("division by zero has no defined result"));
        }
        for node in [lhs, rhs] {
            if let NodeKind::Constant { folded, .. } = &mut self.graph.node_mut(node).kind {
                *folded = true;
            }
        }
        let wide = ty.bits >= 64;
        let result = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Shl if wide => (a as i64).wrapping_shl(b as u32) as f64,
            ArithOp::Shr if wide => (a as i64).wrapping_shr(b as u32) as f64,
            ArithOp::Shl => f64::from((a as i32).wrapping_shl(b as u32)),
            ArithOp::Shr => f64::from((a as i32).wrapping_shr(b as u32)),
            ArithOp::BitAnd => ((a as i64) & (b as i64)) as f64,
            ArithOp::BitXor | ArithOp::Xor => ((a as i64) ^ (b as i64)) as f64,
            ArithOp::Or => ((a as i64) | (b as i64)) as f64,
        };
        let text = if ty.is_float() {
            format!("{:.6}", result)
        } else {
            format!("{}", result.trunc() as i64)
        };
        log::trace!("folded {} {} {} into {}", a, op.label(), b, text);
        Ok(self.constant(text, ty, span))
    }

    fn read_member(&mut self, expr: &Expr) -> Result<NodeId, Diagnostic> {
        let ExprKind::Member { base, .. } = &expr.kind else {
            return Err(unsupported(expr));
        };
        if !self.options.proxy_programl {
            return self.value(base);
        }
        let span = expr.span;
        let dot = self.get_dot(expr)?;
        let field_is_array = self.static_type(expr).is_some_and(|t| t.is_array());
        if field_is_array {
            let address = self.add(NodeKind::Deref(DerefLinks::default()), Some(TypeDesc::int(64)), span);
            self.control(address);
            self.data(dot, address, 0);
            for _ in 0..2 {
                let zero = self.constant("0", TypeDesc::int(64), span);
                self.data(zero, address, 0);
            }
            return Ok(address);
        }
        let links = self.deref_links(dot);
        let element = links.element.ok_or_else(|| bad_index_base(expr))?;
        let read = self.add(
            NodeKind::Read {
                type_dep: links.base_type_dep,
            },
            None,
            span,
        );
        self.edge(EdgeOp::ResolvedMemoryAddress {
            deref: dot,
            dst: Some(read),
            element,
        });
        self.edge(EdgeOp::ReadMemoryElement { element, read });
        self.control(read);
        Ok(read)
    }

    fn read_ternary(
        &mut self,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        span: Span,
    ) -> Result<NodeId, Diagnostic> {
        let mut tested = self.value(cond)?;
        if !matches!(self.graph.node(tested).kind, NodeKind::Comparison { .. }) {
            tested = self.zero_comparison(tested, cond.span)?;
            self.control(tested);
        }
        let branch = self.add(NodeKind::Branch, None, cond.span);
        self.control(branch);
        self.data(tested, branch, 0);

        let lhs = self.value(then_expr)?;
        self.edge(EdgeOp::ProgramlBranch);
        let start = self.edge(EdgeOp::MergeStart);
        self.edge(EdgeOp::Revert { node: branch });

        let rhs = self.value(else_expr)?;
        self.edge(EdgeOp::ProgramlBranch);
        self.edge(EdgeOp::MergeEnd { start });

        let unit = self.add(NodeKind::Select { lhs, rhs }, None, span);
        self.edge(EdgeOp::ArithmeticUnit { lhs, rhs, unit });
        self.control(unit);
        Ok(unit)
    }

    fn size_of(&mut self, inner: &Expr, span: Span) -> Result<NodeId, Diagnostic> {
        let byte_array = self.static_type(inner).and_then(|ty| match &ty {
            CType::Array(..) if *ty.base() == CType::Scalar("unsigned char".into()) => {
                ty.element_count()
            }
            _ => None,
        });
        match byte_array {
            Some(count) => Ok(self.constant(count.to_string(), TypeDesc::int(64), span)),
            None => Err(Diagnostic::error(
                codes::UNSUPPORTED_SIZEOF,
                span,
                format!("sizeof `{}` is not supported", inner),
            )
            .with_hint("sizeof is only supported on arrays of unsigned char")),
        }
    }

    /// Declared C type of an lvalue expression.
    fn static_type(&self, expr: &Expr) -> Option<CType> {
        match &expr.kind {
            ExprKind::Var(ident) => {
                let decl = self.resolved.binding(ident.span)?;
                Some(self.resolved.decl(decl).ty.clone())
            }
            ExprKind::Index { base, .. } => self.static_type(base)?.element().cloned(),
            ExprKind::Member { base, field, .. } => {
                let base_ty = self.static_type(base)?;
                let def = self.structs.get(base_ty.base().struct_name()?)?;
                def.fields
                    .iter()
                    .find(|f| f.name.name == field.name)
                    .map(|f| f.ty.clone())
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => self.static_type(operand)?.element().cloned(),
            _ => None,
        }
    }

    // ── Addresses ───────────────────────────────────────────────────────────

    /// Address node for an index expression, shared within a block.
    fn get_deref(&mut self, expr: &Expr) -> Result<NodeId, Diagnostic> {
        let ExprKind::Index { base, index } = &expr.kind else {
            return Err(bad_index_base(expr));
        };
        let key = expr.to_string();
        if let Some(deref) = self.derefs.get(&key) {
            return Ok(deref);
        }
        if matches!(base.kind, ExprKind::Index { .. }) && !self.options.proxy_programl {
            let offset = self.value(index)?;
            let deref = self.get_deref(base)?;
            self.data(offset, deref, 0);
            return Ok(deref);
        }

        let deref = self.add(NodeKind::Deref(DerefLinks::default()), None, expr.span);
        self.derefs.save(key, deref);
        let links = match &base.kind {
            ExprKind::Member { .. } if self.options.proxy_programl => {
                let dot = self.get_dot(base)?;
                let dot_links = self.deref_links(dot);
                self.edge(EdgeOp::ParameterLoad { src: dot, dst: deref });
                DerefLinks {
                    element: dot_links.element,
                    type_dep: Some(dot),
                    base_type_dep: dot_links.base_type_dep,
                }
            }
            ExprKind::Member { base: inner, .. } => self.deref_base(inner, deref)?,
            _ => self.deref_base(base, deref)?,
        };
        if let NodeKind::Deref(slot) = &mut self.graph.node_mut(deref).kind {
            *slot = links;
        }

        let offset = self.value(index)?;
        self.edge(EdgeOp::SextDataFlow {
            src: offset,
            dst: deref,
            order: 1,
            width: None,
        });
        self.control(deref);
        Ok(deref)
    }

    fn deref_base(&mut self, base: &Expr, deref: NodeId) -> Result<DerefLinks, Diagnostic> {
        match &base.kind {
            ExprKind::Index { .. } => {
                let prev = self.get_deref(base)?;
                let prev_links = self.deref_links(prev);
                self.edge(EdgeOp::ParameterLoad { src: prev, dst: deref });
                Ok(DerefLinks {
                    element: prev_links.element,
                    type_dep: Some(prev),
                    base_type_dep: prev_links.base_type_dep,
                })
            }
            ExprKind::Var(ident) => {
                let decl = self.decl_of(ident)?;
                let array = self.read_variable(decl, ident.span)?;
                self.edge(EdgeOp::ParameterLoad { src: array, dst: deref });
                Ok(DerefLinks {
                    element: Some(array),
                    type_dep: Some(array),
                    base_type_dep: Some(array),
                })
            }
            _ => Err(bad_index_base(base)),
        }
    }

    /// Struct access node for `base.field`.
    fn get_dot(&mut self, expr: &Expr) -> Result<NodeId, Diagnostic> {
        let ExprKind::Member { base, field, .. } = &expr.kind else {
            return Err(bad_index_base(expr));
        };
        let struct_name = self
            .static_type(base)
            .and_then(|ty| ty.base().struct_name().map(str::to_string))
            .ok_or_else(|| {
                Diagnostic::error(
                    codes::UNREGISTERED_STRUCT,
                    base.span,
                    format!("`{}` is not a struct", base),
                )
            })?;
        let field_node = self
            .vars
            .struct_field(&struct_name, &field.name)
            .ok_or_else(|| {
                Diagnostic::error(
                    codes::UNREGISTERED_STRUCT,
                    field.span,
                    format!("struct `{}` has no registered field `{}`", struct_name, field.name),
                )
                .with_hint("structs are registered when passed in as parameters")
            })?;

        let access = self.add(NodeKind::StructAccess(DerefLinks::default()), None, expr.span);
        let element = match &base.kind {
            ExprKind::Var(ident) => {
                let decl = self.decl_of(ident)?;
                let src = self.read_variable(decl, ident.span)?;
                self.edge(EdgeOp::ParameterLoad { src, dst: access });
                src
            }
            ExprKind::Index { base: array, .. } => {
                let src = self.get_deref(base)?;
                let ExprKind::Var(ident) = &array.kind else {
                    return Err(bad_index_base(array));
                };
                let decl = self.decl_of(ident)?;
                let element = self.read_variable(decl, ident.span)?;
                self.data(src, access, 0);
                element
            }
            _ => return Err(bad_index_base(base)),
        };
        self.control(access);
        self.edge(EdgeOp::StructAccess { access });

        let field_ty = self
            .graph
            .immediate_type(field_node, self.options)
            .map_err(|e| Diagnostic::error(codes::UNTYPED_VALUE, field.span, e.0))?;
        let node = self.graph.node_mut(access);
        node.kind = NodeKind::StructAccess(DerefLinks {
            element: Some(element),
            type_dep: None,
            base_type_dep: Some(field_node),
        });
        node.ty = Some(field_ty);
        Ok(access)
    }

    // ── Writes ──────────────────────────────────────────────────────────────

    fn write_expr(&mut self, target: &Expr, value: NodeId) -> Result<NodeId, Diagnostic> {
        let span = target.span;
        match &target.kind {
            ExprKind::Var(ident) => {
                let var = self.write_storage(ident)?;
                Ok(self.add_write(var, value, var, span))
            }
            ExprKind::Index { .. } => {
                let deref = self.get_deref(target)?;
                let links = self.deref_links(deref);
                let element = links.element.ok_or_else(|| bad_index_base(target))?;
                let type_dep = links.base_type_dep.unwrap_or(element);
                let write = self.add_write(element, value, type_dep, span);
                self.edge(EdgeOp::ResolvedMemoryAddress {
                    deref,
                    dst: Some(write),
                    element,
                });
                Ok(write)
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let ExprKind::Var(ident) = &operand.kind else {
                    return Err(unsupported(target));
                };
                let var = self.write_storage(ident)?;
                let meta = self.meta();
                let pointer = self.graph.add_detached_node(Node::new(
                    NodeKind::Constant {
                        value: "0".to_string(),
                        folded: true,
                    },
                    Some(TypeDesc::int(64)),
                    meta,
                    span,
                ));
                let load = self.add(
                    NodeKind::Read {
                        type_dep: Some(pointer),
                    },
                    None,
                    span,
                );
                self.control(load);
                self.edge(EdgeOp::MemoryAddress { src: var, dst: load });
                let write = self.add_write(load, value, var, span);
                self.edge(EdgeOp::MemoryAddress {
                    src: load,
                    dst: write,
                });
                Ok(write)
            }
            ExprKind::Member { base, .. } => {
                if !self.options.proxy_programl {
                    return self.write_expr(base, value);
                }
                let dot = self.get_dot(target)?;
                let links = self.deref_links(dot);
                let element = links.element.ok_or_else(|| bad_index_base(target))?;
                let type_dep = links.base_type_dep.unwrap_or(element);
                let write = self.add_write(element, value, type_dep, span);
                self.edge(EdgeOp::ResolvedMemoryAddress {
                    deref: dot,
                    dst: Some(write),
                    element,
                });
                Ok(write)
            }
            _ => Err(Diagnostic::error(
                codes::UNSUPPORTED_EXPRESSION,
                span,
                format!("cannot assign to `{}`", target),
            )),
        }
    }

    fn add_write(&mut self, var: NodeId, value: NodeId, type_dep: NodeId, span: Span) -> NodeId {
        let write = self.add(
            NodeKind::Write {
                type_dep: Some(type_dep),
                input: Some(value),
            },
            None,
            span,
        );
        self.edge(EdgeOp::ImplicitCast {
            src: value,
            dst: write,
            order: 1,
            target: None,
        });
        let bound = self.graph.node(value).constant_value();
        self.with_iterator(var, |it| it.add_bound(bound));
        self.edge(EdgeOp::WriteMemoryElement {
            write,
            element: var,
        });
        write
    }

    // ── Calls ───────────────────────────────────────────────────────────────

    fn lower_call(&mut self, callee: &Ident, args: &[Expr], span: Span) -> Result<Option<NodeId>, Diagnostic> {
        let unit = self.unit;
        let resolved = self.resolved;
        let unknown = || {
            Diagnostic::error(
                codes::UNKNOWN_FUNCTION,
                callee.span,
                format!("function `{}` is not declared", callee.name),
            )
        };
        let id = resolved.function_id(&callee.name).ok_or_else(unknown)?;
        let func = resolved.function(unit, id).ok_or_else(unknown)?;
        if func.params.len() != args.len() {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_EXPRESSION,
                span,
                format!(
                    "`{}` takes {} argument(s) but {} were given",
                    callee.name,
                    func.params.len(),
                    args.len()
                ),
            )
            .with_related(func.span, "declared here"));
        }
        if self.options.inline_functions {
            return self.inline_call(id, func, args, span);
        }

        let return_type = scalar_type(&func.return_type, func.span)?;
        let call = self.add(NodeKind::FunctionCall, Some(return_type), span);
        let key = self.key_for(id);
        self.queue.push_back(key);
        self.record_mut(key).calls.push(call);

        let mut lowered = Vec::with_capacity(args.len());
        for (param, arg) in func.params.iter().zip(args) {
            let param_type = if param.ty.is_array() || param.ty.is_pointer() {
                TypeDesc::int(64)
            } else {
                scalar_type(&param.ty, param.name.span)?
            };
            let lowering = self.lower_arg(arg, call)?;
            lowered.push(CallArg {
                param_type,
                lowering,
            });
        }
        self.edge(EdgeOp::FunctionCall {
            call,
            callee: key,
            args: lowered,
        });
        Ok(Some(call))
    }

    fn lower_arg(&mut self, arg: &Expr, call: NodeId) -> Result<ArgLowering, Diagnostic> {
        if let ExprKind::Var(ident) = &arg.kind {
            let decl = self.decl_of(ident)?;
            let var = self.read_variable(decl, ident.span)?;
            let kind = &self.graph.node(var).kind;
            if self.options.drop_func_call_proc {
                if matches!(
                    kind,
                    NodeKind::LocalArray { .. }
                        | NodeKind::ExternalArray { .. }
                        | NodeKind::ParamScalar { .. }
                        | NodeKind::LocalScalar { .. }
                ) {
                    return Ok(ArgLowering::MemoryElement { var });
                }
            } else {
                match kind {
                    NodeKind::ExternalArray { .. } | NodeKind::SubParamArray { .. } => {
                        return Ok(ArgLowering::PointerLoad { var });
                    }
                    NodeKind::LocalArray { .. } => {
                        return Ok(ArgLowering::LocalArrayAddress { var });
                    }
                    _ => {}
                }
            }
        }

        let saved = self.derefs.suspend();
        let outer = self.meta_override.replace(self.graph.node(call).meta.clone());
        self.graph.begin_capture();
        let value = self.value(arg);
        let segment = self.graph.end_capture();
        self.meta_override = outer;
        self.derefs.restore(saved);
        Ok(ArgLowering::Value {
            segment,
            value: value?,
        })
    }

    fn inline_call(
        &mut self,
        id: FuncId,
        func: &Function,
        args: &[Expr],
        span: Span,
    ) -> Result<Option<NodeId>, Diagnostic> {
        let Some(body) = &func.body else {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_EXPRESSION,
                span,
                format!("cannot inline `{}`: it has no definition", func.name.name),
            ));
        };
        if self.inline_stack.contains(&id) {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_EXPRESSION,
                span,
                format!("cannot inline recursive call to `{}`", func.name.name),
            ));
        }
        let params = self.resolved.params_of(id);
        for (param, arg) in params.iter().zip(args) {
            match &arg.kind {
                ExprKind::Var(ident) => {
                    let decl = self.decl_of(ident)?;
                    self.vars.alias(*param, decl);
                }
                _ => {
                    let value = self.value(arg)?;
                    self.vars.bind_value(*param, value);
                }
            }
        }
        log::trace!("inlining `{}`", func.name.name);
        self.new_bb();
        let saved_return = self.function_return.take();
        let saved_returns = std::mem::replace(&mut self.returns, 0);
        self.inline_stack.push(id);
        self.lower_block(&body.stmts)
            .map_err(|d| d.with_cause(format!("inlined call to `{}`", func.name.name), Some(span)))?;
        self.inline_stack.pop();
        let result = std::mem::replace(&mut self.function_return, saved_return);
        self.returns = saved_returns;
        Ok(result)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn unsupported(expr: &Expr) -> Diagnostic {
    Diagnostic::error(
        codes::UNSUPPORTED_EXPRESSION,
        expr.span,
        format!("unsupported expression `{}`", expr),
    )
}

fn bad_index_base(expr: &Expr) -> Diagnostic {
    Diagnostic::error(
        codes::BAD_INDEX_BASE,
        expr.span,
        format!("cannot compute an address for `{}`", expr),
    )
    .with_hint("index a named array, an array parameter or a struct field")
}

/// Directives placed directly in a loop body.
fn stmt_pragmas(stmt: &Stmt) -> Vec<(&str, Span)> {
    match &stmt.kind {
        StmtKind::Block(block) => block.pragmas().collect(),
        _ => Vec::new(),
    }
}

/// Variable assigned by a for-loop initializer expression (`i = 0` or
/// `i = 0, j = 0`).
fn assigned_var(expr: &Expr) -> Option<&Ident> {
    match &expr.kind {
        ExprKind::Assign {
            op: AssignOp::Assign,
            lhs,
            ..
        } => match &lhs.kind {
            ExprKind::Var(ident) => Some(ident),
            _ => None,
        },
        ExprKind::Comma { lhs, .. } => assigned_var(lhs),
        _ => None,
    }
}

fn negate_literal(value: &str) -> String {
    if let Ok(v) = value.parse::<i64>() {
        return v.wrapping_neg().to_string();
    }
    if let Ok(v) = value.parse::<f64>() {
        return format!("{:.6}", -v);
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower_src(source: &str, top: &str, options: EmitOptions) -> LowerResult {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let unit = parsed.unit.expect("parse failed");
        let resolved = crate::resolve::resolve(&unit);
        assert!(
            resolved.diagnostics.iter().all(|d| !d.is_error()),
            "resolve errors: {:#?}",
            resolved.diagnostics
        );
        lower(&unit, &resolved.resolved, top, &options)
    }

    fn lower_ok(source: &str, top: &str) -> LoweredProgram {
        lower_with(source, top, EmitOptions::default())
    }

    fn lower_with(source: &str, top: &str, options: EmitOptions) -> LoweredProgram {
        let result = lower_src(source, top, options);
        assert!(!result.has_errors(), "lowering errors: {:#?}", result.diagnostics);
        result.lowered.expect("lowered program")
    }

    fn lower_err(source: &str, top: &str) -> Diagnostic {
        let result = lower_src(source, top, EmitOptions::default());
        assert!(result.lowered.is_none());
        result.diagnostics.into_iter().next().expect("one diagnostic")
    }

    fn count(p: &LoweredProgram, pred: impl Fn(&NodeKind) -> bool) -> usize {
        p.graph
            .top_level()
            .nodes
            .iter()
            .filter(|id| pred(&p.graph.node(**id).kind))
            .count()
    }

    const VADD: &str = "void vadd(int a[16], int b[16]) {\n\
        for (int i = 0; i < 16; i++) {\n\
            a[i] = a[i] + b[i];\n\
        }\n\
    }";

    #[test]
    fn external_node_comes_first() {
        let p = lower_ok(VADD, "vadd");
        let first = p.graph.top_level().nodes[0];
        assert_eq!(first, p.external);
        assert!(matches!(p.graph.node(first).kind, NodeKind::External));
        assert_eq!(p.graph.node(first).meta.group, "External");
    }

    #[test]
    fn repeated_index_shares_address_node() {
        let p = lower_ok(VADD, "vadd");
        assert_eq!(count(&p, |k| matches!(k, NodeKind::Deref(_))), 2);
        assert_eq!(count(&p, |k| matches!(k, NodeKind::ExternalArray { .. })), 2);
        assert_eq!(count(&p, |k| matches!(k, NodeKind::Branch)), 1);
    }

    #[test]
    fn loop_iterator_records_constant_bounds() {
        let p = lower_ok(VADD, "vadd");
        let (_, iter) = p
            .graph
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::LocalScalar { .. }))
            .expect("iterator storage");
        let NodeKind::LocalScalar { name, iterator } = &iter.kind else {
            panic!("expected LocalScalar")
        };
        assert_eq!(name, "i");
        assert_eq!(iterator.bounds, vec![0.0, 16.0]);
        assert_eq!(iterator.reduced_width(), Some(5));
    }

    #[test]
    fn loop_structure_edges_are_recorded() {
        let p = lower_ok(VADD, "vadd");
        let ops: Vec<&EdgeOp> = p.graph.top_level().edges.iter().map(|e| p.graph.edge(*e)).collect();
        assert!(ops.iter().any(|e| matches!(e, EdgeOp::PreLoop)));
        assert!(ops.iter().any(|e| matches!(e, EdgeOp::LoopBack { .. })));
        assert!(matches!(ops[0], EdgeOp::FunctionStart { .. }));
        assert!(matches!(ops.last(), Some(EdgeOp::ControlFlow { .. })));
    }

    #[test]
    fn constant_arithmetic_is_folded() {
        let p = lower_ok("int k() { int x = 2 + 3 * 4; return x; }", "k");
        let values: Vec<(String, bool)> = p
            .graph
            .top_level()
            .nodes
            .iter()
            .filter_map(|id| match &p.graph.node(*id).kind {
                NodeKind::Constant { value, folded } => Some((value.clone(), *folded)),
                _ => None,
            })
            .collect();
        assert!(values.contains(&("14".to_string(), false)));
        assert!(values.contains(&("2".to_string(), true)));
        assert_eq!(count(&p, |k| matches!(k, NodeKind::Arithmetic { .. })), 0);
    }

    /// Constants that survive folding, with their types.
    fn live_constants(p: &LoweredProgram) -> Vec<(String, TypeDesc)> {
        p.graph
            .top_level()
            .nodes
            .iter()
            .map(|id| p.graph.node(*id))
            .filter_map(|n| match &n.kind {
                NodeKind::Constant { value, folded: false } => {
                    Some((value.clone(), n.ty.clone().expect("typed constant")))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn float_operand_decides_folded_type_on_either_side() {
        for src in [
            "void k() { float x = 1 + 0.5; }",
            "void k() { float x = 0.5 + 1; }",
        ] {
            let p = lower_ok(src, "k");
            let live = live_constants(&p);
            assert!(
                live.contains(&("1.500000".to_string(), TypeDesc::float(64))),
                "{}: {:?}",
                src,
                live
            );
        }
    }

    #[test]
    fn long_shift_folds_in_sixty_four_bits() {
        let p = lower_ok("void k() { long x = 1L << 40; }", "k");
        let live = live_constants(&p);
        assert!(
            live.contains(&("1099511627776".to_string(), TypeDesc::int(64))),
            "{:?}",
            live
        );

        let p = lower_ok("void k() { int x = 1 << 4; }", "k");
        assert!(live_constants(&p).contains(&("16".to_string(), TypeDesc::int(32))));
    }

    #[test]
    fn constant_integer_division_by_zero_is_rejected() {
        let d = lower_err("void k() { int x = -(-1 / 0); }", "k");
        assert_eq!(d.code, Some(codes::UNSUPPORTED_EXPRESSION));
        assert!(d.message.contains("/ 0"), "{}", d.message);
        assert!(d.hint.is_some());
    }

    #[test]
    fn float_division_by_zero_still_folds() {
        let p = lower_ok("void k() { float x = 1.0 / 0; }", "k");
        assert!(live_constants(&p).contains(&("inf".to_string(), TypeDesc::float(64))));
    }

    #[test]
    fn callee_is_lowered_breadth_first() {
        let src = "int sq(int v) { return v * v; }\n\
                   int top(int x) { int y = sq(x); return sq(y); }";
        let p = lower_ok(src, "top");
        let sq = p.function_named("sq").expect("callee record");
        assert!(sq.lowered);
        assert_eq!(sq.function_id, 1);
        assert_eq!(sq.calls.len(), 2);
        assert_eq!(sq.stats, Some(CallStats { calls: 2, sites: 2 }));
        assert_eq!(p.function(p.top).stats, Some(CallStats { calls: 1, sites: 1 }));
        assert_eq!(count(&p, |k| matches!(k, NodeKind::FunctionCall)), 2);
    }

    #[test]
    fn unrolled_call_counts_each_copy() {
        let src = "int sq(int v) { return v * v; }\n\
                   void top(int a[8]) {\n\
                     for (int i = 0; i < 8; i++) {\n\
                     #pragma HLS unroll factor=4\n\
                       a[i] = sq(a[i]);\n\
                     }\n\
                   }";
        let p = lower_ok(src, "top");
        let sq = p.function_named("sq").expect("callee record");
        assert_eq!(sq.stats, Some(CallStats { calls: 4, sites: 1 }));
        let unroll = p
            .graph
            .top_level()
            .nodes
            .iter()
            .find_map(|id| match &p.graph.node(*id).kind {
                NodeKind::Pragma { key, factor } if key == "unroll" => Some(factor.clone()),
                _ => None,
            });
        assert_eq!(unroll.as_deref(), Some("4"));
    }

    #[test]
    fn call_arguments_are_captured_off_the_top_level() {
        let src = "int sq(int v) { return v * v; }\n\
                   int top(int x) { return sq(x + 1); }";
        let p = lower_ok(src, "top");
        let args = p
            .graph
            .top_level()
            .edges
            .iter()
            .find_map(|e| match p.graph.edge(*e) {
                EdgeOp::FunctionCall { args, .. } => Some(args.clone()),
                _ => None,
            })
            .expect("call edge");
        assert_eq!(args.len(), 1);
        let ArgLowering::Value { segment, value } = &args[0].lowering else {
            panic!("expected Value argument")
        };
        assert!(segment.nodes.contains(value));
        assert!(!p.graph.top_level().nodes.contains(value));
    }

    #[test]
    fn array_arguments_forward_pointers() {
        let src = "void fill(int d[4]) { d[0] = 1; }\n\
                   void top(int a[4]) { int t[4]; fill(a); fill(t); }";
        let p = lower_ok(src, "top");
        let kinds: Vec<String> = p
            .graph
            .top_level()
            .edges
            .iter()
            .filter_map(|e| match p.graph.edge(*e) {
                EdgeOp::FunctionCall { args, .. } => Some(format!("{:?}", args[0].lowering)),
                _ => None,
            })
            .collect();
        assert!(kinds[0].starts_with("PointerLoad"));
        assert!(kinds[1].starts_with("LocalArrayAddress"));
        let d = p
            .graph
            .nodes()
            .find(|(_, n)| n.name() == Some("d"))
            .map(|(_, n)| n.kind.clone());
        assert!(matches!(d, Some(NodeKind::SubParamArray { .. })));
    }

    #[test]
    fn inlining_removes_calls() {
        let src = "int sq(int v) { return v * v; }\n\
                   int top(int x) { return sq(x); }";
        let p = lower_with(
            src,
            "top",
            EmitOptions {
                inline_functions: true,
                ..Default::default()
            },
        );
        assert_eq!(count(&p, |k| matches!(k, NodeKind::FunctionCall)), 0);
        assert_eq!(count(&p, |k| matches!(k, NodeKind::Arithmetic { .. })), 1);
        assert!(p.function_named("sq").is_none());
    }

    #[test]
    fn constant_global_table_becomes_node() {
        let src = "const int lut[4] = {1, 2, 3, 4};\n\
                   int top(int i) { return lut[i]; }";
        let p = lower_ok(src, "top");
        assert_eq!(count(&p, |k| matches!(k, NodeKind::GlobalArray { .. })), 1);
    }

    #[test]
    fn do_while_is_rejected() {
        let d = lower_err("void k() { int i = 0; do { i++; } while (i < 4); }", "k");
        assert_eq!(d.code, Some(codes::DO_WHILE));
    }

    #[test]
    fn second_return_is_rejected() {
        let d = lower_err(
            "int k(int x) { if (x > 0) { return 1; } return 0; }",
            "k",
        );
        assert_eq!(d.code, Some(codes::MULTIPLE_RETURNS));
        assert!(!d.cause_chain.is_empty());
    }

    #[test]
    fn logical_condition_is_rejected_with_hint() {
        let d = lower_err("void k(int a, int b) { if (a > 0 && b > 0) { a = 1; } }", "k");
        assert_eq!(d.code, Some(codes::UNSUPPORTED_EXPRESSION));
        assert!(d.hint.is_some());
    }

    #[test]
    fn remainder_assignment_is_rejected() {
        let d = lower_err("void k(int a[2]) { a[0] %= 3; }", "k");
        assert_eq!(d.code, Some(codes::UNSUPPORTED_EXPRESSION));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let d = lower_err("void k() { break; }", "k");
        assert_eq!(d.code, Some(codes::BREAK_OUTSIDE_LOOP));
    }

    #[test]
    fn missing_top_is_reported() {
        let d = lower_err("void k() { }", "main");
        assert_eq!(d.code, Some(codes::UNKNOWN_TOP));
    }

    #[test]
    fn writing_scalar_parameter_is_rejected() {
        let d = lower_err("void k(int n) { n = 3; }", "k");
        assert_eq!(d.code, Some(codes::MISSING_STORAGE));
    }

    #[test]
    fn for_without_iterator_is_rejected() {
        let d = lower_err("void k(int n) { int i = 0; for (; i < n; i++) { } }", "k");
        assert_eq!(d.code, Some(codes::UNSUPPORTED_FOR_INIT));
    }

    #[test]
    fn breaking_both_arms_stops_block() {
        let src = "void k(int a[4]) {\n\
                     for (int i = 0; i < 4; i++) {\n\
                       if (a[i] > 0) { break; } else { break; }\n\
                       a[i] = 0;\n\
                     }\n\
                   }";
        let p = lower_ok(src, "k");
        assert_eq!(count(&p, |k| matches!(k, NodeKind::Write { .. })), 1);
    }

    #[test]
    fn basic_blocks_advance_through_loop() {
        let p = lower_ok(VADD, "vadd");
        let max_bb = p.graph.nodes().map(|(_, n)| n.meta.bb).max().unwrap_or(0);
        assert!(max_bb >= 2, "expected several basic blocks, got {}", max_bb);
    }

    #[test]
    fn negative_literal_is_folded_into_constant() {
        assert_eq!(negate_literal("3"), "-3");
        assert_eq!(negate_literal("-3"), "3");
        assert_eq!(negate_literal("1.500000"), "-1.500000");
        assert_eq!(negate_literal("Bool: 1"), "Bool: 1");
        assert_eq!(
            negate_literal(&i64::MIN.to_string()),
            i64::MIN.to_string()
        );
    }
}
