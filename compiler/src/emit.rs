// emit.rs — Program graph to DOT emission
//
// Prints every top-level node, then runs the deferred edge operations in
// creation order. A cursor tracks the last node reached by control flow;
// marker operations (pre-loop, merge end, function start) register
// listeners that fire the next time the cursor moves. Edge operations may
// create and print helper nodes (type markers, extensions, casts, loads) on
// the fly; those inherit their context from the current state node.
//
// Preconditions: `program` came out of `lower` with the same options.
// Postconditions: every edge line refers to two printed nodes; node ids are
//                 assigned in print order starting at 0.
// Failure modes: none. Edges whose endpoints were never printed are skipped
//                and logged.
// Side effects: logs skipped edges and soft type failures via `log`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::Span;
use crate::dot::{Attributes, DotStats, DotWriter, EdgeStyle, PragmaLabel};
use crate::graph::{
    ArgLowering, CallArg, DerefLinks, EdgeId, EdgeOp, FnKey, Graph, Node, NodeId, NodeKind,
    NodeMeta,
};
use crate::lower::LoweredProgram;
use crate::options::EmitOptions;
use crate::types::TypeDesc;

/// Rendered DOT text plus line counts.
#[derive(Debug, Clone)]
pub struct Emission {
    pub dot: String,
    pub stats: DotStats,
}

/// Render a lowered program as DOT.
pub fn emit(program: &LoweredProgram, options: &EmitOptions) -> Emission {
    let emitter = Emitter::new(program, options);
    let (dot, stats) = emitter.run();
    log::debug!("emitted {} nodes and {} edges", stats.nodes, stats.edges);
    Emission { dot, stats }
}

// ── Emitter state ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Listener {
    /// Record the loop's first node.
    PreLoop(EdgeId),
    /// Join the first branch arm's last node to the next node.
    MergeEnd {
        start: EdgeId,
        source2: Option<NodeId>,
    },
    /// Draw call edges from every call site to the callee's first node.
    FunctionStart(FnKey),
}

/// How one node kind is drawn.
struct Appearance {
    color: &'static str,
    label: String,
    key: String,
    node_type: &'static str,
    shape: Option<&'static str>,
    numeric: Option<String>,
    /// Drawn like a literal: no type annotations.
    value_like: bool,
    /// Receives a zero initializer outside memory-element mode.
    storage: bool,
    array_width: Option<u64>,
    /// Type annotations come from the element type.
    element_typed: bool,
    /// Opens the `External` cluster.
    cluster: bool,
}

impl Appearance {
    fn new(color: &'static str, label: impl Into<String>, key: impl Into<String>) -> Self {
        Appearance {
            color,
            label: label.into(),
            key: key.into(),
            node_type: "instruction",
            shape: None,
            numeric: None,
            value_like: false,
            storage: false,
            array_width: None,
            element_typed: false,
            cluster: false,
        }
    }

    fn value(label: impl Into<String>, key: &str) -> Self {
        Appearance {
            node_type: "DO_NOT_USE",
            value_like: true,
            ..Appearance::new("lightyellow", label, key)
        }
    }

    fn storage(label: String, key: &str, array_width: Option<u64>) -> Self {
        Appearance {
            storage: true,
            array_width,
            ..Appearance::new("0.33 0.1 1", label, key)
        }
    }
}

struct Emitter<'a> {
    program: &'a LoweredProgram,
    options: &'a EmitOptions,
    graph: Graph,
    ids: HashMap<NodeId, u32>,
    hidden: HashSet<NodeId>,
    next_id: u32,
    cursor: Option<NodeId>,
    listeners: VecDeque<Listener>,
    loop_starts: HashMap<EdgeId, NodeId>,
    merge_sources: HashMap<EdgeId, Option<NodeId>>,
    /// Node whose context helper nodes inherit.
    state: Option<NodeId>,
    bb: u32,
    bb_empty: bool,
    /// (initializer, storage) pairs wired after all other edges.
    storage_inits: Vec<(NodeId, NodeId)>,
    writer: DotWriter<'a>,
}

impl<'a> Emitter<'a> {
    fn new(program: &'a LoweredProgram, options: &'a EmitOptions) -> Self {
        Emitter {
            program,
            options,
            graph: program.graph.clone(),
            ids: HashMap::new(),
            hidden: HashSet::new(),
            next_id: 0,
            cursor: None,
            listeners: VecDeque::new(),
            loop_starts: HashMap::new(),
            merge_sources: HashMap::new(),
            state: None,
            bb: program.ambient.bb,
            bb_empty: program.bb_empty,
            storage_inits: Vec::new(),
            writer: DotWriter::new(options),
        }
    }

    fn run(mut self) -> (String, DotStats) {
        let top = self.graph.top_level().clone();
        for &node in &top.nodes {
            self.print_node(node);
        }
        for &edge in &top.edges {
            self.run_edge(edge);
        }
        let inits = std::mem::take(&mut self.storage_inits);
        for (init, storage) in inits {
            self.data_flow(init, storage, 0);
        }
        self.writer.finish()
    }

    fn memory_mode(&self) -> bool {
        self.options.allocas_to_mem_elems
    }

    fn kind(&self, id: NodeId) -> &NodeKind {
        &self.graph.node(id).kind
    }

    fn is_external(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::External)
    }

    fn new_bb(&mut self) {
        if !self.bb_empty {
            self.bb += 1;
        }
        self.bb_empty = true;
    }

    /// Context for a node created during emission.
    fn emission_meta(&mut self) -> (NodeMeta, Span) {
        let program = self.program;
        let ambient = &program.ambient;
        let mut meta = NodeMeta {
            unroll: ambient.unroll,
            tripcount: ambient.tripcount,
            pipelined: ambient.pipelined,
            ..NodeMeta::default()
        };
        match self.state {
            Some(state) => {
                let node = self.graph.node(state);
                meta.group = node.meta.group.clone();
                meta.bb = node.meta.bb;
                meta.function_id = node.meta.function_id;
                meta.function = node.meta.function;
                (meta, node.span)
            }
            None => {
                meta.group = ambient.group.clone();
                meta.bb = self.bb;
                meta.function_id = ambient.function_id;
                meta.function = ambient.function;
                self.bb_empty = false;
                (meta, self.graph.node(program.external).span)
            }
        }
    }

    fn create(&mut self, kind: NodeKind, ty: Option<TypeDesc>) -> NodeId {
        let (meta, span) = self.emission_meta();
        self.graph.add_detached_node(Node::new(kind, ty, meta, span))
    }

    fn constant(&mut self, value: &str, ty: TypeDesc) -> NodeId {
        self.create(
            NodeKind::Constant {
                value: value.to_string(),
                folded: false,
            },
            Some(ty),
        )
    }

    /// Create and print in one step.
    fn spawn(&mut self, kind: NodeKind, ty: Option<TypeDesc>) -> NodeId {
        let id = self.create(kind, ty);
        self.print_node(id);
        id
    }

    // ── Cursor ──────────────────────────────────────────────────────────────

    fn update_cursor(&mut self, node: NodeId) {
        self.cursor = Some(node);
        let pending = std::mem::take(&mut self.listeners);
        for listener in pending {
            self.fire(listener, node);
        }
    }

    fn fire(&mut self, listener: Listener, cursor: NodeId) {
        match listener {
            Listener::PreLoop(edge) => {
                self.loop_starts.insert(edge, cursor);
            }
            Listener::MergeEnd { start, source2 } => {
                let source1 = self.merge_sources.get(&start).copied().flatten();
                if let Some(source1) = source1 {
                    if Some(source1) != source2 {
                        self.print_control(source1, cursor, false);
                    }
                }
            }
            Listener::FunctionStart(function) => {
                let calls = self.program.function(function).calls.clone();
                for (i, call) in calls.into_iter().enumerate() {
                    self.call_edge(call, cursor, i as u32 + 1);
                }
            }
        }
    }

    // ── Edge lines ──────────────────────────────────────────────────────────

    fn link(&mut self, src: NodeId, dst: NodeId, style: EdgeStyle) {
        match (self.ids.get(&src), self.ids.get(&dst)) {
            (Some(&a), Some(&b)) => self.writer.edge(a, b, style),
            _ if self.hidden.contains(&src) || self.hidden.contains(&dst) => {}
            _ => log::warn!(
                "skipping edge between unprinted nodes: {} -> {}",
                self.graph.describe(src),
                self.graph.describe(dst)
            ),
        }
    }

    fn print_control(&mut self, src: NodeId, dst: NodeId, back: bool) {
        if self.is_external(src) || self.is_external(dst) {
            let order = self.graph.node(src).meta.function_id;
            self.call_edge(src, dst, order);
            return;
        }
        if self.options.ignore_control_flow {
            return;
        }
        let style = if back {
            EdgeStyle::BackControl
        } else {
            EdgeStyle::Control
        };
        self.link(src, dst, style);
    }

    fn call_edge(&mut self, src: NodeId, dst: NodeId, order: u32) {
        if self.is_external(src) {
            if let Some(&id) = self.ids.get(&dst) {
                let group = self.graph.node(dst).meta.group.clone();
                self.writer.cluster_head(&group, id);
            }
        }
        if !self.options.inline_functions {
            if !(self.options.ignore_control_flow || self.options.ignore_call_edges) {
                self.link(src, dst, EdgeStyle::Call(order));
            }
        } else if !self.options.ignore_control_flow {
            self.link(src, dst, EdgeStyle::Control);
        }
    }

    // ── Edge operations ─────────────────────────────────────────────────────

    fn run_edge(&mut self, edge: EdgeId) {
        let op = self.graph.edge(edge).clone();
        match op {
            EdgeOp::ControlFlow { dst } => self.control_flow(dst),
            EdgeOp::DataFlow { src, dst, order } => self.data_flow(src, dst, order),
            EdgeOp::MemoryAddress { src, dst } => self.memory_address(src, dst, None),
            EdgeOp::ReadMemoryElement { element, read } => self.read_memory_element(element, read),
            EdgeOp::WriteMemoryElement { write, element } => {
                self.write_memory_element(write, element)
            }
            EdgeOp::ResolvedMemoryAddress {
                deref,
                dst,
                element,
            } => self.resolved_memory_address(deref, dst, element),
            EdgeOp::SextDataFlow {
                src,
                dst,
                order,
                width,
            } => self.sext_data_flow(src, dst, order, width),
            EdgeOp::ParameterLoad { src, dst } => self.parameter_load(src, dst),
            EdgeOp::ParameterInitialize { param } => self.parameter_initialize(param),
            EdgeOp::VariableDeclare { var } => {
                if !self.memory_mode() {
                    self.control_flow(var);
                }
            }
            EdgeOp::ImplicitCast {
                src,
                dst,
                order,
                target,
            } => self.implicit_cast(src, dst, order, target),
            EdgeOp::ArithmeticUnit { lhs, rhs, unit } => self.arithmetic_unit(lhs, rhs, unit),
            EdgeOp::StructAccess { access } => self.struct_access(access),
            EdgeOp::Pragma {
                pragma,
                target,
                order,
            } => {
                if !self.options.absorb_pragmas {
                    self.link(pragma, target, EdgeStyle::Pragma(order));
                }
            }
            EdgeOp::ProgramlBranch => {
                if self.options.proxy_programl && !self.options.remove_single_target_branches {
                    let branch = self.spawn(NodeKind::Branch, None);
                    self.control_flow(branch);
                }
            }
            EdgeOp::PreLoop => self.listeners.push_back(Listener::PreLoop(edge)),
            EdgeOp::LoopBack { pre_loop, branch } => {
                if let Some(&start) = self.loop_starts.get(&pre_loop) {
                    if let Some(cursor) = self.cursor {
                        self.print_control(start, cursor, true);
                    }
                    self.update_cursor(start);
                }
                self.update_cursor(branch);
            }
            EdgeOp::MergeStart => {
                self.merge_sources.insert(edge, self.cursor);
            }
            EdgeOp::MergeEnd { start } => self.listeners.push_back(Listener::MergeEnd {
                start,
                source2: self.cursor,
            }),
            EdgeOp::Revert { node } => self.update_cursor(node),
            EdgeOp::FunctionStart { external, function } => {
                self.update_cursor(external);
                self.listeners.push_back(Listener::FunctionStart(function));
            }
            EdgeOp::FunctionCall { call, args, .. } => self.function_call(call, &args),
            EdgeOp::Return {
                function,
                value,
                value_type,
            } => {
                if self.options.inline_functions {
                    return;
                }
                let cursor_meta = self.cursor.map(|c| self.graph.node(c).meta.clone());
                let (function_id, group) = match cursor_meta {
                    Some(meta) => (meta.function_id, meta.group),
                    None => (
                        self.program.ambient.function_id,
                        self.program.ambient.group.clone(),
                    ),
                };
                self.function_end(
                    function,
                    NodeKind::Return,
                    Some(value_type),
                    function_id,
                    group,
                    value,
                );
            }
            EdgeOp::UndefinedFunction {
                function,
                name,
                function_id,
            } => {
                if self.options.inline_functions {
                    return;
                }
                let kind = NodeKind::UndefinedFunction { name: name.clone() };
                self.function_end(function, kind, None, function_id, name, None);
            }
        }
    }

    fn control_flow(&mut self, dst: NodeId) {
        if self.options.only_memory_control_flow {
            let kept = self.kind(dst).is_memory()
                || matches!(
                    self.kind(dst),
                    NodeKind::Branch
                        | NodeKind::External
                        | NodeKind::Return
                        | NodeKind::UndefinedFunction { .. }
                        | NodeKind::FunctionCall
                );
            if !kept {
                return;
            }
        }
        if let Some(src) = self.cursor {
            self.print_control(src, dst, false);
        }
        self.update_cursor(dst);
    }

    /// Literal-like sources that `hide_values` removes.
    fn is_value(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Constant { .. } | NodeKind::ParamValue => true,
            NodeKind::GlobalArray { .. } => self.options.proxy_programl,
            _ => false,
        }
    }

    fn has_source(&self, id: NodeId) -> bool {
        !(self.is_value(id) && self.options.hide_values)
    }

    fn data_flow(&mut self, src: NodeId, dst: NodeId, order: u32) {
        self.state = Some(dst);
        let has_source = self.has_source(src);
        if !self.options.absorb_types {
            let ty = self.graph.immediate_type(src, self.options).ok();
            let constant = self.kind(src).is_constant();
            let marker = self.spawn(NodeKind::Type { constant }, ty);
            self.link(marker, dst, EdgeStyle::DataFlow(order));
            if has_source {
                self.link(src, marker, EdgeStyle::DataFlow(0));
            }
        } else if has_source {
            self.link(src, dst, EdgeStyle::DataFlow(order));
        }
    }

    fn memory_address(&mut self, src: NodeId, dst: NodeId, type_dep: Option<NodeId>) {
        self.state = Some(dst);
        let has_source = self.has_source(src);
        if !self.options.absorb_types {
            let ty = match type_dep {
                Some(dep) if self.memory_mode() => self
                    .graph
                    .value_type(dep, self.options)
                    .or_else(|_| self.graph.immediate_type(src, self.options)),
                _ => self.graph.immediate_type(src, self.options),
            };
            let constant = self.kind(src).is_constant();
            let marker = self.spawn(NodeKind::Type { constant }, ty.ok());
            self.link(marker, dst, EdgeStyle::Address);
            if has_source {
                self.link(src, marker, EdgeStyle::Address);
            }
        } else if has_source {
            self.link(src, dst, EdgeStyle::Address);
        }
    }

    fn read_memory_element(&mut self, element: NodeId, read: NodeId) {
        if self.memory_mode() {
            self.memory_address(element, read, Some(element));
        } else if self.kind(element).is_scalar_storage() {
            self.memory_address(element, read, None);
        }
    }

    fn write_memory_element(&mut self, write: NodeId, element: NodeId) {
        if self.memory_mode() {
            self.memory_address(write, element, Some(element));
        } else if self.kind(element).is_scalar_storage() {
            self.memory_address(element, write, None);
        }
    }

    fn resolved_memory_address(&mut self, deref: NodeId, dst: Option<NodeId>, element: NodeId) {
        let Some(dst) = dst else {
            log::warn!(
                "{} never reached a read or write",
                self.graph.describe(deref)
            );
            return;
        };
        if !self.memory_mode() {
            self.memory_address(deref, dst, None);
            return;
        }
        self.state = Some(dst);
        let spec = self.create(NodeKind::SpecifyAddress, None);
        let source = self.graph.node(deref).meta.clone();
        let meta = &mut self.graph.node_mut(spec).meta;
        meta.unroll = source.unroll;
        meta.pipelined = source.pipelined;
        self.print_node(spec);
        self.control_flow(spec);
        self.data_flow(deref, spec, 0);
        if !self.options.absorb_types {
            let ty = self.graph.value_type(spec, self.options).ok();
            let marker = self.spawn(NodeKind::Type { constant: false }, ty);
            self.link(spec, marker, EdgeStyle::Address);
            self.link(marker, element, EdgeStyle::Address);
        } else {
            self.link(spec, element, EdgeStyle::Address);
        }
    }

    fn sext_data_flow(&mut self, src: NodeId, dst: NodeId, order: u32, width: Option<u32>) {
        if self.options.remove_sexts {
            return self.data_flow(src, dst, order);
        }
        let Ok(incoming) = self.graph.sext_type(src, self.options) else {
            return self.data_flow(src, dst, order);
        };
        let limit = width.unwrap_or(if self.memory_mode() { 32 } else { 64 });
        if self.kind(src).is_constant() {
            self.graph.node_mut(src).ty = Some(TypeDesc::scalar(incoming.kind, limit));
            return self.data_flow(src, dst, order);
        }
        if incoming.bits >= limit {
            return self.data_flow(src, dst, order);
        }
        self.state = Some(dst);
        let sext = self.spawn(
            NodeKind::Sext {
                bits: limit,
                unsigned: incoming.unsigned,
            },
            None,
        );
        self.data_flow(src, sext, 0);
        self.data_flow(sext, dst, order);
        self.control_flow(sext);
    }

    fn implicit_cast(&mut self, src: NodeId, dst: NodeId, order: u32, target: Option<TypeDesc>) {
        let target = match target {
            Some(ty) => Ok(ty),
            None => self.graph.value_type(dst, self.options),
        };
        let (Ok(target), Ok(incoming)) = (target, self.graph.value_type(src, self.options)) else {
            return self.data_flow(src, dst, order);
        };
        if target.is_opaque() || target.void || incoming.is_opaque() || incoming.void {
            return self.data_flow(src, dst, order);
        }
        self.state = Some(dst);
        if target.is_float() && incoming.is_integer() {
            let cast = self.spawn(NodeKind::CastToFloat, Some(target));
            self.control_flow(cast);
            self.data_flow(src, cast, 0);
            self.data_flow(cast, dst, order);
            return;
        }
        if !self.options.remove_sexts && target.kind == incoming.kind {
            if incoming.bits > target.bits {
                let trunc = self.spawn(NodeKind::Truncate, Some(target));
                self.data_flow(src, trunc, 0);
                self.data_flow(trunc, dst, order);
                return;
            }
            if incoming.bits < target.bits {
                return self.sext_data_flow(src, dst, order, Some(target.bits));
            }
        }
        self.data_flow(src, dst, order);
    }

    fn parameter_load(&mut self, src: NodeId, dst: NodeId) {
        if self.memory_mode() {
            return;
        }
        self.state = Some(dst);
        match self.kind(src) {
            NodeKind::ExternalArray { .. } | NodeKind::SubParamArray { .. } => {
                let read = self.spawn(NodeKind::Read { type_dep: None }, Some(TypeDesc::int(64)));
                self.control_flow(read);
                self.memory_address(src, read, None);
                self.data_flow(read, dst, 0);
            }
            _ => {
                self.memory_address(src, dst, None);
                if self.options.proxy_programl {
                    let pointer = self.constant("Local Array Stack Pointer", TypeDesc::int(64));
                    self.print_node(pointer);
                    self.data_flow(pointer, dst, 0);
                }
            }
        }
    }

    fn parameter_initialize(&mut self, param: NodeId) {
        if self.memory_mode() {
            return;
        }
        self.state = Some(param);
        self.control_flow(param);
        let mut prev = param;
        if matches!(self.kind(param), NodeKind::Struct) {
            let bitcast = self.spawn(NodeKind::Bitcast, None);
            self.control_flow(bitcast);
            self.data_flow(param, bitcast, 0);
            prev = bitcast;
        }
        self.state = Some(param);
        let store = self.spawn(
            NodeKind::Write {
                type_dep: None,
                input: None,
            },
            Some(TypeDesc::int(64)),
        );
        self.control_flow(store);
        self.memory_address(prev, store, None);
        let init_type = match self.kind(param) {
            NodeKind::ParamScalar { .. } => self
                .graph
                .value_type(param, self.options)
                .unwrap_or(TypeDesc::int(64)),
            _ => TypeDesc::int(64),
        };
        self.state = Some(store);
        let init = self.spawn(NodeKind::ParamValue, Some(init_type));
        self.data_flow(init, store, 1);
        self.update_cursor(store);
    }

    fn function_call(&mut self, call: NodeId, args: &[CallArg]) {
        if self.options.inline_functions {
            return;
        }
        let mut position = 0;
        for arg in args {
            self.state = Some(call);
            match &arg.lowering {
                ArgLowering::MemoryElement { var } => {
                    self.read_memory_element(*var, call);
                    self.write_memory_element(call, *var);
                }
                ArgLowering::PointerLoad { var } => {
                    let read =
                        self.spawn(NodeKind::Read { type_dep: None }, Some(TypeDesc::int(64)));
                    self.control_flow(read);
                    self.memory_address(*var, read, None);
                    self.implicit_cast(read, call, position, Some(arg.param_type.clone()));
                    position += 1;
                }
                ArgLowering::LocalArrayAddress { var } => {
                    let deref = self.spawn(
                        NodeKind::Deref(DerefLinks::default()),
                        Some(TypeDesc::int(64)),
                    );
                    self.control_flow(deref);
                    self.memory_address(*var, deref, None);
                    self.state = Some(deref);
                    let zero = self.constant("0", TypeDesc::int(64));
                    self.print_node(zero);
                    self.data_flow(zero, deref, 1);
                    self.data_flow(zero, deref, 2);
                    self.implicit_cast(deref, call, position, Some(arg.param_type.clone()));
                    position += 1;
                }
                ArgLowering::Value { segment, value } => {
                    for &node in &segment.nodes {
                        self.print_node(node);
                    }
                    for &edge in &segment.edges {
                        self.run_edge(edge);
                    }
                    self.implicit_cast(*value, call, position, Some(arg.param_type.clone()));
                    position += 1;
                }
            }
        }
        self.control_flow(call);
    }

    /// Close a function with its return (or undefined-function) node and
    /// wire it back to every call site.
    fn function_end(
        &mut self,
        function: FnKey,
        kind: NodeKind,
        ty: Option<TypeDesc>,
        function_id: u32,
        group: String,
        value: Option<NodeId>,
    ) {
        self.new_bb();
        self.state = None;
        let (mut meta, span) = self.emission_meta();
        meta.group = group;
        meta.function_id = function_id;
        meta.function = function;
        let end = self.graph.add_detached_node(Node::new(kind, ty, meta, span));
        self.print_node(end);
        self.new_bb();
        self.control_flow(end);
        let calls = self.program.function(function).calls.clone();
        for call in calls {
            self.call_edge(end, call, 0);
        }
        if let Some(value) = value {
            self.implicit_cast(value, end, 0, None);
        }
    }

    fn arithmetic_unit(&mut self, lhs: NodeId, rhs: NodeId, unit: NodeId) {
        self.state = Some(unit);
        let types = (
            self.graph.sext_type(lhs, self.options),
            self.graph.sext_type(rhs, self.options),
        );
        let (lt, rt) = match types {
            (Ok(l), Ok(r)) if !(l.is_opaque() || r.is_opaque() || l.void || r.void) => (l, r),
            (l, r) => {
                log::warn!(
                    "operands of {} have no arithmetic type ({:?}, {:?}); wiring them directly",
                    self.graph.describe(unit),
                    l.map(|t| t.to_string()),
                    r.map(|t| t.to_string())
                );
                self.data_flow(lhs, unit, 0);
                self.data_flow(rhs, unit, 1);
                return;
            }
        };
        if lt.is_integer() && rt.is_float() {
            let cast = self.spawn(NodeKind::CastToFloat, Some(rt));
            self.control_flow(cast);
            self.data_flow(lhs, cast, 0);
            self.data_flow(cast, unit, 0);
            self.data_flow(rhs, unit, 1);
            return;
        }
        if lt.is_float() && rt.is_integer() {
            let cast = self.spawn(NodeKind::CastToFloat, Some(lt));
            self.control_flow(cast);
            self.data_flow(rhs, cast, 0);
            self.data_flow(cast, unit, 1);
            self.data_flow(lhs, unit, 0);
            return;
        }
        let min = self.graph.unit_min_width(unit, self.options).unwrap_or(0);
        let max = lt.bits.max(rt.bits).max(min);
        for (operand, bits, order) in [(lhs, lt.bits, 0), (rhs, rt.bits, 1)] {
            if bits < max {
                self.sext_data_flow(operand, unit, order, Some(max));
            } else {
                self.data_flow(operand, unit, order);
            }
        }
    }

    fn struct_access(&mut self, access: NodeId) {
        if !self.options.proxy_programl {
            return;
        }
        self.state = Some(access);
        let base = self.constant("0", TypeDesc::int(32));
        self.print_node(base);
        let index = self.constant("struct index", TypeDesc::int(32));
        self.print_node(index);
        self.data_flow(base, access, 1);
        self.data_flow(index, access, 2);
    }

    // ── Node lines ──────────────────────────────────────────────────────────

    fn print_node(&mut self, id: NodeId) {
        if self.ids.contains_key(&id) || self.hidden.contains(&id) {
            return;
        }
        self.narrow_iterator(id);
        let Some(look) = self.appearance(id) else {
            self.hidden.insert(id);
            return;
        };
        let line_id = self.next_id;
        self.next_id += 1;
        self.ids.insert(id, line_id);

        if look.storage && !self.memory_mode() {
            let saved = self.state.replace(id);
            let init = self.constant("0", TypeDesc::int(32));
            self.print_node(init);
            self.storage_inits.push((init, id));
            self.state = saved;
        }

        let node = self.graph.node(id);
        let mut attrs = Attributes::new();
        attrs.insert("group", node.meta.group.clone());
        attrs.insert("nodeType", look.node_type.to_string());
        attrs.insert("keyText", look.key.clone());
        attrs.insert("label", look.label.clone());
        if let Some(shape) = look.shape {
            attrs.insert("shape", shape.to_string());
        }

        let pragmas = if self.options.absorb_pragmas {
            self.pragma_attributes(node, &mut attrs);
            Some(PragmaLabel {
                unroll: node.meta.unroll,
                tripcount: node.meta.tripcount,
                partitions: node.partitions,
                inlined: node.inlined,
                pipelined: node.meta.pipelined,
            })
        } else {
            attrs.insert("numeric", "0".to_string());
            None
        };
        if let Some(numeric) = &look.numeric {
            attrs.insert("numeric", numeric.clone());
        }
        if matches!(node.kind, NodeKind::FunctionCall) && node.inlined {
            attrs.insert("inlined", "inlined".to_string());
        }

        if self.options.absorb_types && !self.options.no_type_display {
            self.type_attributes(id, &look, &mut attrs);
        }
        if self.options.add_bb_id {
            attrs.insert("bbID", node.meta.bb.to_string());
        }
        if self.options.add_func_id {
            attrs.insert("funcID", node.meta.function_id.to_string());
        }
        if self.options.add_num_calls {
            let stats = self
                .program
                .functions
                .get(node.meta.function.0 as usize)
                .and_then(|f| f.stats)
                .unwrap_or_default();
            attrs.insert("numCalls", stats.calls.to_string());
            attrs.insert("numCallSites", stats.sites.to_string());
        }

        self.writer
            .node(line_id, look.color, attrs, pragmas.as_ref());
        if look.cluster {
            self.writer.cluster_head("External", line_id);
        }
    }

    /// Shrink an iterator to the width its constant bounds need.
    fn narrow_iterator(&mut self, id: NodeId) {
        if !(self.memory_mode() && self.options.reduce_iterator_bitwidth) {
            return;
        }
        let node = self.graph.node_mut(id);
        let NodeKind::LocalScalar { iterator, .. } = &node.kind else {
            return;
        };
        let Some(width) = iterator.reduced_width() else {
            return;
        };
        if let Some(ty) = &mut node.ty {
            if ty.is_integer() {
                ty.bits = width;
            }
        }
    }

    fn pragma_attributes(&self, node: &Node, attrs: &mut Attributes) {
        let meta = &node.meta;
        attrs.insert("partitionFactor1", node.partitions[0].factor.to_string());
        attrs.insert("partitionFactor2", node.partitions[1].factor.to_string());
        attrs.insert("fullUnrollFactor", format!("{:.6}", meta.unroll.full));
        attrs.insert("unrollFactor1", format!("{:.6}", meta.unroll.first));
        attrs.insert("unrollFactor2", format!("{:.6}", meta.unroll.second));
        attrs.insert("unrollFactor3", format!("{:.6}", meta.unroll.third));
        attrs.insert("tripcount", format!("{:.6}", meta.tripcount.full));
        for (key, slot) in [("partition1", 0), ("partition2", 1)] {
            let kind = node.partitions[slot]
                .kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "none".to_string());
            attrs.insert(key, kind);
        }
        attrs.insert("inlined", "not_inlined".to_string());
    }

    fn type_attributes(&self, id: NodeId, look: &Appearance, attrs: &mut Attributes) {
        if look.value_like {
            return;
        }
        if self.options.one_hot_types {
            attrs.insert("datatype", self.graph.printable_type(id, self.options));
            return;
        }
        if look.element_typed {
            if let Some(ty) = &self.graph.node(id).ty {
                let text = ty.to_string();
                let datatype = if text == "i1" {
                    "bool"
                } else if ty.is_integer() {
                    "int"
                } else {
                    "float"
                };
                attrs.insert("datatype", datatype.to_string());
                attrs.insert("bitwidth", text.get(1..).unwrap_or("").to_string());
            }
        } else {
            let (datatype, bits) = match self.graph.output_type(id, self.options) {
                Ok(ty) if ty.void => ("void", 0),
                Ok(ty) if ty.is_opaque() => ("NA", 0),
                Ok(ty) if ty.is_float() => ("float", ty.bits),
                Ok(ty) => ("int", ty.bits),
                Err(_) => ("NA", 0),
            };
            attrs.insert("datatype", datatype.to_string());
            attrs.insert("bitwidth", bits.to_string());
        }
        let width = look.array_width.unwrap_or(1);
        attrs.insert("arrayWidth", width.to_string());
    }

    /// Colour, label and key for a node, or `None` when it is not drawn.
    fn appearance(&self, id: NodeId) -> Option<Appearance> {
        let options = self.options;
        let memory = options.allocas_to_mem_elems;
        let programl = options.proxy_programl;
        let node = self.graph.node(id);
        let float_value = || {
            self.graph
                .value_type(id, options)
                .map(|t| t.is_float())
                .unwrap_or(false)
        };
        let named = |memory_label: &str, memory_key: &str, name: &str| {
            if memory {
                (format!("{}{}", memory_label, name), memory_key.to_string())
            } else {
                (format!("Alloca: {}", name), "alloca".to_string())
            }
        };
        let look = match &node.kind {
            NodeKind::External => {
                if options.ignore_control_flow
                    || (options.ignore_call_edges && !options.inline_functions)
                {
                    return None;
                }
                Appearance {
                    cluster: true,
                    ..Appearance::new("white", "External", "[external]")
                }
            }
            NodeKind::Constant { value, folded } => {
                if options.hide_values || *folded {
                    return None;
                }
                Appearance::value(value.clone(), "constantValue")
            }
            NodeKind::GlobalArray { name, .. } if programl => {
                if options.hide_values {
                    return None;
                }
                Appearance::value(name.clone(), "constantValue")
            }
            NodeKind::GlobalArray { name, .. } => {
                Appearance::new("0.33 0.1 1", format!("Global Array: {}", name), "globalArray")
            }
            NodeKind::ParamValue => {
                if options.hide_values {
                    return None;
                }
                Appearance::value("Parameter", "parameterValue")
            }
            NodeKind::Branch => Appearance::new("0.75 0.1 1", "Branch", "br"),
            NodeKind::Read { .. } => {
                let label = if memory { "Read" } else { "Load" };
                Appearance::new("0.584 0.1 1", label, "load")
            }
            NodeKind::Write { .. } => {
                let label = if memory { "Write" } else { "Store" };
                Appearance::new("0.584 0.1 1", label, "store")
            }
            NodeKind::Comparison { .. } => {
                let key = match (programl, float_value()) {
                    (true, true) => "fcmp",
                    (true, false) => "icmp",
                    (false, _) => "cmp",
                };
                Appearance::new("0 0.1 1", "Comparison", key)
            }
            NodeKind::Sext { unsigned, .. } => {
                let (label, key) = if *unsigned {
                    ("Zext", "zext")
                } else {
                    ("Sext", "sext")
                };
                Appearance::new("0.083 0.1 1", label, key)
            }
            NodeKind::Arithmetic { op, .. } => {
                let key = if programl && float_value() {
                    format!("f{}", op.key_text())
                } else {
                    op.key_text().to_string()
                };
                Appearance::new("0 0.1 1", op.label(), key)
            }
            NodeKind::Deref(_) => {
                let label = if memory {
                    "Get Address"
                } else {
                    "Get Element Ptr"
                };
                Appearance::new("0.833 0.05 1", label, "getelementptr")
            }
            NodeKind::StructAccess(_) if programl => {
                let label = if memory {
                    "Get Address"
                } else {
                    "Get Element Ptr"
                };
                Appearance::new("0.833 0.05 1", label, "getelementptr")
            }
            NodeKind::StructAccess(_) => {
                Appearance::new("0.833 0.05 1", "Struct Access", "struct_access")
            }
            NodeKind::LocalScalar { name, .. } => {
                let (label, key) = named("Local Scalar: ", "localScalar", name);
                Appearance::storage(label, &key, None)
            }
            NodeKind::ParamScalar { name } => {
                let (label, key) = named("External Scalar: ", "externalScalar", name);
                Appearance::storage(label, &key, None)
            }
            NodeKind::LocalArray { name, elements, .. } => {
                let (label, key) = named("Local Array: ", "localArray", name);
                Appearance {
                    element_typed: true,
                    ..Appearance::storage(label, &key, Some(*elements))
                }
            }
            NodeKind::ExternalArray { name, elements } => {
                let (label, key) = named("External Array: ", "externalArray", name);
                Appearance::storage(label, &key, Some(*elements))
            }
            NodeKind::SubParamArray { name, elements } => {
                let (label, key) = named("Parameter: ", "arrayParameter", name);
                Appearance::storage(label, &key, Some(*elements))
            }
            NodeKind::Struct => Appearance::new("0.33 0.1 1", "Alloca", "alloca"),
            NodeKind::StructField { .. } => return None,
            NodeKind::Pragma { key, factor } => {
                if options.absorb_pragmas {
                    return None;
                }
                let mut label = format!("Pragma: {}", key);
                if factor != "0" {
                    label.push_str(&format!("\n{}", factor));
                }
                Appearance {
                    node_type: "pragma",
                    numeric: Some(factor.clone()),
                    ..Appearance::new("white", label, key.clone())
                }
            }
            NodeKind::Type { constant } => {
                let text = self.graph.printable_type(id, options);
                let (color, node_type) = if *constant {
                    ("white", "constant")
                } else {
                    ("azure2", "variable")
                };
                Appearance {
                    node_type,
                    shape: Some("diamond"),
                    numeric: options.absorb_pragmas.then(|| "1".to_string()),
                    ..Appearance::new(color, text.clone(), text)
                }
            }
            NodeKind::Return => {
                if options.inline_functions {
                    return None;
                }
                Appearance::new("white", "Return", "ret")
            }
            NodeKind::FunctionCall => {
                if options.inline_functions {
                    return None;
                }
                Appearance::new("white", "Function Call", "call")
            }
            NodeKind::SpecifyAddress => Appearance::new(
                "0.584 0.1 1",
                "Specify Address To Read/Write",
                "specifyAddress",
            ),
            NodeKind::Bitcast => Appearance::new("white", "Bitcast", "bitcast"),
            NodeKind::UnaryOp { op } => Appearance::new("0 0.1 1", op.clone(), op.clone()),
            NodeKind::Truncate => Appearance::new("white", "Truncate", "trunc"),
            NodeKind::UndefinedFunction { name } => {
                let key = if programl {
                    "; undefined function".to_string()
                } else {
                    name.clone()
                };
                Appearance::new("white", format!("Undefined Function: {}", name), key)
            }
            NodeKind::CastToFloat => Appearance::new("white", "Cast To Float", "sitofp"),
            NodeKind::Select { .. } => Appearance::new("0 0.1 1", "select", "phi"),
            NodeKind::FNeg => Appearance::new("0 0.1 1", "Negate", "fneg"),
        };
        Some(look)
    }
}
