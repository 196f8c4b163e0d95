// graph.rs — Program graph arena for lowered kernels
//
// Lowering appends nodes and deferred edge operations to append-only arenas
// and refers to them by index. The top-level segment lists the nodes to print
// and the edge operations to run, in creation order. Call arguments are
// captured into their own segments and carried by the call edge instead.
//
// This module also answers the three type questions emission asks of a node:
// its value type, its immediate (storage) type, and the type it contributes
// to a sign extension.
//
// Preconditions: ids passed to accessors come from the same `Graph`.
// Postconditions: ids are dense and never reused.
// Failure modes: type queries on nodes without a value → `TypeError`.
// Side effects: none.

use crate::ast::Span;
use crate::factor::StackedFactor;
use crate::options::EmitOptions;
use crate::pragma::PartitionKind;
use crate::types::{TypeDesc, TypeError};

// ── Public types ────────────────────────────────────────────────────────────

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index of an edge operation in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

/// Index of a lowered function record (top, callee or synthesized helper).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnKey(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    Or,
    Xor,
}

impl ArithOp {
    pub fn label(self) -> &'static str {
        match self {
            ArithOp::Add => "Addition",
            ArithOp::Sub => "Subtraction",
            ArithOp::Mul => "Multiplication",
            ArithOp::Div => "Division",
            ArithOp::Shl => "LeftShift",
            ArithOp::Shr => "RightShift",
            ArithOp::BitAnd => "BitAnd",
            ArithOp::BitXor => "BitXor",
            ArithOp::Or => "Or",
            ArithOp::Xor => "Xor",
        }
    }

    /// Instruction mnemonic used as the node key.
    pub fn key_text(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Shl => "shl",
            ArithOp::Shr => "ashr",
            ArithOp::BitAnd => "and",
            ArithOp::BitXor | ArithOp::Xor => "xor",
            ArithOp::Or => "or",
        }
    }
}

/// Links from an address node to the storage it computes into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerefLinks {
    /// Storage element the address finally resolves to.
    pub element: Option<NodeId>,
    /// Node whose immediate type is indexed to type this address.
    pub type_dep: Option<NodeId>,
    /// Node that types the value read or written through this address.
    pub base_type_dep: Option<NodeId>,
}

/// Constant-bound tracking for a local scalar used as a loop iterator.
#[derive(Debug, Clone, PartialEq)]
pub struct IteratorBounds {
    pub fixed: bool,
    pub has_init: bool,
    pub written_as_iterator: bool,
    pub in_bounds_region: bool,
    pub in_increment: bool,
    pub bounds: Vec<f64>,
}

impl Default for IteratorBounds {
    fn default() -> Self {
        IteratorBounds {
            fixed: true,
            has_init: false,
            written_as_iterator: true,
            in_bounds_region: false,
            in_increment: false,
            bounds: Vec::new(),
        }
    }
}

impl IteratorBounds {
    /// Record a value written to (or compared against) the iterator.
    /// `value` is `Some` when the value is a numeric constant.
    pub fn add_bound(&mut self, value: Option<f64>) {
        if self.in_bounds_region {
            match value {
                Some(v) => self.bounds.push(v),
                None => self.fixed = false,
            }
        } else if !self.in_increment {
            self.written_as_iterator = false;
        }
    }

    /// Width needed to hold every value between the recorded bounds.
    pub fn reduced_width(&self) -> Option<u32> {
        if !(self.fixed && self.has_init && self.written_as_iterator) || self.bounds.is_empty() {
            return None;
        }
        let max = self.bounds.iter().copied().fold(f64::MIN, f64::max);
        let min = self.bounds.iter().copied().fold(f64::MAX, f64::min);
        let range = (max - min).trunc();
        let width = (range + 1.0).log2().ceil();
        Some((width as u32).max(1))
    }
}

/// What a node represents.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Boundary node standing for everything outside the kernel.
    External,
    Constant {
        value: String,
        /// Consumed by constant folding; never printed.
        folded: bool,
    },
    /// Incoming value of a parameter, stored into its alloca.
    ParamValue,
    Branch,
    Read {
        type_dep: Option<NodeId>,
    },
    Write {
        type_dep: Option<NodeId>,
        input: Option<NodeId>,
    },
    Deref(DerefLinks),
    StructAccess(DerefLinks),
    Comparison {
        lhs: NodeId,
        rhs: NodeId,
    },
    Arithmetic {
        op: ArithOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Select {
        lhs: NodeId,
        rhs: NodeId,
    },
    LocalScalar {
        name: String,
        iterator: IteratorBounds,
    },
    LocalArray {
        name: String,
        array_type: TypeDesc,
        elements: u64,
    },
    ParamScalar {
        name: String,
    },
    ExternalArray {
        name: String,
        elements: u64,
    },
    /// Array parameter of a callee.
    SubParamArray {
        name: String,
        elements: u64,
    },
    /// Struct passed by value.
    Struct,
    /// Field slot of a registered struct. Detached: never listed or printed.
    StructField {
        index: u32,
        array_type: Option<TypeDesc>,
    },
    /// Constant lookup table declared at file scope.
    GlobalArray {
        name: String,
        array_type: TypeDesc,
    },
    Pragma {
        key: String,
        factor: String,
    },
    Sext {
        bits: u32,
        unsigned: bool,
    },
    /// Explicit type marker between a value and its consumer.
    Type {
        constant: bool,
    },
    Return,
    FunctionCall,
    UndefinedFunction {
        name: String,
    },
    SpecifyAddress,
    Bitcast,
    UnaryOp {
        op: String,
    },
    Truncate,
    CastToFloat,
    FNeg,
}

impl NodeKind {
    pub fn is_constant(&self) -> bool {
        matches!(self, NodeKind::Constant { .. })
    }

    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            NodeKind::Read { .. } | NodeKind::Write { .. } | NodeKind::SpecifyAddress
        )
    }

    /// Storage nodes that receive a zero initializer outside memory-element mode.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            NodeKind::LocalScalar { .. }
                | NodeKind::LocalArray { .. }
                | NodeKind::ExternalArray { .. }
                | NodeKind::SubParamArray { .. }
                | NodeKind::ParamScalar { .. }
        )
    }

    pub fn is_scalar_storage(&self) -> bool {
        matches!(
            self,
            NodeKind::LocalScalar { .. } | NodeKind::ParamScalar { .. }
        )
    }
}

/// Context copied onto every node when it is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMeta {
    pub group: String,
    pub bb: u32,
    pub function_id: u32,
    pub function: FnKey,
    pub unroll: StackedFactor,
    pub tripcount: StackedFactor,
    pub pipelined: bool,
}

impl Default for NodeMeta {
    fn default() -> Self {
        NodeMeta {
            group: String::new(),
            bb: 0,
            function_id: 0,
            function: FnKey(0),
            unroll: StackedFactor::default(),
            tripcount: StackedFactor::default(),
            pipelined: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartitionSlot {
    pub factor: u32,
    pub kind: Option<PartitionKind>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Explicitly set type. Most kinds derive theirs from their inputs.
    pub ty: Option<TypeDesc>,
    pub meta: NodeMeta,
    pub partitions: [PartitionSlot; 2],
    pub inlined: bool,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, ty: Option<TypeDesc>, meta: NodeMeta, span: Span) -> Self {
        Node {
            kind,
            ty,
            meta,
            partitions: [PartitionSlot::default(); 2],
            inlined: false,
            span,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::LocalScalar { name, .. }
            | NodeKind::LocalArray { name, .. }
            | NodeKind::ParamScalar { name }
            | NodeKind::ExternalArray { name, .. }
            | NodeKind::SubParamArray { name, .. }
            | NodeKind::GlobalArray { name, .. }
            | NodeKind::UndefinedFunction { name } => Some(name),
            _ => None,
        }
    }

    /// Numeric value of a constant node, if it has one.
    pub fn constant_value(&self) -> Option<f64> {
        match &self.kind {
            NodeKind::Constant { value, .. } => value.parse().ok(),
            _ => None,
        }
    }
}

/// How one call argument reaches the call at emission time.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgLowering {
    /// Variable argument drawn as a read and a write of its storage.
    MemoryElement { var: NodeId },
    /// Array parameter forwarded through a pointer load.
    PointerLoad { var: NodeId },
    /// Local array forwarded by the address of its first element.
    LocalArrayAddress { var: NodeId },
    /// Any other expression, lowered into its own segment.
    Value { segment: Segment, value: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    /// Type the callee expects; 64-bit for array and pointer parameters.
    pub param_type: TypeDesc,
    pub lowering: ArgLowering,
}

/// A deferred edge operation, resolved into concrete DOT edges (and
/// sometimes extra nodes) when emission runs it.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeOp {
    ControlFlow {
        dst: NodeId,
    },
    DataFlow {
        src: NodeId,
        dst: NodeId,
        order: u32,
    },
    MemoryAddress {
        src: NodeId,
        dst: NodeId,
    },
    ReadMemoryElement {
        element: NodeId,
        read: NodeId,
    },
    WriteMemoryElement {
        write: NodeId,
        element: NodeId,
    },
    /// Address computation resolved to storage; `dst` is filled in once the
    /// access node exists.
    ResolvedMemoryAddress {
        deref: NodeId,
        dst: Option<NodeId>,
        element: NodeId,
    },
    SextDataFlow {
        src: NodeId,
        dst: NodeId,
        order: u32,
        width: Option<u32>,
    },
    ParameterLoad {
        src: NodeId,
        dst: NodeId,
    },
    ParameterInitialize {
        param: NodeId,
    },
    VariableDeclare {
        var: NodeId,
    },
    /// Data flow converting `src` to `target` (the destination's own type
    /// when `None`).
    ImplicitCast {
        src: NodeId,
        dst: NodeId,
        order: u32,
        target: Option<TypeDesc>,
    },
    ArithmeticUnit {
        lhs: NodeId,
        rhs: NodeId,
        unit: NodeId,
    },
    StructAccess {
        access: NodeId,
    },
    Pragma {
        pragma: NodeId,
        target: NodeId,
        order: u32,
    },
    ProgramlBranch,
    PreLoop,
    LoopBack {
        pre_loop: EdgeId,
        branch: NodeId,
    },
    MergeStart,
    MergeEnd {
        start: EdgeId,
    },
    Revert {
        node: NodeId,
    },
    FunctionStart {
        external: NodeId,
        function: FnKey,
    },
    FunctionCall {
        call: NodeId,
        callee: FnKey,
        args: Vec<CallArg>,
    },
    Return {
        function: FnKey,
        value: Option<NodeId>,
        value_type: TypeDesc,
    },
    UndefinedFunction {
        function: FnKey,
        name: String,
        function_id: u32,
    },
}

/// An ordered run of nodes to print and edge operations to execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

// ── Arena ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<EdgeOp>,
    /// Open segments; index 0 is the top level, the last one receives new
    /// nodes and edges.
    segments: Vec<Segment>,
}

impl Default for Graph {
    fn default() -> Self {
        Graph {
            nodes: Vec::new(),
            edges: Vec::new(),
            segments: vec![Segment::default()],
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and list it in the open segment.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.add_detached_node(node);
        self.open_segment().nodes.push(id);
        id
    }

    /// Add a node that is referenced by others but never printed on its own.
    pub fn add_detached_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn add_edge(&mut self, op: EdgeOp) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(op);
        self.open_segment().edges.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &EdgeOp {
        &self.edges[id.0 as usize]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut EdgeOp {
        &mut self.edges[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Start routing new nodes and edges into a fresh segment.
    pub fn begin_capture(&mut self) {
        self.segments.push(Segment::default());
    }

    /// Close the innermost capture and hand its contents back.
    pub fn end_capture(&mut self) -> Segment {
        if self.segments.len() > 1 {
            self.segments.pop().unwrap_or_default()
        } else {
            Segment::default()
        }
    }

    pub fn top_level(&self) -> &Segment {
        &self.segments[0]
    }

    fn open_segment(&mut self) -> &mut Segment {
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// Point a resolved-address edge at the access node created after it.
    pub fn set_resolved_target(&mut self, edge: EdgeId, target: NodeId) {
        if let EdgeOp::ResolvedMemoryAddress { dst, .. } = self.edge_mut(edge) {
            *dst = Some(target);
        }
    }

    // ── Type queries ────────────────────────────────────────────────────────

    fn declared_type(&self, id: NodeId) -> Result<TypeDesc, TypeError> {
        self.node(id)
            .ty
            .clone()
            .ok_or_else(|| TypeError(format!("{} has no type", self.describe(id))))
    }

    /// Type of the value a node produces.
    pub fn value_type(&self, id: NodeId, options: &EmitOptions) -> Result<TypeDesc, TypeError> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Read { type_dep } | NodeKind::Write { type_dep, .. } => match type_dep {
                Some(dep) => self.value_type(*dep, options),
                None => self.declared_type(id),
            },
            NodeKind::Deref(links) | NodeKind::StructAccess(links) => {
                if options.allocas_to_mem_elems {
                    return Ok(TypeDesc::int(32));
                }
                if let Some(ty) = &node.ty {
                    return Ok(ty.clone());
                }
                match links.type_dep {
                    Some(dep) => self.immediate_type(dep, options)?.indexed_address(),
                    None => Ok(TypeDesc::int(64)),
                }
            }
            NodeKind::Comparison { lhs, rhs }
            | NodeKind::Arithmetic { lhs, rhs, .. }
            | NodeKind::Select { lhs, rhs } => {
                let unit_min = self.unit_min_width(id, options)?;
                Ok(TypeDesc::binary_result(
                    &self.sext_type(*lhs, options)?,
                    &self.sext_type(*rhs, options)?,
                    unit_min,
                ))
            }
            NodeKind::Sext { bits, .. } => Ok(TypeDesc::int(*bits)),
            NodeKind::SpecifyAddress => Ok(TypeDesc::int(32)),
            NodeKind::Bitcast => Ok(TypeDesc::int(64)),
            NodeKind::FNeg => Ok(TypeDesc::float(64)),
            NodeKind::Struct => Ok(TypeDesc::opaque("struct*")),
            NodeKind::Branch
            | NodeKind::External
            | NodeKind::Pragma { .. }
            | NodeKind::UndefinedFunction { .. } => Err(TypeError(format!(
                "{} carries no value",
                self.describe(id)
            ))),
            _ => self.declared_type(id),
        }
    }

    /// Type of the storage a node stands for; equal to the value type for
    /// everything that is not storage.
    pub fn immediate_type(&self, id: NodeId, options: &EmitOptions) -> Result<TypeDesc, TypeError> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Comparison { .. } => Ok(TypeDesc::int(1)),
            NodeKind::LocalArray { array_type, .. } | NodeKind::GlobalArray { array_type, .. } => {
                Ok(array_type.clone())
            }
            NodeKind::LocalScalar { .. } | NodeKind::ParamScalar { .. } => {
                if options.allocas_to_mem_elems {
                    self.value_type(id, options)
                } else {
                    Ok(TypeDesc::int(64))
                }
            }
            NodeKind::ExternalArray { .. } | NodeKind::SubParamArray { .. } => {
                Ok(TypeDesc::int(64))
            }
            NodeKind::Struct => Ok(TypeDesc::opaque("struct*")),
            NodeKind::StructField { array_type, .. } => match array_type {
                Some(ty) => Ok(ty.clone()),
                None => self.value_type(id, options),
            },
            _ => self.value_type(id, options),
        }
    }

    /// Type a node contributes when it feeds an arithmetic unit.
    pub fn sext_type(&self, id: NodeId, options: &EmitOptions) -> Result<TypeDesc, TypeError> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Constant { .. } => {
                let ty = self.value_type(id, options)?;
                if options.proxy_programl || ty.is_float() {
                    Ok(ty)
                } else {
                    Ok(TypeDesc::scalar(ty.kind, 0))
                }
            }
            NodeKind::LocalArray { .. } | NodeKind::Struct | NodeKind::GlobalArray { .. } => {
                Ok(TypeDesc::int(64))
            }
            _ => self.immediate_type(id, options),
        }
    }

    /// Type drawn on the node and on type markers fed by it.
    pub fn output_type(&self, id: NodeId, options: &EmitOptions) -> Result<TypeDesc, TypeError> {
        match self.node(id).kind {
            NodeKind::Comparison { .. } => self.value_type(id, options),
            _ => self.immediate_type(id, options),
        }
    }

    /// Printable spelling of the output type; `NA` when there is none.
    pub fn printable_type(&self, id: NodeId, options: &EmitOptions) -> String {
        match self.output_type(id, options) {
            Ok(ty) if options.proxy_programl && ty.is_float() => "double".to_string(),
            Ok(ty) => ty.to_string(),
            Err(_) => "NA".to_string(),
        }
    }

    /// Minimum result width of a binary unit.
    pub fn unit_min_width(&self, id: NodeId, options: &EmitOptions) -> Result<u32, TypeError> {
        if !options.proxy_programl {
            return Ok(0);
        }
        match &self.node(id).kind {
            NodeKind::Arithmetic {
                op: ArithOp::Xor | ArithOp::BitXor,
                ..
            } => Ok(32),
            NodeKind::Comparison { lhs, rhs } => {
                let signed = |n: NodeId| -> Result<bool, TypeError> {
                    Ok(!self.sext_type(n, options)?.unsigned)
                };
                if signed(*lhs)? || signed(*rhs)? {
                    Ok(32)
                } else {
                    Ok(0)
                }
            }
            _ => Ok(0),
        }
    }

    /// Short human-readable description of a node for diagnostics and logs.
    pub fn describe(&self, id: NodeId) -> String {
        let node = self.node(id);
        let kind = match &node.kind {
            NodeKind::External => "external node",
            NodeKind::Constant { .. } => "constant",
            NodeKind::ParamValue => "parameter value",
            NodeKind::Branch => "branch",
            NodeKind::Read { .. } => "read",
            NodeKind::Write { .. } => "write",
            NodeKind::Deref(_) => "address computation",
            NodeKind::StructAccess(_) => "struct access",
            NodeKind::Comparison { .. } => "comparison",
            NodeKind::Arithmetic { .. } => "arithmetic unit",
            NodeKind::Select { .. } => "select",
            NodeKind::LocalScalar { .. } => "local scalar",
            NodeKind::LocalArray { .. } => "local array",
            NodeKind::ParamScalar { .. } => "scalar parameter",
            NodeKind::ExternalArray { .. } => "external array",
            NodeKind::SubParamArray { .. } => "array parameter",
            NodeKind::Struct => "struct",
            NodeKind::StructField { .. } => "struct field",
            NodeKind::GlobalArray { .. } => "global array",
            NodeKind::Pragma { .. } => "pragma",
            NodeKind::Sext { .. } => "sign extension",
            NodeKind::Type { .. } => "type marker",
            NodeKind::Return => "return",
            NodeKind::FunctionCall => "function call",
            NodeKind::UndefinedFunction { .. } => "undefined function",
            NodeKind::SpecifyAddress => "address specifier",
            NodeKind::Bitcast => "bitcast",
            NodeKind::UnaryOp { .. } => "unary op",
            NodeKind::Truncate => "truncate",
            NodeKind::CastToFloat => "float cast",
            NodeKind::FNeg => "negation",
        };
        match node.name() {
            Some(name) => format!("{} `{}` (node {})", kind, name, id.0),
            None => format!("{} (node {})", kind, id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    fn add(g: &mut Graph, kind: NodeKind, ty: Option<TypeDesc>) -> NodeId {
        g.add_node(Node::new(kind, ty, NodeMeta::default(), sp()))
    }

    fn constant(g: &mut Graph, value: &str, ty: TypeDesc) -> NodeId {
        add(
            g,
            NodeKind::Constant {
                value: value.into(),
                folded: false,
            },
            Some(ty),
        )
    }

    #[test]
    fn ids_are_dense_and_listed() {
        let mut g = Graph::new();
        let a = add(&mut g, NodeKind::Branch, None);
        let b = g.add_detached_node(Node::new(NodeKind::Branch, None, NodeMeta::default(), sp()));
        let c = add(&mut g, NodeKind::Branch, None);
        assert_eq!((a, b, c), (NodeId(0), NodeId(1), NodeId(2)));
        assert_eq!(g.top_level().nodes, vec![a, c]);
    }

    #[test]
    fn capture_routes_into_own_segment() {
        let mut g = Graph::new();
        let outer = add(&mut g, NodeKind::Branch, None);
        g.begin_capture();
        let inner = add(&mut g, NodeKind::Branch, None);
        let e = g.add_edge(EdgeOp::ControlFlow { dst: inner });
        let seg = g.end_capture();
        assert_eq!(seg.nodes, vec![inner]);
        assert_eq!(seg.edges, vec![e]);
        assert_eq!(g.top_level().nodes, vec![outer]);
        assert!(g.top_level().edges.is_empty());
        assert_eq!(g.end_capture(), Segment::default());
    }

    #[test]
    fn read_takes_type_of_dependency() {
        let mut g = Graph::new();
        let opts = EmitOptions::default();
        let var = add(
            &mut g,
            NodeKind::LocalScalar {
                name: "x".into(),
                iterator: IteratorBounds::default(),
            },
            Some(TypeDesc::float(32)),
        );
        let read = add(&mut g, NodeKind::Read { type_dep: Some(var) }, None);
        assert_eq!(g.value_type(read, &opts).unwrap(), TypeDesc::float(32));
        assert_eq!(g.immediate_type(var, &opts).unwrap(), TypeDesc::int(64));
        let mem = EmitOptions {
            allocas_to_mem_elems: true,
            ..Default::default()
        };
        assert_eq!(g.immediate_type(var, &mem).unwrap(), TypeDesc::float(32));
    }

    #[test]
    fn deref_indexes_array_type() {
        let mut g = Graph::new();
        let opts = EmitOptions::default();
        let arr = add(
            &mut g,
            NodeKind::LocalArray {
                name: "a".into(),
                array_type: TypeDesc::opaque("int[4][8]"),
                elements: 32,
            },
            Some(TypeDesc::int(32)),
        );
        let row = add(
            &mut g,
            NodeKind::Deref(DerefLinks {
                element: Some(arr),
                type_dep: Some(arr),
                base_type_dep: Some(arr),
            }),
            None,
        );
        let cell = add(
            &mut g,
            NodeKind::Deref(DerefLinks {
                type_dep: Some(row),
                ..Default::default()
            }),
            None,
        );
        assert_eq!(g.value_type(row, &opts).unwrap(), TypeDesc::opaque("int[4]"));
        assert_eq!(g.value_type(cell, &opts).unwrap(), TypeDesc::int(64));
        let mem = EmitOptions {
            allocas_to_mem_elems: true,
            ..Default::default()
        };
        assert_eq!(g.value_type(cell, &mem).unwrap(), TypeDesc::int(32));
    }

    #[test]
    fn constants_contribute_zero_width_to_units() {
        let mut g = Graph::new();
        let opts = EmitOptions::default();
        let small = constant(&mut g, "1", TypeDesc::int(32));
        let wide = add(&mut g, NodeKind::Sext { bits: 16, unsigned: false }, None);
        let sum = add(
            &mut g,
            NodeKind::Arithmetic {
                op: ArithOp::Add,
                lhs: wide,
                rhs: small,
            },
            None,
        );
        assert_eq!(g.sext_type(small, &opts).unwrap().bits, 0);
        assert_eq!(g.value_type(sum, &opts).unwrap(), TypeDesc::int(16));
        let programl = EmitOptions {
            proxy_programl: true,
            ..Default::default()
        };
        assert_eq!(g.value_type(sum, &programl).unwrap(), TypeDesc::int(32));
    }

    #[test]
    fn comparison_output_is_unit_type_but_immediate_is_bit() {
        let mut g = Graph::new();
        let opts = EmitOptions::default();
        let a = constant(&mut g, "1.5", TypeDesc::float(64));
        let b = constant(&mut g, "2", TypeDesc::int(32));
        let cmp = add(&mut g, NodeKind::Comparison { lhs: a, rhs: b }, None);
        assert_eq!(g.immediate_type(cmp, &opts).unwrap(), TypeDesc::int(1));
        assert_eq!(g.output_type(cmp, &opts).unwrap(), TypeDesc::float(64));
        let programl = EmitOptions {
            proxy_programl: true,
            ..Default::default()
        };
        assert_eq!(g.printable_type(cmp, &programl), "double");
    }

    #[test]
    fn valueless_nodes_print_na() {
        let mut g = Graph::new();
        let br = add(&mut g, NodeKind::Branch, None);
        let opts = EmitOptions::default();
        assert!(g.value_type(br, &opts).is_err());
        assert_eq!(g.printable_type(br, &opts), "NA");
    }

    #[test]
    fn iterator_width_from_bounds() {
        let mut it = IteratorBounds {
            has_init: true,
            in_bounds_region: true,
            ..Default::default()
        };
        it.add_bound(Some(0.0));
        it.add_bound(Some(100.0));
        assert_eq!(it.reduced_width(), Some(7));
        it.in_bounds_region = false;
        it.add_bound(Some(3.0));
        assert!(!it.written_as_iterator);
        assert_eq!(it.reduced_width(), None);
    }

    #[test]
    fn non_constant_bound_unfixes_iterator() {
        let mut it = IteratorBounds {
            has_init: true,
            in_bounds_region: true,
            ..Default::default()
        };
        it.add_bound(Some(0.0));
        it.add_bound(None);
        assert!(!it.fixed);
        assert_eq!(it.reduced_width(), None);
    }

    #[test]
    fn increment_writes_keep_iterator_shape() {
        let mut it = IteratorBounds {
            has_init: true,
            in_increment: true,
            bounds: vec![0.0, 15.0],
            ..Default::default()
        };
        it.add_bound(None);
        assert!(it.written_as_iterator);
        assert_eq!(it.reduced_width(), Some(4));
    }
}
