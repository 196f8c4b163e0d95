// vars.rs — Variable storage mapping for the lowering engine
//
// Maps each declaration to the graph node that holds it, separately for
// reads and writes, and follows the aliases installed when a callee is
// inlined. Also owns the field tables of registered structs and attaches
// array directives to array storage when it is created.
//
// Preconditions: declarations come from the resolver of the unit being lowered.
// Postconditions: every created storage node is listed in the graph; struct
//                 fields are detached nodes.
// Failure modes: pointer locals, struct locals and non-scalar field types →
//                `UNSUPPORTED_TYPE`.
// Side effects: drains queued partition directives for the variables it creates.

use std::collections::{HashMap, HashSet};

use crate::ast::{CType, Span, StructDef};
use crate::diag::{codes, Diagnostic};
use crate::graph::{EdgeOp, Graph, IteratorBounds, Node, NodeId, NodeKind, NodeMeta};
use crate::id::DeclId;
use crate::pragma::{AnnotationParser, PartitionKind};
use crate::resolve::DeclInfo;
use crate::types::TypeDesc;

/// Struct definitions by name.
pub type StructDefs = HashMap<String, StructDef>;

/// Edge order of each directive kind on pragma edges.
pub const UNROLL_ORDER: u32 = 0;
pub const PARTITION_ORDER: u32 = 1;
pub const RESOURCE_ORDER: u32 = 2;
pub const INLINE_ORDER: u32 = 3;

/// Machine type of a scalar C type.
pub fn scalar_type(ty: &CType, span: Span) -> Result<TypeDesc, Diagnostic> {
    let result = match ty {
        CType::Scalar(name) => TypeDesc::from_c_name(name),
        CType::Void => Ok(TypeDesc::void()),
        other => TypeDesc::from_c_name(&other.to_string()),
    };
    result.map_err(|e| Diagnostic::error(codes::UNSUPPORTED_TYPE, span, e.0))
}

#[derive(Debug, Default)]
pub struct VariableMapper {
    reads: HashMap<DeclId, NodeId>,
    writes: HashMap<DeclId, NodeId>,
    aliases: HashMap<DeclId, DeclId>,
    /// Nodes that are their own value when read (no load is drawn).
    non_read: HashSet<NodeId>,
    declared: HashSet<DeclId>,
    /// Struct name → field name → detached field node.
    structs: HashMap<String, HashMap<String, NodeId>>,
    finished_main: bool,
}

impl VariableMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declaration that actually holds the value of `decl` after aliasing.
    pub fn underlying(&self, decl: DeclId) -> DeclId {
        let mut current = decl;
        let mut hops = 0;
        while let Some(next) = self.aliases.get(&current) {
            current = *next;
            hops += 1;
            if hops > self.aliases.len() {
                break;
            }
        }
        current
    }

    pub fn read_node(&self, decl: DeclId) -> Option<NodeId> {
        self.reads.get(&self.underlying(decl)).copied()
    }

    pub fn write_node(&self, decl: DeclId) -> Option<NodeId> {
        self.writes.get(&self.underlying(decl)).copied()
    }

    pub fn is_non_read(&self, node: NodeId) -> bool {
        self.non_read.contains(&node)
    }

    /// Returns true the first time a local is seen.
    pub fn declare_once(&mut self, decl: DeclId) -> bool {
        self.declared.insert(decl)
    }

    /// Array parameters of the top function are external; later ones belong
    /// to callees.
    pub fn finish_main(&mut self) {
        self.finished_main = true;
    }

    pub fn finished_main(&self) -> bool {
        self.finished_main
    }

    /// Storage for a local variable.
    pub fn create_local(
        &mut self,
        graph: &mut Graph,
        meta: NodeMeta,
        decl: DeclId,
        info: &DeclInfo,
        pragmas: &mut AnnotationParser,
    ) -> Result<NodeId, Diagnostic> {
        let span = info.span;
        let node = match &info.ty {
            CType::Pointer(_) => {
                return Err(Diagnostic::error(
                    codes::UNSUPPORTED_TYPE,
                    span,
                    format!("local pointer `{}` is not supported", info.name),
                )
                .with_hint("index the array parameter directly"));
            }
            CType::Array(..) => {
                if info.ty.base().struct_name().is_some() {
                    return Err(Diagnostic::error(
                        codes::UNSUPPORTED_TYPE,
                        span,
                        format!("local array of structs `{}` is not supported", info.name),
                    ));
                }
                let elem = scalar_type(info.ty.base(), span)?;
                let node = graph.add_node(Node::new(
                    NodeKind::LocalArray {
                        name: info.name.clone(),
                        array_type: TypeDesc::opaque(info.ty.to_string()),
                        elements: info.ty.element_count().unwrap_or(0),
                    },
                    Some(elem),
                    meta.clone(),
                    span,
                ));
                apply_array_pragmas(graph, &meta, &info.name, node, pragmas);
                node
            }
            CType::Struct(name) => {
                return Err(Diagnostic::error(
                    codes::UNSUPPORTED_TYPE,
                    span,
                    format!("local struct `{}` of type `struct {}` is not supported", info.name, name),
                )
                .with_hint("pass the struct in as a parameter"));
            }
            scalar => {
                let ty = scalar_type(scalar, span)?;
                graph.add_node(Node::new(
                    NodeKind::LocalScalar {
                        name: info.name.clone(),
                        iterator: IteratorBounds::default(),
                    },
                    Some(ty),
                    meta,
                    span,
                ))
            }
        };
        self.reads.insert(decl, node);
        self.writes.insert(decl, node);
        Ok(node)
    }

    /// Storage for a parameter of the function being lowered.
    pub fn create_parameter(
        &mut self,
        graph: &mut Graph,
        meta: NodeMeta,
        decl: DeclId,
        info: &DeclInfo,
        pragmas: &mut AnnotationParser,
        structs: &StructDefs,
    ) -> Result<NodeId, Diagnostic> {
        let span = info.span;
        let ty = &info.ty;
        if ty.is_array() || ty.is_pointer() {
            let elem = match ty.base() {
                CType::Struct(name) => {
                    self.register_struct(graph, &meta, name, structs, span)?;
                    TypeDesc::opaque(format!("struct {}", name))
                }
                base => scalar_type(base, span)?,
            };
            let elements = ty.element_count().unwrap_or(1);
            let kind = if self.finished_main {
                NodeKind::SubParamArray {
                    name: info.name.clone(),
                    elements,
                }
            } else {
                NodeKind::ExternalArray {
                    name: info.name.clone(),
                    elements,
                }
            };
            let node = graph.add_node(Node::new(kind, Some(elem), meta.clone(), span));
            apply_array_pragmas(graph, &meta, &info.name, node, pragmas);
            self.reads.insert(decl, node);
            self.writes.insert(decl, node);
            return Ok(node);
        }
        if let CType::Struct(name) = ty {
            self.register_struct(graph, &meta, name, structs, span)?;
            let node = graph.add_node(Node::new(NodeKind::Struct, None, meta, span));
            self.reads.insert(decl, node);
            self.writes.insert(decl, node);
            self.non_read.insert(node);
            return Ok(node);
        }
        let scalar = scalar_type(ty, span)?;
        let node = graph.add_node(Node::new(
            NodeKind::ParamScalar {
                name: info.name.clone(),
            },
            Some(scalar),
            meta,
            span,
        ));
        self.reads.insert(decl, node);
        Ok(node)
    }

    /// Bind a file-scope constant table created on first read.
    pub fn bind_global(&mut self, decl: DeclId, node: NodeId) {
        self.reads.insert(decl, node);
        self.non_read.insert(node);
    }

    /// Inlining: the parameter reads and writes the caller's variable.
    pub fn alias(&mut self, param: DeclId, target: DeclId) {
        let target = self.underlying(target);
        if target != param {
            self.aliases.insert(param, target);
        }
    }

    /// Inlining: the parameter is bound to an already computed value.
    pub fn bind_value(&mut self, param: DeclId, node: NodeId) {
        self.aliases.remove(&param);
        self.reads.insert(param, node);
        self.writes.remove(&param);
        self.non_read.insert(node);
    }

    pub fn struct_field(&self, struct_name: &str, field: &str) -> Option<NodeId> {
        self.structs.get(struct_name)?.get(field).copied()
    }

    pub fn has_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    fn register_struct(
        &mut self,
        graph: &mut Graph,
        meta: &NodeMeta,
        name: &str,
        structs: &StructDefs,
        span: Span,
    ) -> Result<(), Diagnostic> {
        if self.structs.contains_key(name) {
            return Ok(());
        }
        let Some(def) = structs.get(name) else {
            return Err(Diagnostic::error(
                codes::UNSUPPORTED_TYPE,
                span,
                format!("struct `{}` has no definition", name),
            ));
        };
        let mut fields = HashMap::new();
        for (index, field) in def.fields.iter().enumerate() {
            let ty = scalar_type(field.ty.base(), field.name.span)?;
            let array_type = field
                .ty
                .is_array()
                .then(|| TypeDesc::opaque(field.ty.to_string()));
            let node = graph.add_detached_node(Node::new(
                NodeKind::StructField {
                    index: index as u32,
                    array_type,
                },
                Some(ty),
                meta.clone(),
                field.name.span,
            ));
            fields.insert(field.name.name.clone(), node);
        }
        log::debug!("registered struct `{}` with {} fields", name, fields.len());
        self.structs.insert(name.to_string(), fields);
        Ok(())
    }
}

/// Attach resource and partition directives for `name` to its storage node.
fn apply_array_pragmas(
    graph: &mut Graph,
    meta: &NodeMeta,
    name: &str,
    node: NodeId,
    pragmas: &mut AnnotationParser,
) {
    let span = graph.node(node).span;
    if let Some(core) = pragmas.resource(name) {
        let key = if core.eq_ignore_ascii_case("RAM_2P_BRAM") {
            "resourceAllocation_bram2p"
        } else {
            "resourceAllocation_bram1p"
        };
        let pragma = graph.add_node(Node::new(
            NodeKind::Pragma {
                key: key.to_string(),
                factor: "0".to_string(),
            },
            None,
            meta.clone(),
            span,
        ));
        graph.add_edge(EdgeOp::Pragma {
            pragma,
            target: node,
            order: RESOURCE_ORDER,
        });
    }

    for partition in pragmas.take_partitions(name) {
        let pragma = graph.add_node(Node::new(
            NodeKind::Pragma {
                key: format!("{}ArrayPartition{}", partition.kind, partition.dim),
                factor: partition.factor.to_string(),
            },
            None,
            meta.clone(),
            span,
        ));
        let slot = if partition.dim == 1 { 0 } else { 1 };
        let target = &mut graph.node_mut(node).partitions[slot];
        match partition.kind {
            PartitionKind::Complete => {
                target.factor = 1;
                target.kind = Some(PartitionKind::Complete);
            }
            kind if partition.factor > 1 => {
                target.factor = partition.factor;
                target.kind = Some(kind);
            }
            _ => {}
        }
        graph.add_edge(EdgeOp::Pragma {
            pragma,
            target: node,
            order: PARTITION_ORDER,
        });
    }
}
