// dot.rs — Graphviz DOT line writer for program graphs
//
// Formats individual node, edge and cluster lines. Attribute maps are kept
// sorted so the output is deterministic; label suffixes for absorbed types,
// pragmas and ids are appended here so every node kind shares one rule set.
//
// Preconditions: node ids handed to `edge` were assigned by `node`.
// Postconditions: `finish` returns a complete `digraph { ... }` document
//                 with one line per node and one per edge.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::factor::StackedFactor;
use crate::graph::PartitionSlot;
use crate::options::EmitOptions;

/// Attribute map of one DOT line, printed in key order.
pub type Attributes = BTreeMap<&'static str, String>;

/// Line counts by category, for summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotStats {
    pub nodes: usize,
    pub edges: usize,
    /// Nodes by `keyText`.
    pub node_categories: BTreeMap<String, usize>,
    /// Edges by `flowType`.
    pub edge_categories: BTreeMap<String, usize>,
}

/// Pragma data folded into a node's label when pragma markers are absorbed.
#[derive(Debug, Clone, Copy)]
pub struct PragmaLabel {
    pub unroll: StackedFactor,
    pub tripcount: StackedFactor,
    pub partitions: [PartitionSlot; 2],
    pub inlined: bool,
    pub pipelined: bool,
}

/// Flavours of control-flow style edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    Control,
    BackControl,
    Call(u32),
    DataFlow(u32),
    Address,
    Pragma(u32),
}

pub struct DotWriter<'o> {
    options: &'o EmitOptions,
    buf: String,
    stats: DotStats,
}

impl<'o> DotWriter<'o> {
    pub fn new(options: &'o EmitOptions) -> Self {
        let mut buf = String::new();
        writeln!(buf, "digraph {{").unwrap();
        writeln!(buf, "newrank=\"true\";").unwrap();
        DotWriter {
            options,
            buf,
            stats: DotStats::default(),
        }
    }

    /// Write `node<id> [style=filled fillcolor="<color>" ...]`, completing
    /// the label with the suffixes the switches ask for.
    pub fn node(&mut self, id: u32, color: &str, mut attrs: Attributes, pragmas: Option<&PragmaLabel>) {
        let mut label = attrs.remove("label").unwrap_or_default();
        if let Some(pragmas) = pragmas {
            label = pragma_label(label, pragmas);
        }
        if let Some(datatype) = attrs.get("datatype") {
            label.push_str(&format!("\n{}", datatype));
        }
        if let Some(bits) = attrs.get("bitwidth") {
            label.push_str(&format!("\n{} bits", bits));
        }
        if let Some(width) = attrs.get("arrayWidth") {
            label.push_str(&format!("\n Array Width: {}", width));
        }
        if let Some(bb) = attrs.get("bbID") {
            label.push_str(&format!("\n BB ID: {}", bb));
        }
        if let Some(func) = attrs.get("funcID") {
            label.push_str(&format!("\n Func ID: {}", func));
        }
        if !self.options.add_node_type {
            attrs.remove("nodeType");
        }
        if let Some(node_type) = attrs.get("nodeType") {
            label.push_str(&format!("\n Node Type: {}", node_type));
        }
        if let Some(calls) = attrs.get("numCalls") {
            label.push_str(&format!("\n Num Calls: {}", calls));
        }
        if let Some(sites) = attrs.get("numCallSites") {
            label.push_str(&format!("\n Num Call Sites: {}", sites));
        }
        attrs.insert("label", label);

        let category = attrs.get("keyText").cloned().unwrap_or_default();
        *self.stats.node_categories.entry(category).or_default() += 1;
        self.stats.nodes += 1;

        write!(self.buf, "node{} [style=filled fillcolor=\"{}\" ", id, escape(color)).unwrap();
        write_attributes(&mut self.buf, &attrs);
        writeln!(self.buf, "]").unwrap();
    }

    pub fn edge(&mut self, src: u32, dst: u32, style: EdgeStyle) {
        let mut attrs = Attributes::new();
        attrs.insert("edgeOrder", "0".to_string());
        let flow = match style {
            EdgeStyle::Control => {
                attrs.insert("color", "red".to_string());
                "control"
            }
            EdgeStyle::BackControl => {
                attrs.insert("color", "red".to_string());
                attrs.insert("edgeOrder", "1".to_string());
                attrs.insert("style", "dashed".to_string());
                attrs.insert("dir", "back".to_string());
                "control"
            }
            EdgeStyle::Call(order) => {
                attrs.insert("color", "magenta".to_string());
                attrs.insert("edgeOrder", order.to_string());
                "call"
            }
            EdgeStyle::DataFlow(order) => {
                attrs.insert("color", "black".to_string());
                attrs.insert("edgeOrder", order.to_string());
                "dataflow"
            }
            EdgeStyle::Address => {
                let color = if self.options.mark_address_dataflow {
                    "black"
                } else {
                    "aquamarine4"
                };
                attrs.insert("color", color.to_string());
                if self.options.allocas_to_mem_elems {
                    "address"
                } else {
                    "dataflow"
                }
            }
            EdgeStyle::Pragma(order) => {
                attrs.insert("color", "blue".to_string());
                attrs.insert("edgeOrder", order.to_string());
                "pragma"
            }
        };
        attrs.insert("flowType", flow.to_string());
        if !self.options.add_edge_order {
            attrs.remove("edgeOrder");
        }
        if let Some(order) = attrs.get("edgeOrder").cloned() {
            attrs.insert("xlabel", order);
        }

        *self.stats.edge_categories.entry(flow.to_string()).or_default() += 1;
        self.stats.edges += 1;

        write!(self.buf, "node{} -> node{}[", src, dst).unwrap();
        write_attributes(&mut self.buf, &attrs);
        writeln!(self.buf, "]").unwrap();
    }

    /// Pin a node to the top of its group's cluster.
    pub fn cluster_head(&mut self, group: &str, id: u32) {
        writeln!(self.buf, "subgraph cluster_{} {{", sanitize(group)).unwrap();
        writeln!(self.buf, "{{rank=min; node{}}}", id).unwrap();
        writeln!(self.buf, "}}").unwrap();
    }

    pub fn stats(&self) -> &DotStats {
        &self.stats
    }

    pub fn finish(mut self) -> (String, DotStats) {
        writeln!(self.buf, "}}").unwrap();
        (self.buf, self.stats)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn write_attributes(buf: &mut String, attrs: &Attributes) {
    for (key, value) in attrs {
        write!(buf, "{}=\"{}\" ", key, escape(value)).unwrap();
    }
}

/// Fold unroll, partition, tripcount and inline data into a label.
fn pragma_label(mut label: String, p: &PragmaLabel) -> String {
    if p.unroll.full > 1.0 {
        label.push_str(&format!("\n Unroll: {:.6}", p.unroll.full));
    }
    if p.partitions[0].factor > 0 {
        label.push_str(&format!("\n Partition Factor 1: {}", p.partitions[0].factor));
    }
    if p.partitions[1].factor > 0 {
        label.push_str(&format!("\n Partition Factor 2: {}", p.partitions[1].factor));
    }
    if p.tripcount.full > 1.0 {
        label.push_str(&format!("\n Tripcount: {:.6}", p.tripcount.full));
    }
    if let Some(kind) = p.partitions[0].kind {
        label.push_str(&format!("\n Partition 1: {}", kind));
    }
    if let Some(kind) = p.partitions[1].kind {
        label.push_str(&format!("\n Partition 2: {}", kind));
    }
    if p.inlined {
        label.push_str("\n Inlined");
    }
    if p.pipelined {
        label.push_str("\n Pipelined");
    }
    label
}

/// Escape a value for a quoted DOT string; newlines become `\n` so every
/// node stays on one line.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
