// options.rs — Graph emission switches
//
// The independent boolean switches that shape lowering and DOT emission.
// Loaded from defaults, an optional JSON config file and CLI flags, in that
// order; later sources can only turn switches on.
//
// Preconditions: none.
// Postconditions: every switch defaults to off.
// Failure modes: unknown keys or non-boolean values in a config file are
//                rejected by `from_json`.
// Side effects: none.

use serde::{Deserialize, Serialize};

macro_rules! emit_options {
    ($($(#[doc = $doc:literal])* $field:ident),* $(,)?) => {
        /// Emission switches, all off by default.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct EmitOptions {
            $($(#[doc = $doc])* pub $field: bool,)*
        }

        impl EmitOptions {
            /// Every switch name, in declaration order.
            pub const NAMES: &'static [&'static str] = &[$(stringify!($field)),*];

            /// Names of the switches that are on.
            pub fn enabled(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(if self.$field {
                    names.push(stringify!($field));
                })*
                names
            }

            /// Turn on every switch that is on in `other`.
            pub fn merge(&mut self, other: &EmitOptions) {
                $(self.$field |= other.$field;)*
            }

            /// Set a switch by name. Returns false for unknown names.
            pub fn set(&mut self, name: &str, value: bool) -> bool {
                match name {
                    $(stringify!($field) => self.$field = value,)*
                    _ => return false,
                }
                true
            }

            /// Build from a bit mask over `NAMES` (bit i turns on `NAMES[i]`).
            pub fn from_mask(mask: u32) -> Self {
                let mut options = EmitOptions::default();
                for (i, name) in Self::NAMES.iter().enumerate() {
                    if mask & (1 << i) != 0 {
                        options.set(name, true);
                    }
                }
                options
            }
        }
    };
}

emit_options! {
    /// Drop control-flow edges (and the External node with them).
    ignore_control_flow,
    /// Hide constant and parameter-initializer value nodes.
    hide_values,
    /// Fold type information into nodes instead of separate type nodes.
    absorb_types,
    /// Lower calls by inlining callee bodies.
    inline_functions,
    /// Drop call edges between call sites and callees.
    ignore_call_edges,
    /// Ask the CLI for a rendered PDF next to the DOT file.
    make_pdf,
    /// Ask the CLI to write the DOT file under `outputs/`.
    make_dot,
    /// Draw memory-address edges black like data flow.
    mark_address_dataflow,
    /// Omit single-target branch nodes between blocks.
    remove_single_target_branches,
    /// Shrink loop iterators to the width their constant bounds need.
    reduce_iterator_bitwidth,
    /// Represent memory as flattened elements rather than allocas.
    allocas_to_mem_elems,
    /// Wire variable call arguments as memory reads and writes of the call.
    drop_func_call_proc,
    /// Fold pragma markers into node attributes.
    absorb_pragmas,
    add_bb_id,
    add_func_id,
    /// Never insert sign-extend or truncate nodes.
    remove_sexts,
    /// Encode the type as a single printable token.
    one_hot_types,
    add_edge_order,
    /// Keep only control flow into memory, branch, call and boundary nodes.
    only_memory_control_flow,
    /// Match the ProGraML graph schema.
    proxy_programl,
    no_type_display,
    add_node_type,
    add_num_calls,
}

impl EmitOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
