// lowering.rs — Program graph construction on realistic kernels
//
// Runs parse → resolve → lower through the public API and checks the shape
// of the resulting graph: folding, loop factors, merges, call bookkeeping
// and memory directives.

use std::path::Path;

use hgc::diag::codes;
use hgc::graph::{EdgeOp, NodeId, NodeKind};
use hgc::lower::{lower, CallStats, LoweredProgram};
use hgc::options::EmitOptions;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn kernel(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/kernels")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

fn lower_source(source: &str, top: &str, options: &EmitOptions) -> LoweredProgram {
    let parsed = hgc::parser::parse(source);
    assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
    let Some(unit) = parsed.unit else {
        panic!("expected a translation unit")
    };
    let resolved = hgc::resolve::resolve(&unit);
    assert!(
        resolved.diagnostics.iter().all(|d| !d.is_error()),
        "resolve errors: {:#?}",
        resolved.diagnostics
    );
    let result = lower(&unit, &resolved.resolved, top, options);
    assert!(!result.has_errors(), "lowering errors: {:#?}", result.diagnostics);
    let Some(lowered) = result.lowered else {
        panic!("expected a lowered program")
    };
    lowered
}

fn lower_default(source: &str, top: &str) -> LoweredProgram {
    lower_source(source, top, &EmitOptions::default())
}

fn count_nodes(p: &LoweredProgram, pred: impl Fn(&NodeKind) -> bool) -> usize {
    p.graph
        .top_level()
        .nodes
        .iter()
        .filter(|id| pred(&p.graph.node(**id).kind))
        .count()
}

fn count_edges(p: &LoweredProgram, pred: impl Fn(&EdgeOp) -> bool) -> usize {
    p.graph
        .top_level()
        .edges
        .iter()
        .filter(|id| pred(p.graph.edge(**id)))
        .count()
}

// ── Constant folding ─────────────────────────────────────────────────────────

#[test]
fn constant_operands_fold_into_one_constant() {
    let p = lower_default("int k() { int x = 2 + 3; return x; }", "k");
    let printed: Vec<&str> = p
        .graph
        .top_level()
        .nodes
        .iter()
        .filter_map(|id| match &p.graph.node(*id).kind {
            NodeKind::Constant {
                value,
                folded: false,
            } => Some(value.as_str()),
            _ => None,
        })
        .collect();
    assert!(printed.contains(&"5"), "printed constants: {:?}", printed);
    assert!(!printed.contains(&"2"));
    assert!(!printed.contains(&"3"));
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::Arithmetic { .. })), 0);
}

// ── Loops and factors ────────────────────────────────────────────────────────

#[test]
fn unroll_factor_reaches_inner_loop_body() {
    let p = lower_default(&kernel("matmul.c"), "matmul");
    let unroll = p.graph.top_level().nodes.iter().find_map(|id| {
        match &p.graph.node(*id).kind {
            NodeKind::Pragma { key, factor } if key == "unroll" => Some(factor.clone()),
            _ => None,
        }
    });
    assert_eq!(unroll.as_deref(), Some("4"));

    // The marker hangs off the innermost loop's comparison.
    let comparisons: Vec<NodeId> = p
        .graph
        .top_level()
        .nodes
        .iter()
        .copied()
        .filter(|id| matches!(p.graph.node(*id).kind, NodeKind::Comparison { .. }))
        .collect();
    assert_eq!(comparisons.len(), 3);
    let targets: Vec<NodeId> = p
        .graph
        .top_level()
        .edges
        .iter()
        .filter_map(|id| match p.graph.edge(*id) {
            EdgeOp::Pragma { pragma, target, .. } => {
                let NodeKind::Pragma { key, .. } = &p.graph.node(*pragma).kind else {
                    panic!("expected a pragma node");
                };
                (key == "unroll").then_some(*target)
            }
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![comparisons[2]]);
    let NodeKind::Comparison { rhs, .. } = &p.graph.node(targets[0]).kind else {
        panic!("expected Comparison");
    };
    assert_eq!(p.graph.node(*rhs).constant_value(), Some(8.0));

    let (_, mul) = p
        .graph
        .nodes()
        .find(|(_, n)| {
            matches!(
                n.kind,
                NodeKind::Arithmetic {
                    op: hgc::graph::ArithOp::Mul,
                    ..
                }
            )
        })
        .unwrap_or_else(|| panic!("expected a multiply in the inner loop"));
    assert_eq!(mul.meta.unroll.first, 4.0);
    assert_eq!(mul.meta.unroll.full, 4.0);
}

#[test]
fn nested_loops_each_get_a_branch() {
    let p = lower_default(&kernel("matmul.c"), "matmul");
    assert_eq!(count_edges(&p, |e| matches!(e, EdgeOp::PreLoop)), 3);
    assert_eq!(count_edges(&p, |e| matches!(e, EdgeOp::LoopBack { .. })), 3);
    let iterators: Vec<&str> = p
        .graph
        .nodes()
        .filter_map(|(_, n)| match &n.kind {
            NodeKind::LocalScalar { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(iterators, vec!["i", "j", "k"]);
}

#[test]
fn partition_directive_lands_on_local_array() {
    let p = lower_default(&kernel("matmul.c"), "matmul");
    let (_, acc) = p
        .graph
        .nodes()
        .find(|(_, n)| n.name() == Some("acc"))
        .unwrap_or_else(|| panic!("expected storage for acc"));
    let NodeKind::LocalArray { elements, .. } = &acc.kind else {
        panic!("expected LocalArray")
    };
    assert_eq!(*elements, 8);
    let kind = acc.partitions[0].kind.map(|k| k.as_str());
    assert_eq!(kind, Some("complete"));
}

#[test]
fn tripcount_directive_is_snapshotted_on_body_nodes() {
    let p = lower_default(&kernel("mixed.c"), "saxpy");
    let writes: Vec<f64> = p
        .graph
        .top_level()
        .nodes
        .iter()
        .map(|id| p.graph.node(*id))
        .filter(|n| matches!(n.kind, NodeKind::Write { .. }))
        .map(|n| n.meta.tripcount.first)
        .collect();
    assert!(!writes.is_empty());
    assert!(writes.iter().any(|t| *t == 16.0), "tripcounts: {:?}", writes);
}

#[test]
fn pipelined_loop_marks_its_body() {
    let p = lower_default(&kernel("vadd.c"), "vadd");
    let writes: Vec<bool> = p
        .graph
        .top_level()
        .nodes
        .iter()
        .map(|id| p.graph.node(*id))
        .filter(|n| matches!(n.kind, NodeKind::Write { .. }))
        .map(|n| n.meta.pipelined)
        .collect();
    // The iterator initializer runs before the pipelined body opens.
    assert_eq!(writes.first(), Some(&false));
    assert!(writes.iter().any(|p| *p));
}

// ── Branches ─────────────────────────────────────────────────────────────────

#[test]
fn merges_balance_with_breaks() {
    let p = lower_default(&kernel("branches.c"), "threshold");
    let starts = count_edges(&p, |e| matches!(e, EdgeOp::MergeStart));
    let ends = count_edges(&p, |e| matches!(e, EdgeOp::MergeEnd { .. }));
    // One two-armed if plus one break caught at loop exit.
    assert_eq!(starts, 2);
    assert_eq!(ends, 2);
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::Branch)), 3);
}

#[test]
fn breaking_arm_without_else_skips_its_merge() {
    let src = "void k(int a[4]) {\n\
                 for (int i = 0; i < 4; i++) {\n\
                   if (a[i] > 0) { break; }\n\
                 }\n\
               }";
    let p = lower_default(src, "k");
    // Only the break's merge, closed by the loop.
    assert_eq!(count_edges(&p, |e| matches!(e, EdgeOp::MergeStart)), 1);
    assert_eq!(count_edges(&p, |e| matches!(e, EdgeOp::MergeEnd { .. })), 1);
}

// ── Memory ───────────────────────────────────────────────────────────────────

#[test]
fn repeated_index_in_one_block_reuses_address() {
    let p = lower_default("void k(int a[4]) { a[1] = a[1] * a[1]; }", "k");
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::Deref(_))), 1);
}

#[test]
fn entering_a_block_forgets_addresses() {
    let src = "void k(int a[4], int b[4]) {\n\
                 b[0] = a[1];\n\
                 if (b[0] > 0) { b[1] = a[1]; }\n\
               }";
    let p = lower_default(src, "k");
    // b[0] and a[1] outside, reused by the condition; b[1] and a[1] again
    // inside the arm.
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::Deref(_))), 4);
}

#[test]
fn multi_dimensional_index_shares_one_address_per_access() {
    let p = lower_default(&kernel("matmul.c"), "matmul");
    let arrays = count_nodes(&p, |k| matches!(k, NodeKind::ExternalArray { .. }));
    assert_eq!(arrays, 3);
    assert!(count_nodes(&p, |k| matches!(k, NodeKind::Deref(_))) >= 3);
}

#[test]
fn struct_parameter_registers_fields() {
    let src = "struct s { int a; int b[10]; };\n\
               int k(struct s p) { return p.a; }";
    let p = lower_default(src, "k");
    let mut fields: Vec<(u32, Option<String>)> = p
        .graph
        .nodes()
        .filter_map(|(_, n)| match &n.kind {
            NodeKind::StructField { index, array_type } => {
                Some((*index, array_type.as_ref().map(|t| t.to_string())))
            }
            _ => None,
        })
        .collect();
    fields.sort();
    assert_eq!(fields, vec![(0, None), (1, Some("int[10]".to_string()))]);
    // Field slots are never listed for printing.
    assert!(p
        .graph
        .top_level()
        .nodes
        .iter()
        .all(|id| !matches!(p.graph.node(*id).kind, NodeKind::StructField { .. })));
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::StructAccess(_))), 1);
}

#[test]
fn interface_bundles_are_recorded_as_ports() {
    let p = lower_default(&kernel("vadd.c"), "vadd");
    assert_eq!(p.ports.get("a").map(String::as_str), Some("gmem0"));
    assert_eq!(p.ports.get("b").map(String::as_str), Some("gmem1"));
    assert!(!p.ports.contains_key("c"));
}

// ── Calls ────────────────────────────────────────────────────────────────────

#[test]
fn two_call_sites_lower_the_callee_once() {
    let src = "int sq(int v) { return v * v; }\n\
               int top(int x) { return sq(x) + sq(x + 1); }";
    let p = lower_default(src, "top");
    let sq = p
        .function_named("sq")
        .unwrap_or_else(|| panic!("expected a record for sq"));
    assert!(sq.lowered);
    assert_eq!(sq.stats, Some(CallStats { calls: 2, sites: 2 }));
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::FunctionCall)), 2);
    assert_eq!(
        count_edges(&p, |e| matches!(e, EdgeOp::FunctionStart { .. })),
        2
    );
}

#[test]
fn prototype_only_callee_becomes_undefined_function() {
    let p = lower_default(&kernel("calls.c"), "energy");
    let top = p.function(p.top);
    assert_eq!(top.function_id, 0);

    let square = p
        .function_named("square")
        .unwrap_or_else(|| panic!("expected a record for square"));
    assert!(square.has_body);
    assert_eq!(square.function_id, 1);
    assert_eq!(square.stats, Some(CallStats { calls: 1, sites: 1 }));

    let clamp = p
        .function_named("clamp")
        .unwrap_or_else(|| panic!("expected a record for clamp"));
    assert!(!clamp.has_body);
    assert_eq!(clamp.function_id, 2);
    assert_eq!(
        count_edges(&p, |e| matches!(e, EdgeOp::UndefinedFunction { .. })),
        1
    );
}

#[test]
fn inlining_lowers_helper_bodies_in_place() {
    let options = EmitOptions {
        inline_functions: true,
        ..Default::default()
    };
    let src = "int sq(int v) { return v * v; }\n\
               int top(int x) { return sq(x) + sq(x + 1); }";
    let p = lower_source(src, "top", &options);
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::FunctionCall)), 0);
    // Two inlined multiplies plus the outer add.
    assert_eq!(count_nodes(&p, |k| matches!(k, NodeKind::Arithmetic { .. })), 3);
}

#[test]
fn inlining_a_prototype_only_callee_is_rejected() {
    let options = EmitOptions {
        inline_functions: true,
        ..Default::default()
    };
    let source = kernel("calls.c");
    let parsed = hgc::parser::parse(&source);
    let Some(unit) = parsed.unit else {
        panic!("expected a translation unit")
    };
    let resolved = hgc::resolve::resolve(&unit);
    let result = lower(&unit, &resolved.resolved, "energy", &options);
    assert!(result.lowered.is_none());
    let Some(diag) = result.diagnostics.first() else {
        panic!("expected a diagnostic")
    };
    assert_eq!(diag.code, Some(codes::UNSUPPORTED_EXPRESSION));
    assert!(diag.message.contains("clamp"), "{}", diag.message);
}

// ── Connectivity ─────────────────────────────────────────────────────────────

#[test]
fn every_edge_op_names_existing_nodes() {
    for (file, top) in [
        ("vadd.c", "vadd"),
        ("matmul.c", "matmul"),
        ("calls.c", "energy"),
        ("branches.c", "threshold"),
        ("mixed.c", "saxpy"),
    ] {
        let p = lower_default(&kernel(file), top);
        let n = p.graph.node_count() as u32;
        for id in &p.graph.top_level().edges {
            let ends: Vec<u32> = match p.graph.edge(*id) {
                EdgeOp::ControlFlow { dst } => vec![dst.0],
                EdgeOp::DataFlow { src, dst, .. }
                | EdgeOp::MemoryAddress { src, dst }
                | EdgeOp::SextDataFlow { src, dst, .. }
                | EdgeOp::ImplicitCast { src, dst, .. }
                | EdgeOp::ParameterLoad { src, dst } => vec![src.0, dst.0],
                _ => Vec::new(),
            };
            assert!(
                ends.iter().all(|e| *e < n),
                "{}: edge {:?} points past {} nodes",
                file,
                p.graph.edge(*id),
                n
            );
        }
        assert_eq!(p.graph.top_level().nodes[0], p.external, "{}", file);
    }
}
