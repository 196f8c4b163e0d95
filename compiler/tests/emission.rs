// emission.rs — DOT output for the kernel fixtures
//
// Compiles the fixtures end to end through `pipeline::compile` and the
// staged runner, then checks the wire format: node/edge bookkeeping,
// clusters, storage labels and switch-dependent attributes.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use hgc::options::EmitOptions;
use hgc::pipeline::{compile, run_pipeline, CompilationState, Stage};

// ── Helpers ──────────────────────────────────────────────────────────────────

const KERNELS: &[(&str, &str)] = &[
    ("vadd.c", "vadd"),
    ("matmul.c", "matmul"),
    ("calls.c", "energy"),
    ("branches.c", "threshold"),
    ("mixed.c", "saxpy"),
];

fn kernel(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/kernels")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

fn dot(file: &str, top: &str, options: &EmitOptions) -> String {
    match compile(&kernel(file), top, options) {
        Ok(dot) => dot,
        Err(diags) => panic!("{} failed to compile: {:#?}", file, diags),
    }
}

fn with(names: &[&str]) -> EmitOptions {
    let mut options = EmitOptions::default();
    for name in names {
        assert!(options.set(name, true), "unknown switch {}", name);
    }
    options
}

fn node_lines(dot: &str) -> Vec<&str> {
    dot.lines()
        .filter(|l| l.starts_with("node") && !l.contains(" -> "))
        .collect()
}

fn edge_lines(dot: &str) -> Vec<&str> {
    dot.lines().filter(|l| l.contains(" -> ")).collect()
}

fn leading_id(text: &str) -> String {
    text.trim_start_matches("node")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect()
}

/// Every edge endpoint must be a declared node.
fn assert_no_dangling(context: &str, dot: &str) {
    let declared: HashSet<String> = node_lines(dot).iter().map(|l| leading_id(l)).collect();
    for line in edge_lines(dot) {
        let Some((lhs, rhs)) = line.split_once(" -> ") else {
            panic!("expected edge line");
        };
        assert!(
            declared.contains(&leading_id(lhs)),
            "{}: undeclared source in {}",
            context,
            line
        );
        assert!(
            declared.contains(&leading_id(rhs)),
            "{}: undeclared target in {}",
            context,
            line
        );
    }
}

// ── Structure ────────────────────────────────────────────────────────────────

#[test]
fn fixtures_emit_closed_graphs() {
    for (file, top) in KERNELS {
        let out = dot(file, top, &EmitOptions::default());
        assert!(out.starts_with("digraph {\nnewrank=\"true\";\n"), "{}", file);
        assert!(out.ends_with("}\n"), "{}", file);
        assert_no_dangling(file, &out);
    }
}

#[test]
fn stats_count_printed_lines() {
    for (file, top) in KERNELS {
        let mut state = CompilationState::new(kernel(file), *top, EmitOptions::default());
        let result = run_pipeline(&mut state, Stage::Emit, |_, _| {});
        assert!(result.is_ok(), "{}: {:#?}", file, state.diagnostics);
        let Some(emission) = state.emission else {
            panic!("expected an emission for {}", file)
        };
        assert_eq!(emission.stats.nodes, node_lines(&emission.dot).len(), "{}", file);
        assert_eq!(emission.stats.edges, edge_lines(&emission.dot).len(), "{}", file);
        let by_key: usize = emission.stats.node_categories.values().sum();
        assert_eq!(by_key, emission.stats.nodes, "{}", file);
        let by_flow: usize = emission.stats.edge_categories.values().sum();
        assert_eq!(by_flow, emission.stats.edges, "{}", file);
    }
}

#[test]
fn node_zero_is_the_external_boundary() {
    for (file, top) in KERNELS {
        let out = dot(file, top, &EmitOptions::default());
        let first = node_lines(&out)[0];
        assert!(first.starts_with("node0 ["), "{}: {}", file, first);
        assert!(first.contains("label=\"External\""), "{}: {}", file, first);
    }
}

#[test]
fn control_edges_form_one_component() {
    for (file, top) in KERNELS {
        let out = dot(file, top, &EmitOptions::default());
        let mut adjacent: HashMap<String, Vec<String>> = HashMap::new();
        for line in edge_lines(&out) {
            if !(line.contains("flowType=\"control\"") || line.contains("flowType=\"call\"")) {
                continue;
            }
            let Some((lhs, rhs)) = line.split_once(" -> ") else {
                panic!("expected edge line");
            };
            let (a, b) = (leading_id(lhs), leading_id(rhs));
            adjacent.entry(a.clone()).or_default().push(b.clone());
            adjacent.entry(b).or_default().push(a);
        }
        let mut seen = HashSet::from(["0".to_string()]);
        let mut stack = vec!["0".to_string()];
        while let Some(id) = stack.pop() {
            for next in adjacent.get(&id).into_iter().flatten() {
                if seen.insert(next.clone()) {
                    stack.push(next.clone());
                }
            }
        }
        let unreached: Vec<&String> = adjacent.keys().filter(|k| !seen.contains(*k)).collect();
        assert!(unreached.is_empty(), "{}: unreached {:?}", file, unreached);
    }
}

#[test]
fn each_lowered_function_gets_a_cluster() {
    let out = dot("calls.c", "energy", &EmitOptions::default());
    assert!(out.contains("subgraph cluster_External {"));
    assert!(out.contains("subgraph cluster_energy {"));
    assert!(out.contains("subgraph cluster_square {"));
    assert!(out.contains("label=\"Undefined Function: clamp\""));
    assert!(out.contains("label=\"Function Call\""));
}

#[test]
fn output_switches_do_not_change_the_graph() {
    let plain = dot("vadd.c", "vadd", &EmitOptions::default());
    let requested = dot("vadd.c", "vadd", &with(&["make_dot", "make_pdf"]));
    assert_eq!(plain, requested);
}

#[test]
fn compilation_is_deterministic() {
    let options = with(&["absorb_types", "add_bb_id", "add_edge_order"]);
    for (file, top) in KERNELS {
        assert_eq!(dot(file, top, &options), dot(file, top, &options), "{}", file);
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

#[test]
fn alloca_mode_labels_all_storage_as_allocas() {
    let out = dot("matmul.c", "matmul", &EmitOptions::default());
    for name in ["a", "b", "c", "acc", "i", "j", "k"] {
        assert!(
            out.contains(&format!("label=\"Alloca: {}", name)),
            "missing alloca for {}",
            name
        );
    }
    assert!(!out.contains("Local Array:"));
}

#[test]
fn memory_mode_distinguishes_storage_classes() {
    let out = dot("matmul.c", "matmul", &with(&["allocas_to_mem_elems"]));
    assert!(out.contains("label=\"External Array: a"));
    assert!(out.contains("label=\"Local Array: acc"));
    assert!(out.contains("label=\"Local Scalar: i"));
    assert!(!out.contains("Alloca:"));
    assert_no_dangling("matmul memory mode", &out);
}

#[test]
fn reduced_iterators_print_their_bound_width() {
    let narrowed = dot(
        "vadd.c",
        "vadd",
        &with(&["allocas_to_mem_elems", "absorb_types", "reduce_iterator_bitwidth"]),
    );
    let iterator = node_lines(&narrowed)
        .into_iter()
        .find(|l| l.contains("Local Scalar: i"))
        .unwrap_or_else(|| panic!("expected the iterator node"));
    // Bounds 0..64 need seven bits.
    assert!(iterator.contains("bitwidth=\"7\""), "{}", iterator);

    let full = dot("vadd.c", "vadd", &with(&["allocas_to_mem_elems", "absorb_types"]));
    let iterator = node_lines(&full)
        .into_iter()
        .find(|l| l.contains("Local Scalar: i"))
        .unwrap_or_else(|| panic!("expected the iterator node"));
    assert!(!iterator.contains("bitwidth=\"7\""), "{}", iterator);
}

// ── Attributes ───────────────────────────────────────────────────────────────

#[test]
fn absorbed_partition_shows_on_local_array() {
    let out = dot("matmul.c", "matmul", &with(&["absorb_pragmas"]));
    let acc = node_lines(&out)
        .into_iter()
        .find(|l| l.contains("Alloca: acc"))
        .unwrap_or_else(|| panic!("expected the acc node"));
    assert!(acc.contains("partition1=\"complete\""), "{}", acc);
    assert!(acc.contains("partitionFactor1=\"1\""), "{}", acc);
    assert!(!out.contains("color=\"blue\""));
}

#[test]
fn pragma_markers_are_blue_edges_by_default() {
    let out = dot("matmul.c", "matmul", &EmitOptions::default());
    assert!(out.contains("color=\"blue\""));
    assert!(out.contains("flowType=\"pragma\""));
}

#[test]
fn float_kernel_converts_the_integer_operand() {
    let out = dot("mixed.c", "saxpy", &with(&["absorb_types"]));
    assert!(out.contains("keyText=\"sitofp\""));
    assert!(out.contains("datatype=\"float\""));
    assert_no_dangling("saxpy", &out);
}

#[test]
fn call_statistics_reach_the_callee() {
    let out = dot("calls.c", "energy", &with(&["add_num_calls", "add_func_id"]));
    assert!(out.contains("funcID=\"1\""));
    assert!(out.contains("numCalls=\"1\""));
    assert!(out.contains("numCallSites=\"1\""));
}

#[test]
fn call_edges_can_be_dropped() {
    let out = dot("calls.c", "energy", &with(&["ignore_call_edges"]));
    assert!(!out.contains("flowType=\"call\""));
    assert_no_dangling("calls without call edges", &out);
}

#[test]
fn combined_switches_keep_fixtures_attached() {
    let combos: &[&[&str]] = &[
        &["absorb_types", "absorb_pragmas", "add_node_type"],
        &["allocas_to_mem_elems", "drop_func_call_proc", "mark_address_dataflow"],
        &["proxy_programl", "remove_single_target_branches", "remove_sexts"],
        &["ignore_control_flow", "hide_values", "one_hot_types"],
        &["inline_functions", "only_memory_control_flow", "no_type_display"],
    ];
    for names in combos {
        let options = with(names);
        for (file, top) in KERNELS {
            if options.inline_functions && *file == "calls.c" {
                continue;
            }
            let out = dot(file, top, &options);
            assert_no_dangling(&format!("{} {:?}", file, names), &out);
        }
    }
}
