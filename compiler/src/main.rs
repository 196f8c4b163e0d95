use clap::Parser;
use std::path::{Path, PathBuf};

use hgc::options::EmitOptions;
use hgc::pipeline::{run_pipeline, CompilationState, Stage, Summary};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    Dot,
    Ast,
    Summary,
}

/// Emission switches as CLI flags. Each one can only turn its switch on.
#[derive(clap::Args, Debug, Default)]
struct SwitchFlags {
    /// Drop control-flow edges and the External node
    #[arg(long)]
    ignore_control_flow: bool,
    /// Hide constant and parameter value nodes
    #[arg(long)]
    hide_values: bool,
    /// Fold types into nodes instead of separate type nodes
    #[arg(long)]
    absorb_types: bool,
    /// Inline callee bodies at call sites
    #[arg(long)]
    inline_functions: bool,
    /// Drop call edges
    #[arg(long)]
    ignore_call_edges: bool,
    /// Request a rendered PDF next to the DOT file
    #[arg(long)]
    make_pdf: bool,
    /// Write the DOT file to outputs/<top>.dot
    #[arg(long)]
    make_dot: bool,
    /// Draw memory-address edges black
    #[arg(long)]
    mark_address_dataflow: bool,
    /// Omit single-target branch nodes
    #[arg(long)]
    remove_single_target_branches: bool,
    /// Shrink loop iterators to their bound width
    #[arg(long)]
    reduce_iterator_bitwidth: bool,
    /// Represent memory as flattened elements
    #[arg(long)]
    allocas_to_mem_elems: bool,
    /// Wire variable call arguments as memory reads and writes
    #[arg(long)]
    drop_func_call_proc: bool,
    /// Fold pragma markers into node attributes
    #[arg(long)]
    absorb_pragmas: bool,
    /// Annotate nodes with basic-block ids
    #[arg(long)]
    add_bb_id: bool,
    /// Annotate nodes with function ids
    #[arg(long)]
    add_func_id: bool,
    /// Never insert extension or truncation nodes
    #[arg(long)]
    remove_sexts: bool,
    /// Encode types as a single token
    #[arg(long)]
    one_hot_types: bool,
    /// Annotate edges with operand order
    #[arg(long)]
    add_edge_order: bool,
    /// Keep only control flow into memory, branch, call and boundary nodes
    #[arg(long)]
    only_memory_control_flow: bool,
    /// Match the ProGraML graph schema
    #[arg(long)]
    proxy_programl: bool,
    /// Omit type annotations
    #[arg(long)]
    no_type_display: bool,
    /// Annotate nodes with their node type
    #[arg(long)]
    add_node_type: bool,
    /// Annotate nodes with call statistics
    #[arg(long)]
    add_num_calls: bool,
}

impl SwitchFlags {
    fn to_options(&self) -> EmitOptions {
        EmitOptions {
            ignore_control_flow: self.ignore_control_flow,
            hide_values: self.hide_values,
            absorb_types: self.absorb_types,
            inline_functions: self.inline_functions,
            ignore_call_edges: self.ignore_call_edges,
            make_pdf: self.make_pdf,
            make_dot: self.make_dot,
            mark_address_dataflow: self.mark_address_dataflow,
            remove_single_target_branches: self.remove_single_target_branches,
            reduce_iterator_bitwidth: self.reduce_iterator_bitwidth,
            allocas_to_mem_elems: self.allocas_to_mem_elems,
            drop_func_call_proc: self.drop_func_call_proc,
            absorb_pragmas: self.absorb_pragmas,
            add_bb_id: self.add_bb_id,
            add_func_id: self.add_func_id,
            remove_sexts: self.remove_sexts,
            one_hot_types: self.one_hot_types,
            add_edge_order: self.add_edge_order,
            only_memory_control_flow: self.only_memory_control_flow,
            proxy_programl: self.proxy_programl,
            no_type_display: self.no_type_display,
            add_node_type: self.add_node_type,
            add_num_calls: self.add_num_calls,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "hgc",
    version,
    about = "HLS Graph Compiler: lowers C kernels into attributed program graphs (DOT)"
)]
struct Cli {
    /// Input C kernel source file
    source: PathBuf,

    /// Top function to lower
    #[arg(long)]
    top: String,

    /// JSON file of switches to turn on
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    switches: SwitchFlags,

    /// Output kind
    #[arg(long, value_enum, default_value_t = EmitStage::Dot)]
    emit: EmitStage,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log compiler stages and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // ── Switches: defaults → config file → flags ──
    let mut options = EmitOptions::default();
    if let Some(path) = &cli.config {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("hgc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        };
        match EmitOptions::from_json(&text) {
            Ok(loaded) => options.merge(&loaded),
            Err(e) => {
                eprintln!("hgc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
    }
    options.merge(&cli.switches.to_options());

    if cli.verbose {
        eprintln!("hgc: source = {}", cli.source.display());
        eprintln!("hgc: top    = {}", cli.top);
        eprintln!("hgc: emit   = {:?}", cli.emit);
        eprintln!("hgc: switches = {:?}", options.enabled());
    }

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hgc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let terminal = match cli.emit {
        EmitStage::Ast => Stage::Parse,
        EmitStage::Dot | EmitStage::Summary => Stage::Emit,
    };

    let mut state = CompilationState::new(source, cli.top.clone(), options.clone());
    let result = run_pipeline(&mut state, terminal, |_, diags| {
        for diag in diags {
            eprintln!("hgc: {}", diag);
        }
    });
    if let Err(err) = result {
        eprintln!("hgc: {} failed", err.failing_stage.name());
        std::process::exit(1);
    }

    let text = match cli.emit {
        EmitStage::Ast => match &state.unit {
            Some(unit) => format!("{:#?}\n", unit),
            None => {
                eprintln!("hgc: parse failed with no output");
                std::process::exit(1);
            }
        },
        EmitStage::Summary => {
            let json = Summary::from_state(&state).map(|s| s.to_json());
            match json {
                Some(Ok(json)) => json + "\n",
                Some(Err(e)) => {
                    eprintln!("hgc: error: cannot serialize summary: {}", e);
                    std::process::exit(2);
                }
                None => {
                    eprintln!("hgc: no emission to summarize");
                    std::process::exit(1);
                }
            }
        }
        EmitStage::Dot => match state.emission {
            Some(emission) => emission.dot,
            None => {
                eprintln!("hgc: no emission produced");
                std::process::exit(1);
            }
        },
    };

    // ── Write output ──
    let target = match (&cli.output, cli.emit) {
        (Some(path), _) => Some(path.clone()),
        (None, EmitStage::Dot) if options.make_dot || options.make_pdf => {
            Some(Path::new("outputs").join(format!("{}.dot", cli.top)))
        }
        _ => None,
    };
    match target {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("hgc: error: {}: {}", parent.display(), e);
                    std::process::exit(2);
                }
            }
            if let Err(e) = std::fs::write(&path, &text) {
                eprintln!("hgc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            if cli.verbose {
                eprintln!("hgc: wrote {}", path.display());
            }
            if options.make_pdf {
                eprintln!(
                    "hgc: cannot render PDF; run `dot -Tpdf {}` to render it",
                    path.display()
                );
            }
        }
        None => print!("{}", text),
    }
}
