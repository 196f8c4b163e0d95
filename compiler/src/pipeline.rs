// pipeline.rs — Compilation state and stage orchestration
//
// Holds every stage artifact (AST, resolution tables, lowered graph, DOT
// emission) and runs the stages up to a requested terminal stage. Also
// computes build provenance and the JSON summary used by `--emit summary`.
//
// Preconditions: `CompilationState::new` received the source text, top
//                function name and switch set.
// Postconditions: artifacts for every stage up to the terminal one are
//                 populated, or `has_error` is set and the failing stage is
//                 returned.
// Failure modes: any stage emitting error-level diagnostics.
// Side effects: calls `on_stage_complete` after each stage; logs stage timings.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::ast::TranslationUnit;
use crate::diag::{DiagLevel, Diagnostic};
use crate::emit::Emission;
use crate::lower::LoweredProgram;
use crate::options::EmitOptions;
use crate::resolve::ResolvedUnit;

// ── Stages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Parse,
    Resolve,
    Lower,
    Emit,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Parse, Stage::Resolve, Stage::Lower, Stage::Emit];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Resolve => "resolve",
            Stage::Lower => "lower",
            Stage::Emit => "emit",
        }
    }
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Provenance metadata identifying one compilation.
///
/// `source_hash`: SHA-256 of the raw kernel source text.
/// `options_fingerprint`: SHA-256 of the compact JSON of the switch set and
/// top function name.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub options_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn options_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.options_fingerprint)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from source text, top function and switches.
pub fn compute_provenance(source: &str, top: &str, options: &EmitOptions) -> Provenance {
    let canonical = serde_json::json!({ "top": top, "options": options }).to_string();
    Provenance {
        source_hash: sha256(source.as_bytes()),
        options_fingerprint: sha256(canonical.as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ───────────────────────────────────────────────────────

/// All compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub source: String,
    pub top: String,
    pub options: EmitOptions,
    pub unit: Option<TranslationUnit>,
    pub resolved: Option<ResolvedUnit>,
    pub lowered: Option<LoweredProgram>,
    pub emission: Option<Emission>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(source: impl Into<String>, top: impl Into<String>, options: EmitOptions) -> Self {
        Self {
            source: source.into(),
            top: top.into(),
            options,
            unit: None,
            resolved: None,
            lowered: None,
            emission: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }
}

/// Pipeline execution failed due to error-level diagnostics in a stage.
/// The diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_stage: Stage,
}

fn finish_stage(
    state: &mut CompilationState,
    stage: Stage,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    on_stage_complete: &mut impl FnMut(Stage, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_stage_complete(stage, &diags);
    let is_err = diags.iter().any(|d| d.is_error());
    state.diagnostics.extend(diags);
    log::debug!(
        "{} complete, {:.1}ms",
        stage.name(),
        elapsed.as_secs_f64() * 1000.0
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_stage: stage,
        });
    }
    Ok(())
}

/// Internal invariant failure: a stage ran without its input artifact.
fn missing(stage: Stage) -> PipelineError {
    log::warn!("{} ran without its input artifact", stage.name());
    PipelineError {
        failing_stage: stage,
    }
}

// ── Runner ──────────────────────────────────────────────────────────────────

/// Run every stage up to and including `terminal`.
///
/// Per-stage sequence: execute → on_stage_complete(callback) → log → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: Stage,
    mut on_stage_complete: impl FnMut(Stage, &[Diagnostic]),
) -> Result<(), PipelineError> {
    state.provenance = Some(compute_provenance(&state.source, &state.top, &state.options));
    log::debug!("enabled switches: {:?}", state.options.enabled());

    for stage in Stage::ALL.into_iter().filter(|s| *s <= terminal) {
        let t = Instant::now();
        let diags = match stage {
            Stage::Parse => {
                let result = crate::parser::parse(&state.source);
                state.unit = result.unit;
                let mut diags: Vec<Diagnostic> = result
                    .errors
                    .iter()
                    .map(|e| Diagnostic::new(DiagLevel::Error, *e.span(), e.to_string()))
                    .collect();
                if state.unit.is_none() && diags.is_empty() {
                    diags.push(Diagnostic::new(
                        DiagLevel::Error,
                        (0..0).into(),
                        "parse failed with no output",
                    ));
                }
                diags
            }
            Stage::Resolve => {
                let unit = state.unit.as_ref().ok_or_else(|| missing(stage))?;
                let result = crate::resolve::resolve(unit);
                state.resolved = Some(result.resolved);
                result.diagnostics
            }
            Stage::Lower => {
                let unit = state.unit.as_ref().ok_or_else(|| missing(stage))?;
                let resolved = state.resolved.as_ref().ok_or_else(|| missing(stage))?;
                let result = crate::lower::lower(unit, resolved, &state.top, &state.options);
                state.lowered = result.lowered;
                result.diagnostics
            }
            Stage::Emit => {
                let lowered = state.lowered.as_ref().ok_or_else(|| missing(stage))?;
                state.emission = Some(crate::emit::emit(lowered, &state.options));
                Vec::new()
            }
        };
        finish_stage(state, stage, diags, t.elapsed(), &mut on_stage_complete)?;
    }
    Ok(())
}

/// Compile `source` straight to DOT text.
pub fn compile(source: &str, top: &str, options: &EmitOptions) -> Result<String, Vec<Diagnostic>> {
    let mut state = CompilationState::new(source, top, options.clone());
    match run_pipeline(&mut state, Stage::Emit, |_, _| {}) {
        Ok(()) => match state.emission {
            Some(emission) => Ok(emission.dot),
            None => Err(state.diagnostics),
        },
        Err(_) => Err(state.diagnostics),
    }
}

// ── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSummary {
    pub name: String,
    pub function_id: u32,
    pub defined: bool,
    pub calls: u64,
    pub call_sites: u32,
}

/// Machine-readable account of one compilation.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub top: String,
    pub compiler_version: String,
    pub source_hash: String,
    pub options_fingerprint: String,
    pub switches: Vec<&'static str>,
    pub nodes: usize,
    pub edges: usize,
    pub node_categories: BTreeMap<String, usize>,
    pub edge_categories: BTreeMap<String, usize>,
    pub functions: Vec<FunctionSummary>,
    pub ports: BTreeMap<String, String>,
}

impl Summary {
    /// Build from a state that ran through `Stage::Emit`.
    pub fn from_state(state: &CompilationState) -> Option<Summary> {
        let lowered = state.lowered.as_ref()?;
        let emission = state.emission.as_ref()?;
        let provenance = state
            .provenance
            .clone()
            .unwrap_or_else(|| compute_provenance(&state.source, &state.top, &state.options));
        let functions = lowered
            .functions
            .iter()
            .filter(|f| f.lowered)
            .map(|f| {
                let stats = f.stats.unwrap_or_default();
                FunctionSummary {
                    name: f.name.clone(),
                    function_id: f.function_id,
                    defined: f.has_body,
                    calls: stats.calls,
                    call_sites: stats.sites,
                }
            })
            .collect();
        Some(Summary {
            top: state.top.clone(),
            compiler_version: provenance.compiler_version.to_string(),
            source_hash: provenance.source_hash_hex(),
            options_fingerprint: provenance.options_fingerprint_hex(),
            switches: state.options.enabled(),
            nodes: emission.stats.nodes,
            edges: emission.stats.edges,
            node_categories: emission.stats.node_categories.clone(),
            edge_categories: emission.stats.edge_categories.clone(),
            functions,
            ports: lowered.ports.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
