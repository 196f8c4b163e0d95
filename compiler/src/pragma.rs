// pragma.rs — Synthesis directive parsing and annotation scopes
//
// Classifies `#pragma HLS ...` lines attached to a block and maintains the
// annotation state that nodes snapshot at construction: nested unroll and
// tripcount windows, the sticky pipeline flag, and per-variable memory
// directives (ports, resources, partitions) waiting for their array.
//
// Preconditions: blocks are scanned in traversal order; every `push_scope`
//                is paired with a `parse_block` and a `pop_scope`.
// Postconditions: after a balanced scope the factor windows are restored.
// Failure modes: malformed or incomplete directives return a `Diagnostic`
//                carrying the pragma span.
// Side effects: none.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::ast::Span;
use crate::diag::{codes, DiagCode, Diagnostic};
use crate::factor::{FactorHierarchy, StackedFactor};

// ── Directive model ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Complete,
    Cyclic,
    Block,
}

impl PartitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionKind::Complete => "complete",
            PartitionKind::Cyclic => "cyclic",
            PartitionKind::Block => "block",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued `ARRAY_PARTITION` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub kind: PartitionKind,
    pub factor: u32,
    pub dim: u32,
}

/// A recognized directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Interface { port: String, bundle: Option<String> },
    Unroll(u32),
    Pipeline,
    Resource { variable: String, core: String },
    ArrayPartition { variable: String, partition: Partition },
    Inline,
    Tripcount(f64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveError {
    pub code: DiagCode,
    pub message: String,
}

impl DirectiveError {
    fn malformed(message: impl Into<String>) -> Self {
        DirectiveError {
            code: codes::MALFORMED_DIRECTIVE,
            message: message.into(),
        }
    }

    fn incomplete(message: impl Into<String>) -> Self {
        DirectiveError {
            code: codes::INCOMPLETE_DIRECTIVE,
            message: message.into(),
        }
    }

    pub fn into_diagnostic(self, text: &str, span: Span) -> Diagnostic {
        Diagnostic::error(self.code, span, self.message)
            .with_cause(format!("#pragma {}", text), Some(span))
    }
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ── Directive parsing ───────────────────────────────────────────────────────

/// Case-insensitive keyword/value pairs after the directive name.
struct Fields<'t> {
    words: Vec<&'t str>,
}

impl<'t> Fields<'t> {
    /// Value following `key`, if any. The last match wins.
    fn get(&self, key: &str) -> Option<&'t str> {
        let mut found = None;
        for pair in self.words.windows(2) {
            if pair[0].eq_ignore_ascii_case(key) {
                found = Some(pair[1]);
            }
        }
        found
    }

    fn number<T: std::str::FromStr>(&self, key: &str, what: &str) -> Result<Option<T>, DirectiveError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| DirectiveError::malformed(format!("couldn't read {} from '{}'", what, raw))),
        }
    }
}

/// Classify one pragma line. Lines that are not HLS directives, or HLS
/// directives outside the supported set, yield `Ok(None)`.
pub fn parse_directive(text: &str) -> Result<Option<Directive>, DirectiveError> {
    let words: Vec<&str> = text
        .split([' ', '=', '\t'])
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < 2 || !words[0].eq_ignore_ascii_case("HLS") {
        return Ok(None);
    }
    let name = words[1].to_ascii_uppercase();
    let fields = Fields {
        words: words[2..].to_vec(),
    };

    let directive = match name.as_str() {
        "INTERFACE" => {
            let port = fields
                .get("PORT")
                .ok_or_else(|| DirectiveError::incomplete("couldn't find port on interface pragma"))?;
            Directive::Interface {
                port: port.to_string(),
                bundle: fields.get("BUNDLE").map(str::to_string),
            }
        }
        "UNROLL" => {
            let factor: u32 = fields.number("FACTOR", "unroll factor")?.unwrap_or(1);
            if factor == 0 {
                return Err(DirectiveError::malformed("unroll factor must be positive"));
            }
            Directive::Unroll(factor)
        }
        "PIPELINE" => Directive::Pipeline,
        "RESOURCE" => {
            let core = fields.get("CORE");
            let variable = fields.get("VARIABLE");
            let (Some(core), Some(variable)) = (core, variable) else {
                return Err(DirectiveError::incomplete(
                    "couldn't find core or variable on resource pragma",
                ));
            };
            Directive::Resource {
                variable: variable.to_string(),
                core: core.to_string(),
            }
        }
        "ARRAY_PARTITION" => parse_partition(&fields)?,
        "INLINE" => match fields.words.first() {
            Some(w) if w.eq_ignore_ascii_case("ON") => Directive::Inline,
            _ => return Ok(None),
        },
        "TRIPCOUNT" => {
            let avg: f64 = fields
                .number("AVG", "average tripcount")?
                .ok_or_else(|| DirectiveError::incomplete("couldn't find avg on tripcount pragma"))?;
            if avg <= 0.0 {
                return Err(DirectiveError::malformed("average tripcount must be positive"));
            }
            Directive::Tripcount(avg)
        }
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

fn parse_partition(fields: &Fields<'_>) -> Result<Directive, DirectiveError> {
    let kind = fields.get("TYPE");
    let variable = fields.get("VARIABLE");
    let factor: Option<u32> = fields.number("FACTOR", "factor")?;
    let dim: Option<u32> = fields.number("DIM", "dim")?;

    let (Some(kind), Some(variable), Some(dim)) = (kind, variable, dim) else {
        return Err(DirectiveError::incomplete(
            "couldn't find one of type, variable, factor or dim on array partition pragma",
        ));
    };
    let kind = match kind.to_ascii_lowercase().as_str() {
        "complete" => PartitionKind::Complete,
        "cyclic" => PartitionKind::Cyclic,
        "block" => PartitionKind::Block,
        _ => {
            return Err(DirectiveError::malformed(format!(
                "unrecognized partition type: {}",
                kind
            )))
        }
    };
    let factor = match (kind, factor) {
        (PartitionKind::Complete, _) => 1,
        (_, Some(f)) => f,
        (_, None) => {
            return Err(DirectiveError::incomplete(
                "couldn't find one of type, variable, factor or dim on array partition pragma",
            ))
        }
    };
    Ok(Directive::ArrayPartition {
        variable: variable.to_string(),
        partition: Partition { kind, factor, dim },
    })
}

// ── Annotation state ────────────────────────────────────────────────────────

/// What a block scan found that the caller acts on directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockAnnotations {
    pub unroll: u32,
    pub tripcount: f64,
    pub inline: bool,
}

const DEFAULT_PORT_GROUP: &str = "1 Port Ram";

#[derive(Debug, Default)]
pub struct AnnotationParser {
    unroll: FactorHierarchy,
    tripcount: FactorHierarchy,
    pipelined: bool,
    pipeline_stack: Vec<bool>,
    pipeline_tripcount: f64,
    ports: BTreeMap<String, String>,
    resources: HashMap<String, String>,
    partitions: HashMap<String, VecDeque<Partition>>,
}

impl AnnotationParser {
    pub fn new() -> Self {
        AnnotationParser {
            pipeline_tripcount: 1.0,
            ..Default::default()
        }
    }

    /// Scan the directives placed directly in one block and enter its
    /// unroll and tripcount levels.
    pub fn parse_block<'a>(
        &mut self,
        pragmas: impl IntoIterator<Item = (&'a str, Span)>,
    ) -> Result<BlockAnnotations, Diagnostic> {
        let mut found = BlockAnnotations {
            unroll: 1,
            tripcount: 1.0,
            inline: false,
        };
        for (text, span) in pragmas {
            let directive = parse_directive(text).map_err(|e| e.into_diagnostic(text, span))?;
            let Some(directive) = directive else {
                log::debug!("ignoring pragma '{}'", text);
                continue;
            };
            match directive {
                Directive::Interface { port, bundle } => {
                    if let Some(bundle) = bundle {
                        self.ports.insert(port, bundle);
                    }
                }
                Directive::Unroll(factor) => found.unroll = factor,
                Directive::Pipeline => self.pipelined = true,
                Directive::Resource { variable, core } => {
                    self.resources.insert(variable, core);
                }
                Directive::ArrayPartition {
                    variable,
                    partition,
                } => self.partitions.entry(variable).or_default().push_back(partition),
                Directive::Inline => found.inline = true,
                Directive::Tripcount(avg) => found.tripcount = avg,
            }
        }

        self.unroll.enter(f64::from(found.unroll));
        self.tripcount.enter(found.tripcount);

        if self.pipelined && !self.previously_pipelined() {
            self.pipeline_tripcount = self.tripcount.product();
        }
        Ok(found)
    }

    /// Whether a function body asks to be inlined. Leaves all state untouched.
    pub fn requests_inline<'a>(
        pragmas: impl IntoIterator<Item = (&'a str, Span)>,
    ) -> Result<bool, Diagnostic> {
        let mut inline = false;
        for (text, span) in pragmas {
            if let Some(Directive::Inline) =
                parse_directive(text).map_err(|e| e.into_diagnostic(text, span))?
            {
                inline = true;
            }
        }
        Ok(inline)
    }

    /// Open a structured construct.
    pub fn push_scope(&mut self) {
        self.pipeline_stack.push(self.pipelined);
    }

    /// Close the construct opened by the matching `push_scope`/`parse_block`.
    pub fn pop_scope(&mut self) {
        self.unroll.exit();
        self.tripcount.exit();
        self.pipelined = self.pipeline_stack.pop().unwrap_or(false);
    }

    /// A loop condition runs at the enclosing loop's frequency.
    pub fn enter_loop_condition(&mut self) {
        self.unroll.pause();
        self.tripcount.pause();
    }

    pub fn exit_loop_condition(&mut self) {
        self.unroll.unpause();
        self.tripcount.unpause();
    }

    /// A loop increment runs once per iteration, however far the body unrolls.
    pub fn enter_loop_increment(&mut self) {
        self.unroll.pause();
    }

    pub fn exit_loop_increment(&mut self) {
        self.unroll.unpause();
    }

    pub fn unroll(&self) -> StackedFactor {
        self.unroll.snapshot()
    }

    pub fn tripcount(&self) -> StackedFactor {
        self.tripcount.snapshot()
    }

    pub fn pipelined(&self) -> bool {
        self.pipelined
    }

    pub fn previously_pipelined(&self) -> bool {
        self.pipeline_stack.last().copied().unwrap_or(false)
    }

    /// Tripcount product captured when the outermost pipelined block opened.
    pub fn pipeline_tripcount(&self) -> f64 {
        self.pipeline_tripcount
    }

    pub fn port_group(&self, variable: &str) -> &str {
        self.ports
            .get(variable)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PORT_GROUP)
    }

    pub fn ports(&self) -> &BTreeMap<String, String> {
        &self.ports
    }

    pub fn resource(&self, variable: &str) -> Option<&str> {
        self.resources.get(variable).map(String::as_str)
    }

    /// Drain the partitions queued for `variable`, in directive order.
    pub fn take_partitions(&mut self, variable: &str) -> Vec<Partition> {
        self.partitions
            .remove(variable)
            .map(Vec::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    fn directive(text: &str) -> Directive {
        let Ok(Some(d)) = parse_directive(text) else {
            panic!("expected directive from '{}'", text)
        };
        d
    }

    #[test]
    fn unroll_factor_is_read() {
        assert_eq!(directive("HLS unroll factor=4"), Directive::Unroll(4));
        assert_eq!(directive("hls UNROLL"), Directive::Unroll(1));
        assert_eq!(directive("HLS UNROLL factor = 8"), Directive::Unroll(8));
    }

    #[test]
    fn bad_unroll_factor_is_malformed() {
        let err = parse_directive("HLS UNROLL factor=x").unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_DIRECTIVE);
    }

    #[test]
    fn non_hls_pragmas_are_ignored() {
        assert_eq!(parse_directive("once").unwrap(), None);
        assert_eq!(parse_directive("HLS dataflow").unwrap(), None);
        assert_eq!(parse_directive("HLS INLINE off").unwrap(), None);
    }

    #[test]
    fn complete_partition_needs_no_factor() {
        let Directive::ArrayPartition {
            variable,
            partition,
        } = directive("HLS array_partition variable=buf type=complete dim=1")
        else {
            panic!("expected ArrayPartition")
        };
        assert_eq!(variable, "buf");
        assert_eq!(
            partition,
            Partition {
                kind: PartitionKind::Complete,
                factor: 1,
                dim: 1
            }
        );
    }

    #[test]
    fn cyclic_partition_needs_factor() {
        let err = parse_directive("HLS ARRAY_PARTITION variable=a type=cyclic dim=1").unwrap_err();
        assert_eq!(err.code, codes::INCOMPLETE_DIRECTIVE);
        let err = parse_directive("HLS ARRAY_PARTITION variable=a type=diagonal factor=2 dim=1")
            .unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_DIRECTIVE);
    }

    #[test]
    fn tripcount_requires_avg() {
        assert_eq!(
            directive("HLS TRIPCOUNT min=1 avg=12.5 max=20"),
            Directive::Tripcount(12.5)
        );
        let err = parse_directive("HLS TRIPCOUNT min=1 max=20").unwrap_err();
        assert_eq!(err.code, codes::INCOMPLETE_DIRECTIVE);
    }

    #[test]
    fn resource_requires_core_and_variable() {
        assert_eq!(
            directive("HLS RESOURCE variable=buf core=RAM_2P_BRAM"),
            Directive::Resource {
                variable: "buf".into(),
                core: "RAM_2P_BRAM".into()
            }
        );
        assert!(parse_directive("HLS RESOURCE variable=buf").is_err());
    }

    #[test]
    fn block_scan_enters_factor_levels() {
        let mut p = AnnotationParser::new();
        p.push_scope();
        let found = p
            .parse_block([("HLS UNROLL factor=4", sp()), ("HLS TRIPCOUNT avg=10", sp())])
            .expect("valid directives");
        assert_eq!(found.unroll, 4);
        assert_eq!(p.unroll().first, 4.0);
        assert_eq!(p.tripcount().full, 10.0);
        p.pop_scope();
        assert_eq!(p.unroll().full, 1.0);
        assert_eq!(p.tripcount().full, 1.0);
    }

    #[test]
    fn pipeline_captures_tripcount_once() {
        let mut p = AnnotationParser::new();
        p.push_scope();
        p.parse_block([("HLS PIPELINE", sp()), ("HLS TRIPCOUNT avg=8", sp())])
            .unwrap();
        assert!(p.pipelined());
        assert!(!p.previously_pipelined());
        assert_eq!(p.pipeline_tripcount(), 8.0);

        p.push_scope();
        p.parse_block([("HLS TRIPCOUNT avg=4", sp())]).unwrap();
        assert!(p.previously_pipelined());
        assert_eq!(p.pipeline_tripcount(), 8.0);
        p.pop_scope();
        p.pop_scope();
        assert!(!p.pipelined());
    }

    #[test]
    fn condition_pauses_both_windows() {
        let mut p = AnnotationParser::new();
        p.push_scope();
        p.parse_block([("HLS UNROLL factor=2", sp()), ("HLS TRIPCOUNT avg=3", sp())])
            .unwrap();
        p.enter_loop_condition();
        assert_eq!(p.unroll().full, 1.0);
        assert_eq!(p.tripcount().full, 1.0);
        p.exit_loop_condition();
        p.enter_loop_increment();
        assert_eq!(p.unroll().full, 1.0);
        assert_eq!(p.tripcount().full, 3.0);
        p.exit_loop_increment();
        assert_eq!(p.unroll().full, 2.0);
    }

    #[test]
    fn memory_directives_wait_for_their_array() {
        let mut p = AnnotationParser::new();
        p.parse_block([
            ("HLS INTERFACE m_axi port=a bundle=gmem", sp()),
            ("HLS ARRAY_PARTITION variable=a type=block factor=2 dim=1", sp()),
            ("HLS ARRAY_PARTITION variable=a type=complete dim=2", sp()),
        ])
        .unwrap();
        assert_eq!(p.port_group("a"), "gmem");
        assert_eq!(p.port_group("b"), "1 Port Ram");
        let parts = p.take_partitions("a");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].kind, PartitionKind::Block);
        assert!(p.take_partitions("a").is_empty());
    }

    #[test]
    fn requests_inline_is_stateless() {
        assert!(AnnotationParser::requests_inline([("HLS INLINE ON", sp())]).unwrap());
        assert!(!AnnotationParser::requests_inline([("HLS PIPELINE", sp())]).unwrap());
    }
}
