// AST node types for synthesizable C kernel sources.
//
// Covers the restricted C subset accepted by high-level-synthesis flows:
// struct definitions, global declarations, functions, structured statements
// and the C expression grammar. Every node carries a `SimpleSpan`.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct;
//                 `Display` on expressions yields canonical C text.
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
    pub span: Span,
}

impl TranslationUnit {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.items.iter().filter_map(|item| match item {
            Item::Struct(s) => Some(s),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Struct(StructDef),
    Global(Declaration),
    /// Definition (with body) or prototype (without).
    Function(Function),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── Types ──

/// Static C type of a declaration or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    /// Canonical scalar spelling, e.g. `int`, `unsigned char`, `double`.
    Scalar(String),
    Struct(String),
    Void,
    /// Element type and static length (`None` for `[]`).
    Array(Box<CType>, Option<u64>),
    Pointer(Box<CType>),
}

impl CType {
    pub fn is_array(&self) -> bool {
        matches!(self, CType::Array(..))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    /// Innermost non-array, non-pointer type.
    pub fn base(&self) -> &CType {
        match self {
            CType::Array(elem, _) | CType::Pointer(elem) => elem.base(),
            other => other,
        }
    }

    /// One level of indexing: array element or pointee.
    pub fn element(&self) -> Option<&CType> {
        match self {
            CType::Array(elem, _) | CType::Pointer(elem) => Some(elem),
            _ => None,
        }
    }

    /// Total element count across all static dimensions.
    pub fn element_count(&self) -> Option<u64> {
        match self {
            CType::Array(elem, len) => {
                let inner = if elem.is_array() {
                    elem.element_count()?
                } else {
                    1
                };
                len.map(|n| n * inner)
            }
            _ => None,
        }
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            CType::Struct(name) => Some(name),
            CType::Pointer(inner) => inner.struct_name(),
            _ => None,
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Scalar(name) => write!(f, "{}", name),
            CType::Struct(name) => write!(f, "struct {}", name),
            CType::Void => write!(f, "void"),
            CType::Pointer(inner) => write!(f, "{}*", inner),
            CType::Array(..) => {
                write!(f, "{}", self.base())?;
                let mut cur = self;
                while let CType::Array(elem, len) = cur {
                    match len {
                        Some(n) => write!(f, "[{}]", n)?,
                        None => write!(f, "[]")?,
                    }
                    cur = elem;
                }
                Ok(())
            }
        }
    }
}

// ── Declarations ──

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Ident,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Ident,
    pub ty: CType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub return_type: CType,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: CType,
    pub is_const: bool,
}

/// `const? type declarator (, declarator)* ;`
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub is_const: bool,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: Ident,
    pub ty: CType,
    pub init: Option<Initializer>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Expr(Expr),
    Aggregate(Vec<Initializer>, Span),
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    /// Raw text of the directives placed directly in this block.
    pub fn pragmas(&self) -> impl Iterator<Item = (&str, Span)> {
        self.stmts.iter().filter_map(|s| match &s.kind {
            StmtKind::Pragma(text) => Some((text.as_str(), s.span)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    /// Statements of a loop or branch body; a lone statement is its own body.
    pub fn body_stmts(&self) -> &[Stmt] {
        match &self.kind {
            StmtKind::Block(block) => &block.stmts,
            _ => std::slice::from_ref(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Decl(Declaration),
    Expr(Expr),
    Return(Option<Expr>),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Break,
    Block(Block),
    /// `#pragma` line, text after the keyword.
    Pragma(String),
    Empty,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit {
        value: i64,
        long: bool,
        unsigned: bool,
    },
    FloatLit {
        value: f64,
        single: bool,
    },
    BoolLit(bool),
    Var(Ident),
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: Ident,
        arrow: bool,
    },
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Cast {
        ty: CType,
        operand: Box<Expr>,
    },
    SizeOf(Box<Expr>),
    SizeOfType(CType),
    Comma {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Deref,
    AddressOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Rem => "%=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
            AssignOp::And => "&=",
            AssignOp::Or => "|=",
            AssignOp::Xor => "^=",
        }
    }
}

// ── Canonical text ──
//
// Used as the address-compute memo key and in diagnostics. Compound operands
// are parenthesized so that distinct trees never print identically.

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match &e.kind {
        ExprKind::Binary { .. }
        | ExprKind::Assign { .. }
        | ExprKind::Ternary { .. }
        | ExprKind::Comma { .. }
        | ExprKind::Cast { .. } => write!(f, "({})", e),
        _ => write!(f, "{}", e),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::IntLit {
                value,
                long,
                unsigned,
            } => {
                write!(f, "{}", value)?;
                if *unsigned {
                    write!(f, "u")?;
                }
                if *long {
                    write!(f, "ll")?;
                }
                Ok(())
            }
            ExprKind::FloatLit { value, single } => {
                write!(f, "{:?}", value)?;
                if *single {
                    write!(f, "f")?;
                }
                Ok(())
            }
            ExprKind::BoolLit(b) => write!(f, "{}", b),
            ExprKind::Var(id) => write!(f, "{}", id.name),
            ExprKind::Index { base, index } => {
                write_operand(f, base)?;
                write!(f, "[{}]", index)
            }
            ExprKind::Member { base, field, arrow } => {
                write_operand(f, base)?;
                write!(f, "{}{}", if *arrow { "->" } else { "." }, field.name)
            }
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::PostInc => {
                    write_operand(f, operand)?;
                    write!(f, "++")
                }
                UnaryOp::PostDec => {
                    write_operand(f, operand)?;
                    write!(f, "--")
                }
                _ => {
                    let sym = match op {
                        UnaryOp::Neg => "-",
                        UnaryOp::Plus => "+",
                        UnaryOp::Not => "!",
                        UnaryOp::BitNot => "~",
                        UnaryOp::Deref => "*",
                        UnaryOp::AddressOf => "&",
                        UnaryOp::PreInc => "++",
                        _ => "--",
                    };
                    write!(f, "{}", sym)?;
                    write_operand(f, operand)
                }
            },
            ExprKind::Binary { op, lhs, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            ExprKind::Assign { op, lhs, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                write_operand(f, cond)?;
                write!(f, " ? ")?;
                write_operand(f, then_expr)?;
                write!(f, " : ")?;
                write_operand(f, else_expr)
            }
            ExprKind::Cast { ty, operand } => {
                write!(f, "({})", ty)?;
                write_operand(f, operand)
            }
            ExprKind::SizeOf(operand) => write!(f, "sizeof({})", operand),
            ExprKind::SizeOfType(ty) => write!(f, "sizeof({})", ty),
            ExprKind::Comma { lhs, rhs } => write!(f, "{}, {}", lhs, rhs),
        }
    }
}

impl fmt::Display for StmtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmtKind::Decl(decl) => {
                for (i, d) in decl.declarators.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", d.ty, d.name.name)?;
                }
                write!(f, ";")
            }
            StmtKind::Expr(e) => write!(f, "{};", e),
            StmtKind::Return(Some(e)) => write!(f, "return {};", e),
            StmtKind::Return(None) => write!(f, "return;"),
            StmtKind::For { .. } => write!(f, "for (...)"),
            StmtKind::While { cond, .. } => write!(f, "while ({})", cond),
            StmtKind::DoWhile { cond, .. } => write!(f, "do ... while ({})", cond),
            StmtKind::If { cond, .. } => write!(f, "if ({})", cond),
            StmtKind::Break => write!(f, "break;"),
            StmtKind::Block(_) => write!(f, "{{ ... }}"),
            StmtKind::Pragma(text) => write!(f, "#pragma {}", text),
            StmtKind::Empty => write!(f, ";"),
        }
    }
}
