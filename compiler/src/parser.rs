// Parser for synthesizable C kernel sources.
//
// Parses a token stream (from the lexer) into a `TranslationUnit`: struct
// definitions, global declarations, function prototypes and definitions,
// structured statements and the full C expression precedence ladder.
// Uses chumsky combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub unit: Option<TranslationUnit>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a kernel source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = unit_parser(source);
    let (unit, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        unit,
        errors: all_errors,
    }
}

// ── AST construction helpers ──

fn join(a: Span, b: Span) -> Span {
    (a.start..b.end).into()
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        span: join(lhs.span, rhs.span),
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

fn comma_chain(mut exprs: Vec<Expr>) -> Expr {
    let first = exprs.remove(0);
    exprs.into_iter().fold(first, |lhs, rhs| Expr {
        span: join(lhs.span, rhs.span),
        kind: ExprKind::Comma {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    })
}

/// Apply a declarator's pointer stars and array dimensions to a base type.
/// `int a[10][20]` is an array of 10 arrays of 20 ints.
fn declared_type(base: &CType, stars: usize, dims: &[Option<u64>]) -> CType {
    let mut ty = base.clone();
    for _ in 0..stars {
        ty = CType::Pointer(Box::new(ty));
    }
    for dim in dims.iter().rev() {
        ty = CType::Array(Box::new(ty), *dim);
    }
    ty
}

/// Canonical spelling of a scalar type-specifier sequence.
fn canonical_scalar(words: &[Token]) -> Option<String> {
    let mut sign: Option<&str> = None;
    let mut longs = 0;
    let mut saw_int = false;
    let mut base: Option<&str> = None;
    for word in words {
        match word {
            Token::Unsigned | Token::Signed if sign.is_some() => return None,
            Token::Unsigned => sign = Some("unsigned"),
            Token::Signed => sign = Some("signed"),
            Token::Long => longs += 1,
            Token::Int if saw_int => return None,
            Token::Int => saw_int = true,
            _ if base.is_some() => return None,
            Token::Char => base = Some("char"),
            Token::Short => base = Some("short"),
            Token::Float => base = Some("float"),
            Token::Double => base = Some("double"),
            Token::Bool => base = Some("bool"),
            _ => return None,
        }
    }
    let prefix = sign.map(|s| format!("{} ", s)).unwrap_or_default();
    let name = match (base, longs) {
        (Some("float" | "double" | "bool"), _) if sign.is_some() || longs > 0 || saw_int => {
            return None
        }
        (Some(b @ ("float" | "double" | "bool")), _) => b.to_string(),
        (Some("char"), 0) if !saw_int => format!("{}char", prefix),
        (Some("short"), 0) => format!("{}short", prefix),
        (None, 1) => format!("{}long", prefix),
        (None, 2) => format!("{}long long", prefix),
        (None, 0) => format!("{}int", if sign.is_some() { prefix } else { String::new() }),
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Clone)]
enum Prefix {
    Op(UnaryOp),
    Cast(CType),
    SizeOf,
}

#[derive(Debug, Clone)]
enum Postfix {
    Index(Expr),
    Member(Ident, bool),
    Inc,
    Dec,
}

// ── Main parser builder ──
//
// All grammar rules are built inside `unit_parser` so that the `source`
// reference is captured once and shared by all combinators. This avoids
// complex lifetime annotations on per-rule helper functions.

fn unit_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, TranslationUnit, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Types ──

    let scalar_type = select! {
        Token::Unsigned => Token::Unsigned,
        Token::Signed => Token::Signed,
        Token::Int => Token::Int,
        Token::Char => Token::Char,
        Token::Short => Token::Short,
        Token::Long => Token::Long,
        Token::Float => Token::Float,
        Token::Double => Token::Double,
        Token::Bool => Token::Bool,
    }
    .repeated()
    .at_least(1)
    .collect::<Vec<_>>()
    .try_map(|words, span| {
        canonical_scalar(&words)
            .map(CType::Scalar)
            .ok_or_else(|| Rich::custom(span, "invalid combination of type specifiers"))
    });

    let type_name = choice((
        scalar_type,
        just(Token::Void).to(CType::Void),
        just(Token::Struct)
            .ignore_then(ident.clone())
            .map(|id| CType::Struct(id.name)),
    ))
    .boxed();

    let qualifiers = just(Token::Qualifier).repeated();

    // `static const unsigned int` → (is_const, base type)
    let decl_spec = qualifiers
        .clone()
        .ignore_then(just(Token::Const).or_not())
        .then_ignore(qualifiers.clone())
        .then(type_name.clone())
        .then(just(Token::Const).or_not())
        .map(|((c1, ty), c2)| (c1.is_some() || c2.is_some(), ty))
        .boxed();

    let array_dim = select! { Token::IntLit(lit) => lit.value as u64 }
        .or_not()
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    // '*'* IDENT ('[' INT? ']')*
    let declarator = just(Token::Star)
        .repeated()
        .count()
        .then(ident.clone())
        .then(array_dim.repeated().collect::<Vec<_>>())
        .boxed();

    // Abstract type for casts: type '*'*
    let cast_type = type_name
        .clone()
        .then(just(Token::Star).repeated().count())
        .map(|(base, stars)| declared_type(&base, stars, &[]));

    // ── Expressions ──

    let expr = recursive(|expr| {
        let literal = select! {
            Token::IntLit(lit) => ExprKind::IntLit {
                value: lit.value,
                long: lit.long,
                unsigned: lit.unsigned,
            },
            Token::FloatLit(lit) => ExprKind::FloatLit {
                value: lit.value,
                single: lit.single,
            },
            Token::True => ExprKind::BoolLit(true),
            Token::False => ExprKind::BoolLit(false),
        }
        .map_with(|kind, e| Expr {
            kind,
            span: e.span(),
        });

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call = ident
            .clone()
            .then(args)
            .map_with(|(callee, args), e| Expr {
                kind: ExprKind::Call { callee, args },
                span: e.span(),
            });

        let var = ident.clone().map(|id| Expr {
            span: id.span,
            kind: ExprKind::Var(id),
        });

        let paren = expr
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(comma_chain);

        let sizeof_type = just(Token::Sizeof)
            .ignore_then(
                cast_type
                    .clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|ty, e| Expr {
                kind: ExprKind::SizeOfType(ty),
                span: e.span(),
            });

        let primary = choice((literal, sizeof_type, call, var, paren)).boxed();

        // ── Postfix: [i] .f ->f ++ -- ──

        let postfix_op = choice((
            expr.clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(Postfix::Index),
            just(Token::Dot)
                .ignore_then(ident.clone())
                .map(|id| Postfix::Member(id, false)),
            just(Token::Arrow)
                .ignore_then(ident.clone())
                .map(|id| Postfix::Member(id, true)),
            just(Token::PlusPlus).to(Postfix::Inc),
            just(Token::MinusMinus).to(Postfix::Dec),
        ))
        .map_with(|op, e| (op, e.span()));

        let postfix = primary
            .foldl(postfix_op.repeated(), |lhs, (op, op_span)| {
                let span = join(lhs.span, op_span);
                let kind = match op {
                    Postfix::Index(index) => ExprKind::Index {
                        base: Box::new(lhs),
                        index: Box::new(index),
                    },
                    Postfix::Member(field, arrow) => ExprKind::Member {
                        base: Box::new(lhs),
                        field,
                        arrow,
                    },
                    Postfix::Inc => ExprKind::Unary {
                        op: UnaryOp::PostInc,
                        operand: Box::new(lhs),
                    },
                    Postfix::Dec => ExprKind::Unary {
                        op: UnaryOp::PostDec,
                        operand: Box::new(lhs),
                    },
                };
                Expr { kind, span }
            })
            .boxed();

        // ── Prefix: - + ! ~ * & ++ -- (cast) sizeof ──

        let prefix_op = choice((
            cast_type
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(Prefix::Cast),
            select! {
                Token::Minus => Prefix::Op(UnaryOp::Neg),
                Token::Plus => Prefix::Op(UnaryOp::Plus),
                Token::Bang => Prefix::Op(UnaryOp::Not),
                Token::Tilde => Prefix::Op(UnaryOp::BitNot),
                Token::Star => Prefix::Op(UnaryOp::Deref),
                Token::Amp => Prefix::Op(UnaryOp::AddressOf),
                Token::PlusPlus => Prefix::Op(UnaryOp::PreInc),
                Token::MinusMinus => Prefix::Op(UnaryOp::PreDec),
                Token::Sizeof => Prefix::SizeOf,
            },
        ))
        .map_with(|op, e| (op, e.span()));

        let unary = prefix_op
            .repeated()
            .foldr(postfix, |(op, op_span), operand: Expr| {
                let span = join(op_span, operand.span);
                let kind = match op {
                    Prefix::Op(op) => ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    Prefix::Cast(ty) => ExprKind::Cast {
                        ty,
                        operand: Box::new(operand),
                    },
                    Prefix::SizeOf => ExprKind::SizeOf(Box::new(operand)),
                };
                Expr { kind, span }
            })
            .boxed();

        // ── Binary precedence ladder ──

        let product = unary
            .clone()
            .foldl(
                select! {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                }
                .then(unary)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                select! {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Sub,
                }
                .then(product)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let shift = sum
            .clone()
            .foldl(
                select! {
                    Token::Shl => BinaryOp::Shl,
                    Token::Shr => BinaryOp::Shr,
                }
                .then(sum)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let relational = shift
            .clone()
            .foldl(
                select! {
                    Token::Lt => BinaryOp::Lt,
                    Token::Le => BinaryOp::Le,
                    Token::Gt => BinaryOp::Gt,
                    Token::Ge => BinaryOp::Ge,
                }
                .then(shift)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let equality = relational
            .clone()
            .foldl(
                select! {
                    Token::EqEq => BinaryOp::Eq,
                    Token::Ne => BinaryOp::Ne,
                }
                .then(relational)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let bit_and = equality
            .clone()
            .foldl(
                just(Token::Amp).to(BinaryOp::BitAnd).then(equality).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let bit_xor = bit_and
            .clone()
            .foldl(
                just(Token::Caret).to(BinaryOp::BitXor).then(bit_and).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let bit_or = bit_xor
            .clone()
            .foldl(
                just(Token::Pipe).to(BinaryOp::BitOr).then(bit_xor).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let logical_and = bit_or
            .clone()
            .foldl(
                just(Token::AndAnd)
                    .to(BinaryOp::LogicalAnd)
                    .then(bit_or)
                    .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let logical_or = logical_and
            .clone()
            .foldl(
                just(Token::OrOr)
                    .to(BinaryOp::LogicalOr)
                    .then(logical_and)
                    .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        // ── Ternary and assignment (right-associative) ──

        let ternary = logical_or
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr.clone())
                    .or_not(),
            )
            .map(|(cond, arms)| match arms {
                Some((then_expr, else_expr)) => Expr {
                    span: join(cond.span, else_expr.span),
                    kind: ExprKind::Ternary {
                        cond: Box::new(cond),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    },
                },
                None => cond,
            })
            .boxed();

        let assign_op = select! {
            Token::Assign => AssignOp::Assign,
            Token::PlusAssign => AssignOp::Add,
            Token::MinusAssign => AssignOp::Sub,
            Token::StarAssign => AssignOp::Mul,
            Token::SlashAssign => AssignOp::Div,
            Token::PercentAssign => AssignOp::Rem,
            Token::ShlAssign => AssignOp::Shl,
            Token::ShrAssign => AssignOp::Shr,
            Token::AmpAssign => AssignOp::And,
            Token::PipeAssign => AssignOp::Or,
            Token::CaretAssign => AssignOp::Xor,
        };

        ternary
            .then(assign_op.then(expr).or_not())
            .map(|(lhs, rhs)| match rhs {
                Some((op, rhs)) => Expr {
                    span: join(lhs.span, rhs.span),
                    kind: ExprKind::Assign {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                },
                None => lhs,
            })
    });

    // Full expression including the comma operator.
    let full_expr = expr
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(comma_chain)
        .boxed();

    // ── Declarations ──

    let initializer = recursive(|init| {
        init.separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|items, e| Initializer::Aggregate(items, e.span()))
            .or(expr.clone().map(Initializer::Expr))
    });

    let declaration = decl_spec
        .clone()
        .then(
            declarator
                .clone()
                .then(just(Token::Assign).ignore_then(initializer).or_not())
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map_with(|((is_const, base), decls), e| Declaration {
            is_const,
            declarators: decls
                .into_iter()
                .map(|(((stars, name), dims), init)| Declarator {
                    ty: declared_type(&base, stars, &dims),
                    name,
                    init,
                })
                .collect(),
            span: e.span(),
        })
        .then_ignore(just(Token::Semi))
        .boxed();

    // ── Statements ──

    let stmt = recursive(|stmt| {
        let block = stmt
            .clone()
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|stmts, e| Block {
                stmts,
                span: e.span(),
            });

        let expr_stmt = full_expr
            .clone()
            .then_ignore(just(Token::Semi))
            .map(StmtKind::Expr);

        let decl_stmt = declaration.clone().map(StmtKind::Decl);

        let for_init = choice((
            decl_stmt.clone().map_with(|kind, e| Some(Box::new(Stmt {
                kind,
                span: e.span(),
            }))),
            expr_stmt.clone().map_with(|kind, e| Some(Box::new(Stmt {
                kind,
                span: e.span(),
            }))),
            just(Token::Semi).to(None),
        ));

        let for_stmt = just(Token::For)
            .ignore_then(
                for_init
                    .then(full_expr.clone().or_not())
                    .then_ignore(just(Token::Semi))
                    .then(full_expr.clone().or_not())
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .then(stmt.clone())
            .map(|(((init, cond), step), body)| StmtKind::For {
                init,
                cond,
                step,
                body: Box::new(body),
            });

        let paren_cond = full_expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let while_stmt = just(Token::While)
            .ignore_then(paren_cond.clone())
            .then(stmt.clone())
            .map(|(cond, body)| StmtKind::While {
                cond,
                body: Box::new(body),
            });

        let do_while = just(Token::Do)
            .ignore_then(stmt.clone())
            .then_ignore(just(Token::While))
            .then(paren_cond.clone())
            .then_ignore(just(Token::Semi))
            .map(|(body, cond)| StmtKind::DoWhile {
                body: Box::new(body),
                cond,
            });

        let if_stmt = just(Token::If)
            .ignore_then(paren_cond)
            .then(stmt.clone())
            .then(just(Token::Else).ignore_then(stmt.clone()).or_not())
            .map(|((cond, then_branch), else_branch)| StmtKind::If {
                cond,
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            });

        let return_stmt = just(Token::Return)
            .ignore_then(full_expr.clone().or_not())
            .then_ignore(just(Token::Semi))
            .map(StmtKind::Return);

        let break_stmt = just(Token::Break)
            .then(just(Token::Semi))
            .to(StmtKind::Break);

        let pragma = select! { Token::Pragma(text) => StmtKind::Pragma(text) };

        choice((
            pragma,
            block.map(StmtKind::Block),
            decl_stmt,
            for_stmt,
            while_stmt,
            do_while,
            if_stmt,
            return_stmt,
            break_stmt,
            just(Token::Semi).to(StmtKind::Empty),
            expr_stmt,
        ))
        .map_with(|kind, e| Stmt {
            kind,
            span: e.span(),
        })
    });

    let block = stmt
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .map_with(|stmts, e| Block {
            stmts,
            span: e.span(),
        });

    // ── Top-level items ──

    let struct_field_group = type_name
        .clone()
        .then(
            declarator
                .clone()
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then_ignore(just(Token::Semi))
        .map(|(base, decls)| {
            decls
                .into_iter()
                .map(|((stars, name), dims)| Field {
                    ty: declared_type(&base, stars, &dims),
                    name,
                })
                .collect::<Vec<_>>()
        });

    let struct_def = just(Token::Struct)
        .ignore_then(ident.clone())
        .then(
            struct_field_group
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .then_ignore(just(Token::Semi))
        .map_with(|(name, groups), e| {
            Item::Struct(StructDef {
                name,
                fields: groups.into_iter().flatten().collect(),
                span: e.span(),
            })
        });

    let param = just(Token::Const)
        .or_not()
        .then_ignore(qualifiers.clone())
        .then(type_name.clone())
        .then(declarator)
        .map(|((is_const, base), ((stars, name), dims))| Param {
            ty: declared_type(&base, stars, &dims),
            name,
            is_const: is_const.is_some(),
        });

    let params = just(Token::Void)
        .then(just(Token::RParen).rewind())
        .to(Vec::new())
        .or(param.separated_by(just(Token::Comma)).collect::<Vec<_>>())
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let function = decl_spec
        .then(just(Token::Star).repeated().count())
        .then(ident)
        .then(params)
        .then(block.map(Some).or(just(Token::Semi).to(None)))
        .map_with(|(((((_, base), stars), name), params), body), e| {
            Item::Function(Function {
                return_type: declared_type(&base, stars, &[]),
                name,
                params,
                body,
                span: e.span(),
            })
        });

    let global = declaration.map(Item::Global);

    let top_pragma = select! { Token::Pragma(_) => () };

    let item = choice((struct_def, function, global));

    top_pragma
        .clone()
        .repeated()
        .ignore_then(
            item.then_ignore(top_pragma.repeated())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map_with(|items, e| TranslationUnit {
            items,
            span: e.span(),
        })
}

// ── Tests ──
