// Lexer for synthesizable C kernel sources.
//
// Tokenizes the C subset accepted by high-level-synthesis flows. Uses the
// `logos` crate for DFA-based lexing. `#pragma` lines are kept as single
// tokens carrying their text; all other preprocessor lines are skipped.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Integer literal with its C suffix flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntLiteral {
    pub value: i64,
    pub unsigned: bool,
    pub long: bool,
}

/// Floating literal; `single` is set by an `f` suffix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatLiteral {
    pub value: f64,
    pub single: bool,
}

/// Kernel token types.
///
/// Identifiers carry no value; use the span to retrieve the text from the
/// source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(
    skip r"[ \t\r\n\f]+|//[^\n]*|/\*([^*]|\*+[^*/])*\*+/|#[ \t]*(include|define|undef|ifdef|ifndef|endif|if|else|elif)[^\n]*"
)]
pub enum Token {
    // ── Type keywords ──
    #[token("int")]
    Int,
    #[token("unsigned")]
    Unsigned,
    #[token("signed")]
    Signed,
    #[token("char")]
    Char,
    #[token("short")]
    Short,
    #[token("long")]
    Long,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[token("void")]
    Void,
    #[token("bool")]
    #[token("_Bool")]
    Bool,
    #[token("struct")]
    Struct,
    #[token("const")]
    Const,
    /// `static`, `inline`, `volatile`: accepted and ignored.
    #[token("static")]
    #[token("inline")]
    #[token("volatile")]
    Qualifier,

    // ── Statement keywords ──
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("break")]
    Break,
    #[token("return")]
    Return,
    #[token("sizeof")]
    Sizeof,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ── Punctuation ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // ── Operators ──
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("&=")]
    AmpAssign,
    #[token("|=")]
    PipeAssign,
    #[token("^=")]
    CaretAssign,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // ── Literals ──
    /// Floating literal: `1.5`, `.25`, `1e3`, optional `f` suffix.
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fF]?", parse_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fF]?", parse_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fF]?", parse_float)]
    FloatLit(FloatLiteral),

    /// Decimal or hexadecimal integer with optional `u`/`l`/`ll` suffixes.
    #[regex(r"[0-9]+[uUlL]*", parse_int)]
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*", parse_int)]
    IntLit(IntLiteral),

    /// `#pragma <text>`: the text after the keyword, trimmed.
    #[regex(r"#[ \t]*pragma[^\n]*", parse_pragma)]
    Pragma(String),

    // ── Identifier ──
    //
    // Placed after keywords: logos prioritises fixed `#[token]` matches
    // over regex for the same length, so `for` matches For, not Ident.
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Int => "int",
            Token::Unsigned => "unsigned",
            Token::Signed => "signed",
            Token::Char => "char",
            Token::Short => "short",
            Token::Long => "long",
            Token::Float => "float",
            Token::Double => "double",
            Token::Void => "void",
            Token::Bool => "bool",
            Token::Struct => "struct",
            Token::Const => "const",
            Token::Qualifier => "<qualifier>",
            Token::For => "for",
            Token::While => "while",
            Token::Do => "do",
            Token::If => "if",
            Token::Else => "else",
            Token::Break => "break",
            Token::Return => "return",
            Token::Sizeof => "sizeof",
            Token::True => "true",
            Token::False => "false",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::Dot => ".",
            Token::Arrow => "->",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Tilde => "~",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::Ne => "!=",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::PercentAssign => "%=",
            Token::ShlAssign => "<<=",
            Token::ShrAssign => ">>=",
            Token::AmpAssign => "&=",
            Token::PipeAssign => "|=",
            Token::CaretAssign => "^=",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::FloatLit(v) => return write!(f, "{}", v.value),
            Token::IntLit(v) => return write!(f, "{}", v.value),
            Token::Pragma(text) => return write!(f, "#pragma {}", text),
            Token::Ident => "<ident>",
        };
        write!(f, "{}", text)
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<IntLiteral> {
    let slice = lex.slice();
    let digits_end = slice
        .find(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'))
        .unwrap_or(slice.len());
    let (digits, suffix) = slice.split_at(digits_end);
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()? as i64
    } else {
        digits.parse::<u64>().ok()? as i64
    };
    let unsigned = suffix.contains(['u', 'U']);
    let long = suffix.contains(['l', 'L']);
    Some(IntLiteral {
        value,
        unsigned,
        long,
    })
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<FloatLiteral> {
    let slice = lex.slice();
    let (text, single) = match slice.strip_suffix(['f', 'F']) {
        Some(rest) => (rest, true),
        None => (slice, false),
    };
    Some(FloatLiteral {
        value: text.parse().ok()?,
        single,
    })
}

fn parse_pragma(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let start = slice.find("pragma")? + "pragma".len();
    Some(slice[start..].trim().to_string())
}

// ── Public API ──

/// Lex a kernel source string into tokens.
///
/// Returns all successfully parsed tokens together with any errors for
/// unrecognised characters. Lexing is non-fatal: errors are collected and
/// the lexer continues past bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: lex and assert no errors, return token list.
    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    /// Helper: lex and return (tokens, errors).
    fn lex_all(source: &str) -> (Vec<Token>, Vec<LexError>) {
        let result = lex(source);
        let tokens = result.tokens.into_iter().map(|(t, _)| t).collect();
        (tokens, result.errors)
    }

    // ── Keywords ──

    #[test]
    fn type_keywords() {
        let tokens =
            lex_ok("int unsigned signed char short long float double void bool struct const");
        assert_eq!(
            tokens,
            vec![
                Token::Int,
                Token::Unsigned,
                Token::Signed,
                Token::Char,
                Token::Short,
                Token::Long,
                Token::Float,
                Token::Double,
                Token::Void,
                Token::Bool,
                Token::Struct,
                Token::Const,
            ]
        );
    }

    #[test]
    fn keyword_vs_ident() {
        // `format` is an identifier, not keyword `for` + `mat`
        let tokens = lex_ok("for format");
        assert_eq!(tokens, vec![Token::For, Token::Ident]);
    }

    #[test]
    fn qualifiers_collapse() {
        let tokens = lex_ok("static inline volatile");
        assert_eq!(tokens, vec![Token::Qualifier; 3]);
    }

    // ── Operators ──

    #[test]
    fn longest_operator_wins() {
        let tokens = lex_ok(">>= >> > ++ += + -> --");
        assert_eq!(
            tokens,
            vec![
                Token::ShrAssign,
                Token::Shr,
                Token::Gt,
                Token::PlusPlus,
                Token::PlusAssign,
                Token::Plus,
                Token::Arrow,
                Token::MinusMinus,
            ]
        );
    }

    // ── Literals ──

    #[test]
    fn integer_suffixes() {
        let tokens = lex_ok("7 7u 7LL 0x1F");
        let values: Vec<_> = tokens
            .iter()
            .map(|t| {
                let Token::IntLit(lit) = t else {
                    panic!("expected integer literal, got {t:?}");
                };
                (lit.value, lit.unsigned, lit.long)
            })
            .collect();
        assert_eq!(
            values,
            vec![(7, false, false), (7, true, false), (7, false, true), (31, false, false)]
        );
    }

    #[test]
    fn float_literals() {
        let tokens = lex_ok("1.5 2.0f .25 1e3");
        let values: Vec<_> = tokens
            .iter()
            .map(|t| {
                let Token::FloatLit(lit) = t else {
                    panic!("expected float literal, got {t:?}");
                };
                (lit.value, lit.single)
            })
            .collect();
        assert_eq!(
            values,
            vec![(1.5, false), (2.0, true), (0.25, false), (1000.0, false)]
        );
    }

    // ── Preprocessor and comments ──

    #[test]
    fn pragma_keeps_text() {
        let tokens = lex_ok("#pragma HLS unroll factor=4\nx");
        assert_eq!(
            tokens,
            vec![Token::Pragma("HLS unroll factor=4".into()), Token::Ident]
        );
    }

    #[test]
    fn other_directives_and_comments_skipped() {
        let tokens = lex_ok("#include <stdio.h>\n#define N 4\n// line\n/* block\n * more */ x");
        assert_eq!(tokens, vec![Token::Ident]);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let result = lex("int  abc;");
        let spans: Vec<_> = result
            .tokens
            .iter()
            .map(|(_, s)| (s.start, s.end))
            .collect();
        assert_eq!(spans, vec![(0, 3), (5, 8), (8, 9)]);
    }

    // ── Errors ──

    #[test]
    fn bad_character_recovers() {
        let (tokens, errors) = lex_all("a @ b");
        assert_eq!(tokens, vec![Token::Ident, Token::Ident]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, Span { start: 2, end: 3 });
    }
}
