// Lexer for tally source units.
//
// Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters and out-of-range literals produce
//   `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use rust_decimal::Decimal;
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

/// tally token types.
///
/// Keywords and symbols are matched as fixed strings. Literals carry parsed
/// values. Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("def")]
    Def,
    #[token("record")]
    Record,
    #[token("object")]
    Object,
    #[token("sum")]
    Sum,
    #[token("import")]
    Import,
    #[token("plugin")]
    Plugin,
    #[token("cost")]
    Cost,
    #[token("val")]
    Val,
    #[token("mutable")]
    Mutable,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("match")]
    Match,
    #[token("case")]
    Case,
    #[token("lambda")]
    Lambda,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("#")]
    Hash,
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
    #[token("!")]
    Bang,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    // ── Literals ──
    //
    // Decimal must win over Int for `1.5`; logos prefers the longer match.
    /// Decimal literal (e.g. `3.25`). Carries the value and its digit count.
    #[regex(r"[0-9]+\.[0-9]+", parse_decimal)]
    Decimal((Decimal, u32)),

    /// Integer literal. Values outside `i64` are lex errors.
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    /// Character literal with `\'`, `\\`, `\n`, `\t` escapes.
    #[regex(r"'([^'\\]|\\.)'", parse_char)]
    Char(char),

    /// String literal with `\"`, `\\`, `\n`, `\t` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    // ── Identifier ──
    //
    // Fixed `#[token]` matches win over this regex for the same length, so
    // `val` lexes as Val, `value` as Ident.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::Record => write!(f, "record"),
            Token::Object => write!(f, "object"),
            Token::Sum => write!(f, "sum"),
            Token::Import => write!(f, "import"),
            Token::Plugin => write!(f, "plugin"),
            Token::Cost => write!(f, "cost"),
            Token::Val => write!(f, "val"),
            Token::Mutable => write!(f, "mutable"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::For => write!(f, "for"),
            Token::In => write!(f, "in"),
            Token::Match => write!(f, "match"),
            Token::Case => write!(f, "case"),
            Token::Lambda => write!(f, "lambda"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Equals => write!(f, "="),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Arrow => write!(f, "->"),
            Token::Hash => write!(f, "#"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Bang => write!(f, "!"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Decimal((v, _)) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Char(c) => write!(f, "'{c}'"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_decimal(lex: &mut logos::Lexer<'_, Token>) -> Option<(Decimal, u32)> {
    let slice = lex.slice();
    let value: Decimal = slice.parse().ok()?;
    let digits = slice.chars().filter(|c| c.is_ascii_digit()).count() as u32;
    Some((value, digits))
}

fn unescape(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\'' => Some('\''),
        '\\' => Some('\\'),
        'n' => Some('\n'),
        't' => Some('\t'),
        _ => None,
    }
}

fn parse_char(lex: &mut logos::Lexer<'_, Token>) -> Option<char> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut chars = inner.chars();
    let c = chars.next()?;
    if c == '\\' {
        unescape(chars.next()?)
    } else {
        Some(c)
    }
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            result.push(unescape(chars.next()?)?);
        } else {
            result.push(c);
        }
    }
    Some(result)
}

// ── Public API ──

/// Lex a tally source string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
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
                message: format!("unexpected input: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords() {
        let tokens = lex_ok("def record object sum import val mutable if else for in match case lambda");
        assert_eq!(
            tokens,
            vec![
                Token::Def,
                Token::Record,
                Token::Object,
                Token::Sum,
                Token::Import,
                Token::Val,
                Token::Mutable,
                Token::If,
                Token::Else,
                Token::For,
                Token::In,
                Token::Match,
                Token::Case,
                Token::Lambda,
            ]
        );
    }

    #[test]
    fn keyword_vs_ident() {
        let tokens = lex_ok("val value");
        assert_eq!(tokens, vec![Token::Val, Token::Ident]);
    }

    #[test]
    fn comparison_symbols_take_longest_match() {
        let tokens = lex_ok("< <= > >= == = != ->");
        assert_eq!(
            tokens,
            vec![
                Token::Lt,
                Token::Le,
                Token::Gt,
                Token::Ge,
                Token::EqEq,
                Token::Equals,
                Token::NotEq,
                Token::Arrow,
            ]
        );
    }

    #[test]
    fn nested_type_args_close_separately() {
        let tokens = lex_ok("List<List<Int,2>,3>");
        assert_eq!(tokens.iter().filter(|t| **t == Token::Gt).count(), 2);
    }

    #[test]
    fn int_and_decimal_literals() {
        assert_eq!(lex_ok("42"), vec![Token::Int(42)]);
        assert_eq!(
            lex_ok("3.25"),
            vec![Token::Decimal((Decimal::new(325, 2), 3))]
        );
        assert_eq!(lex_ok("0.50"), vec![Token::Decimal((Decimal::new(50, 2), 3))]);
    }

    #[test]
    fn int_out_of_range_is_error() {
        let result = lex("99999999999999999999");
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn char_and_string_literals() {
        assert_eq!(lex_ok("'a'"), vec![Token::Char('a')]);
        assert_eq!(lex_ok(r"'\n'"), vec![Token::Char('\n')]);
        assert_eq!(
            lex_ok(r#""say \"hi\"""#),
            vec![Token::StringLit(r#"say "hi""#.into())]
        );
    }

    #[test]
    fn comments_and_newlines_skipped() {
        let tokens = lex_ok("foo // trailing\nbar");
        assert_eq!(tokens, vec![Token::Ident, Token::Ident]);
    }

    #[test]
    fn spans_correct() {
        let result = lex("val foo");
        assert_eq!(result.tokens[0].1, Span { start: 0, end: 3 });
        assert_eq!(result.tokens[1].1, Span { start: 4, end: 7 });
    }

    #[test]
    fn error_recovery() {
        let result = lex("foo ~ bar");
        let tokens: Vec<Token> = result.tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec![Token::Ident, Token::Ident]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 4, end: 5 });
    }
}
