// Parser for tally source units and plugin declarations.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators. Node IDs are allocated from a shared `NodeIdSource` as nodes
// are built, so they follow source order.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use std::rc::Rc;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::id::{NodeIdSource, UnitId};
use crate::lexer::Token;

type Extra<'tokens> = extra::Err<Rich<'tokens, Token, SimpleSpan>>;

/// Result of parsing a unit: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Result of parsing plugin declaration text.
#[derive(Debug)]
pub struct PluginParseResult {
    pub decls: Vec<PluginDecl>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Convert parse errors into syntax diagnostics.
pub fn syntax_diagnostics(errors: &[Rich<'static, Token, SimpleSpan>]) -> Vec<Diagnostic> {
    errors
        .iter()
        .map(|e| Diagnostic::error(codes::E0001, *e.span(), format!("syntax error: {}", e)))
        .collect()
}

fn lex_errors(lex_errors: Vec<crate::lexer::LexError>) -> Vec<Rich<'static, Token, SimpleSpan>> {
    lex_errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect()
}

/// Parse a tally source string belonging to `unit`. Lexes then parses.
pub fn parse(source: &str, unit: UnitId) -> ParseResult {
    let ids = NodeIdSource::new(unit);
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = unit_parser(source, &ids);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors = lex_errors(lex_result.errors);
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

/// Parse plugin declarations (`plugin name<#N>(x: T): R cost C`).
pub fn parse_plugin_decls(source: &str) -> PluginParseResult {
    let ids = NodeIdSource::new(UnitId::PLATFORM);
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = plugin_parser(source, &ids);
    let (decls, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors = lex_errors(lex_result.errors);
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    PluginParseResult {
        decls: decls.unwrap_or_default(),
        errors: all_errors,
    }
}

// ── Shared fragments ──

fn ident<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Ident, Extra<'tokens>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start..span.end].to_string(),
            span,
        }
    })
}

/// Type expressions: `Int`, `List<T, N>`, `(Int) -> Int`, `3`, `Sum(N, 2)`.
fn type_expr<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, TypeExpr, Extra<'tokens>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(move |ty| {
        let args = ty
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>();

        let fin_lit = select! { Token::Int(n) => n }
            .map_with(|n, e| TypeExpr::FinLit(n as u64, e.span()));

        let fin_op = ident(source)
            .try_map(|id: Ident, span| match id.name.as_str() {
                "Sum" => Ok(FinOp::Sum),
                "Mul" => Ok(FinOp::Mul),
                "Max" => Ok(FinOp::Max),
                _ => Err(Rich::custom(span, "expected Sum, Mul, or Max")),
            })
            .then(
                args.clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(op, args), e| TypeExpr::FinOp {
                op,
                args,
                span: e.span(),
            });

        let function = args
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .then_ignore(just(Token::Arrow))
            .then(ty.clone())
            .map_with(|(params, ret), e| TypeExpr::Function {
                params,
                ret: Box::new(ret),
                span: e.span(),
            });

        let named = just(Token::Hash)
            .or_not()
            .ignore_then(ident(source))
            .then(
                args.clone()
                    .delimited_by(just(Token::Lt), just(Token::Gt))
                    .or_not(),
            )
            .map_with(|(name, args), e| TypeExpr::Named {
                name,
                args: args.unwrap_or_default(),
                span: e.span(),
            });

        choice((fin_lit, fin_op, function, named))
    })
}

/// `<T, #N>` on a definition.
fn type_params<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Vec<TypeParamDecl>, Extra<'tokens>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::Hash)
        .or_not()
        .then(ident(source))
        .map(|(hash, name)| TypeParamDecl {
            name,
            fin: hash.is_some(),
        })
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Lt), just(Token::Gt))
}

/// `(a: T, b: U)` formal parameter list.
fn param_list<'tokens, 'src: 'tokens, I>(
    source: &'src str,
    ids: &'src NodeIdSource,
) -> impl Parser<'tokens, I, Vec<ParamDecl>, Extra<'tokens>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    ident(source)
        .then_ignore(just(Token::Colon))
        .then(type_expr(source))
        .map(move |(name, ty)| ParamDecl {
            id: ids.next(),
            name,
            ty,
        })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
}

fn binary(ids: &NodeIdSource, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = join(lhs.span, rhs.span);
    Expr {
        id: ids.next(),
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

enum Suffix {
    Access(Ident),
    Call(Ident, Vec<TypeExpr>, Vec<Expr>),
}

// ── Unit parser ──

fn unit_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
    ids: &'src NodeIdSource,
) -> impl Parser<'tokens, I, Program, Extra<'tokens>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = ident(source);
    let ty = type_expr(source);
    let type_params = type_params(source);
    let param_list = param_list(source, ids);

    let mut expr = Recursive::declare();
    let mut block = Recursive::declare();

    let type_args = ty
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Lt), just(Token::Gt));

    let args = expr
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Primary expressions ──

    let literal = select! {
        Token::Int(n) => Literal::Int(n),
        Token::Decimal((v, d)) => Literal::Decimal(v, d),
        Token::Char(c) => Literal::Char(c),
        Token::StringLit(s) => Literal::String(s),
        Token::True => Literal::Boolean(true),
        Token::False => Literal::Boolean(false),
    }
    .map_with(move |lit, e| Expr {
        id: ids.next(),
        kind: ExprKind::Literal(lit),
        span: e.span(),
    });

    let block_expr = block.clone().map(move |b: Block| {
        let span = b.span;
        Expr {
            id: ids.next(),
            kind: ExprKind::Block(b),
            span,
        }
    });

    let if_expr = recursive(|if_expr| {
        just(Token::If)
            .ignore_then(
                expr.clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .then(block.clone())
            .then(
                just(Token::Else)
                    .ignore_then(if_expr.or(block_expr.clone()))
                    .or_not(),
            )
            .map_with(move |((cond, then), otherwise), e| Expr {
                id: ids.next(),
                kind: ExprKind::If {
                    cond: Box::new(cond),
                    then,
                    otherwise: otherwise.map(Box::new),
                },
                span: e.span(),
            })
    });

    let for_expr = just(Token::For)
        .ignore_then(
            ident
                .clone()
                .then_ignore(just(Token::In))
                .then(expr.clone())
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(block.clone())
        .map_with(move |((binder, source), body), e| Expr {
            id: ids.next(),
            kind: ExprKind::For {
                binder,
                source: Box::new(source),
                body,
            },
            span: e.span(),
        });

    let match_case = just(Token::Case)
        .ignore_then(ident.clone())
        .then(
            ident
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or_not(),
        )
        .then(block.clone())
        .map_with(move |((member, binder), body), e| MatchCase {
            id: ids.next(),
            member,
            binder,
            body,
            span: e.span(),
        });

    let match_expr = just(Token::Match)
        .ignore_then(
            expr.clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(
            match_case
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(move |(scrutinee, cases), e| Expr {
            id: ids.next(),
            kind: ExprKind::Match {
                scrutinee: Box::new(scrutinee),
                cases,
            },
            span: e.span(),
        });

    let lambda = just(Token::Lambda)
        .ignore_then(param_list.clone())
        .then_ignore(just(Token::Arrow))
        .then(expr.clone())
        .map_with(move |(params, body), e| Expr {
            id: ids.next(),
            kind: ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span: e.span(),
        });

    // `f<T>(..)` must be tried before a bare reference; `a < b` falls back
    // to the reference alternative once the type-argument list fails.
    let call = ident
        .clone()
        .then(type_args.clone().or_not())
        .then(args.clone())
        .map_with(move |((callee, type_args), args), e| Expr {
            id: ids.next(),
            kind: ExprKind::Call {
                callee,
                type_args: type_args.unwrap_or_default(),
                args,
            },
            span: e.span(),
        });

    let reference = ident.clone().map(move |name: Ident| {
        let span = name.span;
        Expr {
            id: ids.next(),
            kind: ExprKind::Ref(name),
            span,
        }
    });

    let paren = expr
        .clone()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let primary = choice((
        literal,
        if_expr,
        for_expr,
        match_expr,
        lambda,
        block_expr,
        paren,
        call,
        reference,
    ))
    .boxed();

    // ── Postfix: `.member` and `.member(args)` ──

    let suffix = just(Token::Dot)
        .ignore_then(ident.clone())
        .then(type_args.clone().or_not().then(args.clone()).or_not())
        .map_with(|(member, call), e| {
            let suffix = match call {
                Some((type_args, args)) => {
                    Suffix::Call(member, type_args.unwrap_or_default(), args)
                }
                None => Suffix::Access(member),
            };
            (suffix, e.span())
        });

    let postfix = primary
        .foldl(suffix.repeated(), move |receiver, (suffix, span)| {
            let span = join(receiver.span, span);
            let kind = match suffix {
                Suffix::Access(member) => ExprKind::DotAccess {
                    receiver: Box::new(receiver),
                    member,
                },
                Suffix::Call(member, type_args, args) => ExprKind::DotCall {
                    receiver: Box::new(receiver),
                    member,
                    type_args,
                    args,
                },
            };
            Expr {
                id: ids.next(),
                kind,
                span,
            }
        })
        .boxed();

    // ── Operators ──

    let unary_op = just(Token::Bang)
        .to(UnaryOp::Not)
        .or(just(Token::Minus).to(UnaryOp::Neg))
        .map_with(|op, e| (op, e.span()));

    let unary = unary_op
        .repeated()
        .foldr(postfix, move |(op, span): (UnaryOp, Span), operand: Expr| {
            let span = join(span, operand.span);
            Expr {
                id: ids.next(),
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            }
        })
        .boxed();

    let product_op = select! {
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Mod,
    };
    let product = unary
        .clone()
        .foldl(product_op.then(unary).repeated(), move |lhs, (op, rhs)| {
            binary(ids, op, lhs, rhs)
        })
        .boxed();

    let sum_op = select! {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
    };
    let sum = product
        .clone()
        .foldl(sum_op.then(product).repeated(), move |lhs, (op, rhs)| {
            binary(ids, op, lhs, rhs)
        })
        .boxed();

    let compare_op = select! {
        Token::EqEq => BinaryOp::Eq,
        Token::NotEq => BinaryOp::NotEq,
        Token::Lt => BinaryOp::Lt,
        Token::Le => BinaryOp::Le,
        Token::Gt => BinaryOp::Gt,
        Token::Ge => BinaryOp::Ge,
    };
    let compare = sum
        .clone()
        .foldl(compare_op.then(sum).repeated(), move |lhs, (op, rhs)| {
            binary(ids, op, lhs, rhs)
        })
        .boxed();

    let and = compare
        .clone()
        .foldl(
            just(Token::AndAnd).to(BinaryOp::And).then(compare).repeated(),
            move |lhs, (op, rhs)| binary(ids, op, lhs, rhs),
        )
        .boxed();

    let or = and
        .clone()
        .foldl(
            just(Token::OrOr).to(BinaryOp::Or).then(and).repeated(),
            move |lhs, (op, rhs)| binary(ids, op, lhs, rhs),
        )
        .boxed();

    expr.define(or);

    // ── Definitions ──

    let field = just(Token::Mutable)
        .or_not()
        .then(ident.clone())
        .then_ignore(just(Token::Colon))
        .then(ty.clone())
        .map(|((mutable, name), ty)| FieldDecl {
            name,
            mutable: mutable.is_some(),
            ty,
        });

    let record_decl = just(Token::Record)
        .ignore_then(ident.clone())
        .then(type_params.clone().or_not())
        .then(
            field
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map_with(|((name, type_params), fields), e| RecordDecl {
            name,
            type_params: type_params.unwrap_or_default(),
            fields,
            span: e.span(),
        });

    let object_decl = just(Token::Object)
        .ignore_then(ident.clone())
        .map_with(|name, e| ObjectDecl {
            name,
            span: e.span(),
        });

    let sum_member = record_decl
        .clone()
        .map(SumMember::Record)
        .or(object_decl.clone().map(SumMember::Object))
        .then_ignore(just(Token::Semi).or_not());

    let sum_item = just(Token::Sum)
        .ignore_then(ident.clone())
        .then(type_params.clone().or_not())
        .then(
            sum_member
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(|((name, type_params), members), e| {
            StmtKind::Sum(Rc::new(SumDecl {
                name,
                type_params: type_params.unwrap_or_default(),
                members,
                span: e.span(),
            }))
        });

    let def_item = just(Token::Def)
        .ignore_then(ident.clone())
        .then(type_params.clone().or_not())
        .then(param_list.clone())
        .then(just(Token::Colon).ignore_then(ty.clone()).or_not())
        .then(block.clone())
        .map_with(|((((name, type_params), params), ret), body), e| {
            StmtKind::Def(Rc::new(FunctionDecl {
                name,
                type_params: type_params.unwrap_or_default(),
                params,
                ret,
                body,
                span: e.span(),
            }))
        });

    let import_item = just(Token::Import)
        .ignore_then(ident.clone())
        .map(StmtKind::Import);

    // ── Statements ──

    let val_stmt = just(Token::Val)
        .to(false)
        .or(just(Token::Mutable).to(true))
        .then(ident.clone())
        .then(just(Token::Colon).ignore_then(ty.clone()).or_not())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|(((mutable, name), ty), value)| {
            StmtKind::Val(ValStmt {
                name,
                mutable,
                ty,
                value,
            })
        });

    let expr_or_assign = expr
        .clone()
        .then(just(Token::Equals).ignore_then(expr.clone()).or_not())
        .try_map(|(target, value): (Expr, Option<Expr>), span| match value {
            None => Ok(StmtKind::Expr(target)),
            Some(value) => match target.kind {
                ExprKind::Ref(_) | ExprKind::DotAccess { .. } => {
                    Ok(StmtKind::Assign(AssignStmt { target, value }))
                }
                _ => Err(Rich::custom(span, "invalid assignment target")),
            },
        });

    let stmt = choice((
        import_item,
        def_item,
        record_decl.map(|r| StmtKind::Record(Rc::new(r))),
        object_decl.map(StmtKind::Object),
        sum_item,
        val_stmt,
        expr_or_assign,
    ))
    .map_with(move |kind, e| Stmt {
        id: ids.next(),
        kind,
        span: e.span(),
    })
    .then_ignore(just(Token::Semi).or_not())
    .boxed();

    block.define(
        stmt.clone()
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(move |stmts, e| Block {
                id: ids.next(),
                stmts,
                span: e.span(),
            }),
    );

    stmt.repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map_with(|statements, e| Program {
            statements,
            span: e.span(),
        })
}

// ── Plugin declaration parser ──

fn plugin_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
    ids: &'src NodeIdSource,
) -> impl Parser<'tokens, I, Vec<PluginDecl>, Extra<'tokens>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::Plugin)
        .ignore_then(ident(source))
        .then(type_params(source).or_not())
        .then(param_list(source, ids))
        .then_ignore(just(Token::Colon))
        .then(type_expr(source))
        .then_ignore(just(Token::Cost))
        .then(type_expr(source))
        .map_with(|((((name, type_params), params), ret), cost), e| PluginDecl {
            name,
            type_params: type_params.unwrap_or_default(),
            params,
            ret,
            cost,
            span: e.span(),
        })
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let result = parse(source, UnitId(1));
        assert!(result.errors.is_empty(), "parse errors: {:?}", result.errors);
        result.program.expect("program")
    }

    fn only_expr(program: &Program) -> &Expr {
        match &program.statements[0].kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn binary_precedence() {
        let program = parse_ok("1 + 2 * 3");
        let expr = only_expr(&program);
        match &expr.kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    rhs.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn less_than_is_not_type_args() {
        let program = parse_ok("a < b");
        assert!(matches!(
            only_expr(&program).kind,
            ExprKind::Binary {
                op: BinaryOp::Lt,
                ..
            }
        ));
    }

    #[test]
    fn generic_call_with_fin_argument() {
        let program = parse_ok("List<Int, 2>(1, 2, 3)");
        match &only_expr(&program).kind {
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => {
                assert_eq!(callee.name, "List");
                assert_eq!(type_args.len(), 2);
                assert!(matches!(type_args[1], TypeExpr::FinLit(2, _)));
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dot_calls_chain() {
        let program = parse_ok("xs.add(4).toString()");
        match &only_expr(&program).kind {
            ExprKind::DotCall {
                receiver, member, ..
            } => {
                assert_eq!(member.name, "toString");
                assert!(matches!(receiver.kind, ExprKind::DotCall { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn definitions_and_statements() {
        let program = parse_ok(
            r#"
            import util
            record Pt<#N>(mutable x: Int, tag: String<N>)
            object Origin
            sum Shape { record Circle(r: Int); object Dot }
            def f<T, #N>(xs: List<T, N>, g: (T) -> Int): Int {
                val total = 0
                for (x in xs) { g(x) }
                total
            }
            mutable y = 1
            y = y + 1
            "#,
        );
        let kinds: Vec<&'static str> = program
            .statements
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Import(_) => "import",
                StmtKind::Record(_) => "record",
                StmtKind::Object(_) => "object",
                StmtKind::Sum(_) => "sum",
                StmtKind::Def(_) => "def",
                StmtKind::Val(_) => "val",
                StmtKind::Assign(_) => "assign",
                StmtKind::Expr(_) => "expr",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["import", "record", "object", "sum", "def", "val", "assign"]
        );
        if let StmtKind::Def(f) = &program.statements[4].kind {
            assert_eq!(f.type_params.len(), 2);
            assert!(!f.type_params[0].fin);
            assert!(f.type_params[1].fin);
            assert!(matches!(f.params[1].ty, TypeExpr::Function { .. }));
        }
    }

    #[test]
    fn if_else_chain_and_match() {
        let program = parse_ok(
            "if (a) { 1 } else if (b) { 2 } else { 3 }\nmatch (o) { case Some(s) { s.value } case None { 0 } }",
        );
        assert_eq!(program.statements.len(), 2);
        match &only_expr(&program).kind {
            ExprKind::If { otherwise, .. } => {
                let nested = otherwise.as_ref().expect("else branch");
                assert!(matches!(nested.kind, ExprKind::If { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lambda_argument() {
        let program = parse_ok("apply(lambda (x: Int) -> x + 1, 5)");
        match &only_expr(&program).kind {
            ExprKind::Call { args, .. } => {
                assert!(matches!(args[0].kind, ExprKind::Lambda { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn node_ids_are_unique() {
        let program = parse_ok("val a = 1 + 2\nval b = a * 3");
        let mut ids = vec![program.statements[0].id, program.statements[1].id];
        if let StmtKind::Val(v) = &program.statements[0].kind {
            ids.push(v.value.id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn invalid_assignment_target_is_syntax_error() {
        let result = parse("1 = 2", UnitId(1));
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn plugin_declarations() {
        let result = parse_plugin_decls(
            "plugin abs(x: Int): Int cost 1\nplugin sum<#N>(xs: List<Int, N>): Int cost Mul(N, 2)",
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.decls.len(), 2);
        assert_eq!(result.decls[1].type_params.len(), 1);
        assert!(matches!(
            result.decls[1].cost,
            TypeExpr::FinOp {
                op: FinOp::Mul,
                ..
            }
        ));
    }
}
