//! Front end
//!
//! `rustpython-parser` turns the source into a Python AST, which is lowered
//! here into the runtime's own tree. Constructs the runtime does not support
//! (classes, `with`, decorators, generators, async) are rejected with a
//! syntax error naming the construct.
//!
//! Every tree built here is walked recursively later, so nesting is bounded
//! before parsing: a token scan caps open brackets and indentation levels
//! and estimates how deep each expression gets.

use crate::ast::*;
use crate::exception::SyntaxError;
use crate::scope;
use num_bigint::BigInt;
use rustpython_parser::ast::{self as py, Ranged};
use rustpython_parser::lexer::lex;
use rustpython_parser::{Mode, Parse, ParseError, ParseErrorType, Tok};
use std::rc::Rc;

type PResult<T> = Result<T, SyntaxError>;

/// Open brackets allowed at once, as in CPython's tokenizer
pub const MAX_BRACKET_DEPTH: usize = 200;

/// Indentation levels allowed, as in CPython's tokenizer
pub const MAX_INDENT_DEPTH: usize = 100;

/// Ceiling on the nesting of a single expression
pub const MAX_EXPR_DEPTH: usize = 1000;

/// Parse a whole snippet
pub fn parse_module(source: &str) -> PResult<Vec<Stmt>> {
    let lines = LineIndex::new(source);
    check_nesting(source, Mode::Module, &lines)?;
    let suite = py::Suite::parse(source, "<snippet>").map_err(|e| syntax_error(e, &lines))?;
    Lowerer::new(lines).body(suite)
}

/// Parse a single expression, as used by `eval`
pub fn parse_expression(source: &str) -> PResult<Expr> {
    let source = source.trim();
    let lines = LineIndex::new(source);
    check_nesting(source, Mode::Expression, &lines)?;
    let expr = py::Expr::parse(source, "<string>").map_err(|e| syntax_error(e, &lines))?;
    Lowerer::new(lines).expr(expr)
}

fn syntax_error(err: ParseError, lines: &LineIndex) -> SyntaxError {
    let message = match &err.error {
        ParseErrorType::Eof => "unexpected EOF while parsing".to_string(),
        ParseErrorType::Lexical(lexical) => lexical.to_string(),
        ParseErrorType::UnrecognizedToken(Tok::Indent, _) => "unexpected indent".to_string(),
        ParseErrorType::UnrecognizedToken(_, Some(expected)) if expected == "Indent" => {
            "expected an indented block".to_string()
        }
        _ => "invalid syntax".to_string(),
    };
    SyntaxError::new(message, lines.line(err.offset))
}

/// Byte offset to line number
struct LineIndex {
    starts: Vec<u32>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        Self { starts }
    }

    fn line(&self, offset: impl Into<u32>) -> u32 {
        let offset = offset.into();
        self.starts.partition_point(|start| *start <= offset) as u32
    }
}

/// Reject sources whose tree would nest deeper than the runtime walks
///
/// Each open bracket keeps a count of the operators and trailers seen since
/// its last separator; the sum over all open brackets bounds the depth of
/// the expression being read. Lexical errors are left to the parser.
fn check_nesting(source: &str, mode: Mode, lines: &LineIndex) -> PResult<()> {
    let mut levels: Vec<usize> = vec![0];
    let mut nesting = 0usize;
    let mut indent = 0usize;
    for item in lex(source, mode) {
        let Ok((tok, range)) = item else {
            return Ok(());
        };
        match tok {
            Tok::Lpar | Tok::Lsqb | Tok::Lbrace => {
                if levels.len() > MAX_BRACKET_DEPTH {
                    return Err(SyntaxError::new(
                        "too many nested parentheses",
                        lines.line(range.start()),
                    ));
                }
                if let Some(count) = levels.last_mut() {
                    *count += 1;
                }
                levels.push(0);
                nesting += 2;
            }
            Tok::Rpar | Tok::Rsqb | Tok::Rbrace => {
                if levels.len() > 1 {
                    nesting -= levels.pop().unwrap_or(0) + 1;
                }
            }
            Tok::Comma | Tok::Colon | Tok::Semi | Tok::Newline | Tok::Equal => {
                if let Some(count) = levels.last_mut() {
                    nesting -= *count;
                    *count = 0;
                }
            }
            Tok::Indent => {
                indent += 1;
                if indent > MAX_INDENT_DEPTH {
                    return Err(SyntaxError::new(
                        "too many levels of indentation",
                        lines.line(range.start()),
                    ));
                }
            }
            Tok::Dedent => indent = indent.saturating_sub(1),
            Tok::Name { .. }
            | Tok::Int { .. }
            | Tok::Float { .. }
            | Tok::Complex { .. }
            | Tok::String { .. } => {}
            _ => {
                if let Some(count) = levels.last_mut() {
                    *count += 1;
                }
                nesting += 1;
            }
        }
        if nesting > MAX_EXPR_DEPTH {
            return Err(SyntaxError::new(
                "expression nested too deeply",
                lines.line(range.start()),
            ));
        }
    }
    Ok(())
}

struct Lowerer {
    lines: LineIndex,
    depth: usize,
}

impl Lowerer {
    fn new(lines: LineIndex) -> Self {
        Self { lines, depth: 0 }
    }

    fn line_of(&self, node: &impl Ranged) -> u32 {
        self.lines.line(node.range().start())
    }

    fn body(&mut self, stmts: Vec<py::Stmt>) -> PResult<Vec<Stmt>> {
        stmts.into_iter().map(|s| self.stmt(s)).collect()
    }

    fn exprs(&mut self, exprs: Vec<py::Expr>) -> PResult<Vec<Expr>> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn opt_expr(&mut self, expr: Option<Box<py::Expr>>) -> PResult<Option<Expr>> {
        expr.map(|e| self.expr(*e)).transpose()
    }

    fn boxed(&mut self, expr: py::Expr) -> PResult<Box<Expr>> {
        self.expr(expr).map(Box::new)
    }

    /// An assignment, loop or `del` target
    fn target(&mut self, expr: py::Expr) -> PResult<Expr> {
        let line = self.line_of(&expr);
        let target = self.expr(expr)?;
        check_target(&target, line)?;
        Ok(target)
    }

    // ---- statements -------------------------------------------------

    fn stmt(&mut self, stmt: py::Stmt) -> PResult<Stmt> {
        let line = self.line_of(&stmt);
        let unsupported = |message: &str| Err(SyntaxError::new(message, line));
        let kind = match stmt {
            py::Stmt::Expr(py::StmtExpr { value, .. }) => StmtKind::Expr(self.expr(*value)?),
            py::Stmt::Assign(py::StmtAssign { targets, value, .. }) => {
                let targets = targets
                    .into_iter()
                    .map(|t| self.target(t))
                    .collect::<PResult<_>>()?;
                StmtKind::Assign {
                    targets,
                    value: self.expr(*value)?,
                }
            }
            py::Stmt::AugAssign(py::StmtAugAssign {
                target, op, value, ..
            }) => {
                let target = self.expr(*target)?;
                if !matches!(
                    target,
                    Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }
                ) {
                    return unsupported("illegal expression for augmented assignment");
                }
                StmtKind::AugAssign {
                    target,
                    op: bin_op(op),
                    value: self.expr(*value)?,
                }
            }
            // the annotation is evaluated nowhere
            py::Stmt::AnnAssign(py::StmtAnnAssign { target, value, .. }) => {
                let target = self.target(*target)?;
                match value {
                    Some(value) => StmtKind::Assign {
                        targets: vec![target],
                        value: self.expr(*value)?,
                    },
                    None => StmtKind::Pass,
                }
            }
            py::Stmt::If(py::StmtIf {
                test, body, orelse, ..
            }) => StmtKind::If {
                test: self.expr(*test)?,
                body: self.body(body)?,
                orelse: self.body(orelse)?,
            },
            py::Stmt::While(py::StmtWhile {
                test, body, orelse, ..
            }) => StmtKind::While {
                test: self.expr(*test)?,
                body: self.body(body)?,
                orelse: self.body(orelse)?,
            },
            py::Stmt::For(py::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => StmtKind::For {
                target: self.target(*target)?,
                iter: self.expr(*iter)?,
                body: self.body(body)?,
                orelse: self.body(orelse)?,
            },
            py::Stmt::Break(_) => StmtKind::Break,
            py::Stmt::Continue(_) => StmtKind::Continue,
            py::Stmt::Pass(_) => StmtKind::Pass,
            py::Stmt::FunctionDef(py::StmtFunctionDef {
                name,
                args,
                body,
                decorator_list,
                ..
            }) => {
                if !decorator_list.is_empty() {
                    return unsupported("decorators are not supported");
                }
                let params = self.params(*args, line)?;
                let body = self.body(body)?;
                let scope = Rc::new(scope::function_scope(&params, &body));
                StmtKind::FunctionDef(Rc::new(FunctionDef {
                    name: Rc::from(name.as_str()),
                    line,
                    params,
                    body,
                    scope,
                }))
            }
            py::Stmt::Return(py::StmtReturn { value, .. }) => {
                StmtKind::Return(self.opt_expr(value)?)
            }
            py::Stmt::Import(py::StmtImport { names, .. }) => {
                StmtKind::Import(names.into_iter().map(alias).collect())
            }
            py::Stmt::ImportFrom(py::StmtImportFrom {
                module,
                names,
                level,
                ..
            }) => StmtKind::ImportFrom {
                module: module.map(|m| m.as_str().to_string()),
                names: names.into_iter().map(alias).collect(),
                level: level.map_or(0, |l| l.to_u32() as usize),
            },
            py::Stmt::Try(py::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                let body = self.body(body)?;
                let handlers = handlers
                    .into_iter()
                    .map(|h| self.handler(h))
                    .collect::<PResult<_>>()?;
                StmtKind::Try {
                    body,
                    handlers,
                    orelse: self.body(orelse)?,
                    finalbody: self.body(finalbody)?,
                }
            }
            py::Stmt::Raise(py::StmtRaise { exc, cause, .. }) => StmtKind::Raise {
                exc: self.opt_expr(exc)?,
                cause: self.opt_expr(cause)?,
            },
            py::Stmt::Global(py::StmtGlobal { names, .. }) => {
                StmtKind::Global(names.iter().map(|n| Rc::from(n.as_str())).collect())
            }
            py::Stmt::Nonlocal(py::StmtNonlocal { names, .. }) => {
                StmtKind::Nonlocal(names.iter().map(|n| Rc::from(n.as_str())).collect())
            }
            py::Stmt::Assert(py::StmtAssert { test, msg, .. }) => StmtKind::Assert {
                test: self.expr(*test)?,
                msg: self.opt_expr(msg)?,
            },
            py::Stmt::Delete(py::StmtDelete { targets, .. }) => StmtKind::Delete(
                targets
                    .into_iter()
                    .map(|t| self.target(t))
                    .collect::<PResult<_>>()?,
            ),
            py::Stmt::ClassDef(_) => return unsupported("class definitions are not supported"),
            py::Stmt::With(_) => return unsupported("'with' statements are not supported"),
            py::Stmt::AsyncFunctionDef(_) | py::Stmt::AsyncFor(_) | py::Stmt::AsyncWith(_) => {
                return unsupported("async code is not supported")
            }
            py::Stmt::Match(_) => return unsupported("'match' statements are not supported"),
            py::Stmt::TryStar(_) => return unsupported("'except*' is not supported"),
            _ => return unsupported("this statement is not supported"),
        };
        Ok(Stmt { line, kind })
    }

    fn handler(&mut self, handler: py::ExceptHandler) -> PResult<Handler> {
        let line = self.line_of(&handler);
        let py::ExceptHandler::ExceptHandler(py::ExceptHandlerExceptHandler {
            type_, name, body, ..
        }) = handler;
        Ok(Handler {
            line,
            kinds: self.opt_expr(type_)?,
            name: name.map(|n| Rc::from(n.as_str())),
            body: self.body(body)?,
        })
    }

    fn params(&mut self, args: py::Arguments, line: u32) -> PResult<Params> {
        let py::Arguments {
            posonlyargs,
            args,
            vararg,
            kwonlyargs,
            kwarg,
            ..
        } = args;
        let mut params = Params::default();
        // positional-only parameters accept keywords here
        for arg in posonlyargs.into_iter().chain(args) {
            let param = self.param(arg)?;
            params.positional.push(param);
        }
        params.varargs = vararg.map(|a| Rc::from(a.arg.as_str()));
        for arg in kwonlyargs {
            let param = self.param(arg)?;
            params.kwonly.push(param);
        }
        params.kwargs = kwarg.map(|a| Rc::from(a.arg.as_str()));

        let mut seen = std::collections::HashSet::new();
        for name in params.names() {
            if !seen.insert(name.clone()) {
                return Err(SyntaxError::new(
                    format!("duplicate argument '{name}' in function definition"),
                    line,
                ));
            }
        }
        Ok(params)
    }

    fn param(&mut self, arg: py::ArgWithDefault) -> PResult<Param> {
        Ok(Param {
            name: Rc::from(arg.def.arg.as_str()),
            default: self.opt_expr(arg.default)?,
        })
    }

    // ---- expressions ------------------------------------------------

    fn expr(&mut self, expr: py::Expr) -> PResult<Expr> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(SyntaxError::new(
                "expression nested too deeply",
                self.line_of(&expr),
            ));
        }
        self.depth += 1;
        let lowered = self.expr_inner(expr);
        self.depth -= 1;
        lowered
    }

    fn expr_inner(&mut self, expr: py::Expr) -> PResult<Expr> {
        let line = self.line_of(&expr);
        let unsupported = |message: &str| Err(SyntaxError::new(message, line));
        Ok(match expr {
            py::Expr::Constant(py::ExprConstant { value, .. }) => {
                Expr::Constant(constant(value, line)?)
            }
            py::Expr::Name(py::ExprName { id, .. }) => Expr::Name(Rc::from(id.as_str())),
            py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => {
                Expr::FString(self.fstring(values)?)
            }
            py::Expr::FormattedValue(value) => {
                Expr::FString(self.fstring(vec![py::Expr::FormattedValue(value)])?)
            }
            py::Expr::BinOp(py::ExprBinOp {
                left, op, right, ..
            }) => Expr::BinOp {
                left: self.boxed(*left)?,
                op: bin_op(op),
                right: self.boxed(*right)?,
            },
            py::Expr::UnaryOp(py::ExprUnaryOp { op, operand, .. }) => {
                let operand = self.expr(*operand)?;
                let op = match op {
                    py::UnaryOp::Not => UnaryOp::Not,
                    py::UnaryOp::USub => UnaryOp::Neg,
                    py::UnaryOp::UAdd => UnaryOp::Pos,
                    py::UnaryOp::Invert => UnaryOp::Invert,
                };
                match (op, operand) {
                    (UnaryOp::Neg, Expr::Constant(c @ (Constant::Int(_) | Constant::BigInt(_) | Constant::Float(_)))) => {
                        Expr::Constant(negate(c))
                    }
                    (op, operand) => Expr::UnaryOp {
                        op,
                        operand: Box::new(operand),
                    },
                }
            }
            py::Expr::BoolOp(py::ExprBoolOp { op, values, .. }) => Expr::BoolOp {
                op: match op {
                    py::BoolOp::And => BoolOp::And,
                    py::BoolOp::Or => BoolOp::Or,
                },
                values: self.exprs(values)?,
            },
            py::Expr::Compare(py::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => Expr::Compare {
                left: self.boxed(*left)?,
                ops: ops.into_iter().map(cmp_op).collect(),
                comparators: self.exprs(comparators)?,
            },
            py::Expr::Call(py::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                let func = self.boxed(*func)?;
                let mut lowered = Vec::with_capacity(args.len() + keywords.len());
                for arg in args {
                    lowered.push(match arg {
                        py::Expr::Starred(py::ExprStarred { value, .. }) => {
                            Arg::Star(self.expr(*value)?)
                        }
                        other => Arg::Positional(self.expr(other)?),
                    });
                }
                for keyword in keywords {
                    let value = self.expr(keyword.value)?;
                    lowered.push(match keyword.arg {
                        Some(name) => Arg::Keyword(Rc::from(name.as_str()), value),
                        None => Arg::DoubleStar(value),
                    });
                }
                Expr::Call {
                    func,
                    args: lowered,
                }
            }
            py::Expr::Attribute(py::ExprAttribute { value, attr, .. }) => Expr::Attribute {
                value: self.boxed(*value)?,
                attr: Rc::from(attr.as_str()),
            },
            py::Expr::Subscript(py::ExprSubscript { value, slice, .. }) => Expr::Subscript {
                value: self.boxed(*value)?,
                index: self.boxed(*slice)?,
            },
            py::Expr::Slice(py::ExprSlice {
                lower, upper, step, ..
            }) => Expr::Slice {
                lower: self.opt_expr(lower)?.map(Box::new),
                upper: self.opt_expr(upper)?.map(Box::new),
                step: self.opt_expr(step)?.map(Box::new),
            },
            py::Expr::List(py::ExprList { elts, .. }) => Expr::List(self.exprs(elts)?),
            py::Expr::Tuple(py::ExprTuple { elts, .. }) => Expr::Tuple(self.exprs(elts)?),
            py::Expr::Set(py::ExprSet { elts, .. }) => Expr::Set(self.exprs(elts)?),
            py::Expr::Dict(py::ExprDict { keys, values, .. }) => {
                let mut pairs = Vec::with_capacity(values.len());
                for (key, value) in keys.into_iter().zip(values) {
                    let key = key.map(|k| self.expr(k)).transpose()?;
                    pairs.push((key, self.expr(value)?));
                }
                Expr::Dict(pairs)
            }
            py::Expr::Starred(py::ExprStarred { value, .. }) => Expr::Starred(self.boxed(*value)?),
            py::Expr::ListComp(py::ExprListComp {
                elt, generators, ..
            }) => {
                let generators = self.generators(generators)?;
                Expr::ListComp {
                    elt: self.boxed(*elt)?,
                    scope: Rc::new(scope::comprehension_scope(&generators)),
                    generators,
                }
            }
            py::Expr::SetComp(py::ExprSetComp {
                elt, generators, ..
            }) => {
                let generators = self.generators(generators)?;
                Expr::SetComp {
                    elt: self.boxed(*elt)?,
                    scope: Rc::new(scope::comprehension_scope(&generators)),
                    generators,
                }
            }
            py::Expr::GeneratorExp(py::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                let generators = self.generators(generators)?;
                Expr::GeneratorExp {
                    elt: self.boxed(*elt)?,
                    scope: Rc::new(scope::comprehension_scope(&generators)),
                    generators,
                }
            }
            py::Expr::DictComp(py::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                let generators = self.generators(generators)?;
                Expr::DictComp {
                    key: self.boxed(*key)?,
                    value: self.boxed(*value)?,
                    scope: Rc::new(scope::comprehension_scope(&generators)),
                    generators,
                }
            }
            py::Expr::IfExp(py::ExprIfExp {
                test, body, orelse, ..
            }) => Expr::IfExp {
                test: self.boxed(*test)?,
                body: self.boxed(*body)?,
                orelse: self.boxed(*orelse)?,
            },
            py::Expr::Lambda(py::ExprLambda { args, body, .. }) => {
                let params = self.params(*args, line)?;
                let value = self.expr(*body)?;
                let body = vec![Stmt {
                    line,
                    kind: StmtKind::Return(Some(value)),
                }];
                let scope = Rc::new(scope::function_scope(&params, &body));
                Expr::Lambda(Rc::new(FunctionDef {
                    name: Rc::from("<lambda>"),
                    line,
                    params,
                    body,
                    scope,
                }))
            }
            py::Expr::NamedExpr(_) => {
                return unsupported("assignment expressions (':=') are not supported")
            }
            py::Expr::Yield(_) | py::Expr::YieldFrom(_) => {
                return unsupported("generators ('yield') are not supported")
            }
            py::Expr::Await(_) => return unsupported("async code is not supported"),
        })
    }

    fn generators(&mut self, generators: Vec<py::Comprehension>) -> PResult<Vec<Comprehension>> {
        let mut lowered = Vec::with_capacity(generators.len());
        for generator in generators {
            if generator.is_async {
                return Err(SyntaxError::new(
                    "async code is not supported",
                    self.line_of(&generator.target),
                ));
            }
            lowered.push(Comprehension {
                target: self.target(generator.target)?,
                iter: self.expr(generator.iter)?,
                ifs: self.exprs(generator.ifs)?,
            });
        }
        Ok(lowered)
    }

    /// f-string pieces; adjacent literal chunks are merged
    fn fstring(&mut self, values: Vec<py::Expr>) -> PResult<Vec<FStringPart>> {
        let mut parts: Vec<FStringPart> = Vec::new();
        for value in values {
            match value {
                py::Expr::Constant(py::ExprConstant {
                    value: py::Constant::Str(text),
                    ..
                }) => match parts.last_mut() {
                    Some(FStringPart::Literal(last)) => last.push_str(&text),
                    _ => parts.push(FStringPart::Literal(text)),
                },
                py::Expr::FormattedValue(py::ExprFormattedValue {
                    value,
                    conversion,
                    format_spec,
                    ..
                }) => {
                    let expr = self.boxed(*value)?;
                    let conversion = match conversion {
                        py::ConversionFlag::Str => Some('s'),
                        py::ConversionFlag::Ascii => Some('a'),
                        py::ConversionFlag::Repr => Some('r'),
                        py::ConversionFlag::None => None,
                    };
                    let spec = match format_spec.map(|spec| *spec) {
                        None => Vec::new(),
                        Some(py::Expr::JoinedStr(py::ExprJoinedStr { values, .. })) => {
                            self.fstring(values)?
                        }
                        Some(other) => self.fstring(vec![other])?,
                    };
                    parts.push(FStringPart::Field {
                        expr,
                        conversion,
                        spec,
                    });
                }
                py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => {
                    for part in self.fstring(values)? {
                        match (parts.last_mut(), part) {
                            (Some(FStringPart::Literal(last)), FStringPart::Literal(text)) => {
                                last.push_str(&text)
                            }
                            (_, part) => parts.push(part),
                        }
                    }
                }
                other => {
                    return Err(SyntaxError::new(
                        "f-string: invalid expression",
                        self.line_of(&other),
                    ))
                }
            }
        }
        Ok(parts)
    }
}

fn constant(value: py::Constant, line: u32) -> PResult<Constant> {
    Ok(match value {
        py::Constant::None => Constant::None,
        py::Constant::Bool(b) => Constant::Bool(b),
        py::Constant::Str(s) => Constant::Str(Rc::from(s)),
        py::Constant::Int(i) => {
            let digits = i.to_string();
            match digits.parse::<i64>() {
                Ok(small) => Constant::Int(small),
                Err(_) => match digits.parse::<BigInt>() {
                    Ok(big) => Constant::BigInt(Rc::new(big)),
                    Err(_) => return Err(SyntaxError::new("invalid integer literal", line)),
                },
            }
        }
        py::Constant::Float(f) => Constant::Float(f),
        py::Constant::Ellipsis => Constant::Ellipsis,
        py::Constant::Bytes(_) => {
            return Err(SyntaxError::new("bytes literals are not supported", line))
        }
        py::Constant::Complex { .. } => {
            return Err(SyntaxError::new("complex numbers are not supported", line))
        }
        py::Constant::Tuple(_) => return Err(SyntaxError::new("invalid syntax", line)),
    })
}

/// Fold `-literal`; the runtime never sees a negated constant
fn negate(c: Constant) -> Constant {
    match c {
        Constant::Int(i) => match i.checked_neg() {
            Some(n) => Constant::Int(n),
            None => Constant::BigInt(Rc::new(-BigInt::from(i))),
        },
        Constant::BigInt(b) => {
            let n = -(*b).clone();
            match i64::try_from(&n) {
                Ok(small) => Constant::Int(small),
                Err(_) => Constant::BigInt(Rc::new(n)),
            }
        }
        Constant::Float(f) => Constant::Float(-f),
        other => other,
    }
}

fn alias(a: py::Alias) -> Alias {
    Alias {
        name: a.name.as_str().to_string(),
        asname: a.asname.map(|n| n.as_str().to_string()),
    }
}

fn bin_op(op: py::Operator) -> BinOp {
    match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mul,
        py::Operator::MatMult => BinOp::MatMul,
        py::Operator::Div => BinOp::Div,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        py::Operator::LShift => BinOp::LShift,
        py::Operator::RShift => BinOp::RShift,
        py::Operator::BitOr => BinOp::BitOr,
        py::Operator::BitXor => BinOp::BitXor,
        py::Operator::BitAnd => BinOp::BitAnd,
        py::Operator::FloorDiv => BinOp::FloorDiv,
    }
}

fn cmp_op(op: py::CmpOp) -> CmpOp {
    match op {
        py::CmpOp::Eq => CmpOp::Eq,
        py::CmpOp::NotEq => CmpOp::NotEq,
        py::CmpOp::Lt => CmpOp::Lt,
        py::CmpOp::LtE => CmpOp::LtE,
        py::CmpOp::Gt => CmpOp::Gt,
        py::CmpOp::GtE => CmpOp::GtE,
        py::CmpOp::Is => CmpOp::Is,
        py::CmpOp::IsNot => CmpOp::IsNot,
        py::CmpOp::In => CmpOp::In,
        py::CmpOp::NotIn => CmpOp::NotIn,
    }
}

fn check_target(target: &Expr, line: u32) -> PResult<()> {
    match target {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
        Expr::Tuple(items) | Expr::List(items) => {
            let stars = items
                .iter()
                .filter(|i| matches!(i, Expr::Starred(_)))
                .count();
            if stars > 1 {
                return Err(SyntaxError::new(
                    "multiple starred expressions in assignment",
                    line,
                ));
            }
            items.iter().try_for_each(|i| check_target(i, line))
        }
        Expr::Starred(inner) => check_target(inner, line),
        Expr::Call { .. } => Err(SyntaxError::new("cannot assign to function call", line)),
        Expr::Constant(_) => Err(SyntaxError::new("cannot assign to literal", line)),
        _ => Err(SyntaxError::new("cannot assign to expression", line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deep inputs are walked on a thread with room for it, as the runtime does
    fn on_big_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    fn message_of(source: &str) -> (String, u32) {
        let source = source.to_string();
        on_big_stack(move || {
            let err = parse_module(&source).unwrap_err();
            (err.message, err.line)
        })
    }

    #[test]
    fn test_parse_assignment_and_call() {
        let module = parse_module("x = 1\nprint(x + 2)\n").unwrap();
        assert_eq!(module.len(), 2);
        assert!(matches!(module[0].kind, StmtKind::Assign { .. }));
        assert_eq!(module[1].line, 2);
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let module = parse_module("a = input('Nom: '); print('Bonjour', a)").unwrap();
        assert_eq!(module.len(), 2);
        assert_eq!(module[1].line, 1);
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 ** 2").unwrap();
        let Expr::BinOp { op, right, .. } = expr else {
            panic!("expected binop");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(*right, Expr::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_negative_literal_is_folded() {
        assert_eq!(parse_expression("-5").unwrap(), Expr::Constant(Constant::Int(-5)));
        assert_eq!(
            parse_expression("-9223372036854775808").unwrap(),
            Expr::Constant(Constant::Int(i64::MIN))
        );
        assert!(matches!(
            parse_expression("100000000000000000000").unwrap(),
            Expr::Constant(Constant::BigInt(_))
        ));
    }

    #[test]
    fn test_chained_comparison() {
        let expr = parse_expression("0 < x <= 10").unwrap();
        let Expr::Compare { ops, .. } = expr else {
            panic!("expected compare");
        };
        assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtE]);
    }

    #[test]
    fn test_fstring_fields() {
        let expr = parse_expression("f\"Total: {total:.2f} ({n!r}) {{x}}\"").unwrap();
        let Expr::FString(parts) = expr else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 5);
        assert!(matches!(
            &parts[1],
            FStringPart::Field { spec, .. } if spec == &vec![FStringPart::Literal(".2f".into())]
        ));
        assert!(matches!(&parts[3], FStringPart::Field { conversion: Some('r'), .. }));
        assert_eq!(parts[4], FStringPart::Literal(") {x}".into()));
    }

    #[test]
    fn test_fstring_self_documenting_field() {
        let expr = parse_expression("f'{x*2=}'").unwrap();
        let Expr::FString(parts) = expr else {
            panic!("expected f-string");
        };
        assert_eq!(parts[0], FStringPart::Literal("x*2=".into()));
        assert!(matches!(&parts[1], FStringPart::Field { conversion: Some('r'), .. }));
    }

    #[test]
    fn test_comprehension_and_conditional() {
        let expr = parse_expression("[x * 2 for x in data if x > 0]").unwrap();
        assert!(matches!(expr, Expr::ListComp { .. }));
        let expr = parse_expression("a if ok else b").unwrap();
        assert!(matches!(expr, Expr::IfExp { .. }));
    }

    #[test]
    fn test_try_except_finally() {
        let src = "try:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    print(e)\nelse:\n    pass\nfinally:\n    print('done')\n";
        let module = parse_module(src).unwrap();
        let StmtKind::Try {
            handlers,
            orelse,
            finalbody,
            ..
        } = &module[0].kind
        else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].line, 3);
        assert_eq!(orelse.len(), 1);
        assert_eq!(finalbody.len(), 1);
    }

    #[test]
    fn test_unsupported_constructs() {
        assert_eq!(
            parse_module("class A:\n    pass\n").unwrap_err().message,
            "class definitions are not supported"
        );
        assert!(parse_module("with open('f') as f:\n    pass\n").is_err());
        assert_eq!(
            parse_module("def g():\n    yield 1\n").unwrap_err(),
            SyntaxError::new("generators ('yield') are not supported", 2)
        );
        assert!(parse_module("@wrap\ndef g():\n    pass\n").is_err());
        assert!(parse_module("if (n := 3):\n    pass\n").is_err());
    }

    #[test]
    fn test_syntax_error_line() {
        let err = parse_module("x = 1\ny = (2 +\n").unwrap_err();
        assert!(err.line >= 2);
        assert_eq!(parse_module("x = 1\nx +* 2\n").unwrap_err().line, 2);
    }

    #[test]
    fn test_bad_targets_are_rejected() {
        assert_eq!(
            parse_module("f() = 1\n").unwrap_err().message,
            "cannot assign to function call"
        );
        assert!(parse_module("a, *b, *c = [1, 2, 3]\n").is_err());
        assert!(parse_module("def f(a, a):\n    pass\n").is_err());
    }

    #[test]
    fn test_star_unpacking_target() {
        let module = parse_module("first, *rest = [1, 2, 3]\n").unwrap();
        let StmtKind::Assign { targets, .. } = &module[0].kind else {
            panic!("expected assign");
        };
        assert!(matches!(&targets[0], Expr::Tuple(items) if matches!(items[1], Expr::Starred(_))));
    }

    #[test]
    fn test_relative_import_level() {
        let module = parse_module("from . import helpers\n").unwrap();
        assert!(matches!(
            &module[0].kind,
            StmtKind::ImportFrom { module: None, level: 1, .. }
        ));
    }

    #[test]
    fn test_nested_brackets_are_capped() {
        let ok = format!("x = {}1{}\n", "(".repeat(MAX_BRACKET_DEPTH), ")".repeat(MAX_BRACKET_DEPTH));
        assert!(on_big_stack(move || parse_module(&ok).is_ok()));

        let deep = format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
        assert_eq!(message_of(&deep), ("too many nested parentheses".to_string(), 1));
        let lists = format!("print({}{})\n", "[".repeat(5000), "]".repeat(5000));
        assert_eq!(message_of(&lists).0, "too many nested parentheses");
    }

    #[test]
    fn test_long_operator_chains_are_capped() {
        let unary = format!("x = {}1\n", "-".repeat(200_000));
        assert_eq!(message_of(&unary).0, "expression nested too deeply");
        let chain = format!("x = {}1\n", "1 + ".repeat(50_000));
        assert_eq!(message_of(&chain).0, "expression nested too deeply");
        let calls = format!("f{}\n", "()".repeat(50_000));
        assert_eq!(message_of(&calls).0, "expression nested too deeply");

        // separators reset the count
        let wide = format!("data = [{}]\n", vec!["-1"; 5000].join(", "));
        assert!(parse_module(&wide).is_ok());
    }

    #[test]
    fn test_indentation_is_capped() {
        let mut src = String::new();
        for level in 0..150 {
            src.push_str(&" ".repeat(level));
            src.push_str("if True:\n");
        }
        src.push_str(&" ".repeat(150));
        src.push_str("pass\n");
        assert_eq!(message_of(&src).0, "too many levels of indentation");
    }
}
