//! Expression/script evaluator.
//!
//! An [`Evaluator`] turns text into reusable [`Invocable`] units. The default
//! [`JsEvaluator`] parses JavaScript with oxc and lowers the AST into the owned
//! trees of [`crate::static_eval`], so the allocator never outlives compilation.

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, AssignmentTarget, BindingPattern, CallExpression, ChainElement,
    ComputedMemberExpression, Expression, ObjectPropertyKind, PropertyKey, PropertyKind,
    Statement, StaticMemberExpression,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator};
use serde_json::Value;

use crate::error::{EvalErrorKind, EvaluationError};
use crate::scope::Scope;
use crate::static_eval::{
    eval_expr, run_script, stringify, ArrayItem, AssignOp, BinaryOp, Expr, LogicalOp, ObjectItem,
    Property, Stmt, UnaryOp,
};

/// A compiled expression or script that can be run against any scope.
pub trait Invocable: fmt::Debug {
    fn source(&self) -> &str;
    fn invoke(&self, scope: &Scope) -> Result<Value, EvaluationError>;
}

pub trait Evaluator {
    /// True when `text` carries embedded expressions and must be evaluated.
    fn detect_expression(&self, text: &str) -> bool;
    fn compile_expression(&self, text: &str) -> Result<Rc<dyn Invocable>, EvaluationError>;
    fn compile_script(&self, text: &str) -> Result<Rc<dyn Invocable>, EvaluationError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsEvaluator;

impl JsEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for JsEvaluator {
    fn detect_expression(&self, text: &str) -> bool {
        !delimited_spans(text).is_empty()
    }

    fn compile_expression(&self, text: &str) -> Result<Rc<dyn Invocable>, EvaluationError> {
        let body = if self.detect_expression(text) {
            compile_template(text)
        } else {
            parse_expression(text).map(ExprBody::Raw)
        }
        .map_err(|kind| EvaluationError::new(text, kind))?;
        Ok(Rc::new(ExpressionUnit {
            source: text.to_string(),
            body,
        }))
    }

    fn compile_script(&self, text: &str) -> Result<Rc<dyn Invocable>, EvaluationError> {
        let body = parse_script(text).map_err(|kind| EvaluationError::new(text, kind))?;
        Ok(Rc::new(ScriptUnit {
            source: text.to_string(),
            body,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNITS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum ExprBody {
    /// Undelimited expression text.
    Raw(Expr),
    /// Exactly one delimited expression; yields its value unchanged.
    Single(Expr),
    /// Literal text interleaved with expressions; yields a string.
    Template(Vec<Segment>),
}

#[derive(Debug)]
struct ExpressionUnit {
    source: String,
    body: ExprBody,
}

impl Invocable for ExpressionUnit {
    fn source(&self) -> &str {
        &self.source
    }

    fn invoke(&self, scope: &Scope) -> Result<Value, EvaluationError> {
        let mut scope = scope.clone();
        let result = match &self.body {
            ExprBody::Raw(e) | ExprBody::Single(e) => eval_expr(e, &mut scope),
            ExprBody::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(t) => out.push_str(t),
                        Segment::Expr(e) => match eval_expr(e, &mut scope) {
                            Ok(v) => out.push_str(&stringify(&v)),
                            Err(kind) => return Err(EvaluationError::new(&self.source, kind)),
                        },
                    }
                }
                Ok(Value::String(out))
            }
        };
        result.map_err(|kind| EvaluationError::new(&self.source, kind))
    }
}

#[derive(Debug)]
struct ScriptUnit {
    source: String,
    body: Vec<Stmt>,
}

impl Invocable for ScriptUnit {
    fn source(&self) -> &str {
        &self.source
    }

    fn invoke(&self, scope: &Scope) -> Result<Value, EvaluationError> {
        run_script(&self.body, scope).map_err(|kind| EvaluationError::new(&self.source, kind))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELIMITERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte ranges of every `{{ … }}` in `text`, delimiters included.
///
/// The closing `}}` is the first one outside nested braces and string or
/// template literals, so `{{ {a: {b: 1}} }}` is a single expression. An opening
/// `{{` that is never closed is skipped.
pub(crate) fn delimited_spans(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find("{{") {
        let open = from + offset;
        match closing_delimiter(bytes, open + 2) {
            Some(end) => {
                spans.push(open..end);
                from = end;
            }
            None => from = open + 2,
        }
    }
    spans
}

/// Index just past the `}}` closing an expression whose body starts at `start`.
fn closing_delimiter(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i + 2),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn compile_template(text: &str) -> Result<ExprBody, EvalErrorKind> {
    let mut segments = Vec::new();
    let mut last_end = 0;
    for whole in delimited_spans(text) {
        if whole.start > last_end {
            segments.push(Segment::Text(text[last_end..whole.start].to_string()));
        }
        segments.push(Segment::Expr(parse_expression(&text[whole.start + 2..whole.end - 2])?));
        last_end = whole.end;
    }
    if last_end < text.len() {
        segments.push(Segment::Text(text[last_end..].to_string()));
    }

    let mut exprs = segments.iter().filter(|s| matches!(s, Segment::Expr(_)));
    let only_whitespace_around = segments
        .iter()
        .all(|s| matches!(s, Segment::Expr(_)) || matches!(s, Segment::Text(t) if t.trim().is_empty()));
    if let (Some(Segment::Expr(single)), None) = (exprs.next(), exprs.next()) {
        if only_whitespace_around {
            return Ok(ExprBody::Single(single.clone()));
        }
    }
    Ok(ExprBody::Template(segments))
}

// ═══════════════════════════════════════════════════════════════════════════════
// OXC LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

/// Scripts are wrapped in a function so that top-level `return` parses.
const SCRIPT_PREFIX: &str = "function __script__() {\n";
const SCRIPT_SUFFIX: &str = "\n}";

fn source_type() -> SourceType {
    SourceType::default().with_module(true)
}

fn syntax_error<E: fmt::Display>(errors: &[E]) -> EvalErrorKind {
    EvalErrorKind::Syntax(
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn parse_expression(text: &str) -> Result<Expr, EvalErrorKind> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, text, source_type())
        .parse_expression()
        .map_err(|errors| syntax_error(&errors))?;
    Lowerer { source: text }.expr(&expr)
}

fn parse_script(text: &str) -> Result<Vec<Stmt>, EvalErrorKind> {
    let wrapped = format!("{}{}{}", SCRIPT_PREFIX, text, SCRIPT_SUFFIX);
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &wrapped, source_type()).parse();
    if !ret.errors.is_empty() {
        return Err(syntax_error(&ret.errors));
    }
    let lowerer = Lowerer { source: &wrapped };
    let Some(Statement::FunctionDeclaration(func)) = ret.program.body.first() else {
        return Err(EvalErrorKind::Syntax("script must be a statement list".into()));
    };
    let Some(body) = &func.body else {
        return Ok(Vec::new());
    };
    lowerer.stmts(&body.statements)
}

struct Lowerer<'s> {
    source: &'s str,
}

impl<'s> Lowerer<'s> {
    fn snippet(&self, span: Span) -> String {
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("<unknown>")
            .to_string()
    }

    fn unsupported(&self, span: Span) -> EvalErrorKind {
        EvalErrorKind::Unsupported(self.snippet(span))
    }

    fn boxed(&self, expr: &Expression) -> Result<Box<Expr>, EvalErrorKind> {
        self.expr(expr).map(Box::new)
    }

    fn expr(&self, expr: &Expression) -> Result<Expr, EvalErrorKind> {
        Ok(match expr {
            Expression::BooleanLiteral(b) => Expr::Literal(Value::Bool(b.value)),
            Expression::NullLiteral(_) => Expr::Literal(Value::Null),
            Expression::NumericLiteral(n) => Expr::Literal(crate::static_eval::number(n.value)),
            Expression::StringLiteral(s) => Expr::Literal(Value::String(s.value.to_string())),
            Expression::TemplateLiteral(t) => Expr::Template {
                quasis: t
                    .quasis
                    .iter()
                    .map(|q| {
                        q.value
                            .cooked
                            .as_ref()
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| q.value.raw.to_string())
                    })
                    .collect(),
                exprs: t
                    .expressions
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<_, _>>()?,
            },
            Expression::Identifier(id) => Expr::Ident(id.name.to_string()),
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for elem in &arr.elements {
                    items.push(match elem {
                        ArrayExpressionElement::SpreadElement(s) => {
                            ArrayItem::Spread(self.expr(&s.argument)?)
                        }
                        ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                        other => match other.as_expression() {
                            Some(e) => ArrayItem::Item(self.expr(e)?),
                            None => return Err(self.unsupported(other.span())),
                        },
                    });
                }
                Expr::Array(items)
            }
            Expression::ObjectExpression(obj) => {
                let mut items = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    items.push(match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            if !matches!(p.kind, PropertyKind::Init) || p.method {
                                return Err(self.unsupported(p.span));
                            }
                            ObjectItem::Property(self.key(&p.key, p.computed)?, self.expr(&p.value)?)
                        }
                        ObjectPropertyKind::SpreadProperty(s) => {
                            ObjectItem::Spread(self.expr(&s.argument)?)
                        }
                    });
                }
                Expr::Object(items)
            }
            Expression::StaticMemberExpression(m) => self.static_member(m)?,
            Expression::ComputedMemberExpression(m) => self.computed_member(m)?,
            Expression::CallExpression(c) => self.call(c)?,
            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    ChainElement::CallExpression(c) => self.call(c)?,
                    ChainElement::StaticMemberExpression(m) => self.static_member(m)?,
                    ChainElement::ComputedMemberExpression(m) => self.computed_member(m)?,
                    _ => return Err(self.unsupported(chain.span)),
                };
                short_circuit(inner)
            }
            Expression::UnaryExpression(u) => {
                let op = match u.operator {
                    UnaryOperator::LogicalNot => UnaryOp::Not,
                    UnaryOperator::UnaryNegation => UnaryOp::Neg,
                    UnaryOperator::UnaryPlus => UnaryOp::Plus,
                    UnaryOperator::Typeof => UnaryOp::TypeOf,
                    _ => return Err(self.unsupported(u.span)),
                };
                Expr::Unary(op, self.boxed(&u.argument)?)
            }
            Expression::BinaryExpression(b) => {
                let op = match b.operator {
                    BinaryOperator::Addition => BinaryOp::Add,
                    BinaryOperator::Subtraction => BinaryOp::Sub,
                    BinaryOperator::Multiplication => BinaryOp::Mul,
                    BinaryOperator::Division => BinaryOp::Div,
                    BinaryOperator::Remainder => BinaryOp::Rem,
                    BinaryOperator::Exponential => BinaryOp::Pow,
                    BinaryOperator::Equality => BinaryOp::Eq,
                    BinaryOperator::Inequality => BinaryOp::NotEq,
                    BinaryOperator::StrictEquality => BinaryOp::StrictEq,
                    BinaryOperator::StrictInequality => BinaryOp::StrictNotEq,
                    BinaryOperator::LessThan => BinaryOp::Lt,
                    BinaryOperator::LessEqualThan => BinaryOp::LtEq,
                    BinaryOperator::GreaterThan => BinaryOp::Gt,
                    BinaryOperator::GreaterEqualThan => BinaryOp::GtEq,
                    BinaryOperator::In => BinaryOp::In,
                    _ => return Err(self.unsupported(b.span)),
                };
                Expr::Binary(op, self.boxed(&b.left)?, self.boxed(&b.right)?)
            }
            Expression::LogicalExpression(l) => {
                let op = match l.operator {
                    LogicalOperator::And => LogicalOp::And,
                    LogicalOperator::Or => LogicalOp::Or,
                    LogicalOperator::Coalesce => LogicalOp::Coalesce,
                };
                Expr::Logical(op, self.boxed(&l.left)?, self.boxed(&l.right)?)
            }
            Expression::ConditionalExpression(c) => Expr::Conditional {
                test: self.boxed(&c.test)?,
                consequent: self.boxed(&c.consequent)?,
                alternate: self.boxed(&c.alternate)?,
            },
            Expression::SequenceExpression(seq) => Expr::Sequence(
                seq.expressions
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expression::ParenthesizedExpression(p) => self.expr(&p.expression)?,
            Expression::AssignmentExpression(a) => {
                let op = match a.operator {
                    AssignmentOperator::Assign => AssignOp::Assign,
                    AssignmentOperator::Addition => AssignOp::Add,
                    AssignmentOperator::Subtraction => AssignOp::Sub,
                    _ => return Err(self.unsupported(a.span)),
                };
                let target = match &a.left {
                    AssignmentTarget::AssignmentTargetIdentifier(id) => id.name.to_string(),
                    _ => return Err(self.unsupported(a.span)),
                };
                Expr::Assign {
                    target,
                    op,
                    value: self.boxed(&a.right)?,
                }
            }
            other => return Err(self.unsupported(other.span())),
        })
    }

    fn key(&self, key: &PropertyKey, computed: bool) -> Result<Property, EvalErrorKind> {
        if computed {
            return match key.as_expression() {
                Some(e) => Ok(Property::Computed(self.boxed(e)?)),
                None => Err(self.unsupported(key.span())),
            };
        }
        match key {
            PropertyKey::StaticIdentifier(id) => Ok(Property::Static(id.name.to_string())),
            PropertyKey::StringLiteral(s) => Ok(Property::Static(s.value.to_string())),
            PropertyKey::NumericLiteral(n) => Ok(Property::Static(stringify(
                &crate::static_eval::number(n.value),
            ))),
            other => Err(self.unsupported(other.span())),
        }
    }

    fn static_member(&self, m: &StaticMemberExpression) -> Result<Expr, EvalErrorKind> {
        Ok(Expr::Member {
            object: self.boxed(&m.object)?,
            property: Property::Static(m.property.name.to_string()),
            optional: m.optional,
        })
    }

    fn computed_member(&self, m: &ComputedMemberExpression) -> Result<Expr, EvalErrorKind> {
        Ok(Expr::Member {
            object: self.boxed(&m.object)?,
            property: Property::Computed(self.boxed(&m.expression)?),
            optional: m.optional,
        })
    }

    fn call(&self, c: &CallExpression) -> Result<Expr, EvalErrorKind> {
        let mut args = Vec::with_capacity(c.arguments.len());
        for arg in &c.arguments {
            match arg.as_expression() {
                Some(e) => args.push(self.expr(e)?),
                None => return Err(self.unsupported(arg.span())),
            }
        }
        Ok(Expr::Call {
            callee: self.boxed(&c.callee)?,
            args,
            optional: c.optional,
        })
    }

    fn stmts(&self, stmts: &[Statement]) -> Result<Vec<Stmt>, EvalErrorKind> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn stmt(&self, stmt: &Statement, out: &mut Vec<Stmt>) -> Result<(), EvalErrorKind> {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                for d in &decl.declarations {
                    let BindingPattern::BindingIdentifier(id) = &d.id else {
                        return Err(self.unsupported(d.span));
                    };
                    let init = match &d.init {
                        Some(e) => Some(self.expr(e)?),
                        None => None,
                    };
                    out.push(Stmt::Declare {
                        name: id.name.to_string(),
                        init,
                    });
                }
            }
            Statement::ExpressionStatement(e) => out.push(Stmt::Expr(self.expr(&e.expression)?)),
            Statement::ReturnStatement(r) => out.push(Stmt::Return(match &r.argument {
                Some(e) => Some(self.expr(e)?),
                None => None,
            })),
            Statement::IfStatement(i) => {
                let mut consequent = Vec::new();
                self.stmt(&i.consequent, &mut consequent)?;
                let mut alternate = Vec::new();
                if let Some(alt) = &i.alternate {
                    self.stmt(alt, &mut alternate)?;
                }
                out.push(Stmt::If {
                    test: self.expr(&i.test)?,
                    consequent,
                    alternate,
                });
            }
            Statement::BlockStatement(b) => out.push(Stmt::Block(self.stmts(&b.body)?)),
            Statement::EmptyStatement(_) => {}
            other => return Err(self.unsupported(other.span())),
        }
        Ok(())
    }
}

/// Inside an optional chain every link short-circuits on a missing value.
fn short_circuit(expr: Expr) -> Expr {
    match expr {
        Expr::Member {
            object, property, ..
        } => Expr::Member {
            object: Box::new(short_circuit(*object)),
            property,
            optional: true,
        },
        Expr::Call { callee, args, .. } => Expr::Call {
            callee: Box::new(short_circuit(*callee)),
            args,
            optional: true,
        },
        other => other,
    }
}
