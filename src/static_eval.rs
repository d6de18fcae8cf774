//! Static Evaluator
//!
//! Owned expression and statement trees, and the interpreter that runs them
//! against a [`Scope`]. Trees are produced once by the evaluator front end and
//! can be invoked any number of times.
//!
//! Values are `serde_json::Value`; `undefined` and `null` are both `Null`.
//! JSON has no `NaN` or `Infinity`, so non-finite numbers also collapse to
//! `Null`. Departures from JavaScript that follow from this:
//!
//! - `{{ 0 / 0 }}` and `{{ 1 / 0 }}` render as empty text, not `NaN` or
//!   `Infinity`.
//! - `typeof null` is `"undefined"`, and so is `typeof (0 / 0)`.
//! - A non-finite result is falsy and compares equal to `null`.

use serde_json::{Map, Number, Value};

use crate::error::EvalErrorKind;
use crate::scope::Scope;

// ═══════════════════════════════════════════════════════════════════════════════
// IR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectItem {
    Property(Property, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Member {
        object: Box<Expr>,
        property: Property,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Assign {
        target: String,
        op: AssignOp,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare { name: String, init: Option<Expr> },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Vec<Stmt>,
        alternate: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const GLOBALS: &[&str] = &[
    "Math", "JSON", "String", "Number", "Boolean", "parseInt", "parseFloat", "undefined", "NaN",
];

/// Upper bound `toFixed` accepts.
const MAX_FRACTION_DIGITS: f64 = 100.0;

/// Numbers with no fractional part are stored as integers so they print as
/// `5` rather than `5.0`. Non-finite results become `Null`.
pub fn number(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Text form used when a value lands in markup.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i128),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => to_number(a) == to_number(b),
        _ => strict_equals(a, b),
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> bool {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return match op {
            BinaryOp::Lt => x < y,
            BinaryOp::LtEq => x <= y,
            BinaryOp::Gt => x > y,
            _ => x >= y,
        };
    }
    let (x, y) = (to_number(a), to_number(b));
    match op {
        BinaryOp::Lt => x < y,
        BinaryOp::LtEq => x <= y,
        BinaryOp::Gt => x > y,
        _ => x >= y,
    }
}

fn property_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => stringify(other),
    }
}

fn get_property(object: &Value, key: &str) -> Value {
    match object {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) if key == "length" => number(items.len() as f64),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::String(s) if key == "length" => number(s.chars().count() as f64),
        Value::String(s) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// JS-style slice bounds: negative indices count from the end.
fn slice_bounds(len: usize, args: &[Value]) -> (usize, usize) {
    let resolve = |v: Option<&Value>, default: usize| -> usize {
        match v {
            None | Some(Value::Null) => default,
            Some(v) => {
                let n = to_number(v);
                if n.is_nan() {
                    0
                } else if n < 0.0 {
                    len.saturating_sub((-n) as usize)
                } else {
                    (n as usize).min(len)
                }
            }
        }
    };
    let start = resolve(args.first(), 0);
    let end = resolve(args.get(1), len);
    (start, end.max(start))
}

fn arg_str(args: &[Value], i: usize) -> String {
    args.get(i).map(stringify).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

enum Flow {
    Normal,
    Return(Value),
}

type EvalResult<T> = std::result::Result<T, EvalErrorKind>;

/// Evaluate a single expression. `scope` is only mutated by assignments.
pub fn eval_expr(expr: &Expr, scope: &mut Scope) -> EvalResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => lookup(name, scope),
        Expr::Template { quasis, exprs } => {
            let mut out = String::new();
            for (i, quasi) in quasis.iter().enumerate() {
                out.push_str(quasi);
                if let Some(e) = exprs.get(i) {
                    out.push_str(&stringify(&eval_expr(e, scope)?));
                }
            }
            Ok(Value::String(out))
        }
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    ArrayItem::Item(e) => out.push(eval_expr(e, scope)?),
                    ArrayItem::Hole => out.push(Value::Null),
                    ArrayItem::Spread(e) => match eval_expr(e, scope)? {
                        Value::Array(inner) => out.extend(inner),
                        Value::String(s) => {
                            out.extend(s.chars().map(|c| Value::String(c.to_string())))
                        }
                        other => {
                            return Err(EvalErrorKind::Type(format!(
                                "{} is not iterable",
                                type_of(&other)
                            )))
                        }
                    },
                }
            }
            Ok(Value::Array(out))
        }
        Expr::Object(items) => {
            let mut out = Map::new();
            for item in items {
                match item {
                    ObjectItem::Property(key, value) => {
                        let key = match key {
                            Property::Static(k) => k.clone(),
                            Property::Computed(e) => property_key(&eval_expr(e, scope)?),
                        };
                        let value = eval_expr(value, scope)?;
                        out.insert(key, value);
                    }
                    ObjectItem::Spread(e) => {
                        if let Value::Object(inner) = eval_expr(e, scope)? {
                            out.extend(inner);
                        }
                    }
                }
            }
            Ok(Value::Object(out))
        }
        Expr::Member {
            object,
            property,
            optional,
        } => {
            if let (Expr::Ident(global), Property::Static(name)) = (object.as_ref(), property) {
                if is_global(global, scope) {
                    return global_property(global, name);
                }
            }
            let target = eval_expr(object, scope)?;
            if target.is_null() {
                return if *optional {
                    Ok(Value::Null)
                } else {
                    Err(EvalErrorKind::Type(format!(
                        "cannot read property {} of undefined",
                        describe_property(property)
                    )))
                };
            }
            let key = match property {
                Property::Static(k) => k.clone(),
                Property::Computed(e) => property_key(&eval_expr(e, scope)?),
            };
            Ok(get_property(&target, &key))
        }
        Expr::Call {
            callee,
            args,
            optional,
        } => eval_call(callee, args, *optional, scope),
        Expr::Unary(op, arg) => {
            let v = eval_expr(arg, scope)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!truthy(&v)),
                UnaryOp::Neg => number(-to_number(&v)),
                UnaryOp::Plus => number(to_number(&v)),
                UnaryOp::TypeOf => Value::String(type_of(&v).to_string()),
            })
        }
        Expr::Binary(op, left, right) => {
            let l = eval_expr(left, scope)?;
            let r = eval_expr(right, scope)?;
            binary(*op, &l, &r)
        }
        Expr::Logical(op, left, right) => {
            let l = eval_expr(left, scope)?;
            match op {
                LogicalOp::And if !truthy(&l) => Ok(l),
                LogicalOp::Or if truthy(&l) => Ok(l),
                LogicalOp::Coalesce if !l.is_null() => Ok(l),
                _ => eval_expr(right, scope),
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if truthy(&eval_expr(test, scope)?) {
                eval_expr(consequent, scope)
            } else {
                eval_expr(alternate, scope)
            }
        }
        Expr::Sequence(exprs) => {
            let mut last = Value::Null;
            for e in exprs {
                last = eval_expr(e, scope)?;
            }
            Ok(last)
        }
        Expr::Assign { target, op, value } => {
            let rhs = eval_expr(value, scope)?;
            let next = match op {
                AssignOp::Assign => rhs,
                AssignOp::Add => binary(BinaryOp::Add, &lookup(target, scope)?, &rhs)?,
                AssignOp::Sub => binary(BinaryOp::Sub, &lookup(target, scope)?, &rhs)?,
            };
            if !scope.assign(target, next.clone()) {
                return Err(EvalErrorKind::UnknownIdentifier(target.clone()));
            }
            Ok(next)
        }
    }
}

/// Run statements. Returns the first `return` value, or an object of the
/// top-level declarations when no `return` executes.
pub fn run_script(body: &[Stmt], scope: &Scope) -> EvalResult<Value> {
    let mut local = scope.clone();
    local.push_layer(crate::scope::LOCALS, Map::new());
    match run_block(body, &mut local)? {
        Flow::Return(v) => Ok(v),
        Flow::Normal => Ok(Value::Object(
            local
                .layers()
                .last()
                .map(|l| l.values.clone())
                .unwrap_or_default(),
        )),
    }
}

fn run_block(body: &[Stmt], scope: &mut Scope) -> EvalResult<Flow> {
    for stmt in body {
        if let Flow::Return(v) = run_stmt(stmt, scope)? {
            return Ok(Flow::Return(v));
        }
    }
    Ok(Flow::Normal)
}

fn run_stmt(stmt: &Stmt, scope: &mut Scope) -> EvalResult<Flow> {
    match stmt {
        Stmt::Declare { name, init } => {
            let value = match init {
                Some(e) => eval_expr(e, scope)?,
                None => Value::Null,
            };
            scope.declare(name.clone(), value);
            Ok(Flow::Normal)
        }
        Stmt::Expr(e) => {
            eval_expr(e, scope)?;
            Ok(Flow::Normal)
        }
        Stmt::Return(e) => Ok(Flow::Return(match e {
            Some(e) => eval_expr(e, scope)?,
            None => Value::Null,
        })),
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            if truthy(&eval_expr(test, scope)?) {
                run_block(consequent, scope)
            } else {
                run_block(alternate, scope)
            }
        }
        Stmt::Block(body) => run_block(body, scope),
    }
}

fn lookup(name: &str, scope: &Scope) -> EvalResult<Value> {
    if let Some(v) = scope.lookup(name) {
        return Ok(v.clone());
    }
    match name {
        "undefined" => Ok(Value::Null),
        "NaN" => Ok(Value::Null),
        _ => Err(EvalErrorKind::UnknownIdentifier(name.to_string())),
    }
}

fn is_global(name: &str, scope: &Scope) -> bool {
    GLOBALS.contains(&name) && !scope.contains(name)
}

fn describe_property(property: &Property) -> String {
    match property {
        Property::Static(k) => format!("'{}'", k),
        Property::Computed(_) => "<computed>".to_string(),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> EvalResult<Value> {
    Ok(match op {
        BinaryOp::Add => {
            if l.is_string() || r.is_string() {
                Value::String(format!("{}{}", stringify(l), stringify(r)))
            } else {
                number(to_number(l) + to_number(r))
            }
        }
        BinaryOp::Sub => number(to_number(l) - to_number(r)),
        BinaryOp::Mul => number(to_number(l) * to_number(r)),
        BinaryOp::Div => number(to_number(l) / to_number(r)),
        BinaryOp::Rem => number(to_number(l) % to_number(r)),
        BinaryOp::Pow => number(to_number(l).powf(to_number(r))),
        BinaryOp::Eq => Value::Bool(loose_equals(l, r)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(l, r)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(l, r)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(l, r)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Value::Bool(compare(op, l, r))
        }
        BinaryOp::In => match r {
            Value::Object(map) => Value::Bool(map.contains_key(&property_key(l))),
            Value::Array(items) => Value::Bool(
                property_key(l)
                    .parse::<usize>()
                    .map_or(false, |i| i < items.len()),
            ),
            other => {
                return Err(EvalErrorKind::Type(format!(
                    "cannot use 'in' on {}",
                    type_of(other)
                )))
            }
        },
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILTINS
// ═══════════════════════════════════════════════════════════════════════════════

fn global_property(global: &str, name: &str) -> EvalResult<Value> {
    match (global, name) {
        ("Math", "PI") => Ok(number(std::f64::consts::PI)),
        ("Math", "E") => Ok(number(std::f64::consts::E)),
        _ => Err(EvalErrorKind::Unsupported(format!("{}.{}", global, name))),
    }
}

fn eval_call(callee: &Expr, args: &[Expr], optional: bool, scope: &mut Scope) -> EvalResult<Value> {
    let mut values = Vec::with_capacity(args.len());
    for a in args {
        values.push(eval_expr(a, scope)?);
    }

    match callee {
        Expr::Ident(name) if is_global(name, scope) => call_function(name, &values),
        Expr::Member {
            object,
            property: Property::Static(method),
            optional: member_optional,
        } => {
            if let Expr::Ident(global) = object.as_ref() {
                if is_global(global, scope) {
                    return call_static(global, method, &values);
                }
            }
            let receiver = eval_expr(object, scope)?;
            if receiver.is_null() && (optional || *member_optional) {
                return Ok(Value::Null);
            }
            call_method(&receiver, method, &values)
        }
        other => {
            let target = eval_expr(other, scope)?;
            if target.is_null() && optional {
                return Ok(Value::Null);
            }
            Err(EvalErrorKind::NotCallable(describe_callee(other)))
        }
    }
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object,
            property: Property::Static(p),
            ..
        } => format!("{}.{}", describe_callee(object), p),
        _ => "expression".to_string(),
    }
}

fn call_function(name: &str, args: &[Value]) -> EvalResult<Value> {
    let first = args.first().cloned().unwrap_or(Value::Null);
    match name {
        "String" => Ok(Value::String(stringify(&first))),
        "Number" => Ok(number(to_number(&first))),
        "Boolean" => Ok(Value::Bool(truthy(&first))),
        "parseInt" => {
            let text = stringify(&first);
            let digits: String = text
                .trim()
                .chars()
                .enumerate()
                .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
                .map(|(_, c)| c)
                .collect();
            Ok(digits
                .parse::<i64>()
                .map(|n| number(n as f64))
                .unwrap_or(Value::Null))
        }
        "parseFloat" => Ok(number(stringify(&first).trim().parse().unwrap_or(f64::NAN))),
        _ => Err(EvalErrorKind::NotCallable(name.to_string())),
    }
}

fn call_static(global: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    let nums = || args.iter().map(to_number);
    let first = args.first().map(to_number).unwrap_or(f64::NAN);
    match (global, method) {
        ("Math", "max") => Ok(number(nums().fold(f64::NEG_INFINITY, f64::max))),
        ("Math", "min") => Ok(number(nums().fold(f64::INFINITY, f64::min))),
        ("Math", "floor") => Ok(number(first.floor())),
        ("Math", "ceil") => Ok(number(first.ceil())),
        ("Math", "round") => Ok(number((first + 0.5).floor())),
        ("Math", "abs") => Ok(number(first.abs())),
        ("Math", "sqrt") => Ok(number(first.sqrt())),
        ("Math", "pow") => Ok(number(
            first.powf(args.get(1).map(to_number).unwrap_or(f64::NAN)),
        )),
        ("JSON", "stringify") => Ok(Value::String(
            args.first().cloned().unwrap_or(Value::Null).to_string(),
        )),
        ("JSON", "parse") => serde_json::from_str(&arg_str(args, 0))
            .map_err(|e| EvalErrorKind::Type(format!("JSON.parse: {}", e))),
        _ => Err(EvalErrorKind::NotCallable(format!("{}.{}", global, method))),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    match receiver {
        Value::String(s) => string_method(s, method, args),
        Value::Array(items) => array_method(items, method, args),
        Value::Number(_) if method == "toFixed" => {
            let digits = args.first().map(to_number).unwrap_or(0.0);
            let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
            if !(0.0..=MAX_FRACTION_DIGITS).contains(&digits) {
                return Err(EvalErrorKind::Type(
                    "toFixed() digits argument must be between 0 and 100".into(),
                ));
            }
            let digits = digits as usize;
            Ok(Value::String(format!(
                "{:.*}",
                digits,
                to_number(receiver)
            )))
        }
        _ if method == "toString" => Ok(Value::String(stringify(receiver))),
        other => Err(EvalErrorKind::NotCallable(format!(
            "{}.{}",
            type_of(other),
            method
        ))),
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    let text = |v: String| Ok(Value::String(v));
    match method {
        "toUpperCase" => text(s.to_uppercase()),
        "toLowerCase" => text(s.to_lowercase()),
        "trim" => text(s.trim().to_string()),
        "toString" => text(s.to_string()),
        "includes" => Ok(Value::Bool(s.contains(&arg_str(args, 0)))),
        "startsWith" => Ok(Value::Bool(s.starts_with(&arg_str(args, 0)))),
        "endsWith" => Ok(Value::Bool(s.ends_with(&arg_str(args, 0)))),
        "indexOf" => Ok(number(
            s.find(&arg_str(args, 0))
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0),
        )),
        "replace" => text(s.replacen(&arg_str(args, 0), &arg_str(args, 1), 1)),
        "replaceAll" => text(s.replace(&arg_str(args, 0), &arg_str(args, 1))),
        "split" => {
            let sep = arg_str(args, 0);
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect()
            };
            Ok(Value::Array(parts))
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), args);
            text(chars[start..end].iter().collect())
        }
        _ => Err(EvalErrorKind::NotCallable(format!("string.{}", method))),
    }
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> EvalResult<Value> {
    match method {
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(v) => stringify(v),
            };
            Ok(Value::String(
                items.iter().map(stringify).collect::<Vec<_>>().join(&sep),
            ))
        }
        "includes" => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            Ok(Value::Bool(items.iter().any(|v| strict_equals(v, &needle))))
        }
        "indexOf" => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            Ok(number(
                items
                    .iter()
                    .position(|v| strict_equals(v, &needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            ))
        }
        "slice" => {
            let (start, end) = slice_bounds(items.len(), args);
            Ok(Value::Array(items[start..end].to_vec()))
        }
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(out))
        }
        "toString" => Ok(Value::String(stringify(&Value::Array(items.to_vec())))),
        _ => Err(EvalErrorKind::NotCallable(format!("array.{}", method))),
    }
}
