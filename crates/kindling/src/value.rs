//! The tagged value model shared by the evaluator and the bytecode VM
//! (SPEC_FULL.md §3, §4.A).

use std::cmp::Ordering;

use crate::diagnostics::{Category, DiagnosticSink};
use crate::heap::{Heap, HeapData};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    Char(char),
    Null,
    Ref(crate::heap::HeapId),
}

impl Value {
    pub fn kind_name(&self, heap: &Heap) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Real(_) => "Real",
            Value::Bool(_) => "Bool",
            Value::Char(_) => "Char",
            Value::Null => "Null",
            Value::Ref(id) => match heap.get(*id) {
                HeapData::String(_) => "String",
                HeapData::List(_) => "List",
                HeapData::Function(_) => "Function",
                HeapData::Struct(_) => "Struct",
            },
        }
    }

    pub fn is_ordinal(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Real(_) | Value::Bool(_))
    }

    /// Promotes an ordinal scalar to `f64` (Bool -> Int -> Real promotion chain).
    fn as_real(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// `true` iff this is the language's notion of a boolean condition result.
    /// Non-Bool predicates are a `TypeError` and evaluate as false.
    pub fn truthy(&self, sink: &mut DiagnosticSink, line: u32) -> bool {
        match self {
            Value::Bool(b) => *b,
            other => {
                sink.report(
                    Category::TypeError,
                    format!("expected Bool in condition, found {}", other_kind_hint(other)),
                    line,
                );
                false
            }
        }
    }

    /// Collapses a `Real` that is mathematically integral back to `Int`
    /// (the canonical numeric narrowing rule, §4.A).
    pub fn narrow_real(v: f64) -> Value {
        if v.floor() == v && v.is_finite() {
            Value::Int(v as i64)
        } else {
            Value::Real(v)
        }
    }

    pub fn to_display_string(&self, heap: &Heap) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Null => "null".to_string(),
            Value::Ref(id) => match heap.get(*id) {
                HeapData::String(s) => s.clone(),
                HeapData::List(list) => {
                    let items: Vec<String> = list.iter().map(|v| v.to_display_string(heap)).collect();
                    format!("[ {} ]", items.join(", "))
                }
                HeapData::Function(f) => format!("<function {}>", f.name()),
                HeapData::Struct(s) => {
                    let fields: Vec<String> = s
                        .fields
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k, v.to_display_string(heap)))
                        .collect();
                    format!("{} {{ {} }}", s.type_name, fields.join(", "))
                }
            },
        }
    }
}

/// Best-effort type name for a scalar, used only in diagnostic text (doesn't
/// need heap access since scalars never reference it).
fn other_kind_hint(v: &Value) -> &'static str {
    match v {
        Value::Int(_) => "Int",
        Value::Real(_) => "Real",
        Value::Bool(_) => "Bool",
        Value::Char(_) => "Char",
        Value::Null => "Null",
        Value::Ref(_) => "a heap value",
    }
}

fn type_error(sink: &mut DiagnosticSink, line: u32, message: impl Into<String>) -> Value {
    sink.report(Category::TypeError, message, line);
    Value::Null
}

/// `add`: numeric promotion, or string concatenation when either operand is
/// a String (evaluator only — the VM backend uses a distinct `sconcat` op).
pub fn add(a: &Value, b: &Value, heap: &mut Heap, sink: &mut DiagnosticSink, line: u32) -> Value {
    if is_string(a, heap) || is_string(b, heap) {
        let s = format!("{}{}", a.to_display_string(heap), b.to_display_string(heap));
        let id = heap.make_string(s);
        return Value::Ref(id);
    }
    numeric_binop(a, b, sink, line, "add", |x, y| x + y, |x, y| x.wrapping_add(y))
}

pub fn sub(a: &Value, b: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    numeric_binop(a, b, sink, line, "sub", |x, y| x - y, |x, y| x.wrapping_sub(y))
}

pub fn mul(a: &Value, b: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    numeric_binop(a, b, sink, line, "mul", |x, y| x * y, |x, y| x.wrapping_mul(y))
}

/// Division by zero reports `DivisionByZero` and yields `Real 0`.
pub fn div(a: &Value, b: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    let (Some(x), Some(y)) = (a.as_real(), b.as_real()) else {
        return type_error(sink, line, "div requires numeric operands");
    };
    if y == 0.0 {
        sink.report(Category::DivisionByZero, "division by zero", line);
        return Value::Real(0.0);
    }
    Value::narrow_real(x / y)
}

/// `mod` truncates to Int.
pub fn modulo(a: &Value, b: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    let (Some(x), Some(y)) = (a.as_real(), b.as_real()) else {
        return type_error(sink, line, "mod requires numeric operands");
    };
    if y == 0.0 {
        sink.report(Category::DivisionByZero, "modulo by zero", line);
        return Value::Real(0.0);
    }
    Value::Int((x as i64).wrapping_rem(y as i64))
}

pub fn pow(a: &Value, b: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    let (Some(x), Some(y)) = (a.as_real(), b.as_real()) else {
        return type_error(sink, line, "pow requires numeric operands");
    };
    Value::narrow_real(x.powf(y))
}

pub fn neg(a: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    match a {
        Value::Int(i) => Value::Int(-i),
        Value::Real(r) => Value::Real(-r),
        Value::Bool(b) => Value::Int(-(*b as i64)),
        _ => type_error(sink, line, "unary '-' requires a numeric operand"),
    }
}

pub fn not(a: &Value, sink: &mut DiagnosticSink, line: u32) -> Value {
    match a {
        Value::Bool(b) => Value::Bool(!b),
        _ => type_error(sink, line, "unary '!' requires a Bool operand"),
    }
}

fn numeric_binop(
    a: &Value,
    b: &Value,
    sink: &mut DiagnosticSink,
    line: u32,
    op_name: &str,
    real_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> i64,
) -> Value {
    match (a, b) {
        (Value::Real(_), _) | (_, Value::Real(_)) => {
            let (Some(x), Some(y)) = (a.as_real(), b.as_real()) else {
                return type_error(sink, line, format!("{op_name} requires numeric operands"));
            };
            Value::narrow_real(real_op(x, y))
        }
        _ => match (int_like(a), int_like(b)) {
            (Some(x), Some(y)) => Value::Int(int_op(x, y)),
            _ => type_error(sink, line, format!("{op_name} requires numeric operands")),
        },
    }
}

fn int_like(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn is_string(v: &Value, heap: &Heap) -> bool {
    matches!(v, Value::Ref(id) if matches!(heap.get(*id), HeapData::String(_)))
}

/// Total order used by both `<`/`>`/`==` and the `sort` builtin: numeric for
/// ordinals, lexicographic-by-string-representation otherwise.
pub fn compare(a: &Value, b: &Value, heap: &Heap) -> Ordering {
    if a.is_ordinal() && b.is_ordinal() {
        let x = a.as_real().unwrap_or(0.0);
        let y = b.as_real().unwrap_or(0.0);
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    } else {
        a.to_display_string(heap).cmp(&b.to_display_string(heap))
    }
}

pub fn equ(a: &Value, b: &Value, heap: &Heap) -> bool {
    compare(a, b, heap) == Ordering::Equal
}

pub fn lt(a: &Value, b: &Value, heap: &Heap) -> bool {
    compare(a, b, heap) == Ordering::Less
}

pub fn gt(a: &Value, b: &Value, heap: &Heap) -> bool {
    compare(a, b, heap) == Ordering::Greater
}

pub fn lte(a: &Value, b: &Value, heap: &Heap) -> bool {
    compare(a, b, heap) != Ordering::Greater
}

pub fn gte(a: &Value, b: &Value, heap: &Heap) -> bool {
    compare(a, b, heap) != Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_real_collapses_integral_values_only() {
        assert_eq!(Value::narrow_real(3.0), Value::Int(3));
        assert_eq!(Value::narrow_real(-4.0), Value::Int(-4));
        assert_eq!(Value::narrow_real(3.5), Value::Real(3.5));
        assert_eq!(Value::narrow_real(f64::INFINITY), Value::Real(f64::INFINITY));
    }

    #[test]
    fn comparison_is_total_for_ordinal_pairs() {
        let heap = Heap::new();
        let pairs = [
            (Value::Int(1), Value::Int(2)),
            (Value::Int(2), Value::Int(2)),
            (Value::Real(1.5), Value::Int(1)),
            (Value::Bool(true), Value::Int(1)),
            (Value::Bool(false), Value::Bool(true)),
        ];
        for (a, b) in pairs {
            let outcomes = [lt(&a, &b, &heap), gt(&a, &b, &heap), equ(&a, &b, &heap)];
            assert_eq!(outcomes.iter().filter(|x| **x).count(), 1, "{a:?} vs {b:?} must satisfy exactly one of </>/==");
        }
    }

    #[test]
    fn division_by_zero_reports_and_yields_zero() {
        let mut sink = DiagnosticSink::new();
        let v = div(&Value::Int(4), &Value::Int(0), &mut sink, 1);
        assert_eq!(v, Value::Real(0.0));
        assert!(!sink.is_empty());
        assert!(sink.categories().any(|c| c == Category::DivisionByZero));
    }

    #[test]
    fn add_promotes_to_real_when_either_side_is_real() {
        let mut heap = Heap::new();
        let mut sink = DiagnosticSink::new();
        assert_eq!(add(&Value::Int(1), &Value::Real(2.5), &mut heap, &mut sink, 1), Value::Real(3.5));
        assert_eq!(add(&Value::Int(2), &Value::Int(2), &mut heap, &mut sink, 1), Value::Int(4));
    }
}
