//! Per-cell evaluation of a parsed expression against a cell's attribute
//! values and dimension coordinates, per SPEC_FULL §4.8.

use std::collections::HashMap;

use super::ast::{Ast, BinOp, UnOp};
use super::value::Value;
use crate::error::{Error, Result};

/// One cell's bindings: dimension coordinates plus attribute values.
pub struct EvalContext<'a> {
    pub coords: &'a [i64],
    pub attributes: &'a HashMap<String, Value>,
}

/// Outcome of evaluating a (sub)expression: a normal value, or the
/// "empty value" signal from an attribute holding its type's empty
/// sentinel, per SPEC_FULL §4.8.
pub enum Evaluated {
    Value(Value),
    Empty,
}

/// Evaluates `ast` against `ctx`. Returns `Ok(true)` for the "include cell,
/// skip predicate" empty-value case, otherwise the predicate's truthiness.
pub fn eval_predicate(ast: &Ast, ctx: &EvalContext) -> Result<bool> {
    match eval(ast, ctx)? {
        Evaluated::Empty => Ok(true),
        Evaluated::Value(v) => v.truthy(),
    }
}

fn eval(ast: &Ast, ctx: &EvalContext) -> Result<Evaluated> {
    match ast {
        Ast::Int(v) => Ok(Evaluated::Value(Value::Int(*v))),
        Ast::Float(v) => Ok(Evaluated::Value(Value::Float(*v))),
        Ast::Str(s) => Ok(Evaluated::Value(Value::Str(s.clone()))),
        Ast::Ident(name) => resolve_ident(name, ctx),
        Ast::Unary(op, inner) => {
            let v = match eval(inner, ctx)? {
                Evaluated::Empty => return Ok(Evaluated::Empty),
                Evaluated::Value(v) => v,
            };
            Ok(Evaluated::Value(match op {
                UnOp::Neg => match v {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    _ => {
                        return Err(Error::ExpressionTypeError {
                            op: "unary '-' requires a number".into(),
                        })
                    }
                },
                UnOp::Not => Value::bool(!v.truthy()?),
            }))
        }
        Ast::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
        Ast::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn resolve_ident(name: &str, ctx: &EvalContext) -> Result<Evaluated> {
    if let Some(rest) = name.strip_prefix("__dim") {
        let idx: usize = rest
            .parse()
            .map_err(|_| Error::ExpressionParse(format!("bad dimension reference {name}")))?;
        let coord = ctx
            .coords
            .get(idx)
            .ok_or_else(|| Error::ExpressionMisuse(format!("dimension index {idx} out of range")))?;
        return Ok(Evaluated::Value(Value::Int(*coord)));
    }
    match ctx.attributes.get(name) {
        Some(v) if is_empty_sentinel(v) => Ok(Evaluated::Empty),
        Some(v) => Ok(Evaluated::Value(v.clone())),
        None => Err(Error::UnknownName(name.to_string())),
    }
}

/// An attribute's element equal to its type's max value signals "empty",
/// per SPEC_FULL §4.8. Only scalar ints/floats carry this sentinel check
/// here; vectors are never collapsed to a single empty signal.
fn is_empty_sentinel(v: &Value) -> bool {
    matches!(v, Value::Int(i) if *i == i64::MAX) || matches!(v, Value::Float(f) if f.is_nan())
}

fn eval_binary(op: BinOp, lhs: &Ast, rhs: &Ast, ctx: &EvalContext) -> Result<Evaluated> {
    let l = match eval(lhs, ctx)? {
        Evaluated::Empty => return Ok(Evaluated::Empty),
        Evaluated::Value(v) => v,
    };
    // Short-circuit boolean operators before evaluating the right side.
    if op == BinOp::And {
        if !l.truthy()? {
            return Ok(Evaluated::Value(Value::bool(false)));
        }
        return eval(rhs, ctx).and_then(|r| match r {
            Evaluated::Empty => Ok(Evaluated::Empty),
            Evaluated::Value(v) => Ok(Evaluated::Value(Value::bool(v.truthy()?))),
        });
    }
    if op == BinOp::Or {
        if l.truthy()? {
            return Ok(Evaluated::Value(Value::bool(true)));
        }
        return eval(rhs, ctx).and_then(|r| match r {
            Evaluated::Empty => Ok(Evaluated::Empty),
            Evaluated::Value(v) => Ok(Evaluated::Value(Value::bool(v.truthy()?))),
        });
    }

    let r = match eval(rhs, ctx)? {
        Evaluated::Empty => return Ok(Evaluated::Empty),
        Evaluated::Value(v) => v,
    };

    Ok(Evaluated::Value(match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, &l, &r)?,
        BinOp::Eq => Value::bool(compare_eq(&l, &r)?),
        BinOp::Ne => Value::bool(!compare_eq(&l, &r)?),
        BinOp::Lt => Value::bool(compare_ord(&l, &r)? == std::cmp::Ordering::Less),
        BinOp::Le => Value::bool(compare_ord(&l, &r)? != std::cmp::Ordering::Greater),
        BinOp::Gt => Value::bool(compare_ord(&l, &r)? == std::cmp::Ordering::Greater),
        BinOp::Ge => Value::bool(compare_ord(&l, &r)? != std::cmp::Ordering::Less),
        BinOp::PipeMatch => Value::bool(pipe_match(&l, &r)?),
        BinOp::AmpMatch => Value::bool(amp_match(&l, &r)?),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }))
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    if Value::either_float(l, r) {
        let (a, b) = (l.as_f64()?, r.as_f64()?);
        Ok(Value::Float(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            _ => unreachable!(),
        }))
    } else {
        let (a, b) = (l.as_i64()?, r.as_i64()?);
        Ok(Value::Int(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => {
                if b == 0 {
                    return Err(Error::ExpressionMisuse("division by zero".into()));
                }
                a / b
            }
            _ => unreachable!(),
        }))
    }
}

fn compare_eq(l: &Value, r: &Value) -> Result<bool> {
    Ok(match (l, r) {
        (Value::Str(a), Value::Str(b)) => a == b,
        _ if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) => {
            return Err(Error::ExpressionTypeError {
                op: "cannot compare a string with a number".into(),
            })
        }
        _ => (l.as_f64()? - r.as_f64()?).abs() < f64::EPSILON,
    })
}

fn compare_ord(l: &Value, r: &Value) -> Result<std::cmp::Ordering> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => l
            .as_f64()?
            .partial_cmp(&r.as_f64()?)
            .ok_or_else(|| Error::ExpressionTypeError {
                op: "unorderable comparison (NaN)".into(),
            }),
    }
}

/// `A |= B`: tokenize `A` on `|`, true iff any token equals `B`.
fn pipe_match(a: &Value, b: &Value) -> Result<bool> {
    let a = a.as_str()?;
    let b = b.as_str()?;
    Ok(a.split('|').any(|tok| tok == b))
}

/// `A &= B` per SPEC_FULL §4.8.
fn amp_match(a: &Value, b: &Value) -> Result<bool> {
    let a = a.as_str()?;
    let b = b.as_str()?;
    if b.is_empty() {
        return Err(Error::ExpressionMisuse("'&=' right-hand side must be non-empty".into()));
    }
    if a == b {
        return Ok(true);
    }
    if b.contains('/') {
        let mut a_segs: Vec<&str> = a.split(['|', '/']).collect();
        let mut b_segs: Vec<&str> = b.split(['|', '/']).collect();
        a_segs.sort_unstable();
        b_segs.sort_unstable();
        Ok(a_segs == b_segs)
    } else {
        Ok(a.split('|').any(|tok| tok == b))
    }
}

/// `splitcompare(attr, delim_ascii_code, str)`.
fn splitcompare(args: &[Value]) -> Result<Value> {
    let attr = args[0].as_str()?;
    let delim = u8::try_from(args[1].as_i64()?)
        .map_err(|_| Error::ExpressionMisuse("delimiter code out of byte range".into()))?
        as char;
    let needle = args[2].as_str()?;
    Ok(Value::bool(attr.split(delim).any(|tok| tok == needle)))
}

/// Allele indices from a flat `[idx, phase, idx, phase, ...]` array.
fn allele_indices(gt: &[i64]) -> Vec<i64> {
    gt.iter().step_by(2).copied().collect()
}

/// `resolve(gt_array, ref_string, alt_string)`.
fn resolve_gt(args: &[Value]) -> Result<Value> {
    let gt = args[0].as_int_vec()?;
    let ref_s = args[1].as_str()?;
    let alt_s = args[2].as_str()?;
    let alt_alleles: Vec<&str> = alt_s.split('|').collect();
    let mut out = String::new();
    for (i, chunk) in gt.chunks(2).enumerate() {
        let idx = chunk[0];
        if i > 0 {
            let phase_marker = gt[2 * i - 1];
            out.push(if phase_marker == 1 { '|' } else { '/' });
        }
        if idx == 0 {
            out.push_str(ref_s);
        } else {
            let alt = alt_alleles.get((idx - 1) as usize).copied().unwrap_or("");
            out.push_str(alt);
        }
    }
    Ok(Value::Str(out))
}

fn eval_call(name: &str, args: &[Ast], ctx: &EvalContext) -> Result<Evaluated> {
    let mut values = Vec::with_capacity(args.len());
    for a in args {
        match eval(a, ctx)? {
            Evaluated::Empty => return Ok(Evaluated::Empty),
            Evaluated::Value(v) => values.push(v),
        }
    }
    let result = match name {
        "splitcompare" => splitcompare(&values)?,
        "resolve" => resolve_gt(&values)?,
        "ishomref" => {
            let idx = allele_indices(values[0].as_int_vec()?);
            Value::bool(!idx.is_empty() && idx.iter().all(|&i| i == 0))
        }
        "ishomalt" => {
            let idx = allele_indices(values[0].as_int_vec()?);
            Value::bool(!idx.is_empty() && idx[0] != 0 && idx.iter().all(|&i| i == idx[0]))
        }
        "ishet" => {
            let idx = allele_indices(values[0].as_int_vec()?);
            Value::bool(idx.windows(2).any(|w| w[0] != w[1]))
        }
        other => return Err(Error::ExpressionMisuse(format!("unknown function {other}"))),
    };
    Ok(Evaluated::Value(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    fn ctx<'a>(coords: &'a [i64], attrs: &'a HashMap<String, Value>) -> EvalContext<'a> {
        EvalContext { coords, attributes: attrs }
    }

    #[test]
    fn pipe_match_finds_token() {
        let ast = parse(r#"alt |= "A""#).expect("parse");
        let mut attrs = HashMap::new();
        attrs.insert("alt".into(), Value::Str("A|C|T|G".into()));
        let c = ctx(&[], &attrs);
        assert!(eval_predicate(&ast, &c).expect("eval"));
    }

    #[test]
    fn amp_match_segment_unordered() {
        let ast = parse(r#"gt &= "1/0""#).expect("parse");
        let mut attrs = HashMap::new();
        attrs.insert("gt".into(), Value::Str("0|1".into()));
        let c = ctx(&[], &attrs);
        assert!(eval_predicate(&ast, &c).expect("eval"));
    }

    #[test]
    fn ishomref_and_ishet() {
        let mut attrs = HashMap::new();
        attrs.insert("gt".into(), Value::IntVec(vec![0, 1, 1]));
        let c = ctx(&[], &attrs);
        assert!(!eval_predicate(&parse("ishomref(gt)").unwrap(), &c).unwrap());
        assert!(eval_predicate(&parse("ishet(gt)").unwrap(), &c).unwrap());
    }

    #[test]
    fn empty_sentinel_short_circuits_to_true() {
        let ast = parse("dp > 10").expect("parse");
        let mut attrs = HashMap::new();
        attrs.insert("dp".into(), Value::Int(i64::MAX));
        let c = ctx(&[], &attrs);
        assert!(eval_predicate(&ast, &c).expect("eval"));
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        let ast = parse("1 + 2").expect("parse");
        let attrs = HashMap::new();
        let c = ctx(&[], &attrs);
        assert!(eval_predicate(&ast, &c).is_err());
    }
}
