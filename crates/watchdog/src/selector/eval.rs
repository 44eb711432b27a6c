//! Evaluation of parsed selectors against JSON values.
//!
//! Outputs are pushed to `out` in order. When a filter fails part way, the
//! outputs it produced before the failure stay in `out`, which is what `?`
//! relies on to keep partial results.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::SelectorError;
use super::parser::{Builtin, Comparison, Filter, Step};
use crate::validation::kind_of;

fn runtime(message: String) -> SelectorError {
    SelectorError::Runtime(message)
}

impl Filter {
    pub(crate) fn eval(&self, input: &Value, out: &mut Vec<Value>) -> Result<(), SelectorError> {
        match self {
            Filter::Identity => {
                out.push(input.clone());
                Ok(())
            }
            Filter::Recurse => {
                recurse(input, out);
                Ok(())
            }
            Filter::Literal(value) => {
                out.push(value.clone());
                Ok(())
            }
            Filter::Builtin(builtin) => {
                out.push(builtin.apply(input)?);
                Ok(())
            }
            Filter::Path(base, step) => {
                let mut bases = Vec::new();
                let base_result = base.eval(input, &mut bases);
                for value in &bases {
                    step.apply(value, out)?;
                }
                base_result
            }
            Filter::Try(inner) => {
                // Errors end the stream, earlier outputs are kept
                let _ = inner.eval(input, out);
                Ok(())
            }
            Filter::Pipe(lhs, rhs) => {
                let mut intermediate = Vec::new();
                let lhs_result = lhs.eval(input, &mut intermediate);
                for value in &intermediate {
                    rhs.eval(value, out)?;
                }
                lhs_result
            }
            Filter::Comma(lhs, rhs) => {
                lhs.eval(input, out)?;
                rhs.eval(input, out)
            }
            Filter::Compare(lhs, op, rhs) => {
                let mut left = Vec::new();
                let mut right = Vec::new();
                rhs.eval(input, &mut right)?;
                lhs.eval(input, &mut left)?;
                // Right-hand outputs vary slowest
                for r in &right {
                    out.extend(left.iter().map(|l| Value::Bool(op.holds(compare(l, r)))));
                }
                Ok(())
            }
            Filter::And(lhs, rhs) => logical(lhs, rhs, input, out, false),
            Filter::Or(lhs, rhs) => logical(lhs, rhs, input, out, true),
            Filter::Select(condition) => {
                let mut verdicts = Vec::new();
                condition.eval(input, &mut verdicts)?;
                for verdict in &verdicts {
                    if truthy(verdict) {
                        out.push(input.clone());
                    }
                }
                Ok(())
            }
            Filter::Map(inner) => {
                let mut items = Vec::new();
                Step::Iterate.apply(input, &mut items)?;
                let mut mapped = Vec::new();
                for item in &items {
                    inner.eval(item, &mut mapped)?;
                }
                out.push(Value::Array(mapped));
                Ok(())
            }
            Filter::Has(key) => {
                let mut keys = Vec::new();
                key.eval(input, &mut keys)?;
                for key in &keys {
                    out.push(Value::Bool(has(input, key)?));
                }
                Ok(())
            }
        }
    }
}

/// `and` / `or`: the right side only runs for left outputs that do not
/// already decide the result
fn logical(
    lhs: &Filter,
    rhs: &Filter,
    input: &Value,
    out: &mut Vec<Value>,
    decided_by: bool,
) -> Result<(), SelectorError> {
    let mut left = Vec::new();
    lhs.eval(input, &mut left)?;
    for l in &left {
        if truthy(l) == decided_by {
            out.push(Value::Bool(decided_by));
            continue;
        }
        let mut right = Vec::new();
        rhs.eval(input, &mut right)?;
        out.extend(right.iter().map(|r| Value::Bool(truthy(r))));
    }
    Ok(())
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering.is_eq(),
            Comparison::Ne => ordering.is_ne(),
            Comparison::Lt => ordering.is_lt(),
            Comparison::Le => ordering.is_le(),
            Comparison::Gt => ordering.is_gt(),
            Comparison::Ge => ordering.is_ge(),
        }
    }
}

impl Step {
    fn apply(&self, input: &Value, out: &mut Vec<Value>) -> Result<(), SelectorError> {
        match (self, input) {
            (Step::Field(_) | Step::Index(_) | Step::Slice(..), Value::Null) => {
                out.push(Value::Null);
            }
            (Step::Field(name), Value::Object(map)) => {
                out.push(map.get(name).cloned().unwrap_or(Value::Null));
            }
            (Step::Field(name), other) => {
                return Err(runtime(format!("Cannot index {} with \"{name}\"", kind_of(other))));
            }
            (Step::Index(index), Value::Array(items)) => {
                let element = resolve_index(*index, items.len()).and_then(|i| items.get(i));
                out.push(element.cloned().unwrap_or(Value::Null));
            }
            (Step::Index(_), other) => {
                return Err(runtime(format!("Cannot index {} with number", kind_of(other))));
            }
            (Step::Slice(start, end), Value::Array(items)) => {
                let (from, to) = slice_bounds(*start, *end, items.len());
                out.push(Value::Array(items[from..to].to_vec()));
            }
            (Step::Slice(start, end), Value::String(text)) => {
                let chars: Vec<char> = text.chars().collect();
                let (from, to) = slice_bounds(*start, *end, chars.len());
                out.push(Value::String(chars[from..to].iter().collect()));
            }
            (Step::Slice(..), other) => {
                return Err(runtime(format!("Cannot index {} with object", kind_of(other))));
            }
            (Step::Iterate, Value::Array(items)) => out.extend(items.iter().cloned()),
            (Step::Iterate, Value::Object(map)) => out.extend(map.values().cloned()),
            (Step::Iterate, other) => {
                return Err(runtime(format!("Cannot iterate over {}", kind_of(other))));
            }
        }
        Ok(())
    }
}

impl Builtin {
    fn apply(self, input: &Value) -> Result<Value, SelectorError> {
        match self {
            Builtin::Length => match input {
                Value::Null => Ok(Value::from(0)),
                Value::Bool(b) => Err(runtime(format!("boolean ({b}) has no length"))),
                Value::Number(n) => Ok(n
                    .as_i64()
                    .map(|i| Value::from(i.unsigned_abs()))
                    .or_else(|| n.as_u64().map(Value::from))
                    .or_else(|| n.as_f64().map(|f| Value::from(f.abs())))
                    .unwrap_or(Value::Null)),
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
            },
            Builtin::Keys => match input {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    Ok(Value::Array(keys.into_iter().map(|k| Value::String(k.clone())).collect()))
                }
                Value::Array(items) => Ok(Value::Array((0..items.len()).map(Value::from).collect())),
                other => Err(runtime(format!("{} has no keys", kind_of(other)))),
            },
            Builtin::Type => Ok(Value::String(kind_of(input).to_string())),
            Builtin::Not => Ok(Value::Bool(!truthy(input))),
            Builtin::Any => Ok(Value::Bool(elements(input)?.iter().any(truthy))),
            Builtin::All => Ok(Value::Bool(elements(input)?.iter().all(truthy))),
            Builtin::Add => elements(input)?.iter().try_fold(Value::Null, add),
        }
    }
}

/// Everything but `false` and `null`
fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn elements(input: &Value) -> Result<Vec<Value>, SelectorError> {
    let mut items = Vec::new();
    Step::Iterate.apply(input, &mut items)?;
    Ok(items)
}

fn has(input: &Value, key: &Value) -> Result<bool, SelectorError> {
    match (input, key) {
        (Value::Object(map), Value::String(name)) => Ok(map.contains_key(name)),
        (Value::Array(items), Value::Number(n)) => {
            Ok(n.as_f64().is_some_and(|i| i >= 0.0 && i < items.len() as f64))
        }
        (input, key) => Err(runtime(format!(
            "Cannot check whether {} has a {} key",
            kind_of(input),
            kind_of(key)
        ))),
    }
}

fn add(acc: Value, next: &Value) -> Result<Value, SelectorError> {
    match (acc, next) {
        (acc, Value::Null) => Ok(acc),
        (Value::Null, next) => Ok(next.clone()),
        (Value::Number(a), Value::Number(b)) => {
            if let Some(sum) = a.as_i64().zip(b.as_i64()).and_then(|(a, b)| a.checked_add(b)) {
                return Ok(Value::from(sum));
            }
            let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
            Number::from_f64(sum)
                .map(Value::Number)
                .ok_or_else(|| runtime(format!("{a} + {b} is not a finite number")))
        }
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(b);
            Ok(Value::String(a))
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b.iter().cloned());
            Ok(Value::Array(a))
        }
        (Value::Object(mut a), Value::Object(b)) => {
            a.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Value::Object(a))
        }
        (acc, next) => Err(runtime(format!(
            "{} and {} cannot be added",
            kind_of(&acc),
            kind_of(next)
        ))),
    }
}

/// Total order over JSON values: null < false < true < numbers < strings <
/// arrays < objects
pub(crate) fn compare(lhs: &Value, rhs: &Value) -> Ordering {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(l, r)| compare(l, r))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => {
            let mut a_keys: Vec<&String> = a.keys().collect();
            let mut b_keys: Vec<&String> = b.keys().collect();
            a_keys.sort();
            b_keys.sort();
            a_keys.cmp(&b_keys).then_with(|| {
                a_keys
                    .iter()
                    .map(|key| compare(&a[key.as_str()], &b[key.as_str()]))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
        }
        _ => rank(lhs).cmp(&rank(rhs)),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    let exact = |n: &Number| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from));
    match (exact(a), exact(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

fn recurse(input: &Value, out: &mut Vec<Value>) {
    out.push(input.clone());
    match input {
        Value::Array(items) => items.iter().for_each(|item| recurse(item, out)),
        Value::Object(map) => map.values().for_each(|value| recurse(value, out)),
        _ => {}
    }
}

/// Negative indices count back from the end
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    usize::try_from(resolved).ok()
}

fn slice_bounds(start: Option<i64>, end: Option<i64>, len: usize) -> (usize, usize) {
    let clamp = |bound: i64| -> usize {
        let bound = if bound < 0 { len as i64 + bound } else { bound };
        bound.clamp(0, len as i64) as usize
    };
    let from = start.map_or(0, clamp);
    let to = end.map_or(len, clamp);
    (from, to.max(from))
}
