//! Evaluates `crate::expr::ast::Expr` trees against a record scope.
//!
//! Scalar-function evaluation is synchronous: there is no suspension point
//! inside `evaluate`, since none of the registered functions need I/O.

use ahash::HashMap;

use crate::error::Error;
use crate::expr::ast::{BinaryOp, Expr, Literal, ObjectEntry, UnaryOp};
use crate::expr::registry::Registry;
use crate::value::{Document, Value};

/// The scope an expression is evaluated against: the current record, plus
/// (for `scan`) the named per-step local scopes and the active match id.
/// This is exactly the scope `emit(expr)` is documented to expose.
pub struct Scope<'a> {
	pub doc: &'a Value,
	pub steps: Option<&'a HashMap<String, Value>>,
	pub match_id: Option<u64>,
	pub registry: &'a Registry,
}

impl<'a> Scope<'a> {
	pub fn new(doc: &'a Value, registry: &'a Registry) -> Self {
		Self {
			doc,
			steps: None,
			match_id: None,
			registry,
		}
	}

	pub fn with_steps(mut self, steps: &'a HashMap<String, Value>, match_id: u64) -> Self {
		self.steps = Some(steps);
		self.match_id = Some(match_id);
		self
	}

	fn resolve_path(&self, parts: &[String]) -> Value {
		if parts.is_empty() {
			return Value::Null;
		}
		if parts[0] == "state" {
			if parts.len() == 2 && parts[1] == "match_id" {
				return self.match_id.map(|id| Value::Number(id as f64)).unwrap_or(Value::Null);
			}
			return Value::Null;
		}
		if let Some(steps) = self.steps {
			if let Some(scope) = steps.get(&parts[0]) {
				if parts.len() == 1 {
					return scope.clone();
				}
				return scope.safe_get(&parts[1..].join("."));
			}
		}
		self.doc.safe_get(&parts.join("."))
	}
}

/// Evaluates `expr` against `scope`, returning the produced value or the
/// first evaluation error encountered.
pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, Error> {
	match expr {
		Expr::Literal(lit) => Ok(literal_value(lit)),
		Expr::Path(parts) => Ok(scope.resolve_path(parts)),
		Expr::Unary(op, inner) => {
			let v = evaluate(inner, scope)?;
			eval_unary(*op, v)
		}
		Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, scope),
		Expr::Call(name, args) => {
			let mut values = Vec::with_capacity(args.len());
			for arg in args {
				values.push(evaluate(arg, scope)?);
			}
			scope.registry.call_scalar(name, values)
		}
		Expr::Array(items) => {
			let mut values = Vec::with_capacity(items.len());
			for item in items {
				values.push(evaluate(item, scope)?);
			}
			Ok(Value::Array(values))
		}
		Expr::Object(entries) => eval_object(entries, scope),
	}
}

fn literal_value(lit: &Literal) -> Value {
	match lit {
		Literal::Null => Value::Null,
		Literal::Bool(b) => Value::Bool(*b),
		Literal::Number(n) => Value::Number(*n),
		Literal::String(s) => Value::String(s.clone()),
	}
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, Error> {
	match op {
		UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
		UnaryOp::Neg => match v {
			Value::Number(n) => Ok(Value::Number(-n)),
			other => Err(Error::eval(format!("cannot negate {other}"))),
		},
	}
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: &Scope<'_>) -> Result<Value, Error> {
	// `||` (coalesce / logical-or) and `&&` short-circuit, matching the
	// teacher's `Value::and`/`Value::or` short-circuiting evaluation.
	match op {
		BinaryOp::And => {
			let l = evaluate(lhs, scope)?;
			if !l.is_truthy() {
				return Ok(Value::Bool(false));
			}
			return Ok(Value::Bool(evaluate(rhs, scope)?.is_truthy()));
		}
		BinaryOp::Or => {
			let l = evaluate(lhs, scope)?;
			if l.is_truthy() {
				return Ok(l);
			}
			return evaluate(rhs, scope);
		}
		BinaryOp::Coalesce => {
			let l = evaluate(lhs, scope)?;
			if !l.is_null() {
				return Ok(l);
			}
			return evaluate(rhs, scope);
		}
		_ => {}
	}

	let l = evaluate(lhs, scope)?;
	let r = evaluate(rhs, scope)?;
	match op {
		BinaryOp::Add => l.try_add(&r),
		BinaryOp::Sub => l.try_sub(&r),
		BinaryOp::Mul => l.try_mul(&r),
		BinaryOp::Div => l.try_div(&r),
		BinaryOp::Mod => match (&l, &r) {
			(Value::Number(a), Value::Number(b)) => Ok(Value::Number(a % b)),
			_ => Err(Error::eval(format!("cannot compute {l} % {r}"))),
		},
		BinaryOp::Eq => Ok(Value::Bool(l == r)),
		BinaryOp::Neq => Ok(Value::Bool(l != r)),
		BinaryOp::Lt => Ok(Value::Bool(l.total_cmp(&r).is_lt())),
		BinaryOp::Lte => Ok(Value::Bool(l.total_cmp(&r).is_le())),
		BinaryOp::Gt => Ok(Value::Bool(l.total_cmp(&r).is_gt())),
		BinaryOp::Gte => Ok(Value::Bool(l.total_cmp(&r).is_ge())),
		BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => unreachable!("handled above"),
	}
}

/// Builds an object literal, including `select`'s spread/exclude semantics:
/// start empty, apply spread and field-add in source order, then apply
/// exclusions last.
fn eval_object(entries: &[ObjectEntry], scope: &Scope<'_>) -> Result<Value, Error> {
	let mut doc = Document::new();
	let mut exclusions = Vec::new();
	for entry in entries {
		match entry {
			ObjectEntry::SpreadAll => {
				if let Value::Object(src) = scope.doc {
					for (k, v) in src.iter() {
						doc.insert(k.clone(), v.clone());
					}
				}
			}
			ObjectEntry::Field {
				name,
				expr,
			} => {
				let value = evaluate(expr, scope)?;
				doc.insert(name.clone(), value);
			}
			ObjectEntry::Exclude(name) => exclusions.push(name.clone()),
		}
	}
	for name in exclusions {
		doc.remove(&name);
	}
	Ok(Value::Object(doc))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> Registry {
		Registry::with_builtins()
	}

	#[test]
	fn path_resolves_against_record() {
		let reg = registry();
		let mut doc = Document::new();
		doc.insert("x", Value::Number(2.0));
		let value = Value::Object(doc);
		let scope = Scope::new(&value, &reg);
		let expr = Expr::Path(vec!["x".to_string()]);
		assert_eq!(evaluate(&expr, &scope).unwrap(), Value::Number(2.0));
	}

	#[test]
	fn missing_path_is_null_not_error() {
		let reg = registry();
		let value = Value::Object(Document::new());
		let scope = Scope::new(&value, &reg);
		let expr = Expr::Path(vec!["missing".to_string(), "nested".to_string()]);
		assert_eq!(evaluate(&expr, &scope).unwrap(), Value::Null);
	}

	#[test]
	fn coalesce_falls_through_null() {
		let reg = registry();
		let value = Value::Object(Document::new());
		let scope = Scope::new(&value, &reg);
		let expr = Expr::Binary(
			BinaryOp::Coalesce,
			Box::new(Expr::Path(vec!["missing".to_string()])),
			Box::new(Expr::lit(1.0)),
		);
		assert_eq!(evaluate(&expr, &scope).unwrap(), Value::Number(1.0));
	}
}
