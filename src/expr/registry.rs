//! The scalar function registry, and the aggregation-factory lookup used to
//! bind `summarize` projections.
//!
//! Dispatch maps string literals straight to function pointers via a plain
//! `HashMap<&'static str, ScalarFn>` built once behind `once_cell::sync::Lazy`
//! — Jet's function surface is a fixed, small set, so a static table is
//! simpler than a dispatch macro.

use std::collections::HashMap;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::Error;
use crate::expr::aggregate::{self, Aggregation};
use crate::value::Value;

type ScalarFn = fn(&[Value]) -> Result<Value, Error>;

static SCALARS: Lazy<HashMap<&'static str, ScalarFn>> = Lazy::new(|| {
	let mut m: HashMap<&'static str, ScalarFn> = HashMap::new();
	m.insert("len", fn_len);
	m.insert("upper", fn_upper);
	m.insert("lower", fn_lower);
	m.insert("trim", fn_trim);
	m.insert("concat", fn_concat);
	m.insert("contains", fn_contains);
	m.insert("starts_with", fn_starts_with);
	m.insert("ends_with", fn_ends_with);
	m.insert("abs", fn_abs);
	m.insert("round", fn_round);
	m.insert("floor", fn_floor);
	m.insert("ceil", fn_ceil);
	m.insert("sqrt", fn_sqrt);
	m.insert("pow", fn_pow);
	m.insert("exp", fn_exp);
	m.insert("ln", fn_ln);
	m.insert("log10", fn_log10);
	m.insert("min", fn_min);
	m.insert("max", fn_max);
	m.insert("not", fn_not);
	m.insert("to_string", fn_to_string);
	m.insert("to_number", fn_to_number);
	m.insert("is_null", fn_is_null);
	m.insert("coalesce", fn_coalesce);
	m
});

/// Resolves both scalar functions and the handful of registered lookup
/// tables (`lookup(name, key)`). Scalar dispatch holds no per-call state,
/// but lookup tables are created and destroyed at runtime by `create`/
/// `delete lookup` statements, and a `Registry` is shared via `Arc` across
/// every flow's operators — so lookup storage needs interior mutability.
/// `DashMap` rather than a `Mutex<HashMap<..>>` for this shared-mutable-table
/// shape, the same choice `crate::dbs::manager` makes for its own tables.
pub struct Registry {
	lookups: DashMap<String, HashMap<String, Value>>,
}

impl Registry {
	pub fn with_builtins() -> Self {
		Self {
			lookups: DashMap::new(),
		}
	}

	/// Registers a named constant lookup table, resolved by the two-argument
	/// `lookup(name, key)` scalar call. Overwrites any existing table of the
	/// same name (`create or replace lookup`).
	pub fn register_lookup(&self, name: impl Into<String>, table: HashMap<String, Value>) {
		self.lookups.insert(name.into(), table);
	}

	pub fn remove_lookup(&self, name: &str) -> bool {
		self.lookups.remove(name).is_some()
	}

	pub fn has_lookup(&self, name: &str) -> bool {
		self.lookups.contains_key(name)
	}

	pub fn list_lookups(&self) -> Vec<String> {
		self.lookups.iter().map(|e| e.key().clone()).collect()
	}

	pub fn call_scalar(&self, name: &str, args: Vec<Value>) -> Result<Value, Error> {
		if name == "lookup" {
			return self.call_lookup(&args);
		}
		match SCALARS.get(name) {
			Some(f) => f(&args),
			None => Err(Error::eval(format!("unknown function `{name}`"))),
		}
	}

	fn call_lookup(&self, args: &[Value]) -> Result<Value, Error> {
		let (table_name, key) = match args {
			[a, b] => (a, b),
			_ => return Err(Error::eval("lookup() takes exactly 2 arguments")),
		};
		let table_name = table_name
			.as_str()
			.ok_or_else(|| Error::eval("lookup()'s first argument must be a string"))?;
		let key = key.as_str().ok_or_else(|| Error::eval("lookup()'s second argument must be a string"))?;
		Ok(self
			.lookups
			.get(table_name)
			.and_then(|table| table.get(key))
			.cloned()
			.unwrap_or(Value::Null))
	}

	/// Validates that `name` resolves to either a scalar function or a
	/// registered lookup table, failing loudly at bind time rather than at
	/// the first matching document.
	pub fn validate_scalar(&self, name: &str) -> Result<(), Error> {
		if name == "lookup" || SCALARS.contains_key(name) {
			Ok(())
		} else {
			Err(Error::bind(format!("unknown function `{name}`")))
		}
	}

	pub fn validate_aggregate(&self, name: &str) -> Result<(), Error> {
		if aggregate::factory(name).is_some() {
			Ok(())
		} else {
			Err(Error::bind(format!("unknown aggregation `{name}`")))
		}
	}

	pub fn create_aggregate(&self, name: &str) -> Option<Box<dyn Aggregation>> {
		aggregate::factory(name).map(|f| f())
	}
}

fn one_string<'a>(args: &'a [Value], fname: &str) -> Result<&'a str, Error> {
	match args {
		[Value::String(s)] => Ok(s),
		_ => Err(Error::eval(format!("{fname}() takes exactly one string argument"))),
	}
}

fn one_number(args: &[Value], fname: &str) -> Result<f64, Error> {
	match args {
		[Value::Number(n)] => Ok(*n),
		_ => Err(Error::eval(format!("{fname}() takes exactly one numeric argument"))),
	}
}

fn fn_len(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::String(s)] => Ok(Value::Number(s.chars().count() as f64)),
		[Value::Array(a)] => Ok(Value::Number(a.len() as f64)),
		[Value::Object(o)] => Ok(Value::Number(o.len() as f64)),
		[Value::Null] => Ok(Value::Number(0.0)),
		_ => Err(Error::eval("len() takes a string, array or object")),
	}
}

fn fn_upper(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::String(one_string(args, "upper")?.to_uppercase()))
}

fn fn_lower(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::String(one_string(args, "lower")?.to_lowercase()))
}

fn fn_trim(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::String(one_string(args, "trim")?.trim().to_string()))
}

fn fn_concat(args: &[Value]) -> Result<Value, Error> {
	let mut out = String::new();
	for arg in args {
		match arg {
			Value::String(s) => out.push_str(s),
			other => out.push_str(&other.to_string()),
		}
	}
	Ok(Value::String(out))
}

fn fn_contains(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::String(haystack), Value::String(needle)] => Ok(Value::Bool(haystack.contains(needle.as_str()))),
		[Value::Array(items), needle] => Ok(Value::Bool(items.iter().any(|v| v == needle))),
		_ => Err(Error::eval("contains() takes (string, string) or (array, value)")),
	}
}

fn fn_starts_with(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::String(s), Value::String(prefix)] => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
		_ => Err(Error::eval("starts_with() takes two strings")),
	}
}

fn fn_ends_with(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::String(s), Value::String(suffix)] => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
		_ => Err(Error::eval("ends_with() takes two strings")),
	}
}

fn fn_abs(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "abs")?.abs()))
}

fn fn_round(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "round")?.round()))
}

fn fn_floor(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "floor")?.floor()))
}

fn fn_ceil(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "ceil")?.ceil()))
}

fn fn_sqrt(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "sqrt")?.sqrt()))
}

fn fn_pow(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::Number(base), Value::Number(exp)] => Ok(Value::Number(base.powf(*exp))),
		_ => Err(Error::eval("pow() takes two numbers")),
	}
}

fn fn_exp(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "exp")?.exp()))
}

fn fn_ln(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "ln")?.ln()))
}

fn fn_log10(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(one_number(args, "log10")?.log10()))
}

fn fn_min(args: &[Value]) -> Result<Value, Error> {
	match args {
		[] => Err(Error::eval("min() takes at least one argument")),
		[first, rest @ ..] => Ok(rest.iter().cloned().fold(first.clone(), Value::min)),
	}
}

fn fn_max(args: &[Value]) -> Result<Value, Error> {
	match args {
		[] => Err(Error::eval("max() takes at least one argument")),
		[first, rest @ ..] => Ok(rest.iter().cloned().fold(first.clone(), Value::max)),
	}
}

fn fn_not(args: &[Value]) -> Result<Value, Error> {
	match args {
		[v] => Ok(Value::Bool(!v.is_truthy())),
		_ => Err(Error::eval("not() takes exactly one argument")),
	}
}

fn fn_to_string(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::String(s)] => Ok(Value::String(s.clone())),
		[v] => Ok(Value::String(v.to_string())),
		_ => Err(Error::eval("to_string() takes exactly one argument")),
	}
}

fn fn_to_number(args: &[Value]) -> Result<Value, Error> {
	match args {
		[Value::Number(n)] => Ok(Value::Number(*n)),
		[Value::String(s)] => s
			.trim()
			.parse::<f64>()
			.map(Value::Number)
			.map_err(|_| Error::eval(format!("cannot convert {s:?} to a number"))),
		_ => Err(Error::eval("to_number() takes exactly one argument")),
	}
}

fn fn_is_null(args: &[Value]) -> Result<Value, Error> {
	match args {
		[v] => Ok(Value::Bool(v.is_null())),
		_ => Err(Error::eval("is_null() takes exactly one argument")),
	}
}

fn fn_coalesce(args: &[Value]) -> Result<Value, Error> {
	Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn upper_uppercases_ascii() {
		let reg = Registry::with_builtins();
		let result = reg.call_scalar("upper", vec![Value::String("abc".into())]).unwrap();
		assert_eq!(result, Value::String("ABC".into()));
	}

	#[test]
	fn unknown_function_fails_bind() {
		let reg = Registry::with_builtins();
		assert!(reg.validate_scalar("nope").is_err());
	}

	#[test]
	fn lookup_resolves_registered_table() {
		let reg = Registry::with_builtins();
		let mut table = HashMap::new();
		table.insert("us".to_string(), Value::String("United States".into()));
		reg.register_lookup("countries", table);
		let result = reg
			.call_scalar("lookup", vec![Value::String("countries".into()), Value::String("us".into())])
			.unwrap();
		assert_eq!(result, Value::String("United States".into()));
	}

	#[test]
	fn aggregate_factory_roundtrip() {
		let reg = Registry::with_builtins();
		assert!(reg.validate_aggregate("sum").is_ok());
		assert!(reg.validate_aggregate("nope").is_err());
		let mut agg = reg.create_aggregate("sum").unwrap();
		agg.push(Value::Number(4.0));
		assert_eq!(agg.result(), Value::Number(4.0));
	}
}
