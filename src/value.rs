//! The document data model.
//!
//! A [`Value`] is one of: null, boolean, finite number, string, an ordered
//! array of values, or a nested [`Document`] (an unordered string-keyed
//! mapping). Documents are treated as immutable once an operator emits them
//! downstream — every transform in `crate::dbs` produces a new `Value`
//! rather than mutating one in place.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;

/// An unordered string-keyed mapping of [`Value`]s — the engine's unit of
/// work. Stored as a `BTreeMap` for deterministic iteration (useful for
/// `Display` and tests); nothing in the engine depends on insertion order.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document(pub BTreeMap<String, Value>);

impl Document {
	pub fn new() -> Self {
		Self(BTreeMap::new())
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn insert(&mut self, key: impl Into<String>, value: Value) {
		self.0.insert(key.into(), value);
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.0.remove(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.0.iter()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl FromIterator<(String, Value)> for Document {
	fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl fmt::Display for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("{")?;
		for (i, (k, v)) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			write!(f, "{k}: {v}")?;
		}
		f.write_str("}")
	}
}

/// A scalar or compound value flowing through a pipeline.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	Array(Vec<Value>),
	Object(Document),
}

impl Default for Value {
	fn default() -> Self {
		Value::Null
	}
}

impl Value {
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(b) => *b,
			Value::Number(n) => *n != 0.0,
			Value::String(s) => !s.is_empty(),
			Value::Array(a) => !a.is_empty(),
			Value::Object(o) => !o.is_empty(),
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&Document> {
		match self {
			Value::Object(o) => Some(o),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(a) => Some(a),
			_ => None,
		}
	}

	/// Reads a dotted path (`a.b.c`) out of this value, returning
	/// [`Value::Null`] for any missing intermediate rather than erroring.
	pub fn safe_get(&self, path: &str) -> Value {
		let mut current = self;
		for part in path.split('.') {
			match current {
				Value::Object(doc) => match doc.get(part) {
					Some(v) => current = v,
					None => return Value::Null,
				},
				_ => return Value::Null,
			}
		}
		current.clone()
	}

	/// Writes a value at a dotted path, creating intermediate objects as
	/// needed. Writing through a non-object intermediate is a no-op.
	pub fn safe_set(&mut self, path: &str, value: Value) {
		let mut parts = path.split('.').peekable();
		let mut current = self;
		while let Some(part) = parts.next() {
			let Value::Object(doc) = current else {
				// A non-object intermediate blocks the write entirely.
				return;
			};
			if parts.peek().is_none() {
				doc.insert(part, value);
				return;
			}
			current = doc.0.entry(part.to_string()).or_insert(Value::Object(Document::new()));
		}
	}

	pub fn is_number(&self) -> bool {
		matches!(self, Value::Number(_))
	}

	pub fn try_add(&self, other: &Value) -> Result<Value, Error> {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
			(Value::Null, Value::Number(b)) => Ok(Value::Number(*b)),
			(Value::Number(a), Value::Null) => Ok(Value::Number(*a)),
			(Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
			_ => Err(Error::eval(format!("cannot add {self} and {other}"))),
		}
	}

	pub fn try_sub(&self, other: &Value) -> Result<Value, Error> {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
			_ => Err(Error::eval(format!("cannot subtract {other} from {self}"))),
		}
	}

	pub fn try_mul(&self, other: &Value) -> Result<Value, Error> {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
			_ => Err(Error::eval(format!("cannot multiply {self} and {other}"))),
		}
	}

	pub fn try_div(&self, other: &Value) -> Result<Value, Error> {
		match (self, other) {
			(Value::Number(_), Value::Number(b)) if *b == 0.0 => Ok(Value::Number(f64::NAN)),
			(Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
			_ => Err(Error::eval(format!("cannot divide {self} by {other}"))),
		}
	}

	/// Total order over values, used to keep group-by keys in a `BTreeMap`
	/// and to compare sorter keys. A variant-rank-then-payload ordering,
	/// total rather than partial since NaN never legitimately occurs in a
	/// document built from Jet literals (values are always finite numbers).
	pub fn total_cmp(&self, other: &Value) -> Ordering {
		fn rank(v: &Value) -> u8 {
			match v {
				Value::Null => 0,
				Value::Bool(_) => 1,
				Value::Number(_) => 2,
				Value::String(_) => 3,
				Value::Array(_) => 4,
				Value::Object(_) => 5,
			}
		}
		match (self, other) {
			(Value::Null, Value::Null) => Ordering::Equal,
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::Number(a), Value::Number(b)) => a.total_cmp(b),
			(Value::String(a), Value::String(b)) => a.cmp(b),
			(Value::Array(a), Value::Array(b)) => {
				for (x, y) in a.iter().zip(b.iter()) {
					match x.total_cmp(y) {
						Ordering::Equal => continue,
						other => return other,
					}
				}
				a.len().cmp(&b.len())
			}
			(Value::Object(a), Value::Object(b)) => a.0.cmp(&b.0),
			_ => rank(self).cmp(&rank(other)),
		}
	}

	pub fn min(self, other: Value) -> Value {
		if self.total_cmp(&other) == Ordering::Greater {
			other
		} else {
			self
		}
	}

	pub fn max(self, other: Value) -> Value {
		if self.total_cmp(&other) == Ordering::Less {
			other
		} else {
			self
		}
	}
}

impl Eq for Value {}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.total_cmp(other) == Ordering::Equal
	}
}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.total_cmp(other))
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		self.total_cmp(other)
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Bool(b) => write!(f, "{b}"),
			Value::Number(n) => write!(f, "{n}"),
			Value::String(s) => write!(f, "{s:?}"),
			Value::Array(a) => {
				f.write_str("[")?;
				for (i, v) in a.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{v}")?;
				}
				f.write_str("]")
			}
			Value::Object(o) => write!(f, "{o}"),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Number(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Number(v as f64)
	}
}

impl From<usize> for Value {
	fn from(v: usize) -> Self {
		Value::Number(v as f64)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::Array(v)
	}
}

impl From<Document> for Value {
	fn from(v: Document) -> Self {
		Value::Object(v)
	}
}

impl From<serde_json::Value> for Value {
	fn from(v: serde_json::Value) -> Self {
		match v {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
			serde_json::Value::String(s) => Value::String(s),
			serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
			serde_json::Value::Object(o) => Value::Object(Document(
				o.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
			)),
		}
	}
}

impl From<Value> for serde_json::Value {
	fn from(v: Value) -> Self {
		match v {
			Value::Null => serde_json::Value::Null,
			Value::Bool(b) => serde_json::Value::Bool(b),
			Value::Number(n) => serde_json::Number::from_f64(n)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			Value::String(s) => serde_json::Value::String(s),
			Value::Array(a) => serde_json::Value::Array(a.into_iter().map(Into::into).collect()),
			Value::Object(o) => {
				serde_json::Value::Object(o.0.into_iter().map(|(k, v)| (k, v.into())).collect())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn safe_get_missing_intermediate_returns_null() {
		let doc = Value::Object(Document::new());
		assert_eq!(doc.safe_get("a.b.c"), Value::Null);
	}

	#[test]
	fn safe_set_creates_intermediates() {
		let mut doc = Value::Object(Document::new());
		doc.safe_set("a.b.c", Value::Number(1.0));
		assert_eq!(doc.safe_get("a.b.c"), Value::Number(1.0));
	}

	#[test]
	fn safe_set_through_non_object_is_noop() {
		let mut doc = Value::Object(Document::new());
		doc.safe_set("a", Value::Number(1.0));
		doc.safe_set("a.b", Value::Number(2.0));
		assert_eq!(doc.safe_get("a"), Value::Number(1.0));
		assert_eq!(doc.safe_get("a.b"), Value::Null);
	}

	#[test]
	fn total_cmp_orders_by_variant_then_payload() {
		assert!(Value::Null < Value::Bool(false));
		assert!(Value::Number(1.0) < Value::Number(2.0));
		assert!(Value::String("a".into()) < Value::String("b".into()));
	}
}
