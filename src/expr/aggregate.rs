//! Built-in aggregations usable inside a `summarize` projection.
//!
//! A small hand-rolled clone-box trait rather than an enum dispatch: Jet's
//! built-in aggregation set is fixed and small, but `summarize` resolves
//! aggregation names against a pluggable registry, so a trait object is the
//! natural extension point here.

use crate::value::Value;

/// One running aggregation over a column of values within a group.
/// `push`/`result` never fail: non-numeric input to a numeric aggregation is
/// simply ignored rather than a hard error.
pub trait Aggregation: Send {
	fn push(&mut self, value: Value);
	fn result(&self) -> Value;
	fn reset(&mut self);
	fn clone_box(&self) -> Box<dyn Aggregation>;
}

impl Clone for Box<dyn Aggregation> {
	fn clone(&self) -> Self {
		self.clone_box()
	}
}

#[derive(Clone, Default)]
struct Sum {
	total: f64,
}

impl Aggregation for Sum {
	fn push(&mut self, value: Value) {
		if let Some(n) = value.as_f64() {
			self.total += n;
		}
	}
	fn result(&self) -> Value {
		Value::Number(self.total)
	}
	fn reset(&mut self) {
		self.total = 0.0;
	}
	fn clone_box(&self) -> Box<dyn Aggregation> {
		Box::new(self.clone())
	}
}

#[derive(Clone, Default)]
struct Count {
	count: f64,
}

impl Aggregation for Count {
	fn push(&mut self, _value: Value) {
		self.count += 1.0;
	}
	fn result(&self) -> Value {
		Value::Number(self.count)
	}
	fn reset(&mut self) {
		self.count = 0.0;
	}
	fn clone_box(&self) -> Box<dyn Aggregation> {
		Box::new(self.clone())
	}
}

#[derive(Clone, Default)]
struct Mean {
	total: f64,
	count: f64,
}

impl Aggregation for Mean {
	fn push(&mut self, value: Value) {
		if let Some(n) = value.as_f64() {
			self.total += n;
			self.count += 1.0;
		}
	}
	fn result(&self) -> Value {
		if self.count == 0.0 {
			Value::Null
		} else {
			Value::Number(self.total / self.count)
		}
	}
	fn reset(&mut self) {
		self.total = 0.0;
		self.count = 0.0;
	}
	fn clone_box(&self) -> Box<dyn Aggregation> {
		Box::new(self.clone())
	}
}

#[derive(Clone, Default)]
struct Min {
	current: Option<Value>,
}

impl Aggregation for Min {
	fn push(&mut self, value: Value) {
		self.current = Some(match self.current.take() {
			Some(existing) => existing.min(value),
			None => value,
		});
	}
	fn result(&self) -> Value {
		self.current.clone().unwrap_or(Value::Null)
	}
	fn reset(&mut self) {
		self.current = None;
	}
	fn clone_box(&self) -> Box<dyn Aggregation> {
		Box::new(self.clone())
	}
}

#[derive(Clone, Default)]
struct Max {
	current: Option<Value>,
}

impl Aggregation for Max {
	fn push(&mut self, value: Value) {
		self.current = Some(match self.current.take() {
			Some(existing) => existing.max(value),
			None => value,
		});
	}
	fn result(&self) -> Value {
		self.current.clone().unwrap_or(Value::Null)
	}
	fn reset(&mut self) {
		self.current = None;
	}
	fn clone_box(&self) -> Box<dyn Aggregation> {
		Box::new(self.clone())
	}
}

/// `collect(x)`: gathers every pushed value into an array, in push order.
#[derive(Clone, Default)]
struct Collect {
	items: Vec<Value>,
}

impl Aggregation for Collect {
	fn push(&mut self, value: Value) {
		self.items.push(value);
	}
	fn result(&self) -> Value {
		Value::Array(self.items.clone())
	}
	fn reset(&mut self) {
		self.items.clear();
	}
	fn clone_box(&self) -> Box<dyn Aggregation> {
		Box::new(self.clone())
	}
}

pub fn factory(name: &str) -> Option<fn() -> Box<dyn Aggregation>> {
	match name {
		"sum" => Some(|| Box::new(Sum::default())),
		"count" => Some(|| Box::new(Count::default())),
		"mean" | "avg" => Some(|| Box::new(Mean::default())),
		"min" => Some(|| Box::new(Min::default())),
		"max" => Some(|| Box::new(Max::default())),
		"collect" => Some(|| Box::new(Collect::default())),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sum_accumulates_numbers() {
		let mut agg = factory("sum").unwrap()();
		agg.push(Value::Number(1.0));
		agg.push(Value::Number(2.0));
		assert_eq!(agg.result(), Value::Number(3.0));
	}

	#[test]
	fn mean_of_empty_is_null() {
		let agg = factory("mean").unwrap()();
		assert_eq!(agg.result(), Value::Null);
	}

	#[test]
	fn count_ignores_value_contents() {
		let mut agg = factory("count").unwrap()();
		agg.push(Value::Null);
		agg.push(Value::Bool(true));
		assert_eq!(agg.result(), Value::Number(2.0));
	}
}
