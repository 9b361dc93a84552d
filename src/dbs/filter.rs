//! `where <expr>`: forwards documents for which the predicate evaluates
//! truthy.

use std::sync::Arc;

use crate::error::Error;
use crate::expr::{evaluate, Expr, Registry, Scope};
use crate::value::Value;

pub struct Filter {
	predicate: Expr,
	registry: Arc<Registry>,
}

impl Filter {
	pub fn new(predicate: Expr, registry: Arc<Registry>) -> Self {
		Self {
			predicate,
			registry,
		}
	}

	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		let scope = Scope::new(&doc, &self.registry);
		if evaluate(&self.predicate, &scope)?.is_truthy() {
			Ok(vec![doc])
		} else {
			Ok(Vec::new())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::BinaryOp;
	use crate::value::Document;

	#[test]
	fn forwards_only_truthy_documents() {
		let registry = Arc::new(Registry::with_builtins());
		let predicate = Expr::Binary(BinaryOp::Gt, Box::new(Expr::Path(vec!["x".into()])), Box::new(Expr::lit(1.0)));
		let mut filter = Filter::new(predicate, registry);

		let mut doc = Document::new();
		doc.insert("x", Value::Number(0.0));
		assert!(filter.push(Value::Object(doc)).unwrap().is_empty());

		let mut doc = Document::new();
		doc.insert("x", Value::Number(5.0));
		assert_eq!(filter.push(Value::Object(doc)).unwrap().len(), 1);
	}
}
