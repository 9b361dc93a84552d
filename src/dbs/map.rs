//! `map <expr>`: replaces the document with the evaluated transform
//! result; a `null` result drops the document.

use std::sync::Arc;

use crate::error::Error;
use crate::expr::{evaluate, Expr, Registry, Scope};
use crate::value::Value;

pub struct Map {
	transform: Expr,
	registry: Arc<Registry>,
}

impl Map {
	pub fn new(transform: Expr, registry: Arc<Registry>) -> Self {
		Self {
			transform,
			registry,
		}
	}

	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		let scope = Scope::new(&doc, &self.registry);
		let result = evaluate(&self.transform, &scope)?;
		if result.is_null() {
			Ok(Vec::new())
		} else {
			Ok(vec![result])
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Document;

	#[test]
	fn null_result_drops_document() {
		let registry = Arc::new(Registry::with_builtins());
		let mut map = Map::new(Expr::Literal(crate::expr::Literal::Null), registry);
		assert!(map.push(Value::Object(Document::new())).unwrap().is_empty());
	}
}
