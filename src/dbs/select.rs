//! `select { ...entries }`: projects fields, built directly on
//! [`crate::expr::eval::evaluate`]'s object-literal construction which
//! already implements the spread/field/exclude ordering rule.

use std::sync::Arc;

use crate::error::Error;
use crate::expr::{evaluate, Expr, ObjectEntry, Registry, Scope};
use crate::value::Value;

pub struct Select {
	entries: Vec<ObjectEntry>,
	registry: Arc<Registry>,
}

impl Select {
	pub fn new(entries: Vec<ObjectEntry>, registry: Arc<Registry>) -> Self {
		Self {
			entries,
			registry,
		}
	}

	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		let scope = Scope::new(&doc, &self.registry);
		let object = Expr::Object(self.entries.clone());
		Ok(vec![evaluate(&object, &scope)?])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Document;

	#[test]
	fn excludes_fields_after_spread() {
		let registry = Arc::new(Registry::with_builtins());
		let entries = vec![ObjectEntry::SpreadAll, ObjectEntry::Exclude("password".into())];
		let mut select = Select::new(entries, registry);

		let mut doc = Document::new();
		doc.insert("id", Value::Number(1.0));
		doc.insert("password", Value::String("secret".into()));
		let out = select.push(Value::Object(doc)).unwrap();
		let out_doc = out[0].as_object().unwrap();
		assert!(!out_doc.contains_key("password"));
		assert_eq!(out_doc.get("id"), Some(&Value::Number(1.0)));
	}
}
