//! Recursive-descent parser producing `crate::syn::ast::Program` from Jet
//! source text, plus a Pratt expression parser for the expression grammar.
//!
//! `Parser` wraps a token stream and a small peek buffer, with
//! `expected!`/`unexpected!`-style error helpers, and indexes directly into
//! a `Vec<Spanned>` plus a cursor rather than a multi-token lookahead
//! buffer, since nothing in Jet's grammar needs more than one token of
//! lookahead beyond what recursive descent already gives for free.

use crate::error::{Error, Position};
use crate::expr::{BinaryOp, Expr, Literal, ObjectEntry, UnaryOp};
use crate::syn::ast::{Call, CallArg, EmitSpec, OpPlan, PipelinePlan, Program, Statement, StepAction, StepPlan};
use crate::syn::lexer::{Lexer, Spanned, Token};

pub fn parse_program(source: &str) -> Result<Program, Error> {
	let tokens = Lexer::new(source).tokenize()?;
	let mut parser = Parser::new(tokens);
	parser.parse_program()
}

pub struct Parser {
	tokens: Vec<Spanned>,
	pos: usize,
}

impl Parser {
	pub fn new(tokens: Vec<Spanned>) -> Self {
		Self {
			tokens,
			pos: 0,
		}
	}

	fn current(&self) -> &Spanned {
		&self.tokens[self.pos.min(self.tokens.len() - 1)]
	}

	fn position(&self) -> Position {
		self.current().position
	}

	fn peek(&self) -> &Token {
		&self.current().token
	}

	fn bump(&mut self) -> Token {
		let tok = self.current().token.clone();
		if self.pos < self.tokens.len() - 1 {
			self.pos += 1;
		}
		tok
	}

	fn unexpected<T>(&self, expected: &str) -> Result<T, Error> {
		Err(Error::parse(format!("expected {expected}, found {:?}", self.peek()), self.position()))
	}

	fn eat(&mut self, token: &Token) -> bool {
		if self.peek() == token {
			self.bump();
			true
		} else {
			false
		}
	}

	fn expect(&mut self, token: &Token) -> Result<(), Error> {
		if self.eat(token) {
			Ok(())
		} else {
			self.unexpected(&format!("{token:?}"))
		}
	}

	/// Matches a bare keyword, i.e. an `Ident` token with the given text.
	/// Jet has no reserved-word table; keywords are ordinary identifiers
	/// recognised positionally, a common convention for soft keywords.
	fn eat_kw(&mut self, kw: &str) -> bool {
		if let Token::Ident(s) = self.peek() {
			if s == kw {
				self.bump();
				return true;
			}
		}
		false
	}

	fn expect_kw(&mut self, kw: &str) -> Result<(), Error> {
		if self.eat_kw(kw) {
			Ok(())
		} else {
			self.unexpected(kw)
		}
	}

	fn ident(&mut self) -> Result<String, Error> {
		match self.bump() {
			Token::Ident(s) => Ok(s),
			other => Err(Error::parse(format!("expected identifier, found {other:?}"), self.position())),
		}
	}

	fn string_lit(&mut self) -> Result<String, Error> {
		match self.bump() {
			Token::String(s) => Ok(s),
			other => Err(Error::parse(format!("expected string literal, found {other:?}"), self.position())),
		}
	}

	pub fn parse_program(&mut self) -> Result<Program, Error> {
		let mut statements = Vec::new();
		while !matches!(self.peek(), Token::Eof) {
			statements.push(self.statement()?);
			if !self.eat(&Token::Semicolon) {
				break;
			}
		}
		if !matches!(self.peek(), Token::Eof) {
			return self.unexpected("end of input");
		}
		Ok(Program {
			statements,
		})
	}

	fn statement(&mut self) -> Result<Statement, Error> {
		if self.eat_kw("create") {
			self.create_statement()
		} else if self.eat_kw("delete") {
			self.delete_statement()
		} else if self.eat_kw("insert") {
			self.insert_statement()
		} else if self.eat_kw("flush") {
			Ok(Statement::Flush {
				stream: self.ident()?,
			})
		} else if self.eat_kw("list") {
			self.list_statement()
		} else if self.eat_kw("info") {
			Ok(Statement::Info {
				name: self.ident()?,
			})
		} else if self.eat_kw("subscribe") {
			Ok(Statement::Subscribe {
				stream: self.ident()?,
			})
		} else if self.eat_kw("unsubscribe") {
			Ok(Statement::Unsubscribe {
				id: self.ident()?,
			})
		} else {
			self.unexpected("a statement")
		}
	}

	fn create_statement(&mut self) -> Result<Statement, Error> {
		let replace = if self.eat_kw("or") {
			self.expect_kw("replace")?;
			true
		} else {
			false
		};
		if self.eat_kw("stream") {
			let name = self.ident()?;
			let ttl_ms = self.parse_optional_ttl()?;
			return Ok(Statement::CreateStream {
				name,
				replace,
				ttl_ms,
			});
		}
		if self.eat_kw("flow") {
			let name = self.ident()?;
			let ttl_ms = self.parse_optional_ttl()?;
			self.expect_kw("as")?;
			let pipeline = self.pipeline()?;
			return Ok(Statement::CreateFlow {
				name,
				replace,
				ttl_ms,
				pipeline,
			});
		}
		if self.eat_kw("lookup") {
			let name = self.ident()?;
			self.expect_kw("as")?;
			let entries = self.lookup_table()?;
			return Ok(Statement::CreateLookup {
				name,
				replace,
				entries,
			});
		}
		self.unexpected("'stream', 'flow' or 'lookup'")
	}

	fn parse_optional_ttl(&mut self) -> Result<Option<u64>, Error> {
		if self.eat_kw("ttl") {
			self.expect(&Token::LParen)?;
			let ms = match self.bump() {
				Token::Duration(ms) => ms,
				other => return Err(Error::parse(format!("expected duration, found {other:?}"), self.position())),
			};
			self.expect(&Token::RParen)?;
			Ok(Some(ms))
		} else {
			Ok(None)
		}
	}

	fn lookup_table(&mut self) -> Result<Vec<(String, Expr)>, Error> {
		self.expect(&Token::LBrace)?;
		let mut entries = Vec::new();
		if !matches!(self.peek(), Token::RBrace) {
			loop {
				let key = self.string_lit()?;
				self.expect(&Token::Colon)?;
				let value = self.expr()?;
				entries.push((key, value));
				if !self.eat(&Token::Comma) {
					break;
				}
			}
		}
		self.expect(&Token::RBrace)?;
		Ok(entries)
	}

	fn delete_statement(&mut self) -> Result<Statement, Error> {
		if self.eat_kw("stream") {
			Ok(Statement::DeleteStream {
				name: self.ident()?,
			})
		} else if self.eat_kw("flow") {
			Ok(Statement::DeleteFlow {
				name: self.ident()?,
			})
		} else if self.eat_kw("lookup") {
			Ok(Statement::DeleteLookup {
				name: self.ident()?,
			})
		} else {
			self.unexpected("'stream', 'flow' or 'lookup'")
		}
	}

	fn insert_statement(&mut self) -> Result<Statement, Error> {
		self.expect_kw("into")?;
		let stream = self.ident()?;
		let docs = if self.eat(&Token::LBracket) {
			let mut docs = Vec::new();
			if !matches!(self.peek(), Token::RBracket) {
				loop {
					docs.push(self.object_literal()?);
					if !self.eat(&Token::Comma) {
						break;
					}
				}
			}
			self.expect(&Token::RBracket)?;
			docs
		} else {
			vec![self.object_literal()?]
		};
		Ok(Statement::Insert {
			stream,
			docs,
		})
	}

	fn list_statement(&mut self) -> Result<Statement, Error> {
		if self.eat_kw("streams") {
			Ok(Statement::ListStreams)
		} else if self.eat_kw("flows") {
			Ok(Statement::ListFlows)
		} else if self.eat_kw("lookups") {
			Ok(Statement::ListLookups)
		} else {
			self.unexpected("'streams', 'flows' or 'lookups'")
		}
	}

	fn pipeline(&mut self) -> Result<PipelinePlan, Error> {
		let source = self.ident()?;
		let mut ops = Vec::new();
		while self.eat(&Token::Pipe) {
			ops.push(self.op()?);
		}
		if ops.is_empty() {
			return self.unexpected("at least one '| operator' stage");
		}
		Ok(PipelinePlan {
			source,
			ops,
		})
	}

	fn op(&mut self) -> Result<OpPlan, Error> {
		if self.eat_kw("where") {
			Ok(OpPlan::Where(self.expr()?))
		} else if self.eat_kw("map") {
			Ok(OpPlan::Map(self.expr()?))
		} else if self.eat_kw("select") {
			Ok(OpPlan::Select(self.object_entries()?))
		} else if self.eat_kw("scan") {
			self.scan_op()
		} else if self.eat_kw("summarize") {
			self.summarize_op()
		} else if self.eat_kw("sorter") {
			self.sorter_op()
		} else if self.eat_kw("insert_into") {
			self.expect(&Token::LParen)?;
			let name = self.ident()?;
			self.expect(&Token::RParen)?;
			Ok(OpPlan::InsertInto(name))
		} else if self.eat_kw("write_to_file") {
			self.expect(&Token::LParen)?;
			let path = self.string_lit()?;
			self.expect(&Token::RParen)?;
			Ok(OpPlan::WriteToFile(path))
		} else if self.eat_kw("assert_or_save_expected") {
			self.expect(&Token::LParen)?;
			let path = self.string_lit()?;
			self.expect(&Token::RParen)?;
			Ok(OpPlan::AssertOrSaveExpected(path))
		} else {
			self.unexpected("an operator")
		}
	}

	fn scan_op(&mut self) -> Result<OpPlan, Error> {
		self.expect(&Token::LParen)?;
		let mut steps = Vec::new();
		loop {
			steps.push(self.step()?);
			if !self.eat(&Token::Semicolon) {
				break;
			}
		}
		self.expect(&Token::RParen)?;
		Ok(OpPlan::Scan(steps))
	}

	fn step(&mut self) -> Result<StepPlan, Error> {
		self.expect_kw("step")?;
		let name = self.ident()?;
		let optional = self.eat_kw("optional");
		let end_when = if self.eat_kw("end_when") {
			Some(self.expr()?)
		} else {
			None
		};
		self.expect(&Token::Colon)?;
		let guard = self.expr()?;
		self.expect(&Token::Arrow)?;
		let mut actions = Vec::new();
		loop {
			actions.push(self.step_action()?);
			if !self.eat(&Token::Comma) {
				break;
			}
		}
		Ok(StepPlan {
			name,
			optional,
			end_when,
			guard,
			actions,
		})
	}

	fn step_action(&mut self) -> Result<StepAction, Error> {
		if self.eat_kw("emit") {
			self.expect(&Token::LParen)?;
			let expr = self.expr()?;
			self.expect(&Token::RParen)?;
			return Ok(StepAction::Emit(expr));
		}
		// assign := path '=' expr
		let mut path = vec![self.ident()?];
		while self.eat(&Token::Dot) {
			path.push(self.ident()?);
		}
		self.expect(&Token::Eq)?;
		let value = self.expr()?;
		Ok(StepAction::Assign {
			field: path.join("."),
			value,
		})
	}

	fn summarize_op(&mut self) -> Result<OpPlan, Error> {
		let projections = self
			.object_entries()?
			.into_iter()
			.filter_map(|entry| match entry {
				ObjectEntry::Field {
					name,
					expr,
				} => Some((name, (*expr).clone())),
				_ => None,
			})
			.collect();
		let by = if self.eat_kw("by") {
			let mut fields = vec![self.ident()?];
			while self.eat(&Token::Comma) {
				fields.push(self.ident()?);
			}
			fields
		} else {
			Vec::new()
		};
		let window = if self.eat_kw("over") {
			self.expect_kw("window")?;
			self.expect(&Token::Eq)?;
			Some(self.call_expr()?)
		} else {
			None
		};
		let emit = if self.eat_kw("emit") {
			Some(self.emit_spec()?)
		} else {
			None
		};
		Ok(OpPlan::Summarize {
			projections,
			by,
			window,
			emit,
		})
	}

	fn number_or_duration(&mut self) -> Result<u64, Error> {
		match self.bump() {
			Token::Number(n) => Ok(n as u64),
			Token::Duration(ms) => Ok(ms),
			other => Err(Error::parse(format!("expected a number or duration, found {other:?}"), self.position())),
		}
	}

	/// `sorter(key_expr [, buffer_size] [, max_latency])`: the key is a
	/// full expression (usually a bare field path) so it does not fit
	/// [`Parser::call_expr`]'s ident/number/duration argument grammar; the
	/// two trailing tuning parameters do.
	fn sorter_op(&mut self) -> Result<OpPlan, Error> {
		self.expect(&Token::LParen)?;
		let key = self.expr()?;
		let mut buffer_size = None;
		let mut max_latency_ms = None;
		if self.eat(&Token::Comma) {
			buffer_size = Some(self.number_or_duration()?);
			if self.eat(&Token::Comma) {
				max_latency_ms = Some(self.number_or_duration()?);
			}
		}
		self.expect(&Token::RParen)?;
		Ok(OpPlan::Sorter {
			key,
			buffer_size,
			max_latency_ms,
		})
	}

	/// `emit_when(<predicate>)` takes a full expression argument, unlike
	/// every other emit-trigger call whose arguments are field names or
	/// numeric/duration literals — special-cased here since [`Parser::call_expr`]
	/// only parses the latter.
	fn emit_spec(&mut self) -> Result<EmitSpec, Error> {
		if matches!(self.peek(), Token::Ident(s) if s == "emit_when") {
			self.bump();
			self.expect(&Token::LParen)?;
			let predicate = self.expr()?;
			self.expect(&Token::RParen)?;
			return Ok(EmitSpec::When(predicate));
		}
		Ok(EmitSpec::Call(self.call_expr()?))
	}

	/// Parses a `name(args...)` shape where arguments are field-name
	/// identifiers or number/duration literals, used by window and
	/// emit-trigger clauses.
	fn call_expr(&mut self) -> Result<Call, Error> {
		let name = self.ident()?;
		self.expect(&Token::LParen)?;
		let mut args = Vec::new();
		if !matches!(self.peek(), Token::RParen) {
			loop {
				let arg = match self.bump() {
					Token::Ident(s) => CallArg::Ident(s),
					Token::Number(n) => CallArg::Number(n),
					Token::Duration(ms) => CallArg::Duration(ms),
					other => {
						return Err(Error::parse(format!("unexpected call argument {other:?}"), self.position()))
					}
				};
				args.push(arg);
				if !self.eat(&Token::Comma) {
					break;
				}
			}
		}
		self.expect(&Token::RParen)?;
		Ok(Call {
			name,
			args,
		})
	}

	fn object_literal(&mut self) -> Result<Expr, Error> {
		Ok(Expr::Object(self.object_entries()?))
	}

	fn object_entries(&mut self) -> Result<Vec<ObjectEntry>, Error> {
		self.expect(&Token::LBrace)?;
		let mut entries = Vec::new();
		if !matches!(self.peek(), Token::RBrace) {
			loop {
				if self.eat(&Token::Minus) {
					entries.push(ObjectEntry::Exclude(self.ident()?));
				} else if matches!(self.peek(), Token::Dot) {
					// `...*`
					self.expect(&Token::Dot)?;
					self.expect(&Token::Dot)?;
					self.expect(&Token::Dot)?;
					self.expect(&Token::Star)?;
					entries.push(ObjectEntry::SpreadAll);
				} else {
					let name = self.ident()?;
					self.expect(&Token::Colon)?;
					let expr = self.expr()?;
					entries.push(ObjectEntry::Field {
						name,
						expr: std::sync::Arc::new(expr),
					});
				}
				if !self.eat(&Token::Comma) {
					break;
				}
			}
		}
		self.expect(&Token::RBrace)?;
		Ok(entries)
	}

	// --- Expression grammar (Pratt parser) ---

	pub fn expr(&mut self) -> Result<Expr, Error> {
		self.expr_bp(0)
	}

	fn expr_bp(&mut self, min_bp: u8) -> Result<Expr, Error> {
		let mut lhs = self.unary()?;
		loop {
			let Some((op, lbp, rbp)) = binary_op(self.peek()) else {
				break;
			};
			if lbp < min_bp {
				break;
			}
			self.bump();
			let rhs = self.expr_bp(rbp)?;
			lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
		}
		Ok(lhs)
	}

	fn unary(&mut self) -> Result<Expr, Error> {
		if self.eat(&Token::Minus) {
			return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
		}
		if self.eat(&Token::Bang) {
			return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
		}
		self.postfix()
	}

	fn postfix(&mut self) -> Result<Expr, Error> {
		let mut expr = self.primary()?;
		loop {
			if self.eat(&Token::Dot) {
				let field = self.ident()?;
				expr = match expr {
					Expr::Path(mut parts) => {
						parts.push(field);
						Expr::Path(parts)
					}
					other => {
						// Only plain paths accumulate further segments;
						// anything else is a dead end the binder will
						// reject — member access is only valid on
						// identifiers and nested paths.
						let _ = &other;
						return Err(Error::parse("member access on a non-path expression", self.position()));
					}
				};
			} else {
				break;
			}
		}
		Ok(expr)
	}

	fn primary(&mut self) -> Result<Expr, Error> {
		match self.peek().clone() {
			Token::Number(n) => {
				self.bump();
				Ok(Expr::lit(n))
			}
			Token::String(s) => {
				self.bump();
				Ok(Expr::lit(s))
			}
			Token::LParen => {
				self.bump();
				let inner = self.expr()?;
				self.expect(&Token::RParen)?;
				Ok(inner)
			}
			Token::LBrace => self.object_literal(),
			Token::LBracket => {
				self.bump();
				let mut items = Vec::new();
				if !matches!(self.peek(), Token::RBracket) {
					loop {
						items.push(self.expr()?);
						if !self.eat(&Token::Comma) {
							break;
						}
					}
				}
				self.expect(&Token::RBracket)?;
				Ok(Expr::Array(items))
			}
			Token::Ident(name) => {
				self.bump();
				match name.as_str() {
					"true" => return Ok(Expr::lit(true)),
					"false" => return Ok(Expr::lit(false)),
					"null" => return Ok(Expr::Literal(Literal::Null)),
					_ => {}
				}
				if self.eat(&Token::LParen) {
					let mut args = Vec::new();
					if !matches!(self.peek(), Token::RParen) {
						loop {
							args.push(self.expr()?);
							if !self.eat(&Token::Comma) {
								break;
							}
						}
					}
					self.expect(&Token::RParen)?;
					return Ok(Expr::Call(name, args));
				}
				Ok(Expr::Path(vec![name]))
			}
			other => Err(Error::parse(format!("unexpected token {other:?}"), self.position())),
		}
	}
}

/// Binding powers, lowest to highest: `||`/`??`, `&&`, comparisons,
/// additive, multiplicative.
fn binary_op(token: &Token) -> Option<(BinaryOp, u8, u8)> {
	Some(match token {
		Token::OrOr => (BinaryOp::Or, 1, 2),
		Token::Coalesce => (BinaryOp::Coalesce, 1, 2),
		Token::AndAnd => (BinaryOp::And, 3, 4),
		Token::EqEq => (BinaryOp::Eq, 5, 6),
		Token::NotEq => (BinaryOp::Neq, 5, 6),
		Token::Lt => (BinaryOp::Lt, 5, 6),
		Token::Lte => (BinaryOp::Lte, 5, 6),
		Token::Gt => (BinaryOp::Gt, 5, 6),
		Token::Gte => (BinaryOp::Gte, 5, 6),
		Token::Plus => (BinaryOp::Add, 7, 8),
		Token::Minus => (BinaryOp::Sub, 7, 8),
		Token::Star => (BinaryOp::Mul, 9, 10),
		Token::Slash => (BinaryOp::Div, 9, 10),
		Token::Percent => (BinaryOp::Mod, 9, 10),
		_ => return None,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_simple_pipeline_program() {
		let program = parse_program(
			"create stream n; create flow f as n | where x > 1 | insert_into(out);",
		)
		.unwrap();
		assert_eq!(program.statements.len(), 2);
	}

	#[test]
	fn parses_scan_with_two_steps() {
		let program = parse_program(
			"create flow f as n | scan(step inSession: true => sessionStart = sessionStart ?? Ts, emit({ts: Ts}); step endSession: Ts - inSession.sessionStart > 30 => emit({ts: Ts})) | insert_into(out);",
		)
		.unwrap();
		assert_eq!(program.statements.len(), 1);
	}

	#[test]
	fn parses_summarize_with_window_and_by() {
		let program = parse_program(
			"create flow f as sales | summarize {total: sum(amount), cnt: count()} by product over window = tumbling_window(2) | insert_into(out);",
		)
		.unwrap();
		assert_eq!(program.statements.len(), 1);
	}

	#[test]
	fn parses_emit_when_predicate() {
		let program = parse_program(
			"create flow f as sales | summarize {total: sum(amount)} by product emit emit_when(total > 100) | insert_into(out);",
		)
		.unwrap();
		assert_eq!(program.statements.len(), 1);
	}

	#[test]
	fn parses_sorter_with_tuning_params() {
		let program = parse_program("create flow f as ticks | sorter(ts, 3, 1000) | insert_into(out);").unwrap();
		match &program.statements[0] {
			Statement::CreateFlow {
				pipeline, ..
			} => match &pipeline.ops[0] {
				OpPlan::Sorter {
					buffer_size,
					max_latency_ms,
					..
				} => {
					assert_eq!(*buffer_size, Some(3));
					assert_eq!(*max_latency_ms, Some(1000));
				}
				other => panic!("expected Sorter, got {other:?}"),
			},
			other => panic!("expected CreateFlow, got {other:?}"),
		}
	}

	#[test]
	fn precedence_multiplies_before_adding() {
		let mut parser = Parser::new(Lexer::new("1 + 2 * 3").tokenize().unwrap());
		let expr = parser.expr().unwrap();
		assert_eq!(
			expr,
			Expr::Binary(
				BinaryOp::Add,
				Box::new(Expr::lit(1.0)),
				Box::new(Expr::Binary(BinaryOp::Mul, Box::new(Expr::lit(2.0)), Box::new(Expr::lit(3.0)))),
			)
		);
	}
}
