//! The binder and top-level entry point: walks the plan tree `crate::syn`
//! produces, validates names against the scalar/aggregation registry,
//! compiles window/emit-trigger/scan-step plan nodes into live runtime
//! state, and drives the `crate::dbs` stream manager.
//!
//! One statement in, one structured result out, independent of its
//! siblings in the same program text — `execute` returns a result per
//! statement. `tracing` carries lifecycle logging.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dbs::filter::Filter;
use crate::dbs::flow::FlowInfo;
use crate::dbs::insert_into::InsertInto;
use crate::dbs::manager::StreamManager;
use crate::dbs::map::Map;
use crate::dbs::operator::Operator;
use crate::dbs::pipeline::Pipeline;
use crate::dbs::scan::{self, Scan};
use crate::dbs::select::Select;
use crate::dbs::sorter::Sorter;
use crate::dbs::stream::StreamInfo;
use crate::dbs::summarize::Summarize;
use crate::error::Error;
use crate::expr::{evaluate, Expr, ObjectEntry, Registry, Scope};
use crate::syn::ast::{Call, CallArg, EmitSpec, OpPlan, PipelinePlan, Statement, StepAction, StepPlan};
use crate::syn::parser::parse_program;
use crate::value::Value;
use crate::window::{EmitTrigger, Window};

/// What a single statement produced, on success.
#[derive(Debug, Clone)]
pub enum StatementResult {
	Ack,
	Inserted {
		count: usize,
	},
	Streams(Vec<StreamInfo>),
	Flows(Vec<FlowInfo>),
	Lookups(Vec<String>),
	StreamInfo(StreamInfo),
	FlowInfo(FlowInfo),
	Subscribed {
		id: Uuid,
	},
	Unsubscribed {
		removed: bool,
	},
}

/// One statement's outcome within a program: `execute` returns
/// `{success, result|error, warnings[]}` per statement, not just once for
/// the whole program.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
	pub result: Result<StatementResult, Error>,
	pub warnings: Vec<String>,
}

/// Ties the query transpiler (`crate::syn`) to the runtime (`crate::dbs`)
/// and the shared scalar/aggregation/lookup registry (`crate::expr`).
pub struct Engine {
	registry: Arc<Registry>,
	manager: StreamManager,
	config: EngineConfig,
	subscriptions: DashMap<Uuid, channel::Receiver<Value>>,
}

impl Engine {
	pub fn new(config: EngineConfig) -> Self {
		Self {
			registry: Arc::new(Registry::with_builtins()),
			manager: StreamManager::new(),
			config,
			subscriptions: DashMap::new(),
		}
	}

	pub fn manager(&self) -> &StreamManager {
		&self.manager
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	/// Hands a subscriber's receiving end to an external caller, e.g. a
	/// wire-level front-end this crate does not implement. Each
	/// subscription's receiver can only be taken once.
	pub fn take_subscription(&self, id: Uuid) -> Option<channel::Receiver<Value>> {
		self.subscriptions.remove(&id).map(|(_, rx)| rx)
	}

	/// Lets an external scheduler enforce TTLs at whatever cadence it likes
	/// — TTL expiry is independent of flow traffic; `EngineConfig::
	/// ttl_sweep_interval_ms` is this call's suggested period.
	pub fn sweep_expired(&self) {
		self.manager.sweep_expired();
	}

	/// Parses `source` and executes every statement in order, each
	/// independently reported. A parse error aborts before any statement
	/// runs at all — parse/bind errors fail loudly before any side effect
	/// — but a bind/runtime/resource error on one statement does not
	/// prevent later statements in the same program from running.
	pub async fn execute(&self, source: &str) -> Vec<ExecutionOutcome> {
		let program = match parse_program(source) {
			Ok(program) => program,
			Err(err) => {
				return vec![ExecutionOutcome {
					result: Err(err),
					warnings: Vec::new(),
				}]
			}
		};
		let mut outcomes = Vec::with_capacity(program.statements.len());
		for statement in program.statements {
			let mut warnings = Vec::new();
			let result = self.execute_statement(statement, &mut warnings).await;
			outcomes.push(ExecutionOutcome {
				result,
				warnings,
			});
		}
		outcomes
	}

	async fn execute_statement(&self, statement: Statement, warnings: &mut Vec<String>) -> Result<StatementResult, Error> {
		match statement {
			Statement::CreateStream {
				name,
				replace,
				ttl_ms,
			} => {
				self.manager.create_stream(&name, replace, ttl_ms)?;
				info!(stream = %name, "stream created");
				Ok(StatementResult::Ack)
			}
			Statement::CreateFlow {
				name,
				replace,
				ttl_ms,
				pipeline,
			} => {
				let source = pipeline.source.clone();
				let compiled = self.compile_pipeline(&pipeline, warnings)?;
				self.manager.create_flow(&name, &source, ttl_ms, compiled, replace)?;
				info!(flow = %name, source = %source, "flow created");
				Ok(StatementResult::Ack)
			}
			Statement::CreateLookup {
				name,
				replace,
				entries,
			} => {
				if !replace && self.registry.has_lookup(&name) {
					return Err(Error::resource(format!("lookup `{name}` already exists")));
				}
				let scope = Scope::new(&Value::Null, &self.registry);
				let mut table = std::collections::HashMap::with_capacity(entries.len());
				for (key, expr) in &entries {
					table.insert(key.clone(), evaluate(expr, &scope)?);
				}
				self.registry.register_lookup(name, table);
				Ok(StatementResult::Ack)
			}
			Statement::DeleteStream {
				name,
			} => {
				self.manager.delete_stream(&name)?;
				info!(stream = %name, "stream deleted");
				Ok(StatementResult::Ack)
			}
			Statement::DeleteFlow {
				name,
			} => {
				self.manager.delete_flow(&name)?;
				info!(flow = %name, "flow deleted");
				Ok(StatementResult::Ack)
			}
			Statement::DeleteLookup {
				name,
			} => {
				if self.registry.remove_lookup(&name) {
					Ok(StatementResult::Ack)
				} else {
					Err(Error::resource(format!("lookup `{name}` does not exist")))
				}
			}
			Statement::Insert {
				stream,
				docs,
			} => {
				let scope = Scope::new(&Value::Null, &self.registry);
				let docs = docs.iter().map(|expr| evaluate(expr, &scope)).collect::<Result<Vec<_>, _>>()?;
				let count = self.manager.insert_into_stream(&stream, docs).await?;
				Ok(StatementResult::Inserted {
					count,
				})
			}
			Statement::Flush {
				stream,
			} => {
				self.manager.flush(&stream).await?;
				Ok(StatementResult::Ack)
			}
			Statement::ListStreams => Ok(StatementResult::Streams(self.manager.list_streams())),
			Statement::ListFlows => Ok(StatementResult::Flows(self.manager.list_flows().await)),
			Statement::ListLookups => Ok(StatementResult::Lookups(self.registry.list_lookups())),
			Statement::Info {
				name,
			} => {
				if let Some(info) = self.manager.info_stream(&name) {
					Ok(StatementResult::StreamInfo(info))
				} else if let Some(info) = self.manager.info_flow(&name).await {
					Ok(StatementResult::FlowInfo(info))
				} else {
					Err(Error::resource(format!("no stream or flow named `{name}`")))
				}
			}
			Statement::Subscribe {
				stream,
			} => {
				let (id, rx) = self.manager.subscribe(&stream)?;
				self.subscriptions.insert(id, rx);
				Ok(StatementResult::Subscribed {
					id,
				})
			}
			Statement::Unsubscribe {
				id,
			} => {
				let id = Uuid::parse_str(&id).map_err(|_| Error::resource(format!("`{id}` is not a valid subscription id")))?;
				self.subscriptions.remove(&id);
				Ok(StatementResult::Unsubscribed {
					removed: self.manager.unsubscribe(id),
				})
			}
		}
	}

	fn compile_pipeline(&self, plan: &PipelinePlan, warnings: &mut Vec<String>) -> Result<Pipeline, Error> {
		let mut ops = Vec::with_capacity(plan.ops.len());
		for op_plan in &plan.ops {
			ops.push(self.compile_op(op_plan, warnings)?);
		}
		Ok(Pipeline::new(ops))
	}

	fn compile_op(&self, op_plan: &OpPlan, warnings: &mut Vec<String>) -> Result<Operator, Error> {
		match op_plan {
			OpPlan::Where(expr) => {
				validate_expr_scalars(expr, &self.registry)?;
				Ok(Operator::Filter(Filter::new(expr.clone(), Arc::clone(&self.registry))))
			}
			OpPlan::Map(expr) => {
				validate_expr_scalars(expr, &self.registry)?;
				Ok(Operator::Map(Map::new(expr.clone(), Arc::clone(&self.registry))))
			}
			OpPlan::Select(entries) => {
				for entry in entries {
					if let ObjectEntry::Field {
						expr,
						..
					} = entry
					{
						validate_expr_scalars(expr, &self.registry)?;
					}
				}
				Ok(Operator::Select(Select::new(entries.clone(), Arc::clone(&self.registry))))
			}
			OpPlan::Scan(steps) => {
				let steps = steps.iter().map(|step| self.compile_step(step)).collect::<Result<Vec<_>, _>>()?;
				Ok(Operator::Scan(Scan::new(steps, Arc::clone(&self.registry), self.config.scan_match_cap)))
			}
			OpPlan::Summarize {
				projections,
				by,
				window,
				emit,
			} => {
				for (field, expr) in projections {
					let (name, args) = expr.as_aggregate_call().ok_or_else(|| Error::bind(format!("projection `{field}` is not an aggregation call")))?;
					self.registry.validate_aggregate(name)?;
					for arg in args {
						validate_expr_scalars(arg, &self.registry)?;
					}
				}
				let window = match window {
					Some(call) => compile_window(call)?,
					None => Window::Sliding {
						size: u64::MAX,
					},
				};
				let emit = match emit {
					Some(spec) => compile_emit(spec)?,
					None => EmitTrigger::OnWindowClose,
				};
				if let EmitTrigger::When(predicate) = &emit {
					validate_expr_scalars(predicate, &self.registry)?;
				}
				let summarize = Summarize::new(by.clone(), projections.clone(), window, emit, Arc::clone(&self.registry))?;
				Ok(Operator::Summarize(summarize))
			}
			OpPlan::Sorter {
				key,
				buffer_size,
				max_latency_ms,
			} => {
				validate_expr_scalars(key, &self.registry)?;
				Ok(Operator::Sorter(Sorter::new(
					key.clone(),
					Arc::clone(&self.registry),
					buffer_size.unwrap_or(self.config.sorter_buffer_size as u64) as usize,
					max_latency_ms.unwrap_or(u64::MAX),
				)))
			}
			OpPlan::InsertInto(target) => {
				if !self.manager.stream_exists(target) {
					warnings.push(format!(
						"insert_into target stream `{target}` does not exist yet; documents will be dropped (and the flow faulted) until it is created"
					));
				}
				Ok(Operator::InsertInto(InsertInto::new(target.clone())))
			}
			OpPlan::WriteToFile(_) => Err(Error::bind("write_to_file is not supported: file I/O is outside this engine's scope")),
			OpPlan::AssertOrSaveExpected(_) => Err(Error::bind("assert_or_save_expected is not supported: test-fixture tooling is outside this engine's scope")),
		}
	}

	fn compile_step(&self, step: &StepPlan) -> Result<scan::Step, Error> {
		validate_expr_scalars(&step.guard, &self.registry)?;
		if let Some(end_when) = &step.end_when {
			validate_expr_scalars(end_when, &self.registry)?;
		}
		let mut assignments = Vec::new();
		let mut emit = None;
		for action in &step.actions {
			match action {
				StepAction::Assign {
					field,
					value,
				} => {
					validate_expr_scalars(value, &self.registry)?;
					assignments.push((field.clone(), value.clone()));
				}
				StepAction::Emit(expr) => {
					validate_expr_scalars(expr, &self.registry)?;
					emit = Some(expr.clone());
				}
			}
		}
		Ok(scan::Step {
			name: step.name.clone(),
			optional: step.optional,
			end_when: step.end_when.clone(),
			guard: step.guard.clone(),
			assignments,
			emit,
		})
	}
}

/// Walks an expression tree validating every scalar function call name
/// against the registry — an unknown function is a bind error, checked
/// once at bind time rather than on the first matching document.
/// Aggregation calls are validated separately by their caller, since the
/// same `Expr::Call` shape means either a scalar or an aggregation
/// depending on where it appears.
fn validate_expr_scalars(expr: &Expr, registry: &Registry) -> Result<(), Error> {
	match expr {
		Expr::Literal(_) | Expr::Path(_) => Ok(()),
		Expr::Unary(_, inner) => validate_expr_scalars(inner, registry),
		Expr::Binary(_, lhs, rhs) => {
			validate_expr_scalars(lhs, registry)?;
			validate_expr_scalars(rhs, registry)
		}
		Expr::Call(name, args) => {
			registry.validate_scalar(name)?;
			for arg in args {
				validate_expr_scalars(arg, registry)?;
			}
			Ok(())
		}
		Expr::Object(entries) => {
			for entry in entries {
				if let ObjectEntry::Field {
					expr,
					..
				} = entry
				{
					validate_expr_scalars(expr, registry)?;
				}
			}
			Ok(())
		}
		Expr::Array(items) => {
			for item in items {
				validate_expr_scalars(item, registry)?;
			}
			Ok(())
		}
	}
}

fn ident_arg(args: &[CallArg], index: usize, call_name: &str) -> Result<String, Error> {
	match args.get(index) {
		Some(CallArg::Ident(s)) => Ok(s.clone()),
		_ => Err(Error::bind(format!("{call_name}() expects a field-name argument at position {index}"))),
	}
}

fn numeric_arg(args: &[CallArg], index: usize, call_name: &str) -> Result<f64, Error> {
	match args.get(index) {
		Some(CallArg::Number(n)) => Ok(*n),
		Some(CallArg::Duration(ms)) => Ok(*ms as f64),
		_ => Err(Error::bind(format!("{call_name}() expects a numeric argument at position {index}"))),
	}
}

/// Compiles an `over window = <call>` plan node into a runtime [`Window`].
fn compile_window(call: &Call) -> Result<Window, Error> {
	let args = &call.args;
	match call.name.as_str() {
		"tumbling_window" => Ok(Window::Tumbling {
			size: numeric_arg(args, 0, "tumbling_window")? as u64,
		}),
		"count_window" => Ok(Window::Count {
			size: numeric_arg(args, 0, "count_window")? as u64,
		}),
		"hopping_window" => Ok(Window::Hopping {
			size: numeric_arg(args, 0, "hopping_window")? as u64,
			hop: numeric_arg(args, 1, "hopping_window")? as u64,
		}),
		"sliding_window" => Ok(Window::Sliding {
			size: numeric_arg(args, 0, "sliding_window")? as u64,
		}),
		"session_window" => Ok(Window::Session {
			gap_field: ident_arg(args, 0, "session_window")?,
			gap: numeric_arg(args, 1, "session_window")?,
		}),
		"tumbling_window_by" => Ok(Window::TumblingBy {
			field: ident_arg(args, 0, "tumbling_window_by")?,
			size: numeric_arg(args, 1, "tumbling_window_by")?,
		}),
		"hopping_window_by" => Ok(Window::HoppingBy {
			field: ident_arg(args, 0, "hopping_window_by")?,
			size: numeric_arg(args, 1, "hopping_window_by")?,
			hop: numeric_arg(args, 2, "hopping_window_by")?,
		}),
		other => Err(Error::bind(format!("unknown window function `{other}`"))),
	}
}

/// Compiles an `emit <spec>` plan node into a runtime [`EmitTrigger`].
fn compile_emit(spec: &EmitSpec) -> Result<EmitTrigger, Error> {
	match spec {
		EmitSpec::When(predicate) => Ok(EmitTrigger::When(predicate.clone())),
		EmitSpec::Call(call) => {
			let args = &call.args;
			match call.name.as_str() {
				"emit_every" => Ok(EmitTrigger::Every {
					n: numeric_arg(args, 0, "emit_every")? as u64,
				}),
				"emit_on_change" => Ok(EmitTrigger::OnChange {
					field: ident_arg(args, 0, "emit_on_change")?,
				}),
				"emit_on_group_change" => Ok(EmitTrigger::OnGroupChange),
				"emit_on_update" => Ok(EmitTrigger::OnUpdate),
				other => Err(Error::bind(format!("unknown emit trigger `{other}`"))),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn engine() -> Engine {
		Engine::new(EngineConfig::default())
	}

	#[tokio::test]
	async fn exp_map_pipeline_end_to_end() {
		let engine = engine();
		let outcomes = engine
			.execute(
				"create stream n; create stream r; \
				 create flow f as n | select { x: x, exp_x: exp(x) } | insert_into(r); \
				 insert into n {x:0}; insert into n {x:1}; insert into n {x:2}; flush n;",
			)
			.await;
		for outcome in &outcomes {
			assert!(outcome.result.is_ok(), "{:?}", outcome.result);
		}
	}

	#[tokio::test]
	async fn unknown_scalar_function_is_a_bind_error() {
		let engine = engine();
		let outcomes = engine.execute("create stream n; create flow f as n | where nope(x) | insert_into(n);").await;
		assert!(outcomes[1].result.is_err());
	}

	#[tokio::test]
	async fn insert_into_missing_target_warns_not_errors() {
		let engine = engine();
		let outcomes = engine.execute("create stream n; create flow f as n | insert_into(missing);").await;
		assert!(outcomes[1].result.is_ok());
		assert!(!outcomes[1].warnings.is_empty());
	}

	#[tokio::test]
	async fn list_streams_reports_created_streams() {
		let engine = engine();
		engine.execute("create stream a; create stream b;").await;
		let outcomes = engine.execute("list streams;").await;
		match &outcomes[0].result {
			Ok(StatementResult::Streams(streams)) => assert_eq!(streams.len(), 2),
			other => panic!("expected Streams, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn subscribe_then_insert_delivers_document() {
		let engine = engine();
		engine.execute("create stream n;").await;
		let outcomes = engine.execute("subscribe n;").await;
		let id = match outcomes[0].result.as_ref().unwrap() {
			StatementResult::Subscribed {
				id,
			} => *id,
			other => panic!("expected Subscribed, got {other:?}"),
		};
		let rx = engine.take_subscription(id).unwrap();
		engine.execute("insert into n {x:1};").await;
		let doc = rx.recv().await.unwrap();
		assert_eq!(doc.safe_get("x"), Value::Number(1.0));
	}

	#[tokio::test]
	async fn lookup_statements_create_and_resolve() {
		let engine = engine();
		let outcomes = engine
			.execute("create lookup countries as { \"us\": \"United States\" }; create stream n; create flow f as n | map { name: lookup(\"countries\", code) } | insert_into(n);")
			.await;
		for outcome in &outcomes {
			assert!(outcome.result.is_ok(), "{:?}", outcome.result);
		}
	}
}
