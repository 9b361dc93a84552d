//! End-to-end scenarios run through the public `Engine` surface, one per
//! named scenario.

use jsonjet::{Engine, EngineConfig, StatementResult};

fn engine() -> Engine {
	Engine::new(EngineConfig::default())
}

fn assert_all_ok(outcomes: &[jsonjet::ExecutionOutcome]) {
	for outcome in outcomes {
		assert!(outcome.result.is_ok(), "{:?}", outcome.result);
	}
}

async fn subscribed_receiver(engine: &Engine, stream: &str) -> async_channel::Receiver<jsonjet::Value> {
	let outcomes = engine.execute(&format!("subscribe {stream};")).await;
	match outcomes[0].result.as_ref().unwrap() {
		StatementResult::Subscribed {
			id,
		} => engine.take_subscription(*id).unwrap(),
		other => panic!("expected Subscribed, got {other:?}"),
	}
}

#[tokio::test]
async fn exp_map_emits_in_order() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n; create stream r;").await);
	assert_all_ok(
		&engine
			.execute("create flow f as n | select { x: x, exp_x: exp(x) } | insert_into(r);")
			.await,
	);
	let rx = subscribed_receiver(&engine, "r").await;
	assert_all_ok(&engine.execute("insert into n {x:0}; insert into n {x:1}; insert into n {x:2}; flush n;").await);

	let expected = [(0.0, 1.0f64.exp()), (1.0, 1.0f64.exp()), (2.0, 2.0f64.exp())];
	for (x, exp_x) in expected {
		let doc = rx.recv().await.unwrap();
		assert_eq!(doc.safe_get("x").as_f64(), Some(x));
		assert!((doc.safe_get("exp_x").as_f64().unwrap() - exp_x).abs() < 1e-9);
	}
}

#[tokio::test]
async fn cumulative_scan_produces_running_total() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n; create stream r;").await);
	assert_all_ok(
		&engine
			.execute("create flow f as n | scan(step sum: true => sum.total = (sum.total||0)+x, emit({input:x, cumulative:sum.total})) | insert_into(r);")
			.await,
	);
	let rx = subscribed_receiver(&engine, "r").await;
	for x in 1..=5 {
		assert_all_ok(&engine.execute(&format!("insert into n {{x:{x}}};")).await);
	}

	let mut running = 0.0;
	for x in 1..=5 {
		running += x as f64;
		let doc = rx.recv().await.unwrap();
		assert_eq!(doc.safe_get("input").as_f64(), Some(x as f64));
		assert_eq!(doc.safe_get("cumulative").as_f64(), Some(running));
	}
}

#[tokio::test]
async fn summarize_by_group_preserves_totals() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream sales; create stream out;").await);
	assert_all_ok(
		&engine
			.execute("create flow f as sales | summarize {total:sum(amount), cnt:count()} by product over window = tumbling_window(2) | insert_into(out);")
			.await,
	);
	let rx = subscribed_receiver(&engine, "out").await;
	let rows = [("laptop", 1000.0), ("mouse", 20.0), ("laptop", 1200.0), ("keyboard", 50.0)];
	for (product, amount) in rows {
		assert_all_ok(&engine.execute(&format!("insert into sales {{product:\"{product}\", amount:{amount}}};")).await);
	}
	assert_all_ok(&engine.execute("flush sales;").await);

	let mut total_sum = 0.0;
	let mut total_cnt = 0.0;
	while let Ok(doc) = rx.try_recv() {
		total_sum += doc.safe_get("total").as_f64().unwrap_or(0.0);
		total_cnt += doc.safe_get("cnt").as_f64().unwrap_or(0.0);
	}
	let expected_sum: f64 = rows.iter().map(|(_, amount)| amount).sum();
	assert_eq!(total_sum, expected_sum);
	assert_eq!(total_cnt, rows.len() as f64);
}

#[tokio::test]
async fn sorter_reorders_and_drops_late_record() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n; create stream r;").await);
	assert_all_ok(&engine.execute("create flow f as n | sorter(ts, 3, 1000) | insert_into(r);").await);
	let rx = subscribed_receiver(&engine, "r").await;
	for ts in [100, 300, 200, 400, 150] {
		assert_all_ok(&engine.execute(&format!("insert into n {{ts:{ts}}};")).await);
	}
	assert_all_ok(&engine.execute("flush n;").await);

	let mut seen = Vec::new();
	while let Ok(doc) = rx.try_recv() {
		seen.push(doc.safe_get("ts").as_f64().unwrap() as i64);
	}
	assert_eq!(seen, vec![100, 200, 300, 400]);
}

#[tokio::test]
async fn session_scan_groups_by_gap() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n; create stream r;").await);
	assert_all_ok(
		&engine
			.execute(
				"create flow f as n | scan(step inSession: true => sessionStart = inSession.sessionStart ?? Ts, emit({sessionStart: inSession.sessionStart}); \
				 step endSession: Ts - inSession.sessionStart > 30 => closed = true) | insert_into(r);",
			)
			.await,
	);
	let rx = subscribed_receiver(&engine, "r").await;
	for ts in [0, 1, 2, 3, 32, 36, 38, 41, 75] {
		assert_all_ok(&engine.execute(&format!("insert into n {{Ts:{ts}}};")).await);
	}

	let mut sessions = Vec::new();
	while let Ok(doc) = rx.try_recv() {
		sessions.push(doc.safe_get("sessionStart").as_f64().unwrap() as i64);
	}
	// `endSession` never emits; only `inSession` does, once per session. A
	// session only ends when a record's gap from its start exceeds 30, and
	// that same record opens the next session: three sessions starting at
	// 0, 32 and 75.
	assert_eq!(sessions, vec![0, 32, 75]);
}

#[tokio::test]
async fn exclusion_select_drops_named_fields() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream user_data; create stream out;").await);
	assert_all_ok(
		&engine
			.execute("create flow f as user_data | select { ...*, -password, -ssn, safe_age: age } | insert_into(out);")
			.await,
	);
	let rx = subscribed_receiver(&engine, "out").await;
	assert_all_ok(&engine.execute("insert into user_data {id:1, name:\"J\", password:\"p\", ssn:\"s\", age:25};").await);

	let doc = rx.recv().await.unwrap();
	assert_eq!(doc.safe_get("id").as_f64(), Some(1.0));
	assert_eq!(doc.safe_get("name").as_str(), Some("J"));
	assert_eq!(doc.safe_get("safe_age").as_f64(), Some(25.0));
	assert!(doc.safe_get("password").is_null());
	assert!(doc.safe_get("ssn").is_null());
}

#[tokio::test]
async fn flush_is_idempotent() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n; create stream r;").await);
	assert_all_ok(
		&engine
			.execute("create flow f as n | summarize {total:sum(x)} over window = sliding_window(1000) emit emit_on_update | insert_into(r);")
			.await,
	);
	let rx = subscribed_receiver(&engine, "r").await;
	assert_all_ok(&engine.execute("insert into n {x:1}; flush n;").await);
	let mut first_flush_count = 0;
	while rx.try_recv().is_ok() {
		first_flush_count += 1;
	}
	assert!(first_flush_count > 0);

	assert_all_ok(&engine.execute("flush n;").await);
	assert!(rx.try_recv().is_err(), "a second flush with no intervening push must not emit again");
}

#[tokio::test]
async fn bind_error_on_unknown_function_does_not_create_flow() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n;").await);
	let outcomes = engine.execute("create flow f as n | where not_a_real_fn(x) | insert_into(n);").await;
	assert!(outcomes[0].result.is_err());
	let info = engine.execute("info f;").await;
	assert!(info[0].result.is_err(), "flow must not have been created after a bind error");
}

#[tokio::test]
async fn insert_into_nonexistent_target_warns_and_faults_flow_lazily() {
	let engine = engine();
	assert_all_ok(&engine.execute("create stream n;").await);
	let create = engine.execute("create flow f as n | insert_into(missing);").await;
	assert!(create[0].result.is_ok());
	assert!(!create[0].warnings.is_empty());

	assert_all_ok(&engine.execute("insert into n {x:1};").await);
	let outcomes = engine.execute("info f;").await;
	match outcomes[0].result.as_ref().unwrap() {
		StatementResult::FlowInfo(info) => assert!(info.faulted.is_some()),
		other => panic!("expected FlowInfo, got {other:?}"),
	}
}
