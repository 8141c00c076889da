use super::*;
use crate::testing::{Call, Reply, ScriptedConnection, ScriptedRow, row};
use crate::value::Value;
use std::time::Duration;

fn engine() -> Engine<ScriptedConnection> {
    Engine::new(EngineConfig::new())
}

fn numbered(n: i64) -> Vec<ScriptedRow> {
    (0..n).map(|i| row([("id", Value::Int(i))])).collect()
}

fn update_node(id: i64, status: &str) -> Node {
    Node::with_value("pgsql.update", "accounts")
        .child(Node::new("values").leaf("status", status))
        .child(Node::new("where").leaf("id", id))
}

#[tokio::test]
async fn generate_only_returns_sql_without_touching_the_backend() {
    let conn = ScriptedConnection::new();
    let mut node = Node::with_value("pgsql.read", "users")
        .child(Node::new("where").leaf("id", 7))
        .leaf("generate-only", true);

    engine().run(&conn, &mut node, None).await.unwrap();

    assert!(conn.calls().is_empty());
    assert_eq!(node.name, "pgsql.read");
    assert_eq!(
        node.value,
        Value::from(r#"SELECT * FROM "users" WHERE "id" = $1 LIMIT 25"#)
    );
    assert_eq!(node.children, vec![Node::with_value("$1", 7)]);
}

#[tokio::test]
async fn generate_only_needs_no_connection() {
    let engine = Engine::<ScriptedConnection>::new(EngineConfig::new().dialect(Dialect::mssql()));
    let mut ctx = Context::new();
    let mut node = update_node(1, "closed").leaf("generate-only", true);
    node.name = "mssql.update".into();

    engine.invoke(&mut ctx, &mut node, None).await.unwrap();

    assert_eq!(
        node.value,
        Value::from(r#"UPDATE "accounts" SET "status" = @p0 WHERE "id" = @p1"#)
    );
    assert_eq!(node.children.len(), 2);
}

#[tokio::test]
async fn read_replaces_request_with_unnamed_rows() {
    let conn = ScriptedConnection::new().rows(vec![
        row([("id", Value::Int(1)), ("name", Value::from("ann"))]),
        row([("id", Value::Int(2)), ("name", Value::Null)]),
    ]);
    let mut node = Node::with_value("pgsql.read", "users")
        .child(Node::new("columns").child(Node::new("id")).child(Node::new("name")));

    engine().run(&conn, &mut node, None).await.unwrap();

    assert!(node.value.is_null());
    assert_eq!(node.children.len(), 2);
    let first = &node.children[0];
    assert_eq!(first.name, "");
    assert_eq!(
        first.children,
        vec![Node::with_value("id", 1), Node::with_value("name", "ann")]
    );
    assert!(node.children[1].children[1].value.is_null());
    assert_eq!(
        conn.statements(),
        vec![r#"SELECT "id", "name" FROM "users" LIMIT 25"#.to_string()]
    );
}

#[tokio::test]
async fn read_stops_at_default_limit() {
    let conn = ScriptedConnection::new().rows(numbered(30));
    let mut node = Node::with_value("pgsql.read", "users");

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.children.len(), 25);
    assert_eq!(node.children[24].children[0].value, Value::Int(24));
}

#[tokio::test]
async fn read_stops_at_explicit_limit() {
    let conn = ScriptedConnection::new().rows(numbered(10));
    let mut node = Node::with_value("pgsql.read", "users").leaf("limit", 3);

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.children.len(), 3);
}

#[tokio::test]
async fn select_groups_multiple_result_sets() {
    let conn = ScriptedConnection::new().reply(Reply::Rows(vec![
        numbered(2),
        vec![row([("total", Value::Int(2))])],
    ]));
    let mut node = Node::with_value("pgsql.select", "SELECT id FROM a; SELECT count(*) AS total FROM a")
        .leaf("multiple-result-sets", true);

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.children.len(), 2);
    assert_eq!(node.children[0].name, "");
    assert_eq!(node.children[0].children.len(), 2);
    assert_eq!(
        node.children[1].children[0].children,
        vec![Node::with_value("total", 2)]
    );
    // The flag is consumed, never bound.
    assert_eq!(
        conn.calls(),
        vec![Call::Open {
            text: "SELECT id FROM a; SELECT count(*) AS total FROM a".into(),
            params: vec![],
            in_tx: false,
        }]
    );
}

#[tokio::test]
async fn batch_without_result_sets_adds_no_groups() {
    let conn = ScriptedConnection::new().reply(Reply::Rows(vec![]));
    let mut node = Node::with_value("pgsql.select", "UPDATE a SET x = 1; UPDATE b SET y = 2")
        .leaf("multiple-result-sets", true);

    engine().run(&conn, &mut node, None).await.unwrap();

    assert!(node.value.is_null());
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn row_cap_applies_to_each_result_set() {
    let conn = ScriptedConnection::new().reply(Reply::Rows(vec![numbered(3), numbered(3)]));
    let mut node = Node::with_value("pgsql.read", "t")
        .leaf("limit", 2)
        .leaf("multiple-result-sets", true);

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.children.len(), 2);
    assert!(node.children.iter().all(|set| set.children.len() == 2));
}

#[tokio::test]
async fn select_without_flag_reads_only_the_first_result_set() {
    let conn = ScriptedConnection::new().reply(Reply::Rows(vec![numbered(2), numbered(5)]));
    let mut node = Node::with_value("pgsql.select", "SELECT 1; SELECT 2");

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.children.len(), 2);
    assert!(node.children.iter().all(|r| r.children.len() == 1));
}

#[tokio::test]
async fn select_binds_children_as_parameters() {
    let conn = ScriptedConnection::new();
    let mut node = Node::with_value("pgsql.select", "SELECT * FROM t WHERE a = $1 AND b = $2")
        .leaf("$1", 5)
        .child(Node::new("$2"));

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(
        conn.calls(),
        vec![Call::Open {
            text: "SELECT * FROM t WHERE a = $1 AND b = $2".into(),
            params: vec![Value::Int(5), Value::Null],
            in_tx: false,
        }]
    );
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn scalar_takes_first_column_of_first_row() {
    let conn = ScriptedConnection::new()
        .rows(vec![
            row([("count", Value::Int(42)), ("other", Value::Int(0))]),
            row([("count", Value::Int(7))]),
        ])
        .rows(vec![]);
    let engine = engine();

    let mut node = Node::with_value("pgsql.scalar", "SELECT count(*), 0 FROM t");
    engine.run(&conn, &mut node, None).await.unwrap();
    assert_eq!(node.value, Value::Int(42));
    assert!(node.children.is_empty());

    let mut node = Node::with_value("pgsql.scalar", "SELECT id FROM t WHERE false");
    engine.run(&conn, &mut node, None).await.unwrap();
    assert!(node.value.is_null());
}

#[tokio::test]
async fn execute_sets_affected_row_count() {
    let conn = ScriptedConnection::new().reply(Reply::Affected(3));
    let mut node = Node::with_value("pgsql.execute", "DELETE FROM t WHERE a = $1").leaf("$1", 1);

    engine().run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.value, Value::Int(3));
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn mutations_replace_request_with_row_count() {
    let conn = ScriptedConnection::new()
        .reply(Reply::Affected(1))
        .reply(Reply::Affected(4))
        .reply(Reply::Affected(2));
    let engine = engine();

    let mut create = Node::with_value("pgsql.create", "accounts")
        .child(Node::new("values").leaf("id", 9).leaf("status", "open"));
    engine.run(&conn, &mut create, None).await.unwrap();
    assert_eq!(create.value, Value::Int(1));
    assert!(create.children.is_empty());

    let mut update = update_node(9, "closed");
    engine.run(&conn, &mut update, None).await.unwrap();
    assert_eq!(update.value, Value::Int(4));

    let mut delete = Node::with_value("pgsql.delete", "accounts")
        .child(Node::new("where").leaf("id", 9));
    engine.run(&conn, &mut delete, None).await.unwrap();
    assert_eq!(delete.value, Value::Int(2));

    assert_eq!(
        conn.statements(),
        vec![
            r#"INSERT INTO "accounts" ("id", "status") VALUES ($1, $2)"#.to_string(),
            r#"UPDATE "accounts" SET "status" = $1 WHERE "id" = $2"#.to_string(),
            r#"DELETE FROM "accounts" WHERE "id" = $1"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn syntax_error_leaves_request_and_backend_untouched() {
    let conn = ScriptedConnection::new();
    let mut node = Node::with_value("pgsql.read", "t").leaf("limit", 1).leaf("limit", 2);
    let before = node.clone();

    let err = engine().run(&conn, &mut node, None).await.unwrap_err();

    assert!(err.is_syntax());
    assert_eq!(node, before);
    assert!(conn.calls().is_empty());
}

#[tokio::test]
async fn rejected_batch_parameters_leave_the_request_intact() {
    let conn = ScriptedConnection::new().reject_batch_params();
    let mut node = Node::with_value("pgsql.select", "SELECT * FROM t WHERE id = $1; SELECT 1")
        .leaf("$1", 1)
        .leaf("multiple-result-sets", true);
    let before = node.clone();

    let err = engine().run(&conn, &mut node, None).await.unwrap_err();

    assert!(err.is_syntax());
    assert_eq!(node, before);
    assert!(conn.calls().is_empty());
}

#[tokio::test]
async fn backend_failure_leaves_node_empty() {
    let conn = ScriptedConnection::new().reply(Reply::Fail("relation \"t\" does not exist"));
    let mut node = Node::with_value("pgsql.select", "SELECT * FROM t WHERE a = $1").leaf("$1", 1);

    let err = engine().run(&conn, &mut node, None).await.unwrap_err();

    assert!(err.is_execution());
    assert!(err.to_string().contains("does not exist"));
    assert!(node.value.is_null());
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn unknown_operations_are_rejected() {
    let conn = ScriptedConnection::new();
    for name in ["pgsql.frobnicate", "mssql.read", "pgsqlread", "read"] {
        let mut node = Node::with_value(name, "t");
        let err = engine().run(&conn, &mut node, None).await.unwrap_err();
        assert!(
            matches!(&err, SqlError::UnknownOperation(op) if op == name),
            "{name}: {err}"
        );
    }
}

#[tokio::test]
async fn missing_connection_is_reported() {
    let mut ctx = Context::new();
    let mut node = Node::with_value("pgsql.read", "t");

    let err = engine().invoke(&mut ctx, &mut node, None).await.unwrap_err();

    assert!(matches!(err, SqlError::Connection(_)));
    assert!(err.to_string().contains("pgsql.connect"));
}

#[tokio::test]
async fn operations_outside_a_transaction_run_in_autocommit() {
    let conn = ScriptedConnection::new();
    let mut node = update_node(1, "x");

    engine().run(&conn, &mut node, None).await.unwrap();

    assert!(matches!(
        conn.calls().as_slice(),
        [Call::Execute { in_tx: false, .. }]
    ));
}

#[tokio::test]
async fn transaction_commits_when_every_child_succeeds() {
    let conn = ScriptedConnection::new()
        .reply(Reply::Affected(1))
        .reply(Reply::Affected(1));
    let mut node = Node::new("pgsql.transaction.create")
        .child(update_node(1, "debited"))
        .child(update_node(2, "credited"));

    engine().run(&conn, &mut node, None).await.unwrap();

    let calls = conn.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], Call::Begin { savepoint: false });
    assert!(matches!(calls[1], Call::Execute { in_tx: true, .. }));
    assert!(matches!(calls[2], Call::Execute { in_tx: true, .. }));
    assert_eq!(calls[3], Call::Commit { savepoint: false });
    assert_eq!(node.children[0].value, Value::Int(1));
    assert_eq!(node.children[1].value, Value::Int(1));
}

#[tokio::test]
async fn transaction_rolls_back_on_first_failure_and_returns_it_unchanged() {
    let conn = ScriptedConnection::new()
        .reply(Reply::Affected(1))
        .reply(Reply::Fail("duplicate key value violates unique constraint"));
    let mut node = Node::new("pgsql.transaction.create")
        .child(update_node(1, "debited"))
        .child(update_node(2, "credited"))
        .child(update_node(3, "never"));

    let err = engine().run(&conn, &mut node, None).await.unwrap_err();

    assert!(err.is_execution());
    assert_eq!(
        err.to_string(),
        "Execution error: duplicate key value violates unique constraint"
    );
    let calls = conn.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls.last(), Some(&Call::Rollback { savepoint: false }));
    assert!(!calls.iter().any(|c| matches!(c, Call::Commit { .. })));
}

#[tokio::test]
async fn failed_rollback_still_returns_the_original_error() {
    let conn = ScriptedConnection::new()
        .reply(Reply::Fail("deadlock detected"))
        .fail_rollback();
    let mut node = Node::new("pgsql.transaction.create").child(update_node(1, "x"));

    let err = engine().run(&conn, &mut node, None).await.unwrap_err();

    assert_eq!(err.to_string(), "Execution error: deadlock detected");
}

#[tokio::test]
async fn nested_transaction_becomes_a_savepoint() {
    let conn = ScriptedConnection::new();
    let mut node = Node::new("pgsql.transaction.create")
        .child(update_node(1, "outer"))
        .child(Node::new("pgsql.transaction.create").child(update_node(2, "inner")));

    engine().run(&conn, &mut node, None).await.unwrap();

    let calls = conn.calls();
    assert_eq!(calls[0], Call::Begin { savepoint: false });
    assert_eq!(calls[2], Call::Begin { savepoint: true });
    assert!(matches!(calls[3], Call::Execute { in_tx: true, .. }));
    assert_eq!(calls[4], Call::Commit { savepoint: true });
    assert_eq!(calls[5], Call::Commit { savepoint: false });
}

#[tokio::test]
async fn failing_savepoint_rolls_back_both_levels() {
    let conn = ScriptedConnection::new()
        .reply(Reply::Affected(1))
        .reply(Reply::Fail("check constraint violated"));
    let mut node = Node::new("pgsql.transaction.create")
        .child(update_node(1, "outer"))
        .child(Node::new("pgsql.transaction.create").child(update_node(2, "inner")));

    let err = engine().run(&conn, &mut node, None).await.unwrap_err();

    assert!(err.is_execution());
    let calls = conn.calls();
    let tail = &calls[calls.len() - 2..];
    assert_eq!(
        tail,
        [
            Call::Rollback { savepoint: true },
            Call::Rollback { savepoint: false }
        ]
    );
}

#[tokio::test]
async fn cancellation_mid_read_leaves_node_empty() {
    let token = CancellationToken::new();
    let conn = ScriptedConnection::new()
        .rows(numbered(3))
        .cancel_after_rows(1, token.clone());
    let mut node = Node::with_value("pgsql.select", "SELECT id FROM t");

    let err = engine().run(&conn, &mut node, Some(&token)).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(node.value.is_null());
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn cancelled_token_stops_before_the_backend_is_reached() {
    let token = CancellationToken::new();
    token.cancel();
    let conn = ScriptedConnection::new();
    let mut node = update_node(1, "x");

    let err = engine().run(&conn, &mut node, Some(&token)).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(conn.calls().is_empty());
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn cancellation_inside_transaction_rolls_back() {
    let token = CancellationToken::new();
    let conn = ScriptedConnection::new()
        .rows(numbered(3))
        .cancel_after_rows(1, token.clone());
    let mut node = Node::new("pgsql.transaction.create")
        .child(Node::with_value("pgsql.select", "SELECT id FROM t"))
        .child(update_node(1, "never"));

    let err = engine().run(&conn, &mut node, Some(&token)).await.unwrap_err();

    assert!(err.is_cancelled());
    let calls = conn.calls();
    assert_eq!(calls.last(), Some(&Call::Rollback { savepoint: false }));
    assert!(!calls.iter().any(|c| matches!(c, Call::Execute { .. })));
}

#[tokio::test]
async fn statement_timeout_is_an_execution_failure() {
    let conn = ScriptedConnection::new().delay(Duration::from_millis(200));
    let engine = Engine::new(EngineConfig::new().statement_timeout(Duration::from_millis(10)));
    let mut node = Node::with_value("pgsql.execute", "SELECT pg_sleep(1)");

    let err = engine.run(&conn, &mut node, None).await.unwrap_err();

    assert!(matches!(err, SqlError::Timeout(_)));
    assert!(err.is_execution());
}

fn shout(row: &ScriptedRow) -> SqlResult<Vec<(String, Value)>> {
    Ok(row
        .iter()
        .map(|(name, value)| (name.to_uppercase(), value.clone()))
        .collect())
}

#[tokio::test]
async fn custom_converter_replaces_the_default() {
    let conn = ScriptedConnection::new().rows(numbered(1));
    let engine = engine().with_converter(shout);
    let mut node = Node::with_value("pgsql.read", "t");

    engine.run(&conn, &mut node, None).await.unwrap();

    assert_eq!(node.children[0].children[0].name, "ID");
}

#[test]
fn blocking_and_suspending_paths_agree() {
    let request = Node::with_value("pgsql.read", "users")
        .child(Node::new("where").leaf("active", true))
        .leaf("limit", 2);

    let blocking_conn = ScriptedConnection::new().rows(numbered(5));
    let blocking = BlockingEngine::new(EngineConfig::new()).unwrap();
    let mut blocking_node = request.clone();
    blocking.run(&blocking_conn, &mut blocking_node).unwrap();

    let async_conn = ScriptedConnection::new().rows(numbered(5));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut async_node = request.clone();
    runtime
        .block_on(engine().run(&async_conn, &mut async_node, None))
        .unwrap();

    assert_eq!(blocking_node, async_node);
    assert_eq!(blocking_node.children.len(), 2);
    assert_eq!(blocking_conn.calls(), async_conn.calls());
}

#[test]
fn blocking_transaction_rolls_back_on_failure() {
    let conn = ScriptedConnection::new()
        .reply(Reply::Affected(1))
        .reply(Reply::Fail("boom"));
    let blocking = BlockingEngine::new(EngineConfig::new()).unwrap();
    let mut node = Node::new("pgsql.transaction.create")
        .child(update_node(1, "a"))
        .child(update_node(2, "b"));

    let err = blocking.run(&conn, &mut node).unwrap_err();

    assert_eq!(err.to_string(), "Execution error: boom");
    assert_eq!(
        conn.calls().last(),
        Some(&Call::Rollback { savepoint: false })
    );
}

#[test]
fn operation_names_resolve_per_dialect() {
    let pg = Dialect::postgres();
    assert_eq!(Operation::parse(&pg, "pgsql.read").unwrap(), Operation::Read);
    assert_eq!(
        Operation::parse(&pg, "pgsql.transaction.create").unwrap(),
        Operation::Transaction
    );
    assert!(Operation::parse(&pg, "mssql.read").is_err());
    assert_eq!(
        Operation::parse(&Dialect::mssql(), "mssql.scalar").unwrap(),
        Operation::Scalar
    );
}
