use super::*;
use crate::database::Database;
use crate::testing::MockDriver;

fn db() -> Database<MockDriver> {
    Database::new(MockDriver::default())
}

fn log(db: &Database<MockDriver>) -> Vec<String> {
    db.driver().sql_log()
}

#[tokio::test]
async fn root_commit_issues_begin_and_commit_and_releases_once() {
    let db = db();
    let tx = db.begin().await.unwrap();
    assert!(tx.is_root());
    assert_eq!(tx.state(), TransactionState::Pending);
    assert_eq!(db.driver().outstanding(), 1);

    tx.commit().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Committed);
    assert_eq!(log(&db), vec!["begin", "commit"]);
    assert_eq!(db.driver().acquired(), 1);
    assert_eq!(db.driver().released(), 1);
    assert_eq!(db.driver().outstanding(), 0);
}

#[tokio::test]
async fn double_commit_is_a_state_error() {
    let db = db();
    let tx = db.begin().await.unwrap();
    tx.commit().await.unwrap();

    let err = tx.commit().await.unwrap_err();
    assert!(err.is_state_error());
    assert_eq!(
        err.to_string(),
        "transaction may not be committed after being committed"
    );
    // No SQL for the rejected commit.
    assert_eq!(log(&db), vec!["begin", "commit"]);
}

#[tokio::test]
async fn control_operations_after_rollback_fail() {
    let db = db();
    let tx = db.begin().await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(tx.state(), TransactionState::RolledBack);

    for err in [
        tx.commit().await.unwrap_err(),
        tx.rollback().await.unwrap_err(),
        tx.savepoint().await.unwrap_err(),
        tx.revert().await.unwrap_err(),
        tx.begin().await.unwrap_err(),
    ] {
        assert!(err.is_state_error());
        assert!(err.to_string().ends_with("after being rolled back"));
    }
    assert_eq!(db.driver().released(), 1);
}

#[tokio::test]
async fn savepoint_and_revert_keep_state() {
    let db = db();
    let tx = db.begin().await.unwrap();
    let id = tx.id().to_string();

    tx.savepoint().await.unwrap();
    tx.revert().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Pending);

    tx.commit().await.unwrap();
    assert_eq!(
        log(&db),
        vec![
            "begin".to_string(),
            format!("savepoint {id}"),
            format!("rollback to savepoint {id}"),
            "commit".to_string(),
        ]
    );
}

#[tokio::test]
async fn nested_transactions_use_savepoints_on_the_same_connection() {
    let db = db();
    let root = db.begin().await.unwrap();
    let child = root.begin().await.unwrap();
    let grandchild = child.begin().await.unwrap();
    assert!(!child.is_root());
    assert_ne!(child.id(), root.id());
    assert_ne!(grandchild.id(), child.id());

    grandchild.rollback().await.unwrap();
    child.commit().await.unwrap();
    root.commit().await.unwrap();

    assert_eq!(
        log(&db),
        vec![
            "begin".to_string(),
            format!("savepoint {}", child.id()),
            format!("savepoint {}", grandchild.id()),
            format!("rollback to savepoint {}", grandchild.id()),
            format!("release savepoint {}", child.id()),
            "commit".to_string(),
        ]
    );
    assert_eq!(db.driver().acquired(), 1);
    assert_eq!(db.driver().released(), 1);
}

#[tokio::test]
async fn nested_commit_does_not_touch_parent() {
    let db = db();
    let root = db.begin().await.unwrap();
    let child = root.begin().await.unwrap();
    child.commit().await.unwrap();

    assert_eq!(child.state(), TransactionState::Committed);
    assert_eq!(root.state(), TransactionState::Pending);
    assert_eq!(db.driver().released(), 0);
    root.rollback().await.unwrap();
}

#[tokio::test]
async fn nested_operation_after_parent_finished_is_usage_error() {
    let db = db();
    let root = db.begin().await.unwrap();
    let child = root.begin().await.unwrap();
    root.commit().await.unwrap();

    let err = child.commit().await.unwrap_err();
    assert!(err.is_usage_error());
    assert_eq!(child.state(), TransactionState::Pending);
}

#[tokio::test]
async fn nested_operation_after_parent_dropped_is_usage_error() {
    let db = db();
    let child = {
        let root = db.begin().await.unwrap();
        root.begin().await.unwrap()
    };
    let err = child.savepoint().await.unwrap_err();
    assert!(err.is_usage_error());

    // The connection stays checked out until the last handle goes away.
    assert_eq!(db.driver().outstanding(), 1);
    drop(child);
    assert_eq!(db.driver().discarded(), 1);
    assert_eq!(db.driver().outstanding(), 0);
}

#[tokio::test]
async fn dropping_a_pending_root_discards_its_connection() {
    let db = db();
    let tx = db.begin().await.unwrap();
    let clone = tx.clone();
    drop(tx);
    assert_eq!(db.driver().discarded(), 0);
    drop(clone);
    assert_eq!(db.driver().discarded(), 1);
    assert_eq!(db.driver().released(), 0);
}

#[tokio::test]
async fn begin_with_commits_on_success() {
    let db = db();
    let value = db
        .begin_with(|tx| async move {
            tx.sql("select ").bind(1).run().await?;
            Ok::<_, SqlError>(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(log(&db), vec!["begin", "select $1", "commit"]);
    assert_eq!(db.driver().outstanding(), 0);
}

#[tokio::test]
async fn begin_with_rolls_back_and_returns_work_error() {
    let db = db();
    let err = db
        .begin_with(|_tx| async move { Err::<(), _>(SqlError::usage("boom")) })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Usage error: boom");
    assert_eq!(log(&db), vec!["begin", "rollback"]);
    assert_eq!(db.driver().released(), 1);
}

#[tokio::test]
async fn begin_with_leaves_explicitly_finished_transaction_alone() {
    let db = db();
    db.begin_with(|tx| async move {
        tx.rollback().await?;
        Ok::<_, SqlError>(())
    })
    .await
    .unwrap();

    assert_eq!(log(&db), vec!["begin", "rollback"]);
}

#[tokio::test]
async fn nested_failure_propagates_and_rolls_back_root() {
    let db = db();
    let observed = Arc::new(std::sync::Mutex::new(None));
    let seen = Arc::clone(&observed);

    let err = db
        .begin_with(|root| async move {
            *seen.lock().unwrap() = Some(root.clone());
            root.begin_with(|inner| async move {
                inner.sql("delete from t").run().await?;
                Err::<(), _>(SqlError::usage("inner failed"))
            })
            .await
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Usage error: inner failed");
    let root = observed.lock().unwrap().take().unwrap();
    assert_eq!(root.state(), TransactionState::RolledBack);

    let log = log(&db);
    assert_eq!(log.len(), 5);
    assert!(log[1].starts_with("savepoint "));
    assert_eq!(log[2], "delete from t");
    assert!(log[3].starts_with("rollback to savepoint "));
    assert_eq!(log[4], "rollback");
    assert_eq!(db.driver().released(), 1);
}

#[tokio::test]
async fn failed_commit_in_begin_with_rolls_back() {
    let db = db();
    db.driver().fail_on("commit");

    let err = db
        .begin_with(|_tx| async move { Ok::<_, SqlError>(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::Connection(_)));
    assert_eq!(log(&db), vec!["begin", "commit", "rollback"]);
    assert_eq!(db.driver().released(), 1);
}

#[tokio::test]
async fn failed_rollback_still_releases_and_keeps_original_error() {
    let db = db();
    db.driver().fail_on("rollback");

    let err = db
        .begin_with(|_tx| async move { Err::<(), _>(SqlError::usage("original")) })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Usage error: original");
    assert_eq!(db.driver().released(), 1);
    assert_eq!(db.driver().outstanding(), 0);
}

#[tokio::test]
async fn failed_begin_releases_connection() {
    let db = db();
    db.driver().fail_on("begin");

    assert!(db.begin().await.is_err());
    assert_eq!(db.driver().acquired(), 1);
    assert_eq!(db.driver().released(), 1);
}

#[tokio::test]
async fn failed_acquire_propagates() {
    let db = db();
    db.driver().fail_acquire();
    let err = db.begin().await.unwrap_err();
    assert!(matches!(err, SqlError::Connection(_)));
    assert!(log(&db).is_empty());
}

#[tokio::test]
async fn statements_after_root_finished_fail() {
    let db = db();
    let tx = db.begin().await.unwrap();
    tx.commit().await.unwrap();

    let err = tx.sql("select 1").run().await.unwrap_err();
    assert!(matches!(err, SqlError::Connection(_)));
}

#[tokio::test]
async fn database_statements_check_out_per_round_trip() {
    let db = db();
    db.sql("select 1").run().await.unwrap();
    db.insert_into("users", crate::Row::new().set("name", "a"))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(
        log(&db),
        vec!["select 1", r#"insert into "users" ("name") values ($1)"#]
    );
    assert_eq!(db.driver().acquired(), 2);
    assert_eq!(db.driver().outstanding(), 0);
}

#[tokio::test]
async fn savepoint_ids_come_from_the_database_generator() {
    let db = Database::with_savepoint_ids(
        MockDriver::default(),
        DatabaseConfig::default(),
        SavepointIds::new("sp_").with_limit(2),
    );
    let root = db.begin().await.unwrap();
    let a = root.begin().await.unwrap();
    let b = root.begin().await.unwrap();

    assert_eq!(root.id(), "sp_1");
    assert_eq!(a.id(), "sp_2");
    assert_eq!(b.id(), "sp_1");
}

#[tokio::test]
async fn concurrent_roots_get_distinct_ids() {
    let db = db();
    let (a, b) = tokio::join!(db.begin(), db.begin());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id(), b.id());
    assert_eq!(db.driver().acquired(), 2);
}

#[tokio::test]
async fn nested_begin_with_releases_savepoint_on_success() {
    let db = db();
    let root = db.begin().await.unwrap();
    let inner_id = Arc::new(std::sync::Mutex::new(String::new()));
    let seen = Arc::clone(&inner_id);

    let value = root
        .begin_with(|inner| async move {
            *seen.lock().unwrap() = inner.id().to_string();
            inner.sql("update t set a = ").bind(1).run().await?;
            Ok::<_, SqlError>("done")
        })
        .await
        .unwrap();
    assert_eq!(value, "done");
    assert_eq!(root.state(), TransactionState::Pending);
    root.commit().await.unwrap();

    let id = inner_id.lock().unwrap().clone();
    assert_eq!(
        log(&db),
        vec![
            "begin".to_string(),
            format!("savepoint {id}"),
            "update t set a = $1".to_string(),
            format!("release savepoint {id}"),
            "commit".to_string(),
        ]
    );
}

#[tokio::test]
async fn nested_savepoint_and_revert_use_the_nested_id() {
    let db = db();
    let root = db.begin().await.unwrap();
    let child = root.begin().await.unwrap();

    child.savepoint().await.unwrap();
    child.sql("delete from t").run().await.unwrap();
    child.revert().await.unwrap();
    assert_eq!(child.state(), TransactionState::Pending);
    child.commit().await.unwrap();
    root.commit().await.unwrap();

    let id = child.id();
    assert_eq!(
        log(&db),
        vec![
            "begin".to_string(),
            format!("savepoint {id}"),
            format!("savepoint {id}"),
            "delete from t".to_string(),
            format!("rollback to savepoint {id}"),
            format!("release savepoint {id}"),
            "commit".to_string(),
        ]
    );
}

#[tokio::test]
async fn control_statements_are_not_prepared() {
    let db = db();
    db.begin_with(|root| async move {
        root.begin_with(|inner| async move {
            inner.sql("select 1").run().await?;
            Ok::<_, SqlError>(())
        })
        .await
    })
    .await
    .unwrap();

    let prepared: Vec<_> = db
        .driver()
        .connection()
        .submitted()
        .into_iter()
        .filter(|s| s.prepared)
        .map(|s| s.sql)
        .collect();
    assert_eq!(prepared, vec!["select 1"]);
    assert_eq!(log(&db).len(), 5);
}
