//! End-to-end runs of the script player against a recording agent.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use common::{in_memory, item, MockAgent};
use pretty_assertions::assert_eq;
use script_player::schema::Schema;
use script_player::{
    action_call, define_action, ActionConfig, AgentSession, FreeFn, PlayerConfig, Script,
    ScriptError, ScriptPlayer, ScriptTarget, Status, Task, TargetKind,
};
use serde_json::{json, Map, Value};

fn player_for(agent: Arc<MockAgent>, script: Script) -> ScriptPlayer {
    ScriptPlayer::new(script, move |_| async move { Ok(AgentSession::new(agent)) })
        .with_config(in_memory())
}

#[tokio::test(start_paused = true)]
async fn test_sleep_only_script_finishes_with_empty_results() {
    let agent = Arc::new(MockAgent::new());
    let script = Script::new(vec![Task::new("t", vec![item(json!({ "sleep": 500 }))])]);
    let mut player = player_for(agent.clone(), script);

    let started = tokio::time::Instant::now();
    assert_eq!(player.run().await, Status::Done);
    assert!(started.elapsed() >= std::time::Duration::from_millis(500));

    assert_eq!(player.task_status_list()[0].status, Status::Done);
    assert!(player.result().is_empty());
    assert!(agent.log.entries().is_empty());
}

#[tokio::test]
async fn test_custom_string_action_result_is_named() {
    let custom = define_action(ActionConfig {
        name: "RunCustomAction".to_string(),
        interface_alias: Some("runCustomAction".to_string()),
        description: "Run a custom action".to_string(),
        param_schema: Some(Schema::string()),
        call: Some(action_call(|param, _ctx| async move {
            assert_eq!(param, json!("hello"));
            Ok(json!("ok"))
        })),
    })
    .unwrap();
    let agent = Arc::new(MockAgent::new().with_action(custom));
    let script = Script::new(vec![Task::new(
        "custom",
        vec![item(json!({ "runCustomAction": "hello", "name": "r1" }))],
    )]);
    let mut player = player_for(agent, script);

    assert_eq!(player.run().await, Status::Done);
    assert_eq!(player.result().get("r1"), Some(&json!("ok")));
}

fn two_task_script(continue_on_error: bool) -> Script {
    Script::new(vec![
        Task::new(
            "first",
            vec![
                item(json!({ "aiAct": "open the menu" })),
                item(json!({ "aiAct": "click the ghost" })),
                item(json!({ "aiAct": "never reached" })),
            ],
        )
        .continue_on_error(continue_on_error),
        Task::new("second", vec![item(json!({ "aiAct": "close the menu" }))]),
    ])
}

#[tokio::test]
async fn test_continue_on_error_moves_to_next_task() {
    let agent = Arc::new(MockAgent::new().failing_on("click the ghost"));
    let mut player = player_for(agent.clone(), two_task_script(true));

    assert_eq!(player.run().await, Status::Done);
    let tasks = player.task_status_list();
    assert_eq!(tasks[0].status, Status::Error);
    assert_eq!(tasks[0].current_step, Some(1));
    assert_eq!(
        tasks[0].error.as_ref().unwrap().to_string(),
        "could not click the ghost"
    );
    assert_eq!(tasks[1].status, Status::Done);
    assert!(agent.log.contains("close the menu"));
    assert!(!agent.log.contains("never reached"));
}

#[tokio::test]
async fn test_task_failure_aborts_the_run() {
    let agent = Arc::new(MockAgent::new().failing_on("click the ghost"));
    let mut player = player_for(agent.clone(), two_task_script(false));

    assert_eq!(player.run().await, Status::Error);
    let tasks = player.task_status_list();
    assert_eq!(tasks[0].status, Status::Error);
    assert_eq!(tasks[1].status, Status::Init);
    assert_eq!(player.current_task_index(), Some(0));
    assert!(!agent.log.contains("close the menu"));
}

#[tokio::test]
async fn test_unnamed_results_use_run_wide_indices() {
    let agent = Arc::new(MockAgent::new());
    let script = Script::new(vec![
        Task::new(
            "one",
            vec![
                item(json!({ "aiQuery": "the headlines" })),
                item(json!({ "aiNumber": "the unread count", "name": "unread" })),
                item(json!({ "aiTap": "the first headline" })),
            ],
        ),
        Task::new(
            "two",
            vec![
                item(json!({ "aiString": "the page title" })),
                item(json!({ "javascript": "1 + 1" })),
            ],
        ),
    ]);
    let mut player = player_for(agent, script);

    assert_eq!(player.run().await, Status::Done);
    let keys: Vec<_> = player.result().values().keys().cloned().collect();
    assert_eq!(keys, vec!["0", "unread", "1", "2"]);
    assert_eq!(
        player.result().to_value(),
        json!({
            "0": { "query": "the headlines" },
            "unread": 42,
            "1": "text",
            "2": 2
        })
    );
}

#[tokio::test]
async fn test_failed_assertion_is_recorded_then_fails() {
    let agent = Arc::new(MockAgent::new().with_failed_assertions());
    let script = Script::new(vec![Task::new(
        "check",
        vec![
            item(json!({ "aiAssert": "the cart is empty", "errorMessage": "cart not empty", "name": "cart" })),
            item(json!({ "aiAct": "checkout" })),
        ],
    )]);
    let mut player = player_for(agent.clone(), script);

    assert_eq!(player.run().await, Status::Error);
    assert_eq!(
        player.result().get("cart"),
        Some(&json!({ "pass": false, "thought": "checked the cart is empty", "message": "cart not empty" }))
    );
    let error = player.task_status_list()[0].error.clone().unwrap();
    assert!(matches!(*error, ScriptError::AssertionFailed(ref m) if m == "cart not empty"));
    assert!(!agent.log.contains("checkout"));
}

#[tokio::test]
async fn test_intrinsic_steps_reach_the_action_space() {
    let agent = Arc::new(MockAgent::new());
    let script = Script::new(vec![Task::new(
        "form",
        vec![
            item(json!({ "aiInput": "rust", "locate": "search box" })),
            item(json!({ "aiInput": "search box", "value": 7, "mode": "append" })),
            item(json!({ "aiKeyboardPress": "Enter" })),
            item(json!({ "aiScroll": "results", "direction": "up", "name": "scrolled" })),
            item(json!({ "aiWaitFor": "results shown", "timeout": 500 })),
            item(json!({ "logScreenshot": "after search", "content": "done" })),
        ],
    )]);
    let mut player = player_for(agent.clone(), script);

    assert_eq!(player.run().await, Status::Done);
    let log = agent.log.entries();
    assert_eq!(
        log[0],
        r#"Input {"value":"rust","locate":{"prompt":"search box","deepThink":false,"cacheable":true},"mode":"replace"}"#
    );
    assert!(log[1].contains(r#""value":"7""#), "{}", log[1]);
    assert!(log[1].contains(r#""mode":"typeOnly""#), "{}", log[1]);
    assert_eq!(log[2], r#"KeyboardPress {"locate":null,"keyName":"Enter"}"#);
    assert!(log[3].starts_with("Scroll "), "{}", log[3]);
    assert!(log[3].contains(r#""direction":"up""#));
    assert!(log[3].contains(r#""prompt":"results""#));
    assert_eq!(log[4], r#"aiWaitFor results shown {"timeout":500,"timeoutMs":500}"#);
    assert_eq!(log[5], "recordToReport after search done");

    // only the named action step is recorded; the failing report write is swallowed
    assert_eq!(player.result().to_value(), json!({ "scrolled": "Scroll done" }));
}

#[tokio::test]
async fn test_unknown_flow_item_fails_before_any_call() {
    let agent = Arc::new(MockAgent::new());
    let script = Script::new(vec![Task::new(
        "bad",
        vec![item(json!({ "aiTeleport": "home" }))],
    )]);
    let mut player = player_for(agent.clone(), script);

    assert_eq!(player.run().await, Status::Error);
    let error = player.task_status_list()[0].error.clone().unwrap();
    assert!(matches!(*error, ScriptError::UnknownFlowItem(_)));
    assert!(error.is_structural());
    assert!(agent.log.entries().is_empty());
}

#[tokio::test]
async fn test_observer_sees_every_transition() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let agent = Arc::new(MockAgent::new().failing_on("click the ghost"));
    let mut player = player_for(agent, two_task_script(true)).with_observer(move |task| {
        sink.lock().unwrap().push((task.index, task.status));
    });

    player.run().await;
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (0, Status::Running),
            (0, Status::Error),
            (1, Status::Running),
            (1, Status::Done)
        ]
    );
}

#[tokio::test]
async fn test_cleanup_errors_never_change_the_outcome() {
    let last_ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&last_ran);
    let agent = Arc::new(MockAgent::new());
    let script = Script::new(vec![Task::new("t", vec![item(json!({ "aiAct": "wave" }))])]);
    let mut player = ScriptPlayer::new(script, move |_| async move {
        Ok(AgentSession::new(agent)
            .with_free_fn(FreeFn::new("fails", || async { Err(anyhow::anyhow!("browser gone")) }))
            .with_free_fn(FreeFn::new("panics", || async { panic!("double free") }))
            .with_free_fn(FreeFn::new("closes", move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })))
    })
    .with_config(in_memory());

    assert_eq!(player.run().await, Status::Done);
    assert!(last_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_setup_failure_runs_no_tasks() {
    let events = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&events);
    let script = Script::new(vec![Task::new("t", vec![item(json!({ "aiAct": "wave" }))])]);
    let mut player = ScriptPlayer::new(script, |_| async {
        Err::<AgentSession, _>(anyhow::anyhow!("no device connected"))
    })
    .with_config(in_memory())
    .with_observer(move |_| *sink.lock().unwrap() += 1);

    assert_eq!(player.run().await, Status::Error);
    assert_eq!(
        player.error_in_setup().unwrap().to_string(),
        "no device connected"
    );
    assert_eq!(player.task_status_list()[0].status, Status::Init);
    assert_eq!(*events.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_action_alias_is_a_setup_error() {
    let clash = define_action(ActionConfig {
        name: "Click".to_string(),
        interface_alias: Some("aiTap".to_string()),
        description: "Click an element".to_string(),
        call: Some(action_call(|_, _| async { Ok(Value::Null) })),
        ..Default::default()
    })
    .unwrap();
    let agent = Arc::new(MockAgent::new().with_action(clash));
    let mut player = player_for(agent, Script::new(vec![]));

    assert_eq!(player.run().await, Status::Error);
    assert!(matches!(
        player.error_in_setup(),
        Some(ScriptError::DuplicateAction { key, .. }) if key == "aiTap"
    ));
}

#[tokio::test]
async fn test_results_are_written_after_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Map::new();
    env.insert("output".to_string(), json!("out/results.json"));
    let script = Script::new(vec![Task::new(
        "t",
        vec![
            item(json!({ "aiBoolean": "is it dark mode", "name": "dark" })),
            item(json!({ "aiAct": "crash now" })),
        ],
    )])
    .with_target(ScriptTarget {
        kind: TargetKind::Web,
        env,
    });
    let agent = Arc::new(MockAgent::new().failing_on("crash now"));
    let mut player = ScriptPlayer::new(script, move |target| async move {
        assert_eq!(target.unwrap().output(), Some("out/results.json"));
        Ok(AgentSession::new(agent))
    })
    .with_config(PlayerConfig {
        run_dir: dir.path().join("run"),
        persist_results: true,
        cwd: dir.path().to_path_buf(),
    });

    assert_eq!(player.output(), dir.path().join("out/results.json"));
    assert_eq!(player.run().await, Status::Error);

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(player.output()).unwrap()).unwrap();
    assert_eq!(written, json!({ "dark": true }));
}

#[tokio::test]
async fn test_report_file_and_destroy() {
    let agent = Arc::new(MockAgent::new());
    let script = Script::new(vec![Task::new("t", vec![item(json!({ "aiAct": "wave" }))])]);
    let mut player = player_for(agent.clone(), script);

    assert_eq!(player.report_file(), None);
    player.run().await;
    assert_eq!(player.report_file(), Some("script_player_run/report/run.html"));

    player.destroy_agent().await.unwrap();
    assert!(agent.was_destroyed());
}
