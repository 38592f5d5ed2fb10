//! Scripts loaded from YAML and played end to end.

mod common;

use std::sync::Arc;

use common::{in_memory, MockAgent};
use script_player::{parse_yaml_script, AgentSession, ScriptPlayer, Status, TargetKind};
use serde_json::json;

const SHOPPING_SCRIPT: &str = r#"
web:
  url: https://shop.example.com
tasks:
  - name: search
    flow:
      - aiTap: search box
        deepThink: true
      - aiInput: noise cancelling headphones
        locate: search box
      - aiKeyboardPress: Enter
      - aiQuery: "{name: string, price: number}[], the first three products"
        name: products
  - name: inspect
    continueOnError: true
    flow:
      - aiAssert: a product list is visible
      - aiDragAndDrop:
          from: first product
          to: compare tray
      - aiSwipe:
          direction: up
          distance: 300
      - sleep: "10"
"#;

#[tokio::test]
async fn test_yaml_script_plays_every_step() {
    let script = parse_yaml_script(SHOPPING_SCRIPT, Some("shopping.yaml"), false).unwrap();
    assert_eq!(script.target.as_ref().unwrap().kind, TargetKind::Web);

    let agent = Arc::new(MockAgent::new());
    let handle = Arc::clone(&agent);
    let mut player = ScriptPlayer::new(script, move |target| async move {
        assert_eq!(
            target.unwrap().env.get("url"),
            Some(&json!("https://shop.example.com"))
        );
        Ok(AgentSession::new(handle))
    })
    .with_config(in_memory())
    .with_script_path("flows/shopping.yaml");

    assert_eq!(player.run().await, Status::Done);
    assert!(player
        .output()
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("shopping-"));

    let log = agent.log.entries();
    assert_eq!(
        log[0],
        r#"Tap {"locate":{"prompt":"search box","deepThink":true,"cacheable":true}}"#
    );
    assert!(log[1].starts_with(r#"Input {"value":"noise cancelling headphones""#));
    assert!(log[2].contains(r#""keyName":"Enter""#));
    assert!(log[3].starts_with("aiQuery"));
    assert_eq!(log[4], "aiAssert a product list is visible");
    assert!(log[5].starts_with("DragAndDrop "));
    assert!(log[5].contains(r#""prompt":"compare tray""#));
    assert!(log[6].starts_with("Swipe "));
    assert!(log[6].contains(r#""distance":300.0"#) || log[6].contains(r#""distance":300"#));

    let results = player.result().to_value();
    assert_eq!(
        results["products"],
        json!({ "query": "{name: string, price: number}[], the first three products" })
    );
    assert_eq!(results["0"]["pass"], true);
}

#[tokio::test]
async fn test_yaml_script_with_invalid_sleep_fails_its_task() {
    let script = parse_yaml_script(
        "tasks:\n  - name: wait\n    flow:\n      - sleep: later\n",
        None,
        true,
    )
    .unwrap();
    let agent = Arc::new(MockAgent::new());
    let mut player = ScriptPlayer::new(script, move |_| async move { Ok(AgentSession::new(agent)) })
        .with_config(in_memory());

    assert_eq!(player.run().await, Status::Error);
    assert_eq!(
        player.task_status_list()[0].error.as_ref().unwrap().to_string(),
        "ms for sleep must be greater than 0, but got later"
    );
}
