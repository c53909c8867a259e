mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::fs;

use common::{raw_room, service, Answer, FakeClient, ScriptedAsk};
use matrix_rooms::actions::{run_action, run_menu, Action, ActionContext, Flow};
use matrix_rooms::report::{retry_failed, OperationReport};
use matrix_rooms::room::RoomRef;
use matrix_rooms::service::LeaveOptions;

fn ten_rooms() -> Vec<RoomRef> {
    (1..=10)
        .map(|i| RoomRef::new(&format!("!room{}:m", i), &format!("room {}", i)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn leave_with_one_rejection_then_retry() {
    let svc = service(FakeClient::new(Vec::new()).fail("leave", "!room1:m", 1));

    let report = svc.leave_rooms(ten_rooms(), LeaveOptions::default()).await;
    assert_eq!(report.leaved_rooms.len(), 9);
    assert_eq!(report.err_leaved_rooms.len(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.err_leaved_rooms[0].room_id, "!room1:m");

    let mut rounds = 0;
    let report = retry_failed(
        report,
        |failed| svc.leave_rooms(failed, LeaveOptions::default()),
        |_| {
            rounds += 1;
            Ok(true)
        },
    )
    .await
    .unwrap();

    assert_eq!(rounds, 1);
    assert!(report.err_leaved_rooms.is_empty());
    assert!(report.errors.is_empty());
    assert_eq!(report.leaved_rooms.len(), 10);
    assert_eq!(svc.client().count("leave !room1:m"), 2);
    assert_eq!(svc.client().count("leave !room2:m"), 1);
}

#[tokio::test(start_paused = true)]
async fn alias_failure_marks_room_as_not_left() {
    let svc = service(FakeClient::new(Vec::new()).fail("delete_alias", "#ops:m", 1));
    let rooms = vec![
        RoomRef::new("!ops:m", "ops").with_alias("#ops:m"),
        RoomRef::new("!dev:m", "dev").with_alias("#dev:m"),
        RoomRef::new("!misc:m", "misc"),
    ];

    let report = svc
        .leave_rooms(rooms, LeaveOptions { delete_alias: true })
        .await;

    assert_eq!(svc.client().count("leave !ops:m"), 1);
    assert_eq!(report.err_leaved_rooms.len(), 1);
    assert_eq!(report.err_leaved_rooms[0].room_id, "!ops:m");
    assert_eq!(report.leaved_rooms.len(), 2);
    assert_eq!(svc.client().count("delete_alias #dev:m"), 1);
}

#[tokio::test(start_paused = true)]
async fn aliases_untouched_without_option() {
    let svc = service(FakeClient::new(Vec::new()));
    let rooms = vec![RoomRef::new("!ops:m", "ops").with_alias("#ops:m")];

    let report = svc.leave_rooms(rooms, LeaveOptions::default()).await;

    assert_eq!(report.leaved_rooms.len(), 1);
    assert_eq!(svc.client().calls(), vec!["leave !ops:m"]);
}

#[tokio::test(start_paused = true)]
async fn leave_outdated_action_retries_and_saves() {
    let old = (Utc::now() - ChronoDuration::days(400)).timestamp_millis();
    let recent = (Utc::now() - ChronoDuration::days(3)).timestamp_millis();
    let rooms = vec![
        raw_room("!old:m", "old-project", &["alice", "bob", "carol"], &[("bob", old, "bye")]),
        raw_room("!fresh:m", "fresh", &["alice", "bob"], &[("bob", recent, "hi")]),
        // direct chats are never proposed
        raw_room("!dm:m", "Борис", &["alice", "boris"], &[("boris", old, "привет")]),
    ];
    let svc = service(FakeClient::new(rooms).fail("leave", "!old:m", 1));
    let ask = ScriptedAsk::new(vec![
        Answer::Number(6),
        Answer::Confirm(false), // show rooms
        Answer::Confirm(true),  // leave
        Answer::Confirm(true),  // retry
        Answer::Confirm(true),  // save
    ]);
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: tmp.path().join("exports"),
    };

    let flow = run_action(Action::LeaveOutdated, &ctx).await.unwrap();

    assert_eq!(flow, Flow::Continue);
    ask.assert_done();
    assert!(ask.questions().iter().any(|q| q == "Show 1 outdated rooms?"));
    assert_eq!(svc.client().count("leave !old:m"), 2);
    assert_eq!(svc.client().count("leave !dm:m"), 0);

    let saved: Vec<_> = fs::read_dir(tmp.path().join("exports"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("leaved_"));
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&saved[0]).unwrap()).unwrap();
    assert_eq!(json["leavedRooms"][0]["roomId"], "!old:m");
    assert_eq!(json["errLeavedRooms"], serde_json::json!([]));
}

#[tokio::test(start_paused = true)]
async fn declined_retry_offers_errors() {
    let rooms = vec![raw_room("!lonely:m", "lonely", &["alice"], &[])];
    let svc = service(FakeClient::new(rooms).fail("leave", "!lonely:m", 1));
    let ask = ScriptedAsk::new(vec![
        Answer::Default,        // ignored users
        Answer::Confirm(true),  // show rooms
        Answer::Confirm(true),  // leave
        Answer::Confirm(false), // retry
        Answer::Confirm(true),  // show errors
        Answer::Confirm(false), // save
    ]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: tempfile::tempdir().unwrap().path().to_path_buf(),
    };

    run_action(Action::LeaveEmpty, &ctx).await.unwrap();

    ask.assert_done();
    assert_eq!(svc.client().count("leave !lonely:m"), 1);
    assert!(ask.questions().contains(&"Show errors?".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn leave_empty_asks_which_senders_to_ignore() {
    let rooms = vec![
        raw_room("!bots:m", "bots", &["alice"], &[("deploy_bot", 1_000, "built")]),
        raw_room("!jira:m", "jira", &["alice"], &[("jira_bot", 1_000, "ticket")]),
    ];
    let svc = service(FakeClient::new(rooms));
    let ask = ScriptedAsk::new(vec![
        Answer::Text("Deploy_Bot, jira_bot"),
        Answer::Confirm(false), // show rooms
        Answer::Confirm(true),  // leave
        Answer::Confirm(false), // save
    ]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_action(Action::LeaveEmpty, &ctx).await.unwrap();

    ask.assert_done();
    assert!(ask.questions().contains(&"Show 2 rooms?".to_owned()));
    assert_eq!(svc.client().count("leave !bots:m"), 1);
    assert_eq!(svc.client().count("leave !jira:m"), 1);
}

#[tokio::test(start_paused = true)]
async fn ignore_prompt_defaults_to_configured_list() {
    let rooms = vec![
        raw_room("!bots:m", "bots", &["alice"], &[("deploy_bot", 1_000, "built")]),
        raw_room("!jira:m", "jira", &["alice"], &[("jira_bot", 1_000, "ticket")]),
    ];
    let svc = service(FakeClient::new(rooms));
    let ask = ScriptedAsk::new(vec![
        Answer::Default,
        Answer::Confirm(false), // show rooms
        Answer::Confirm(false), // leave
    ]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_action(Action::LeaveEmpty, &ctx).await.unwrap();

    ask.assert_done();
    // only jira_bot is configured, so the deploy bot's room has activity
    assert!(ask.questions().contains(&"Show 1 rooms?".to_owned()));
    assert!(svc.client().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn menu_runs_until_stop() {
    let rooms = vec![raw_room("!a:m", "a", &["alice"], &[])];
    let svc = service(FakeClient::new(rooms));
    let stats = Action::ALL.iter().position(|a| *a == Action::ShowStats).unwrap();
    let stop = Action::ALL.iter().position(|a| *a == Action::Stop).unwrap();
    let ask = ScriptedAsk::new(vec![Answer::Select(stats), Answer::Default, Answer::Select(stop)]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_menu(&ctx).await.unwrap();

    ask.assert_done();
    assert_eq!(svc.client().calls(), vec!["stop"]);
}

#[tokio::test(start_paused = true)]
async fn invite_action_targets_chosen_bucket() {
    let rooms = vec![
        raw_room("!a:m", "team-a", &["alice", "bob"], &[("bob", 1_000, "hi")]),
        raw_room("!b:m", "team-b", &["alice"], &[]),
    ];
    let svc = service(FakeClient::new(rooms));
    let all_rooms = 0;
    let ask = ScriptedAsk::new(vec![
        Answer::Text("bob"),
        Answer::Default,
        Answer::Select(all_rooms),
        Answer::All,
        Answer::Confirm(true),  // invite
        Answer::Confirm(false), // save
    ]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_action(Action::Invite, &ctx).await.unwrap();

    ask.assert_done();
    let calls = svc.client().calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.contains(&"invite !a:m @bob:matrix.example.org".to_owned()));
    assert!(calls.contains(&"invite !b:m @bob:matrix.example.org".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn invite_unknown_user_stops_early() {
    let rooms = vec![raw_room("!a:m", "team-a", &["alice"], &[])];
    let svc = service(FakeClient::new(rooms));
    let ask = ScriptedAsk::new(vec![Answer::Text("mallory")]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_action(Action::Invite, &ctx).await.unwrap();

    ask.assert_done();
    assert!(svc.client().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn join_invited_action() {
    let svc = service(
        FakeClient::new(Vec::new())
            .with_invites(vec![RoomRef::new("!inv:m", "invited"), RoomRef::new("!inv2:m", "other")]),
    );
    let ask = ScriptedAsk::new(vec![
        Answer::All,
        Answer::Confirm(true),  // join
        Answer::Confirm(false), // save
    ]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_action(Action::JoinInvited, &ctx).await.unwrap();

    ask.assert_done();
    assert_eq!(svc.client().count("join !inv:m"), 1);
    assert_eq!(svc.client().count("join !inv2:m"), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_alias_action_resolves_first() {
    let svc = service(FakeClient::new(Vec::new()).with_alias("#ops:matrix.example.org", "!ops:m"));
    let ask = ScriptedAsk::new(vec![Answer::Text("ops"), Answer::Confirm(true)]);
    let ctx = ActionContext {
        service: &svc,
        ask: &ask,
        export_dir: std::env::temp_dir(),
    };

    run_action(Action::DeleteAlias, &ctx).await.unwrap();

    ask.assert_done();
    assert_eq!(svc.client().calls(), vec!["delete_alias #ops:matrix.example.org"]);
}

#[test]
fn report_trait_exposes_verb_lists() {
    let report = matrix_rooms::report::LeaveReport {
        leaved_rooms: vec![RoomRef::new("!a:m", "a")],
        ..Default::default()
    };
    assert_eq!(report.done().len(), 1);
    assert!(report.failed().is_empty());
}
