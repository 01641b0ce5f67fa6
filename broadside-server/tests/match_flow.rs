mod common;

use broadside_client::ServerMessage;
use broadside_protocol::{ErrorCode, ShotOutcome};
use common::{dinghy, join, seated_pair, sloop, start, statuses, test_config};
use std::time::Duration;

#[tokio::test]
async fn test_single_shot_sinks_and_wins() {
    let (_server, addr) = start(test_config(dinghy())).await;
    let (a, b, _) = seated_pair(addr, "A1 H", "B1H").await;

    a.client.fire("B1").await.unwrap();

    let result = b.client.wait_result().await.unwrap();
    assert_eq!(result.shooter, a.name);
    assert_eq!(result.target, b.name);
    assert_eq!(result.outcome, ShotOutcome::Sunk);
    assert_eq!(result.ship.as_deref(), Some("Dinghy"));
    assert_eq!(result.move_seq, 1);

    let finished = a.client.wait_status("finished").await.unwrap();
    assert_eq!(finished["winner"], a.name.as_str());
    assert_eq!(finished["loser"], b.name.as_str());
    assert_eq!(finished["reason"], "fleet_destroyed");
}

#[tokio::test]
async fn test_players_and_spectators_see_different_boards() {
    let (_server, addr) = start(test_config(sloop())).await;
    let a = join(addr).await;
    let b = join(addr).await;
    let spectator = join(addr).await;

    a.client.place("A1 H").await.unwrap();
    b.client.place("C3 V").await.unwrap();
    a.client.wait_status("match_started").await.unwrap();
    spectator.client.wait_status("match_started").await.unwrap();

    a.client.fire("J10").await.unwrap();
    let seen_by_a = a.client.drain(Duration::from_millis(200)).await.unwrap();
    let seen_by_spectator = spectator.client.drain(Duration::from_millis(200)).await.unwrap();

    let boards = statuses(&seen_by_a, "boards");
    let last = boards.last().unwrap();
    let opponent_rows = last["boards"][1]["view"]["rows"].as_array().unwrap();
    assert!(opponent_rows.iter().all(|row| !row.as_str().unwrap().contains('S')));
    assert!(opponent_rows[9].as_str().unwrap().ends_with('o'));

    let boards = statuses(&seen_by_spectator, "boards");
    let last = boards.last().unwrap();
    let rows = last["boards"][1]["view"]["rows"].as_array().unwrap();
    assert!(rows[2].as_str().unwrap().contains('S'));
    assert!(rows[3].as_str().unwrap().contains('S'));
}

#[tokio::test]
async fn test_invalid_moves_are_reported_to_sender_only() {
    let (_server, addr) = start(test_config(sloop())).await;
    let a = join(addr).await;
    let b = join(addr).await;

    a.client.place("J1 H").await.unwrap();
    assert_eq!(a.client.wait_error().await.unwrap().code, ErrorCode::InvalidPlacement);

    a.client.fire("A1").await.unwrap();
    assert_eq!(a.client.wait_error().await.unwrap().code, ErrorCode::WrongPhase);

    a.client.place("A1 H").await.unwrap();
    b.client.place("A1 H").await.unwrap();
    b.client.wait_status("match_started").await.unwrap();

    b.client.fire("A1").await.unwrap();
    assert_eq!(b.client.wait_error().await.unwrap().code, ErrorCode::NotYourTurn);

    a.client.fire("K11").await.unwrap();
    assert_eq!(
        a.client.wait_error().await.unwrap().code,
        ErrorCode::MalformedCoordinate
    );

    let seen_by_b = b.client.drain(Duration::from_millis(200)).await.unwrap();
    assert!(!seen_by_b.iter().any(|m| matches!(m, ServerMessage::Error(_))));
}

#[tokio::test]
async fn test_resent_shot_is_replayed_to_shooter_only() {
    let (_server, addr) = start(test_config(sloop())).await;
    let (a, b, _) = seated_pair(addr, "A1 H", "A1 H").await;

    let seq = a.client.fire("A1").await.unwrap();
    let first = a.client.wait_result().await.unwrap();
    assert_eq!(first.outcome, ShotOutcome::Hit);
    b.client.wait_result().await.unwrap();

    a.client.refire(seq, "A1").await.unwrap();
    let replayed = a.client.wait_result().await.unwrap();
    assert_eq!(replayed, first);

    let seen_by_b = b.client.drain(Duration::from_millis(200)).await.unwrap();
    assert!(!seen_by_b.iter().any(|m| matches!(m, ServerMessage::Result(_))));
}

#[tokio::test]
async fn test_next_match_starts_after_finish() {
    let (_server, addr) = start(test_config(dinghy())).await;
    let (a, b, _) = seated_pair(addr, "A1 H", "A1 H").await;
    let c = join(addr).await;

    a.client.fire("A1").await.unwrap();
    c.client.wait_status("finished").await.unwrap();

    // c waited longest, so it plays the winner.
    let promoted = c.client.wait_status("promoted").await.unwrap();
    assert_eq!(promoted["slot"], 0);
    assert_eq!(promoted["opponent"], a.name.as_str());

    b.client.drain(Duration::from_millis(200)).await.unwrap();
    b.client.status().await.unwrap();
    let queue = b.client.wait_status("queue").await.unwrap();
    assert_eq!(queue["role"], "spectator");
}

#[tokio::test]
async fn test_chat_commands() {
    let (_server, addr) = start(test_config(dinghy())).await;
    let a = join(addr).await;

    a.client.chat("/help").await.unwrap();
    let help = a.client.wait_status("help").await.unwrap();
    assert!(help["commands"].as_array().unwrap().len() >= 5);

    a.client.chat("/launch").await.unwrap();
    assert_eq!(a.client.wait_error().await.unwrap().code, ErrorCode::UnknownCommand);

    a.client.chat("/chat anyone here?").await.unwrap();
    let message = a
        .client
        .wait_for(Duration::from_secs(2), |m| matches!(m, ServerMessage::Chat(_)))
        .await
        .unwrap();
    let ServerMessage::Chat(body) = message else {
        unreachable!()
    };
    assert_eq!(body.from, a.name);
    assert_eq!(body.text, "anyone here?");

    a.client.ping("are you there").await.unwrap();
    let pong = a
        .client
        .wait_for(Duration::from_secs(2), |m| matches!(m, ServerMessage::Pong(_)))
        .await
        .unwrap();
    assert_eq!(pong, ServerMessage::Pong("are you there".into()));
}
