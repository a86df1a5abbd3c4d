mod common;

use std::{sync::atomic::Ordering, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use common::harness;
use lfgbridge::lobby::{Lobbies, LobbyState, NewLobby, Outcome, SEAT_LIMIT};

const GRACE: Duration = Duration::from_secs(60);

fn new_lobby(category: &str) -> NewLobby {
    NewLobby {
        creator_id: "100".into(),
        creator_name: "Ana".into(),
        category: category.into(),
        note: "chill games".into(),
        expires_at: OffsetDateTime::now_utc() + time::Duration::minutes(30),
        origin_community: Some("g1".into()),
        origin_channel: Some("c1".into()),
    }
}

async fn state(lobbies: &Lobbies, post_id: Uuid) -> LobbyState {
    lobbies.post(post_id).await.unwrap().unwrap().state
}

#[tokio::test]
async fn creator_takes_the_first_seat_and_the_card_reaches_every_community() {
    let h = harness(3, None, GRACE).await;

    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    let post = h.lobbies.post(post_id).await.unwrap().unwrap();
    assert_eq!(post.seats, 1);
    assert_eq!(post.seat_limit, SEAT_LIMIT);
    assert_eq!(post.state, LobbyState::Open);
    assert_eq!(h.lobbies.roster(post_id).await.unwrap()[0].user_id, "100");

    let copies = h.lobbies.copies(post_id).await.unwrap();
    assert_eq!(copies.len(), 3);
    for (i, copy) in copies.iter().enumerate() {
        let hook = h.platform.hook(&format!("w{}", i + 1));
        assert_eq!(hook.sent_count(), 1);
        assert_eq!(copy.community_id, format!("g{}", i + 1));
        let sent = hook.sent.lock()[0].clone();
        assert_eq!(sent.username.as_deref(), Some("LFG Bridge"));
        assert_eq!(sent.payload.embeds[0]["fields"][0]["name"], "Players 1/4");
    }
}

#[tokio::test]
async fn sequential_joins_count_up_and_the_last_seat_fills_once() {
    let h = harness(2, Some("https://rooms.test/abc"), GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    assert_eq!(h.lobbies.join(post_id, "200", "Bo").await.unwrap(), Outcome::Joined { seats: 2, limit: 4 });
    let hook = h.platform.hook("w1");
    assert_eq!(hook.edit_count(), 1);
    assert_eq!(hook.edits.lock()[0].1.payload.embeds[0]["fields"][0]["name"], "Players 2/4");

    assert_eq!(h.lobbies.join(post_id, "300", "Cy").await.unwrap(), Outcome::Joined { seats: 3, limit: 4 });
    assert_eq!(h.lobbies.join(post_id, "400", "Di").await.unwrap(), Outcome::Filled { seats: 4, limit: 4 });

    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Full);
    assert!(h.lobbies.teardown_pending(post_id));

    let requests = h.rooms.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].game_id, "game-7");
    assert_eq!(requests[0].community_id, "g1");
    assert_eq!(requests[0].players.len(), 4);

    assert_eq!(h.platform.dms.lock().len(), 4);
    for user in ["100", "200", "300", "400"] {
        let dms = h.platform.dms_to(user);
        assert_eq!(dms.len(), 1);
        assert!(dms[0].content.contains("https://rooms.test/abc"));
    }

    // filled card no longer offers join
    let last_edit = hook.edits.lock().last().unwrap().1.clone();
    let buttons = last_edit.payload.components[0]["components"].as_array().unwrap().clone();
    assert_eq!(buttons.len(), 1);
    assert_eq!(buttons[0]["label"], "Cancel");

    assert_eq!(h.lobbies.join(post_id, "500", "Ed").await.unwrap(), Outcome::LobbyFull);
    assert_eq!(h.rooms.requests.lock().len(), 1);
}

#[tokio::test]
async fn failed_room_request_falls_back_to_manual_instructions() {
    let h = harness(1, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("ranked")).await.unwrap();
    h.platform.failing_dms.lock().insert("300".into());

    for (user, name) in [("200", "Bo"), ("300", "Cy"), ("400", "Di")] {
        h.lobbies.join(post_id, user, name).await.unwrap();
    }

    assert_eq!(h.rooms.requests.lock().len(), 1);
    let dms = h.platform.dms.lock().clone();
    assert_eq!(dms.len(), 3);
    assert!(dms.iter().all(|(_, p)| p.content.contains("Ana hosts")));
}

#[tokio::test]
async fn unmapped_category_skips_the_room_provider() {
    let h = harness(1, Some("https://rooms.test/x"), GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Casual")).await.unwrap();

    for (user, name) in [("200", "Bo"), ("300", "Cy"), ("400", "Di")] {
        h.lobbies.join(post_id, user, name).await.unwrap();
    }

    assert!(h.rooms.requests.lock().is_empty());
    assert_eq!(h.platform.dms.lock().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_joins_never_exceed_the_seat_limit() {
    let h = harness(2, Some("https://rooms.test/race"), GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    let extra = 5;
    let contenders = (SEAT_LIMIT as usize - 1) + extra;
    let joins: Vec<_> = (0..contenders)
        .map(|i| {
            let lobbies = h.lobbies.clone();
            tokio::spawn(async move { lobbies.join(post_id, &format!("u{i}"), &format!("User {i}")).await.unwrap() })
        })
        .collect();

    let mut outcomes = vec![];
    for join in joins {
        outcomes.push(join.await.unwrap());
    }

    let admitted = outcomes.iter().filter(|o| matches!(o, Outcome::Joined { .. } | Outcome::Filled { .. })).count();
    let rejected = outcomes.iter().filter(|o| **o == Outcome::LobbyFull).count();
    let filled = outcomes.iter().filter(|o| matches!(o, Outcome::Filled { .. })).count();

    assert_eq!(admitted, SEAT_LIMIT as usize - 1);
    assert_eq!(rejected, extra);
    assert_eq!(filled, 1);

    let post = h.lobbies.post(post_id).await.unwrap().unwrap();
    assert_eq!(post.seats, SEAT_LIMIT);
    assert_eq!(h.lobbies.roster(post_id).await.unwrap().len(), SEAT_LIMIT as usize);
    assert_eq!(h.rooms.requests.lock().len(), 1);
    assert_eq!(h.platform.dms.lock().len(), SEAT_LIMIT as usize);
}

#[tokio::test]
async fn joining_twice_does_not_take_a_second_seat() {
    let h = harness(1, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    assert_eq!(h.lobbies.join(post_id, "200", "Bo").await.unwrap(), Outcome::Joined { seats: 2, limit: 4 });
    assert_eq!(h.lobbies.join(post_id, "200", "Bo").await.unwrap(), Outcome::AlreadyJoined);
    assert_eq!(h.lobbies.join(post_id, "100", "Ana").await.unwrap(), Outcome::AlreadyJoined);
    assert_eq!(h.lobbies.post(post_id).await.unwrap().unwrap().seats, 2);
}

#[tokio::test]
async fn leaving_twice_reports_not_in_game() {
    let h = harness(1, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();
    h.lobbies.join(post_id, "200", "Bo").await.unwrap();
    h.lobbies.join(post_id, "300", "Cy").await.unwrap();

    assert_eq!(h.lobbies.leave(post_id, "200").await.unwrap(), Outcome::Left { seats: 2, limit: 4 });
    assert_eq!(h.lobbies.leave(post_id, "200").await.unwrap(), Outcome::NotInGame);
    assert_eq!(h.lobbies.leave(post_id, "999").await.unwrap(), Outcome::NotInGame);

    let post = h.lobbies.post(post_id).await.unwrap().unwrap();
    assert_eq!(post.seats, 2);
    assert_eq!(h.lobbies.roster(post_id).await.unwrap().len(), 2);

    // the freed seat can be taken again
    assert_eq!(h.lobbies.join(post_id, "200", "Bo").await.unwrap(), Outcome::Joined { seats: 3, limit: 4 });
}

#[tokio::test]
async fn creator_cannot_leave_but_can_cancel() {
    let h = harness(2, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();
    h.lobbies.join(post_id, "200", "Bo").await.unwrap();

    assert_eq!(h.lobbies.leave(post_id, "100").await.unwrap(), Outcome::CreatorCannotLeave);
    assert_eq!(h.lobbies.cancel(post_id, "200").await.unwrap(), Outcome::NotCreator);
    assert_eq!(h.lobbies.cancel(post_id, "100").await.unwrap(), Outcome::Cancelled);

    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Cancelled);
    assert_eq!(h.platform.hook("w1").delete_count(), 1);
    assert_eq!(h.platform.hook("w2").delete_count(), 1);

    assert_eq!(h.lobbies.cancel(post_id, "100").await.unwrap(), Outcome::Closed);
    assert_eq!(h.lobbies.join(post_id, "300", "Cy").await.unwrap(), Outcome::Closed);
    assert_eq!(h.lobbies.leave(post_id, "200").await.unwrap(), Outcome::Closed);
    assert_eq!(h.platform.hook("w1").delete_count(), 1);
    assert!(h.lobbies.list_open().await.unwrap().is_empty());
}

#[tokio::test]
async fn admins_may_cancel_any_post() {
    let h = harness(1, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    assert_eq!(h.lobbies.cancel(post_id, "admin").await.unwrap(), Outcome::Cancelled);
    assert_eq!(h.lobbies.cancel(Uuid::now_v7(), "admin").await.unwrap(), Outcome::NotFound);
}

#[tokio::test]
async fn teardown_leaves_the_post_terminal_even_when_every_delete_fails() {
    let h = harness(3, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    h.platform.hook("w1").fail_deletes.store(true, Ordering::SeqCst);
    h.platform.hook("w2").fail_deletes.store(true, Ordering::SeqCst);
    h.platform.hook("w3").gone.store(true, Ordering::SeqCst);

    assert_eq!(h.lobbies.cancel(post_id, "100").await.unwrap(), Outcome::Cancelled);
    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Cancelled);
    for hook in ["w1", "w2", "w3"] {
        assert_eq!(h.platform.hook(hook).delete_count(), 1, "{hook}");
    }
}

#[tokio::test]
async fn roster_updates_tolerate_a_broken_copy() {
    let h = harness(3, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();
    h.platform.hook("w2").fail_edits.store(true, Ordering::SeqCst);

    assert_eq!(h.lobbies.join(post_id, "200", "Bo").await.unwrap(), Outcome::Joined { seats: 2, limit: 4 });
    assert_eq!(h.platform.hook("w1").edit_count(), 1);
    assert_eq!(h.platform.hook("w2").edit_count(), 0);
    assert_eq!(h.platform.hook("w3").edit_count(), 1);
}

#[tokio::test]
async fn expiry_sweep_closes_a_stale_post_exactly_once() {
    let h = harness(2, None, GRACE).await;
    let mut stale = new_lobby("Ranked");
    stale.expires_at = OffsetDateTime::now_utc() - time::Duration::minutes(1);
    let stale_id = h.lobbies.create(stale).await.unwrap();
    let fresh_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();

    let now = OffsetDateTime::now_utc();
    assert_eq!(h.lobbies.sweep_expired(now).await.unwrap(), 1);
    assert_eq!(state(&h.lobbies, stale_id).await, LobbyState::Expired);
    assert_eq!(state(&h.lobbies, fresh_id).await, LobbyState::Open);

    let stale_copies = h.lobbies.copies(stale_id).await.unwrap();
    let deleted = h.platform.hook("w1").deletes.lock().clone();
    assert_eq!(deleted, [stale_copies[0].message_id.clone()]);

    assert_eq!(h.lobbies.sweep_expired(now).await.unwrap(), 0);
    assert_eq!(h.platform.hook("w1").delete_count(), 1);
    assert_eq!(h.platform.hook("w2").delete_count(), 1);
}

#[tokio::test]
async fn filled_post_is_torn_down_after_the_grace_delay() {
    let h = harness(2, None, Duration::from_millis(50)).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();
    for (user, name) in [("200", "Bo"), ("300", "Cy"), ("400", "Di")] {
        h.lobbies.join(post_id, user, name).await.unwrap();
    }
    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Full);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Cancelled);
    assert!(!h.lobbies.teardown_pending(post_id));
    assert_eq!(h.platform.hook("w1").delete_count(), 1);
    assert_eq!(h.platform.hook("w2").delete_count(), 1);
}

#[tokio::test]
async fn manual_cancel_disarms_the_delayed_teardown() {
    let h = harness(1, None, Duration::from_millis(150)).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();
    for (user, name) in [("200", "Bo"), ("300", "Cy"), ("400", "Di")] {
        h.lobbies.join(post_id, user, name).await.unwrap();
    }
    assert!(h.lobbies.teardown_pending(post_id));

    assert_eq!(h.lobbies.cancel(post_id, "100").await.unwrap(), Outcome::Cancelled);
    assert!(!h.lobbies.teardown_pending(post_id));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Cancelled);
    assert_eq!(h.platform.hook("w1").delete_count(), 1);
}

#[tokio::test]
async fn unknown_posts_are_reported_as_such() {
    let h = harness(1, None, GRACE).await;
    let missing = Uuid::now_v7();

    assert_eq!(h.lobbies.join(missing, "200", "Bo").await.unwrap(), Outcome::NotFound);
    assert_eq!(h.lobbies.leave(missing, "200").await.unwrap(), Outcome::NotFound);
    assert_eq!(h.lobbies.cancel(missing, "100").await.unwrap(), Outcome::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_slow_card_edit_cannot_overwrite_a_newer_roster() {
    let h = harness(1, None, GRACE).await;
    let post_id = h.lobbies.create(new_lobby("Ranked")).await.unwrap();
    let hook = h.platform.hook("w1");
    hook.edit_delays.lock().push_back(Duration::from_millis(200));

    let first = {
        let lobbies = h.lobbies.clone();
        tokio::spawn(async move { lobbies.join(post_id, "200", "Bo").await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.lobbies.join(post_id, "300", "Cy").await.unwrap();

    assert_eq!(first.await.unwrap(), Outcome::Joined { seats: 2, limit: 4 });
    assert_eq!(second, Outcome::Joined { seats: 3, limit: 4 });

    let last = hook.edits.lock().last().unwrap().1.clone();
    assert_eq!(last.payload.embeds[0]["fields"][0]["name"], "Players 3/4");
}

#[tokio::test]
async fn failed_fill_side_effects_still_report_the_seat() {
    let h = harness(1, Some("https://rooms.test/x"), GRACE).await;
    let mut lobby = new_lobby("Ranked");
    lobby.origin_community = None;
    lobby.origin_channel = None;
    let post_id = h.lobbies.create(lobby).await.unwrap();
    h.lobbies.join(post_id, "200", "Bo").await.unwrap();
    h.lobbies.join(post_id, "300", "Cy").await.unwrap();

    // without an origin the room request reads the ledger; make that fail
    sqlx::query("DROP TABLE relayed_copies").execute(&h.db_pool).await.unwrap();

    assert_eq!(h.lobbies.join(post_id, "400", "Di").await.unwrap(), Outcome::Filled { seats: 4, limit: 4 });
    assert_eq!(state(&h.lobbies, post_id).await, LobbyState::Full);
    assert!(h.lobbies.teardown_pending(post_id));
    assert!(h.rooms.requests.lock().is_empty());
    assert!(h.platform.dms.lock().is_empty());
}
