//! End-to-end determinism tests over the kernel.
//!
//! A fixture run drives the kernel the way the simulation driver does:
//! run bookkeeping, tick advancement, timeline serves, and admission of a
//! mix of accepted and rejected actions. Determinism is then checked three
//! ways: identical runs produce identical logs, replay reproduces the
//! projection hash, and incremental application equals batch replay for
//! every prefix.

use feedsim_core::admission::{act, ActionRequest};
use feedsim_core::event::{ActionType, EventPayload, RunConfigData, RunStartedData};
use feedsim_core::project::{self, Projector};
use feedsim_core::rank::Algorithm;
use feedsim_core::store::append_event;
use feedsim_core::{append_applied, clock, ident, timeline, Store};

fn fresh_store() -> Store {
    let store = Store::open_in_memory().expect("open in-memory store");
    store.init(false).expect("init schema");
    store
}

fn request(op_id: &str, actor: &str, action_type: ActionType) -> ActionRequest {
    ActionRequest {
        op_id: op_id.into(),
        actor_id: actor.into(),
        action_type,
        timeline_id: None,
        position: None,
        target_post_id: None,
        target_user_id: None,
        body: None,
    }
}

/// A small but busy deterministic run: 3 users, 4 ticks, posts, likes,
/// unlikes, follows, and a few deliberate rejections.
fn run_fixture(store: &Store) {
    let run_id = ident::run_id(42, 3, 3, Algorithm::Hot, 4, 0);
    append_applied(
        store,
        0,
        &EventPayload::RunStarted(RunStartedData {
            run_id: run_id.clone(),
            started_tick: 0,
        }),
    )
    .unwrap();
    append_applied(
        store,
        0,
        &EventPayload::RunConfig(RunConfigData {
            run_id,
            seed: 42,
            agents: 3,
            ranking_algorithm: Algorithm::Hot,
            k: 3,
            ticks: 4,
        }),
    )
    .unwrap();

    let users = ["u0", "u1", "u2"];
    let mut op = 0_u32;
    let mut next_op = |user: &str| {
        op += 1;
        format!("{user}-{op:04}")
    };

    for tick in 1..=4_i64 {
        clock::advance(store).unwrap();

        for user in users {
            let tl = timeline::serve(store, user, Algorithm::Hot, 3, 42 + tick).unwrap();

            // Everyone posts on their "own" tick.
            if (tick as usize - 1) % users.len() == users.iter().position(|u| *u == user).unwrap()
            {
                let mut post = request(&next_op(user), user, ActionType::Post);
                post.body = Some(format!("{user} at tick {tick}"));
                assert!(act(store, &post).unwrap().accepted());
            }

            // Like whatever is at the top of the feed (may be rejected as
            // a duplicate vote on later ticks; that is part of the log).
            if let Some(item) = tl.items.first() {
                let mut like = request(&next_op(user), user, ActionType::Like);
                like.timeline_id = Some(tl.timeline_id.clone());
                like.position = Some(item.position);
                like.target_post_id = Some(item.post_id.clone());
                act(store, &like).unwrap();
            }

            // u2 follows u0 every tick: accepted once, duplicate after.
            if user == "u2" {
                let mut follow = request(&next_op(user), user, ActionType::Follow);
                follow.target_user_id = Some("u0".into());
                act(store, &follow).unwrap();
            }
        }
    }

    // One unlike at the end so decrements are exercised.
    let tl = timeline::serve(store, "u0", Algorithm::Hot, 3, 99).unwrap();
    if let Some(item) = tl.items.first() {
        let mut unlike = request("u0-unlike", "u0", ActionType::Unlike);
        unlike.timeline_id = Some(tl.timeline_id.clone());
        unlike.position = Some(item.position);
        unlike.target_post_id = Some(item.post_id.clone());
        act(store, &unlike).unwrap();
    }
}

#[test]
fn identical_runs_produce_identical_logs_and_state() {
    let store_a = fresh_store();
    let store_b = fresh_store();
    run_fixture(&store_a);
    run_fixture(&store_b);

    let events_a = store_a.scan_from(0).unwrap();
    let events_b = store_b.scan_from(0).unwrap();
    assert_eq!(events_a.len(), events_b.len());
    assert_eq!(events_a, events_b, "logs must be bit-identical");

    assert_eq!(
        project::state_hash(store_a.conn()).unwrap(),
        project::state_hash(store_b.conn()).unwrap()
    );
}

#[test]
fn replay_reproduces_the_projection_hash() {
    // S1: capture hashes, drop projections, replay, recompute.
    let store = fresh_store();
    run_fixture(&store);

    let before = project::state_hash(store.conn()).unwrap();
    store.truncate_projections().unwrap();
    assert_ne!(
        project::state_hash(store.conn()).unwrap(),
        before,
        "truncation must visibly clear state"
    );

    let replayed = project::replay_all(&store).unwrap();
    assert_eq!(replayed as i64, store.head_seq().unwrap());
    assert_eq!(project::state_hash(store.conn()).unwrap(), before);
}

#[test]
fn every_prefix_replays_to_the_incremental_state() {
    let store = fresh_store();
    run_fixture(&store);
    let events = store.scan_from(0).unwrap();

    // Check a handful of prefixes including the full log.
    for prefix_len in [1, events.len() / 2, events.len()] {
        // Incremental: apply the prefix event by event.
        let incremental = fresh_store();
        incremental
            .transaction(|conn| {
                let projector = Projector::new(conn);
                for event in &events[..prefix_len] {
                    let appended = append_event(conn, event.tick, &event.payload)?;
                    assert_eq!(appended.seq, event.seq, "seq assignment must match");
                    projector.apply(&appended)?;
                }
                Ok(())
            })
            .unwrap();

        // Batch: same prefix, then a full replay over it.
        let batch = fresh_store();
        batch
            .transaction(|conn| {
                for event in &events[..prefix_len] {
                    append_event(conn, event.tick, &event.payload)?;
                }
                Ok(())
            })
            .unwrap();
        project::replay_all(&batch).unwrap();

        assert_eq!(
            project::state_hash(incremental.conn()).unwrap(),
            project::state_hash(batch.conn()).unwrap(),
            "prefix of {prefix_len} events diverged"
        );
    }
}

#[test]
fn up_votes_always_equals_the_vote_count() {
    let store = fresh_store();
    run_fixture(&store);

    let mismatches: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM posts p
             WHERE p.up_votes <> (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.post_id)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(mismatches, 0);
}

#[test]
fn follows_graph_is_irreflexive_with_unique_edges() {
    let store = fresh_store();
    run_fixture(&store);

    let self_edges: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = followee_id",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(self_edges, 0);

    let duplicate_edges: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM (
                 SELECT follower_id, followee_id FROM follows
                 GROUP BY follower_id, followee_id HAVING COUNT(*) > 1
             )",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(duplicate_edges, 0);
}

#[test]
fn every_accepted_exposure_tied_action_has_a_matching_timeline() {
    let store = fresh_store();
    run_fixture(&store);

    for event in store.scan_from(0).unwrap() {
        let EventPayload::Action(data) = event.payload else {
            continue;
        };
        if !data.action_type.requires_exposure()
            || data.status != feedsim_core::ActionStatus::Accepted
        {
            continue;
        }
        let timeline_id = data.timeline_id.expect("exposure-tied action");
        let position = data.position.expect("exposure-tied action");
        let target = data.target_post_id.expect("exposure-tied action");

        let owner = project::query::timeline_user(store.conn(), &timeline_id)
            .unwrap()
            .expect("timeline must exist");
        assert_eq!(owner, data.actor_id);
        let exposed = project::query::exposed_post_at(store.conn(), &timeline_id, position)
            .unwrap()
            .expect("position must be populated");
        assert_eq!(exposed, target);
    }
}

#[test]
fn tick_is_non_decreasing_in_seq_order() {
    let store = fresh_store();
    run_fixture(&store);

    let events = store.scan_from(0).unwrap();
    for pair in events.windows(2) {
        assert!(
            pair[1].tick >= pair[0].tick,
            "tick went backwards between #{} and #{}",
            pair[0].seq,
            pair[1].seq
        );
    }
}
