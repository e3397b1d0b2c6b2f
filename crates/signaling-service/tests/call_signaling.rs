//! End-to-end call signaling through the service entry point.
//!
//! Covers:
//! - The requested -> offer -> accepted -> late staff join walkthrough
//! - Re-sync contents by role
//! - Authorization drops
//! - SDP last-write-wins and sender-inclusive broadcast
//! - ICE relay to others only
//! - Members whose mailbox overflows are closed, then re-sync
//! - Disconnect leaves call state alone

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use signaling_service::actors::{CallOutcome, DropReason};
use signaling_service::protocol::ServerEvent;
use signaling_service::rooms::Room;
use signaling_service::store::{CallState, SdpKind};
use signaling_test_utils::*;

fn update(state: CallState, staff_id: Option<&str>) -> ServerEvent {
    ServerEvent::CallUpdate {
        state,
        staff_id: staff_id.map(str::to_string),
        reason: None,
    }
}

fn sdp_event(call_id: &str, kind: SdpKind, payload: serde_json::Value) -> ServerEvent {
    ServerEvent::CallSdp {
        call_id: call_id.to_string(),
        sdp_type: kind,
        sdp: payload,
    }
}

// ============================================================================
// Walkthrough
// ============================================================================

#[tokio::test]
async fn test_offer_accept_then_late_staff_socket() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;

    h.send(&client, join_call("c1")).await.unwrap();
    assert_eq!(drain(&mut client_out), vec![update(CallState::Requested, None)]);

    // Staff joins: snapshot only, nothing stored yet
    h.send(&staff, join_call("c1")).await.unwrap();
    assert_eq!(drain(&mut staff_out), vec![update(CallState::Requested, None)]);

    // Client offer reaches both members, sender included
    h.send(&client, send_sdp("c1", "offer", json!("O1")))
        .await
        .unwrap();
    let offer = sdp_event("c1", SdpKind::Offer, json!("O1"));
    assert_eq!(drain(&mut client_out), vec![offer.clone()]);
    assert_eq!(drain(&mut staff_out), vec![offer.clone()]);
    assert_eq!(h.store.peek("c1").await.unwrap().sdp_offer, Some(json!("O1")));

    // Staff accepts
    assert_eq!(
        h.send(&staff, accept("c1")).await.unwrap(),
        CallOutcome::Applied
    );
    let accepted = update(CallState::Accepted, Some("S1"));
    assert_eq!(drain(&mut client_out), vec![accepted.clone()]);
    assert_eq!(drain(&mut staff_out), vec![accepted.clone()]);
    assert_eq!(
        h.store.peek("c1").await.unwrap().state,
        CallState::Accepted
    );

    // Second tab of the same staff identity joins late
    let (tab, mut tab_out) = h.connect(staff_identity("S1")).await;
    h.send(&tab, join_call("c1")).await.unwrap();
    assert_eq!(drain(&mut tab_out), vec![accepted, offer]);
}

// ============================================================================
// Re-sync
// ============================================================================

#[tokio::test]
async fn test_late_client_gets_answer_but_not_offer() {
    let record = CallRecordBuilder::new("c2")
        .state(CallState::Accepted)
        .staff("S1")
        .offer(sdp("offer", "v=0 offer"))
        .answer(sdp("answer", "v=0 answer"))
        .build();
    let h = TestService::with_calls([record]).await;

    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    h.send(&client, join_call("c2")).await.unwrap();
    assert_eq!(
        drain(&mut client_out),
        vec![
            update(CallState::Accepted, Some("S1")),
            sdp_event("c2", SdpKind::Answer, sdp("answer", "v=0 answer")),
        ]
    );

    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&staff, join_call("c2")).await.unwrap();
    assert_eq!(
        drain(&mut staff_out),
        vec![
            update(CallState::Accepted, Some("S1")),
            sdp_event("c2", SdpKind::Answer, sdp("answer", "v=0 answer")),
            sdp_event("c2", SdpKind::Offer, sdp("offer", "v=0 offer")),
        ]
    );
}

#[tokio::test]
async fn test_no_late_joiner_sees_requested_after_decision() {
    let h = TestService::with_calls([CallRecordBuilder::new("c3").build()]).await;
    let (staff, _staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&staff, decline("c3", Some("in a meeting")))
        .await
        .unwrap();

    for i in 0..3 {
        let (late, mut late_out) = h.connect(client_identity(&format!("C{i}"))).await;
        h.send(&late, join_call("c3")).await.unwrap();
        let first = next_event(&mut late_out).await.unwrap();
        assert!(matches!(
            first,
            ServerEvent::CallUpdate {
                state: CallState::Declined,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn test_join_unknown_call_joins_room_without_resync() {
    let h = TestService::new().await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;

    assert_eq!(
        h.send(&client, join_call("ghost")).await.unwrap(),
        CallOutcome::Dropped(DropReason::NotFound)
    );
    assert!(drain(&mut client_out).is_empty());
    assert!(h
        .service
        .rooms()
        .is_member(&Room::call("ghost"), client.id())
        .await);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_client_cannot_accept_or_decline() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    h.send(&staff, join_call("c1")).await.unwrap();
    drain(&mut client_out);
    drain(&mut staff_out);

    for frame in [accept("c1"), decline("c1", None)] {
        assert_eq!(
            h.send(&client, frame).await.unwrap(),
            CallOutcome::Dropped(DropReason::Unauthorized)
        );
    }

    let record = h.store.peek("c1").await.unwrap();
    assert_eq!(record.state, CallState::Requested);
    assert_eq!(record.staff_id, None);
    expect_silence(&mut client_out).await.unwrap();
    expect_silence(&mut staff_out).await.unwrap();
}

#[tokio::test]
async fn test_end_requires_membership_and_is_terminal() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (outsider, _out) = h.connect(client_identity("C9")).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    drain(&mut client_out);

    assert_eq!(
        h.send(&outsider, end_call("c1")).await.unwrap(),
        CallOutcome::Dropped(DropReason::Unauthorized)
    );

    h.send(&client, end_call("c1")).await.unwrap();
    assert_eq!(drain(&mut client_out), vec![update(CallState::Ended, None)]);

    let (staff, _staff_out) = h.connect(staff_identity("S1")).await;
    assert_eq!(
        h.send(&staff, accept("c1")).await.unwrap(),
        CallOutcome::Dropped(DropReason::InvalidTransition)
    );
    assert_eq!(h.store.peek("c1").await.unwrap().state, CallState::Ended);
}

// ============================================================================
// Accept / decline
// ============================================================================

#[tokio::test]
async fn test_repeat_accept_is_silent() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&staff, join_call("c1")).await.unwrap();
    h.send(&staff, accept("c1")).await.unwrap();
    drain(&mut staff_out);
    let writes = h.store.update_calls();

    assert_eq!(
        h.send(&staff, accept("c1")).await.unwrap(),
        CallOutcome::Unchanged
    );
    assert_eq!(h.store.update_calls(), writes);
    expect_silence(&mut staff_out).await.unwrap();
}

#[tokio::test]
async fn test_decline_reason_is_broadcast() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    let (staff, _staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    drain(&mut client_out);

    h.send(&staff, decline("c1", Some("office hours over")))
        .await
        .unwrap();

    assert_eq!(
        drain(&mut client_out),
        vec![ServerEvent::CallUpdate {
            state: CallState::Declined,
            staff_id: None,
            reason: Some("office hours over".to_string()),
        }]
    );
    assert_eq!(
        h.store.peek("c1").await.unwrap().staff_id.as_deref(),
        Some("S1")
    );
}

#[tokio::test]
async fn test_racing_decisions_end_consistent() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    let (s1, _s1_out) = h.connect(staff_identity("S1")).await;
    let (s2, _s2_out) = h.connect(staff_identity("S2")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    drain(&mut client_out);

    let (a, b) = tokio::join!(
        h.send(&s1, accept("c1")),
        h.send(&s2, decline("c1", None))
    );
    a.unwrap();
    b.unwrap();

    // Whichever ran last is both persisted and the last thing members saw
    let stored = h.store.peek("c1").await.unwrap();
    let last = drain(&mut client_out).pop();
    match last {
        Some(ServerEvent::CallUpdate { state, .. }) => assert_eq!(state, stored.state),
        other => assert!(other.is_none(), "unexpected event {other:?}"),
    }
    assert!(matches!(
        stored.state,
        CallState::Accepted | CallState::Declined
    ));
}

// ============================================================================
// SDP / ICE
// ============================================================================

#[tokio::test]
async fn test_sdp_twice_stores_same_payload() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&staff, join_call("c1")).await.unwrap();
    drain(&mut staff_out);

    let answer = sdp("answer", "v=0 a");
    h.send(&staff, send_sdp("c1", "answer", answer.clone()))
        .await
        .unwrap();
    let first = h.store.peek("c1").await.unwrap();
    h.send(&staff, send_sdp("c1", "answer", answer.clone()))
        .await
        .unwrap();
    let second = h.store.peek("c1").await.unwrap();

    assert_eq!(first.sdp_answer, Some(answer.clone()));
    assert_eq!(second.sdp_answer, first.sdp_answer);
    assert!(second.updated_at >= first.updated_at);

    // Only the broadcasts repeat
    let event = sdp_event("c1", SdpKind::Answer, answer);
    assert_eq!(drain(&mut staff_out), vec![event.clone(), event]);
}

#[tokio::test]
async fn test_ice_goes_to_others_only() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    h.send(&staff, join_call("c1")).await.unwrap();
    drain(&mut client_out);
    drain(&mut staff_out);
    let writes = h.store.update_calls();

    let cand = candidate("candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host");
    h.send(&client, send_ice("c1", cand.clone())).await.unwrap();

    assert_eq!(
        drain(&mut staff_out),
        vec![ServerEvent::CallIce {
            call_id: "c1".to_string(),
            candidate: cand,
        }]
    );
    assert!(drain(&mut client_out).is_empty());
    assert_eq!(h.store.update_calls(), writes);
}

#[tokio::test]
async fn test_member_with_full_mailbox_is_closed_and_resyncs() {
    let vars = [("SIGNALING_CONNECTION_BUFFER".to_string(), "2".to_string())]
        .into_iter()
        .collect();
    let h = TestService::build(vec![CallRecordBuilder::new("c1").build()], Vec::new(), vars).await;
    let (client, _client_out) = h.connect(client_identity("C1")).await;
    let (staff, mut staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    // Staff never drains: snapshot plus one candidate fills its mailbox
    h.send(&staff, join_call("c1")).await.unwrap();
    h.send(&client, send_ice("c1", candidate("candidate:0")))
        .await
        .unwrap();
    assert!(!staff.is_closed());

    h.send(&client, send_sdp("c1", "offer", json!("O1")))
        .await
        .unwrap();

    assert!(staff.is_closed());
    let seen = drain(&mut staff_out);
    assert_eq!(seen.len(), 2);
    assert!(!seen.contains(&sdp_event("c1", SdpKind::Offer, json!("O1"))));

    // The reconnecting socket converges through re-sync
    h.disconnect(&staff).await;
    let (again, mut again_out) = h.connect(staff_identity("S1")).await;
    h.send(&again, join_call("c1")).await.unwrap();
    assert_eq!(
        drain(&mut again_out),
        vec![
            update(CallState::Requested, None),
            sdp_event("c1", SdpKind::Offer, json!("O1")),
        ]
    );
}

#[tokio::test]
async fn test_sdp_rejected_without_payload() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, _out) = h.connect(client_identity("C1")).await;

    let result = h
        .send(&client, frame("call:sdp", json!({"callId": "c1", "type": "offer"})))
        .await;
    assert!(result.is_err());
    assert_eq!(h.store.peek("c1").await.unwrap().sdp_offer, None);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_keeps_call_state() {
    let h = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
    let (client, mut client_out) = h.connect(client_identity("C1")).await;
    let (staff, _staff_out) = h.connect(staff_identity("S1")).await;
    h.send(&client, join_call("c1")).await.unwrap();
    h.send(&staff, join_call("c1")).await.unwrap();
    h.send(&staff, accept("c1")).await.unwrap();
    drain(&mut client_out);
    let before = h.store.peek("c1").await.unwrap();

    h.disconnect(&staff).await;

    assert_eq!(h.store.peek("c1").await.unwrap(), before);
    assert_eq!(
        h.service.rooms().member_count(&Room::call("c1")).await,
        1
    );

    // Reconnect re-syncs from the store
    let (again, mut again_out) = h.connect(staff_identity("S1")).await;
    h.send(&again, join_call("c1")).await.unwrap();
    assert_eq!(
        drain(&mut again_out),
        vec![update(CallState::Accepted, Some("S1"))]
    );
}
