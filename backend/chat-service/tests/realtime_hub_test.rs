mod common;

use chat_service::models::{Channel, GroupId, PrincipalId};
use chat_service::websocket::{Audience, ChatEvent, ConnectionState, MembershipChange};
use common::{drain, next_frame, Harness};
use futures::future::join_all;

#[tokio::test]
async fn users_without_connections_have_no_entry() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let registry = h.state.hub.registry();

    assert!(registry.connections_of(alice).is_empty());
    let (handle, _rx) = h.state.hub.connect(alice).await.unwrap();
    assert!(registry.is_connected(alice));

    h.state.hub.disconnect(handle);
    assert!(!registry.is_connected(alice));
    assert!(registry.connections_of(alice).is_empty());
    assert_eq!(h.state.hub.state_of(handle), ConnectionState::Disconnected);
}

#[tokio::test]
async fn each_device_gets_one_copy() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.befriend(alice, bob).await;

    let (_phone, mut phone_rx) = h.state.hub.connect(alice).await.unwrap();
    let (_laptop, mut laptop_rx) = h.state.hub.connect(alice).await.unwrap();
    assert_eq!(h.state.hub.registry().connections_of(alice).len(), 2);

    let event = ChatEvent::MembershipChanged {
        from: bob.into(),
        to: alice.into(),
        change: MembershipChange::Reload,
    };
    // alice's devices hold both channels; each still gets one frame
    let sent = h
        .state
        .broadcaster
        .publish_to(
            &[Channel::User(alice), Channel::User(bob)],
            Audience::only([alice]),
            &event,
        )
        .unwrap();
    assert_eq!(sent, 2);

    assert_eq!(next_frame(&mut phone_rx).await.msg_id, 0);
    assert_eq!(next_frame(&mut laptop_rx).await.msg_id, 0);
    assert!(drain(&mut phone_rx).is_empty());
    assert!(drain(&mut laptop_rx).is_empty());
}

#[tokio::test]
async fn same_channel_events_arrive_in_publish_order() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let group = h
        .state
        .coordinator
        .create_group(alice, "ordered", "")
        .await
        .unwrap();
    let (_handle, mut rx) = h.state.hub.connect(alice).await.unwrap();

    for n in 1..=20 {
        let event = ChatEvent::MembershipChanged {
            from: group.id.into(),
            to: PrincipalId(n),
            change: MembershipChange::Reload,
        };
        h.state
            .broadcaster
            .publish(Channel::Group(group.id), &event)
            .unwrap();
    }
    let order: Vec<i64> = drain(&mut rx).into_iter().map(|f| f.to_id).collect();
    assert_eq!(order, (1..=20).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_and_disconnects_leave_no_residue() {
    let h = Harness::new();
    let mut users = Vec::new();
    for i in 0..8 {
        users.push(h.user(&format!("user{i}")).await);
    }
    let shared = GroupId(users[0].0);

    let tasks = (0..64).map(|i| {
        let hub = h.state.hub.clone();
        let user = users[i % users.len()];
        tokio::spawn(async move {
            let (handle, _rx) = hub.connect(user).await.unwrap();
            hub.subscribe(handle, Channel::Group(shared));
            tokio::task::yield_now().await;
            assert!(hub.disconnect(handle));
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(h.state.hub.registry().user_count(), 0);
    assert_eq!(h.state.hub.connection_count(), 0);
    assert!(h.state.hub.subscribers_of(Channel::Group(shared)).is_empty());
}

#[tokio::test]
async fn store_outage_rejects_connect_cleanly() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let (existing, _rx) = h.state.hub.connect(alice).await.unwrap();

    h.store.set_available(false);
    let err = h.state.hub.connect(alice).await.unwrap_err();
    assert_eq!(err.status(), 503);

    // the earlier connection is unaffected
    assert_eq!(
        h.state.hub.registry().connections_of(alice).into_iter().collect::<Vec<_>>(),
        vec![existing]
    );
    assert_eq!(h.state.hub.connection_count(), 1);
}
