mod common;

use chat_service::models::{Channel, ChatMessage, GroupId, MessageKind};
use chat_service::store::RelationshipStore;
use chat_service::websocket::MembershipChange;
use common::{drain, next_frame, Harness};
use error_types::error_codes;

#[tokio::test]
async fn create_group_subscribes_creator_and_announces() {
    let h = Harness::new();
    let owner = h.user("owner").await;
    let (conn, mut rx) = h.state.hub.connect(owner).await.unwrap();

    let group = h.state.coordinator.create_group(owner, "  Rustaceans ", "").await.unwrap();
    assert_eq!(group.name, "Rustaceans");
    assert!(h.state.hub.channels_of(conn).contains(&Channel::Group(group.id)));

    let member = h.store.membership(group.id, owner).await.unwrap().unwrap();
    assert!(member.is_operator);

    let frame = next_frame(&mut rx).await;
    assert_eq!(frame.to_id, group.id.0);
    let seed: ChatMessage = serde_json::from_str(&frame.details).unwrap();
    assert_eq!(seed.kind, MessageKind::System);
    assert_eq!(seed.content, "group created");

    let err = h.state.coordinator.create_group(owner, "   ", "").await.unwrap_err();
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn operator_adds_friend_who_is_subscribed_live() {
    let h = Harness::new();
    let operator = h.user("olga").await;
    let member = h.user("mike").await;
    h.befriend(operator, member).await;
    let group = h.state.coordinator.create_group(operator, "g", "").await.unwrap();

    let (_op_conn, mut op_rx) = h.state.hub.connect(operator).await.unwrap();
    let (member_conn, mut member_rx) = h.state.hub.connect(member).await.unwrap();
    assert!(!h.state.hub.channels_of(member_conn).contains(&Channel::Group(group.id)));

    let seed = h
        .state
        .coordinator
        .add_member(operator, group.id, member)
        .await
        .unwrap();

    assert!(h.store.membership(group.id, member).await.unwrap().is_some());
    assert!(h.state.hub.channels_of(member_conn).contains(&Channel::Group(group.id)));
    assert_eq!(seed.content, "Hi all, I'm mike");
    assert_eq!(seed.sender_id, Some(member));

    for rx in [&mut op_rx, &mut member_rx] {
        let frame = next_frame(rx).await;
        assert_eq!(frame.msg_id, seed.id.0);
        assert_eq!(frame.from_id, member.0);
        assert!(drain(rx).is_empty());
    }
}

#[tokio::test]
async fn add_member_preconditions() {
    let h = Harness::new();
    let operator = h.user("olga").await;
    let friend = h.user("fred").await;
    let stranger = h.user("sam").await;
    h.befriend(operator, friend).await;
    let group = h.state.coordinator.create_group(operator, "g", "").await.unwrap();

    let err = h
        .state
        .coordinator
        .add_member(operator, group.id, stranger)
        .await
        .unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_FRIENDS);

    h.state.coordinator.add_member(operator, group.id, friend).await.unwrap();
    let err = h
        .state
        .coordinator
        .add_member(operator, group.id, friend)
        .await
        .unwrap_err();
    assert_eq!(err.code(), error_codes::ALREADY_GROUP_MEMBER);

    // plain members cannot add
    h.befriend(friend, stranger).await;
    let err = h
        .state
        .coordinator
        .add_member(friend, group.id, stranger)
        .await
        .unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_GROUP_OPERATOR);

    let err = h
        .state
        .coordinator
        .add_member(operator, GroupId(424_242), friend)
        .await
        .unwrap_err();
    assert_eq!(err.code(), error_codes::GROUP_NOT_FOUND);
}

#[tokio::test]
async fn deleted_group_notifies_member_once_before_unsubscribing() {
    let h = Harness::new();
    let operator = h.user("olga").await;
    let member = h.user("mike").await;
    h.befriend(operator, member).await;
    let group = h.state.coordinator.create_group(operator, "g", "").await.unwrap();
    h.state.coordinator.add_member(operator, group.id, member).await.unwrap();

    let (member_conn, mut member_rx) = h.state.hub.connect(member).await.unwrap();
    h.state.coordinator.delete_group(operator, group.id).await.unwrap();

    let frames = drain(&mut member_rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].msg_id, 0);
    let change: MembershipChange = serde_json::from_str(&frames[0].details).unwrap();
    assert_eq!(change, MembershipChange::GroupRemoved { group_id: group.id });

    assert!(!h.state.hub.channels_of(member_conn).contains(&Channel::Group(group.id)));
    assert!(h.state.hub.subscribers_of(Channel::Group(group.id)).is_empty());
    assert!(h.store.group(group.id).await.unwrap().is_none());
    assert!(h.state.groups.my_groups(member).await.unwrap().is_empty());
}

#[tokio::test]
async fn owner_can_never_be_removed_or_demoted() {
    let h = Harness::new();
    let owner = h.user("owner").await;
    let op = h.user("op").await;
    h.befriend(owner, op).await;
    let group = h.state.coordinator.create_group(owner, "g", "").await.unwrap();
    h.state.coordinator.add_member(owner, group.id, op).await.unwrap();
    h.state.groups.set_operator(owner, group.id, op).await.unwrap();

    for caller in [owner, op] {
        let err = h
            .state
            .coordinator
            .remove_member(caller, group.id, owner)
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::GROUP_OWNER_PROTECTED);

        let err = h
            .state
            .groups
            .unset_operator(caller, group.id, owner)
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::GROUP_OWNER_PROTECTED);
    }

    let owner_row = h.store.membership(group.id, owner).await.unwrap().unwrap();
    assert!(owner_row.is_operator);
}

#[tokio::test]
async fn operator_flags() {
    let h = Harness::new();
    let owner = h.user("owner").await;
    let op = h.user("op").await;
    let plain = h.user("plain").await;
    h.befriend(owner, op).await;
    h.befriend(owner, plain).await;
    let group = h.state.coordinator.create_group(owner, "g", "").await.unwrap();
    h.state.coordinator.add_member(owner, group.id, op).await.unwrap();
    h.state.coordinator.add_member(owner, group.id, plain).await.unwrap();

    let err = h.state.groups.set_operator(plain, group.id, plain).await.unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_GROUP_OPERATOR);

    h.state.groups.set_operator(owner, group.id, op).await.unwrap();
    let operators = h.state.groups.list_operators(plain, group.id).await.unwrap();
    let mut ids: Vec<_> = operators.iter().map(|m| m.user_id).collect();
    ids.sort();
    assert_eq!(ids, vec![owner, op]);

    let err = h.state.groups.unset_operator(op, group.id, op).await.unwrap_err();
    assert_eq!(err.code(), error_codes::SELF_DEMOTION);

    h.state.groups.unset_operator(owner, group.id, op).await.unwrap();
    assert_eq!(h.state.groups.list_operators(owner, group.id).await.unwrap().len(), 1);
    assert_eq!(h.state.groups.list_members(owner, group.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn removal_and_leaving() {
    let h = Harness::new();
    let owner = h.user("owner").await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    h.befriend(owner, a).await;
    h.befriend(owner, b).await;
    let group = h.state.coordinator.create_group(owner, "g", "").await.unwrap();
    h.state.coordinator.add_member(owner, group.id, a).await.unwrap();
    h.state.coordinator.add_member(owner, group.id, b).await.unwrap();

    let (a_conn, mut a_rx) = h.state.hub.connect(a).await.unwrap();
    let (_b_conn, mut b_rx) = h.state.hub.connect(b).await.unwrap();

    // plain members cannot remove others
    let err = h.state.coordinator.remove_member(b, group.id, a).await.unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_GROUP_OPERATOR);

    h.state.coordinator.remove_member(owner, group.id, a).await.unwrap();
    assert!(!h.state.hub.channels_of(a_conn).contains(&Channel::Group(group.id)));
    let frames = drain(&mut a_rx);
    assert_eq!(frames.len(), 1);
    let change: MembershipChange = serde_json::from_str(&frames[0].details).unwrap();
    assert_eq!(change, MembershipChange::GroupRemoved { group_id: group.id });
    // the removal is private to the removed member
    assert!(drain(&mut b_rx).is_empty());

    // leaving needs no operator flag
    h.state.coordinator.remove_member(b, group.id, b).await.unwrap();
    assert!(h.store.membership(group.id, b).await.unwrap().is_none());
    assert_eq!(drain(&mut b_rx).len(), 1);

    let err = h.state.coordinator.remove_member(owner, group.id, a).await.unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_GROUP_MEMBER);
}
