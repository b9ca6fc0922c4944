pub mod channel;
pub mod group;
pub mod ids;
pub mod message;
pub mod relationship;

pub use channel::Channel;
pub use group::{Group, GroupMember};
pub use ids::{GroupId, MessageId, PrincipalId, UserId};
pub use message::{
    ChatMessage, Conversation, Direction, MessageKind, MessagePage, MessageScope,
    MessageSearchPage, NewMessage,
};
pub use relationship::{
    FriendRequest, FriendRequestState, PrincipalKind, PrincipalSummary, UserProfile,
};
