pub mod channel_resolver;
pub mod friend_service;
pub mod group_service;
pub mod membership_coordinator;
pub mod message_service;
pub mod search_service;

pub use channel_resolver::ChannelMembershipResolver;
pub use friend_service::FriendService;
pub use group_service::GroupService;
pub use membership_coordinator::MembershipCoordinator;
pub use message_service::{MessageService, RecentChat};
pub use search_service::SearchService;
