pub mod api;
pub mod cache;
pub mod channel;
pub mod credentials;
pub mod refresh;

pub use api::{ChannelListResponse, ChannelsQuery, GroupsResponse, RefreshResponse, StatusResponse};
pub use cache::{CacheHeader, CachePayload, RefreshMetadata, RefreshStatus};
pub use channel::{Category, CategoryStats, Channel};
pub use credentials::Credentials;
pub use refresh::{DerivedRefreshState, RefreshSnapshot, StartOutcome};
