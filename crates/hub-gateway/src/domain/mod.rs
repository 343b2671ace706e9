//! Domain types for the hub: configuration, identifiers, errors, the method
//! registry and wire types.

pub mod config;
pub mod error;
pub mod ids;
pub mod methods;
pub mod search;
pub mod types;

pub use config::{CliOverrides, ConfigError, HubConfig, HubConfigBuilder, SubscriptionConfig};
pub use error::{
    ApiError, ApiResult, DeliverError, HubError, RegisterError, SessionError, SubscriptionError,
};
pub use ids::{SessionId, SubscriptionId};
pub use methods::HubCall;
pub use search::{IdList, InvertibleField, SearchRequest};
pub use types::{BlockParam, BlockRecord, HeaderRecord, RpcRequest};
