// Library modules
pub mod broker;
pub mod dispatch;
pub mod error;
pub mod idgen;
pub mod params;
pub mod perms;
pub mod pipe;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod session;
pub mod topics;
pub mod users;

// Re-export commonly used types
pub use broker::Broker;
pub use dispatch::Dispatcher;
pub use error::{ErrKind, RpcError, RpcResult};
pub use idgen::IdGen;
pub use params::Params;
pub use perms::PermissionOracle;
pub use pipe::{Pipe, PipeMessage, ReadBatch, DEFAULT_PIPE_CAPACITY};
pub use registry::PipeRegistry;
pub use rpc::{ErrorBody, Request, Response};
pub use session::Session;
pub use topics::TopicIndex;
pub use users::{TagMap, TagSource, UserRegistry};
