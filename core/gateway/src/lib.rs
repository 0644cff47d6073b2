//! Stowaway gateway.
//!
//! A stateless HTTP facade over heterogeneous object-storage backends. Each
//! request carries a connection descriptor; the gateway dials the named
//! driver, performs one operation and closes the session before answering.
//!
//! # Layers
//! - [`session`]: dialing and guaranteed closing of per-request sessions
//! - [`pagination`]: client `cursor`/`count` to driver pages and back
//! - [`transfer`]: streamed copies and uploads with size enforcement
//! - [`gateway`]: one method per API operation
//! - [`routes`]: the axum router

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod pagination;
pub mod response;
pub mod routes;
pub mod session;
pub mod transfer;
pub mod upload;

pub use config::{GatewayConfig, NotFoundStatus};
pub use connection::{Connection, CopyRequest};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::Gateway;
pub use response::{ContainersResult, DialResult, FieldPolicy, ItemView, ItemsResult};
pub use routes::router;
pub use session::{close_after, close_after_both, Session, SessionManager};
pub use transfer::{TransferEngine, UploadSource};
