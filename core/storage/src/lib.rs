//! Storage driver abstraction for Stowaway.
//!
//! This module provides a trait-based interface for different storage
//! backends (in-memory, local filesystem, cloud object stores) and a driver
//! registry resolving provider kinds to backend sessions.
//!
//! # Design Principles
//! - Driver isolation: No provider-specific logic in the gateway
//! - Async operations: All I/O operations are async
//! - Streaming support: Item content is moved as byte streams
//! - Unified error semantics: Consistent error types across drivers

pub mod driver;
pub mod registry;
pub mod memory;
pub mod local;

pub use driver::{url_host_path, ByteStream, Container, Item, Location};
pub use registry::{create_default_registry, DriverFactory, DriverRegistry};
pub use memory::MemoryBackend;
