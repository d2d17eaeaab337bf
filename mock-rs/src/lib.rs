//! # Mockpit - expectation-driven HTTP contract mocks
//!
//! A mock serves a directory of named request/response examples, but only
//! answers a request after the matching example was explicitly *expected*.
//! Each answered example is counted and the count can be drained. The
//! container manager runs one isolated mock per examples directory.
//!
//! ## Architecture
//!
//! ```text
//! examples dir ─▶ ContractParser ─▶ ContractData ─▶ Contract ─▶ MockEngine ─▶ Router
//!                                                                  ▲
//!   SIGHUP / POST /_reload ─▶ MockServer (swaps router) ───────────┘
//!
//! ContainerManager ─▶ ContainerRuntime (Docker) ─▶ mock container
//!        └──────────── ControlClient (/_examples, /_expect, /_recordings)
//! ```

pub mod archive;
pub mod config;
pub mod contract;
pub mod errors;
pub mod manager;
pub mod mock;
pub mod server;

pub use config::{ManagerConfig, MockpitConfig, ServerConfig};
pub use contract::{Contract, ContractData, ContractParser, ExampleResponse, Pair};
pub use errors::MockError;
pub use manager::{
    ContainerManager, ContainerRuntime, ControlClient, DockerRuntime, InMemoryRuntime, MockInstance,
    ReadinessProbe,
};
pub use mock::{MockEngine, Recording};
pub use server::{forward_os_signals, MockServer, ServerEvent, ServerHandle, ServerState};

/// Version reported by the serve command
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
