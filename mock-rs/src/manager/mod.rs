//! Container orchestration for isolated mock instances

mod container;
mod control;
mod docker;
mod memory;
mod readiness;
mod runtime;

pub use container::{ContainerManager, MockInstance, CONTAINER_PREFIX};
pub use control::ControlClient;
pub use docker::DockerRuntime;
pub use memory::{InMemoryRuntime, RuntimeOp};
pub use readiness::ReadinessProbe;
pub use runtime::{ContainerInspection, ContainerRuntime, ContainerSpec, ContainerSummary};
