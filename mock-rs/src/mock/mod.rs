//! Mock engine and its HTTP routes

mod engine;
mod routes;

pub use engine::{MockEngine, Recording};
pub use routes::{build_router, CASE_PARAM, EXAMPLES_ROUTE, EXPECT_ROUTE, RECORDINGS_ROUTE, RELOAD_ROUTE};
