pub mod cleanup;
pub mod dispatch;
pub mod plan;
pub mod run;
pub(crate) mod runner_builder;

pub use dispatch::dispatch;
