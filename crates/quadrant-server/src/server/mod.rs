pub mod config;
pub mod deadline;
pub mod dispatch;
pub mod lifecycle;
pub mod service;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod e2e;
