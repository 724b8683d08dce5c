#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

pub mod client;
pub mod coordinator;
pub mod stream;

/// Message types plus the generated tonic stubs.
///
/// ## Services
///
/// - `calculator.CalculatorService`: [`calculator_service_server`] /
///   [`calculator_service_client`]
/// - `greet.GreetService`: [`greet_service_server`] / [`greet_service_client`]
/// - `blog.BlogService`: [`blog_service_server`] / [`blog_service_client`]
///
/// Every method is encoded with the prost codec, so a peer compiled from the
/// equivalent `.proto` files interoperates.
pub mod proto {
    pub use crate::common::messages::*;

    include!(concat!(env!("OUT_DIR"), "/calculator.CalculatorService.rs"));
    include!(concat!(env!("OUT_DIR"), "/greet.GreetService.rs"));
    include!(concat!(env!("OUT_DIR"), "/blog.BlogService.rs"));
}
