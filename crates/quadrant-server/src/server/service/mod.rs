//! The three gRPC services and how they are assembled.

pub mod blog;
pub mod calculator;
pub mod greet;

use crate::server::{config::GreetSettings, dispatch::Dispatcher, store::DocumentStore};
use blog::BlogHandler;
use calculator::CalculatorHandler;
use greet::GreetHandler;
use std::sync::Arc;

/// One handler per service, all sharing a [`Dispatcher`].
pub struct Handlers {
    pub calculator: CalculatorHandler,
    pub greet: GreetHandler,
    pub blog: BlogHandler,
}

impl Handlers {
    pub fn new(
        dispatcher: Dispatcher,
        greet: GreetSettings,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            calculator: CalculatorHandler::new(dispatcher.clone()),
            greet: GreetHandler::new(dispatcher.clone(), greet),
            blog: BlogHandler::new(dispatcher, store),
        }
    }
}
