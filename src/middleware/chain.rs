//! Ordered composition of middleware constructors.

use std::fmt;
use std::sync::Arc;

use crate::handler::Handler;

/// Wraps a next handler into a middleware handler.
pub type Constructor = Arc<dyn Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync>;

/// An ordered list of middleware constructors.
///
/// The first constructor is the outermost: it sees a flow before every
/// later middleware and before the terminal handler.
#[derive(Clone, Default)]
pub struct Chain {
    constructors: Vec<Constructor>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constructor as the new innermost middleware.
    pub fn append(mut self, constructor: Constructor) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Wrap `handler` with the chain.
    pub fn then(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.constructors
            .iter()
            .rev()
            .fold(handler, |next, constructor| constructor(next))
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.constructors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::{client, new_log, Recorder, Tag};

    fn tag(name: &'static str, log: &crate::handler::test_support::Log) -> Constructor {
        let log = log.clone();
        Arc::new(move |next: Arc<dyn Handler>| Tag::wrap(name, &log, next))
    }

    #[tokio::test]
    async fn first_middleware_is_outermost() {
        let log = new_log();
        let chain = Chain::new()
            .append(tag("first", &log))
            .append(tag("second", &log))
            .append(tag("third", &log));
        assert_eq!(chain.len(), 3);

        let handler = chain.then(Recorder::new("service", &log));
        handler.serve(client(1)).await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "second", "third", "service"]);
    }

    #[tokio::test]
    async fn empty_chain_is_the_handler_itself() {
        let log = new_log();
        let chain = Chain::new();
        assert!(chain.is_empty());

        chain.then(Recorder::new("service", &log)).serve(client(1)).await.unwrap();
        assert_eq!(*log.lock(), vec!["service"]);
    }
}
