//! Smooth weighted round-robin.
//!
//! Every pick adds each child's weight to its current score, selects the
//! highest score (first child wins ties) and subtracts the total weight from
//! the winner. Over any window of `total` consecutive picks each child is
//! chosen exactly `weight` times, spread out rather than in blocks.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future;
use parking_lot::Mutex;

use crate::handler::{FlowError, Handler, HandlerFuture};

#[derive(Debug)]
struct Child {
    name: String,
    handler: Arc<dyn Handler>,
    weight: i64,
}

/// Weighted selection among child handlers, one pick per flow.
///
/// A child may itself be a `WeightedRoundRobin`; it then makes its own pick
/// when chosen.
#[derive(Debug)]
pub struct WeightedRoundRobin {
    name: String,
    children: Vec<Child>,
    current: Mutex<Vec<i64>>,
    total: i64,
}

impl WeightedRoundRobin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            current: Mutex::new(Vec::new()),
            total: 0,
        }
    }

    /// Add a child. An absent weight counts as 1; a zero weight keeps the
    /// child but never selects it.
    pub fn add(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>, weight: Option<u32>) {
        let weight = i64::from(weight.unwrap_or(1));
        self.children.push(Child {
            name: name.into(),
            handler,
            weight,
        });
        self.current.get_mut().push(0);
        self.total += weight;
    }

    /// Sum of all child weights. Zero means nothing can be selected.
    pub fn total_weight(&self) -> i64 {
        self.total
    }

    /// Index of the child handling the next flow.
    fn next_index(&self) -> Option<usize> {
        if self.total == 0 {
            return None;
        }

        let mut current = self.current.lock();
        let mut best: Option<usize> = None;
        for (index, child) in self.children.iter().enumerate() {
            if child.weight == 0 {
                continue;
            }
            current[index] += child.weight;
            if best.map_or(true, |b| current[index] > current[b]) {
                best = Some(index);
            }
        }

        let index = best?;
        current[index] -= self.total;
        Some(index)
    }
}

impl Handler for WeightedRoundRobin {
    fn serve(&self, client: SocketAddr) -> HandlerFuture<'_> {
        let Some(index) = self.next_index() else {
            return Box::pin(future::ready(Err(FlowError::NoServer(self.name.clone()))));
        };

        let child = &self.children[index];
        tracing::trace!(service = %self.name, child = %child.name, client = %client, "Selected child");
        child.handler.serve(client)
    }
}
