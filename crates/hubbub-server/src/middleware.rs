use std::sync::Arc;

use hubbub_core::{Event, EventError};

use crate::hooks::ConnectRequest;

/// Transforms or rejects an event on its way in or out.
pub type Middleware = Arc<dyn Fn(Event, &ConnectRequest) -> Result<Event, EventError> + Send + Sync>;

/// Ordered middleware list, run first to last.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Middleware>,
}

/// A chain aborted by one of its layers.
#[derive(Debug)]
pub struct Rejected {
    /// The event as it entered the chain.
    pub original: Event,
    pub error: EventError,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append: runs after every layer already present.
    pub fn push(&mut self, layer: Middleware) {
        self.layers.push(layer);
    }

    /// Prepend: runs before every layer already present.
    pub fn insert_first(&mut self, layer: Middleware) {
        self.layers.insert(0, layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Thread `event` through every layer. The first error stops the chain
    /// and hands back the untouched input.
    pub fn run(&self, event: Event, request: &ConnectRequest) -> Result<Event, Box<Rejected>> {
        if self.layers.is_empty() {
            return Ok(event);
        }
        let original = event.clone();
        let mut current = event;
        for layer in &self.layers {
            current = match layer(current, request) {
                Ok(next) => next,
                Err(error) => return Err(Box::new(Rejected { original, error })),
            };
        }
        Ok(current)
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain").field("layers", &self.layers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag(name: &'static str) -> Middleware {
        Arc::new(move |mut event: Event, _req: &ConnectRequest| {
            let trail = event
                .metadata
                .entry("trail")
                .or_insert_with(|| json!([]));
            if let Some(list) = trail.as_array_mut() {
                list.push(json!(name));
            }
            Ok(event)
        })
    }

    fn reject(msg: &'static str) -> Middleware {
        Arc::new(move |_event: Event, _req: &ConnectRequest| Err(EventError::middleware(msg)))
    }

    #[test]
    fn empty_chain_is_identity() {
        let event = Event::from_client("a", "Ping", json!(1));
        let out = MiddlewareChain::new().run(event.clone(), &ConnectRequest::default()).unwrap();
        assert_eq!(out, event);
    }

    #[test]
    fn push_and_insert_first_order() {
        let mut chain = MiddlewareChain::new();
        chain.push(tag("b"));
        chain.push(tag("c"));
        chain.insert_first(tag("a"));
        assert_eq!(chain.len(), 3);

        let out = chain
            .run(Event::from_client("x", "Ping", json!(null)), &ConnectRequest::default())
            .unwrap();
        assert_eq!(out.metadata["trail"], json!(["a", "b", "c"]));
    }

    #[test]
    fn error_returns_pre_chain_event() {
        let mut chain = MiddlewareChain::new();
        chain.push(tag("a"));
        chain.push(reject("banned word"));
        chain.push(tag("never"));

        let event = Event::from_client("x", "Chat", json!("bad"));
        let rejected = chain.run(event.clone(), &ConnectRequest::default()).unwrap_err();
        assert_eq!(rejected.original, event);
        assert_eq!(rejected.error, EventError::middleware("banned word"));
    }
}
