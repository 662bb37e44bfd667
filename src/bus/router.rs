use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug};

use crate::bus::LocalBus;
use crate::bus::handlers::PayloadHandler;

/// Topic-filter to handler table.
///
/// Each route becomes one subscription drained by its own task, so handlers
/// for different devices run independently.
#[derive(Default)]
pub struct Router {
    routes: Vec<(String, Arc<dyn PayloadHandler>)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route; several routes may share a filter.
    pub fn route(mut self, filter: impl Into<String>, handler: Arc<dyn PayloadHandler>) -> Self {
        self.routes.push((filter.into(), handler));
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Subscribes every route on `bus` and spawns its delivery task.
    ///
    /// Subscriptions are registered before this returns, so nothing published
    /// afterwards is missed. Tasks end when the bus drops their channel.
    pub fn spawn(self, bus: &LocalBus, span: Span) -> Vec<JoinHandle<()>> {
        self.routes
            .into_iter()
            .map(|(filter, handler)| {
                let mut rx = bus.subscribe(&filter);
                debug!(parent: &span, filter = %filter, "subscribed");
                tokio::spawn(
                    async move {
                        while let Some(msg) = rx.recv().await {
                            handler.handle(&msg.topic, &msg.payload);
                        }
                    }
                    .instrument(span.clone()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl PayloadHandler for Collect {
        fn handle(&self, topic: &str, payload: &[u8]) {
            self.seen.lock().push((topic.to_string(), payload.to_vec()));
        }
    }

    #[tokio::test]
    async fn routes_payloads_to_matching_handlers() {
        let bus = LocalBus::new();
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let router = Router::new().route("A/#", a.clone()).route("B/x", b.clone());
        assert_eq!(router.len(), 2);
        let _tasks = router.spawn(&bus, Span::none());

        bus.publish("A/1", vec![1]).unwrap();
        bus.publish("B/y", vec![2]).unwrap();
        bus.publish("B/x", vec![3]).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.seen.lock().clone(), vec![("A/1".to_string(), vec![1])]);
        assert_eq!(b.seen.lock().clone(), vec![("B/x".to_string(), vec![3])]);
    }

    #[tokio::test]
    async fn preserves_order_within_a_route() {
        let bus = LocalBus::new();
        let c = Arc::new(Collect::default());
        let _tasks = Router::new().route("T/#", c.clone()).spawn(&bus, Span::none());

        for i in 0..20u8 {
            bus.publish("T/d", vec![i]).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let order: Vec<u8> = c.seen.lock().iter().map(|(_, p)| p[0]).collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }
}
