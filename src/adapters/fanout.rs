//! Fan-out sink: forwards every event to a list of sinks, in order.

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn EventSink + Send>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: impl EventSink + Send + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for MultiSink {
    fn emit(&mut self, event: &AppEvent) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    struct Shared(Arc<Mutex<Vec<AppEvent>>>);

    impl EventSink for Shared {
        fn emit(&mut self, event: &AppEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn every_sink_sees_every_event() {
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiSink::new()
            .with(Shared(Arc::clone(&a)))
            .with(Shared(Arc::clone(&b)));
        assert_eq!(multi.len(), 2);

        multi.emit(&AppEvent::AnomalyCleared);
        multi.emit(&AppEvent::VisionReset);

        assert_eq!(a.lock().len(), 2);
        assert_eq!(*a.lock(), *b.lock());
    }
}
