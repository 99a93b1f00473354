use super::error::SinkError;
use super::module::ModuleData;

/// Destination of decoded logical events.
///
/// The driver calls `write_event` once per logical event with every configured
/// module, whether or not it had data (`ModuleData::has_data`), and `close` once the
/// input is exhausted.
pub trait EventSink {
    fn write_event(&mut self, event_counter: u64, modules: &[ModuleData]) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError>;
}

/// Fans every call out to each of the sinks in order
#[derive(Default)]
pub struct SinkList {
    sinks: Vec<Box<dyn EventSink>>,
}

impl SinkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for SinkList {
    fn write_event(&mut self, event_counter: u64, modules: &[ModuleData]) -> Result<(), SinkError> {
        for sink in self.sinks.iter_mut() {
            sink.write_event(event_counter, modules)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        for sink in self.sinks.iter_mut() {
            sink.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl EventSink for Recorder {
        fn write_event(&mut self, event_counter: u64, modules: &[ModuleData]) -> Result<(), SinkError> {
            self.0
                .lock()
                .unwrap()
                .push(format!("event {event_counter} with {} modules", modules.len()));
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(String::from("close"));
            Ok(())
        }
    }

    #[test]
    fn test_sink_list_fans_out() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkList::new();
        assert!(sinks.is_empty());
        sinks.push(Box::new(Recorder(log.clone())));
        sinks.push(Box::new(Recorder(log.clone())));
        sinks.write_event(4, &[]).unwrap();
        sinks.close().unwrap();
        assert_eq!(sinks.len(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "event 4 with 0 modules",
                "event 4 with 0 modules",
                "close",
                "close"
            ]
        );
    }
}
