mod event;
mod sink;

use std::sync::Arc;

pub use event::*;
pub use sink::*;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use pakt_types::{Exit, Info, Package, PackageId, Status};

    fn package(name: &str) -> Package {
        Package::new(
            PackageId::new(name, "1.0", "x86_64", "fedora").unwrap(),
            Info::Available,
            "a test package",
        )
    }

    #[test]
    fn test_null_sink() {
        let sink = NullSink;
        sink.emit(JobEvent::Status(Status::Query));
    }

    #[test]
    fn test_channel_sink() {
        let (sink, rx) = ChannelSink::new();
        sink.emit(JobEvent::Package(package("hal")));
        sink.emit(JobEvent::Percentage(50));
        sink.emit(JobEvent::Finished(Exit::Success));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], JobEvent::Package(p) if p.package_id.name() == "hal"));
        assert!(matches!(&events[1], JobEvent::Percentage(50)));
        assert!(events[2].is_finished());
    }

    #[test]
    fn test_channel_sink_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(JobEvent::Status(Status::Setup));
    }

    #[test]
    fn test_collector_sink() {
        let sink = CollectorSink::default();
        assert!(sink.is_empty());

        sink.emit(JobEvent::Status(Status::Download));
        sink.emit(JobEvent::Speed(2048));

        assert_eq!(sink.len(), 2);
        let events = sink.events();
        assert!(matches!(&events[0], JobEvent::Status(Status::Download)));
        assert!(matches!(&events[1], JobEvent::Speed(2048)));
    }

    #[test]
    fn test_event_sink_handle() {
        let collector = Arc::new(CollectorSink::default());
        let sink: EventSinkHandle = collector.clone();
        sink.emit(JobEvent::AllowCancel(false));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_event_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NullSink>();
        assert_send_sync::<ChannelSink>();
        assert_send_sync::<CollectorSink>();
    }
}
