use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use super::event::Event;
use super::types::{TRACK_UPDATE, TRACK_UPDATE_REQUEST, TrackRecord};
use crate::ws::SessionEvent;
use crate::ws::config::ProtocolRevision;
use crate::ws::protocol::Packet;

/// Background task turning session messages into track events.
///
/// It is the only writer of the current-track cache.
pub(crate) struct Consumer {
    protocol: ProtocolRevision,
    session_rx: broadcast::Receiver<SessionEvent>,
    current_tx: watch::Sender<Option<TrackRecord>>,
    event_tx: broadcast::Sender<Event>,
}

impl Consumer {
    pub(crate) fn new(
        protocol: ProtocolRevision,
        session_rx: broadcast::Receiver<SessionEvent>,
        current_tx: watch::Sender<Option<TrackRecord>>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            protocol,
            session_rx,
            current_tx,
            event_tx,
        }
    }

    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(mut self) {
        loop {
            match self.session_rx.recv().await {
                Ok(event) => self.dispatch(event),
                Err(RecvError::Lagged(n)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Gateway consumer lagged, missed {n} session events");
                    #[cfg(not(feature = "tracing"))]
                    let _ = n;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn dispatch(&self, event: SessionEvent) {
        let message = match &event {
            SessionEvent::Message(packet) => Some(packet.clone()),
            _ => None,
        };

        self.emit(Event::Session(event));

        if let Some(packet) = message {
            self.handle_message(packet);
        }
    }

    fn handle_message(&self, packet: Packet) {
        let is_response = match packet.event_type.as_deref() {
            Some(TRACK_UPDATE) => false,
            Some(TRACK_UPDATE_REQUEST) if self.protocol.supports_track_requests() => true,
            _ => return,
        };
        let Some(data) = packet.data else {
            return;
        };

        let record = TrackRecord::new(data);
        let dedupe = self.protocol.dedupes_track_updates();
        let mut changed = true;
        self.current_tx.send_modify(|current| {
            changed = !dedupe
                || !current
                    .as_ref()
                    .is_some_and(|previous| previous.is_same_track(&record));
            *current = Some(record.clone());
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(song_id = ?record.song_id(), changed, "Track broadcast received");

        self.emit(Event::DataUpdated(record.clone()));
        if changed {
            self.emit(Event::TrackUpdated(record.clone()));
        }
        if is_response {
            self.emit(Event::TrackUpdateResponse(record));
        }
    }

    fn emit(&self, event: Event) {
        _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ws::protocol::OpCode;

    struct Harness {
        consumer: Consumer,
        current_rx: watch::Receiver<Option<TrackRecord>>,
        event_rx: broadcast::Receiver<Event>,
    }

    fn harness(protocol: ProtocolRevision) -> Harness {
        let (_session_tx, session_rx) = broadcast::channel(16);
        let (current_tx, current_rx) = watch::channel(None);
        let (event_tx, event_rx) = broadcast::channel(16);

        Harness {
            consumer: Consumer::new(protocol, session_rx, current_tx, event_tx),
            current_rx,
            event_rx,
        }
    }

    fn track(event_type: &str, id: &str) -> SessionEvent {
        SessionEvent::Message(
            Packet::new(OpCode::MessageIn)
                .with_event_type(event_type)
                .with_data(json!({ "song": { "id": id } })),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn new_song_emits_data_then_track() {
        let mut h = harness(ProtocolRevision::V4);

        h.consumer.dispatch(track(TRACK_UPDATE, "A"));

        let events = drain(&mut h.event_rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::Session(SessionEvent::Message(_))));
        assert!(matches!(events[1], Event::DataUpdated(_)));
        assert!(matches!(events[2], Event::TrackUpdated(_)));
        assert_eq!(
            h.current_rx.borrow().as_ref().and_then(TrackRecord::song_id),
            Some(&json!("A"))
        );
    }

    #[test]
    fn refresh_of_same_song_only_updates_data() {
        let mut h = harness(ProtocolRevision::V4);
        h.consumer.dispatch(track(TRACK_UPDATE, "A"));
        drain(&mut h.event_rx);

        h.consumer.dispatch(track(TRACK_UPDATE, "A"));

        let events = drain(&mut h.event_rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Event::DataUpdated(_)));
    }

    #[test]
    fn legacy_reports_every_broadcast_as_a_track_change() {
        let mut h = harness(ProtocolRevision::Legacy);
        h.consumer.dispatch(track(TRACK_UPDATE, "A"));
        drain(&mut h.event_rx);

        h.consumer.dispatch(track(TRACK_UPDATE, "A"));

        let events = drain(&mut h.event_rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], Event::DataUpdated(_)));
        assert!(matches!(events[2], Event::TrackUpdated(_)));
    }

    #[test]
    fn request_answer_also_emits_response() {
        let mut h = harness(ProtocolRevision::V4);

        h.consumer.dispatch(track(TRACK_UPDATE_REQUEST, "A"));

        let events = drain(&mut h.event_rx);
        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], Event::TrackUpdateResponse(_)));
    }

    #[test]
    fn legacy_ignores_request_answers() {
        let mut h = harness(ProtocolRevision::Legacy);

        h.consumer.dispatch(track(TRACK_UPDATE_REQUEST, "A"));

        assert_eq!(drain(&mut h.event_rx).len(), 1);
        assert!(h.current_rx.borrow().is_none());
    }

    #[test]
    fn keep_alives_and_unknown_tags_are_only_forwarded() {
        let mut h = harness(ProtocolRevision::V4);

        h.consumer
            .dispatch(SessionEvent::Message(Packet::new(OpCode::MessageIn)));
        h.consumer.dispatch(SessionEvent::Message(
            Packet::new(OpCode::MessageIn)
                .with_event_type("NOTIFICATION")
                .with_data(json!({ "type": "EVENT" })),
        ));
        h.consumer.dispatch(SessionEvent::Message(
            Packet::new(OpCode::MessageIn).with_event_type(TRACK_UPDATE),
        ));

        assert_eq!(drain(&mut h.event_rx).len(), 3);
        assert!(h.current_rx.borrow().is_none());
    }
}
