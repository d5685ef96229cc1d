//! Pure routing of rumqttc events
//!
//! Turns raw MQTT event-loop events into the small set of routes the
//! session supervisor acts on. Payloads cross this boundary as opaque
//! strings; interpretation stays at the call sites that need it.

use rumqttc::v5::Event;

/// Routing decision for one MQTT event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Broker acknowledged the connection - ready to (re)subscribe
    ConnAck,
    /// Inbound message on a subscribed topic
    Message {
        topic: String,
        payload: String,
        retained: bool,
    },
    /// Broker-initiated disconnect
    Disconnect,
    /// Any other incoming packet (logged, not acted on)
    Infrastructure(String),
    /// Outgoing traffic - nothing to do
    Outgoing,
}

/// Route an MQTT event to a supervisor action (pure function)
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => {
            use rumqttc::v5::mqttbytes::v5::Packet;
            match incoming {
                Packet::ConnAck(_) => EventRoute::ConnAck,
                Packet::Publish(publish) => EventRoute::Message {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: String::from_utf8_lossy(&publish.payload).to_string(),
                    retained: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnect,
                other => EventRoute::Infrastructure(format!("{other:?}")),
            }
        }
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{Packet, Publish};
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn routes_publish_packets_to_message() {
        let publish = Publish::new("devices/abc/temp", QoS::AtMostOnce, "21.5", None);
        let event = Event::Incoming(Packet::Publish(publish));

        match route_event(&event) {
            EventRoute::Message {
                topic,
                payload,
                retained,
            } => {
                assert_eq!(topic, "devices/abc/temp");
                assert_eq!(payload, "21.5");
                assert!(!retained);
            }
            other => panic!("expected Message route, got {other:?}"),
        }
    }

    #[test]
    fn routes_non_utf8_payloads_lossily() {
        let publish = Publish::new("t", QoS::AtMostOnce, vec![0xff, 0xfe, b'a'], None);
        let event = Event::Incoming(Packet::Publish(publish));

        match route_event(&event) {
            EventRoute::Message { payload, .. } => assert!(payload.ends_with('a')),
            other => panic!("expected Message route, got {other:?}"),
        }
    }

    #[test]
    fn routes_pingresp_to_infrastructure() {
        let event = Event::Incoming(Packet::PingResp(rumqttc::v5::mqttbytes::v5::PingResp));
        assert!(matches!(route_event(&event), EventRoute::Infrastructure(_)));
    }
}
