//! MQTT link to the machine controller.
//!
//! Setpoints go out as comma separated triples on the publish topic. The
//! controller reports back on topics below the subscribe filter: the last
//! topic segment is `position` (a triple) or `error` (the tracking error).

use crate::config::TelemetryConfig;
use fresa_core::{Machine, Point};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

const FEEDBACK_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("unexpected message on {0}")]
    UnexpectedTopic(String),

    #[error("malformed payload on {topic}: {payload:?}")]
    Malformed { topic: String, payload: String },

    #[error("timed out after {0:?} waiting for the broker")]
    Timeout(Duration),

    #[error("MQTT connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Format a setpoint for the publish topic.
pub fn encode_setpoint(point: &Point) -> String {
    format!("{:.6},{:.6},{:.6}", point.x(), point.y(), point.z())
}

/// A message from the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feedback {
    /// Tracking error reported by the controller
    Error(f64),
    /// Measured position
    Position(Point),
}

impl Feedback {
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, TelemetryError> {
        let malformed = || TelemetryError::Malformed {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        };
        let text = std::str::from_utf8(payload).map_err(|_| malformed())?.trim();

        match topic.rsplit('/').next() {
            Some("error") => text.parse().map(Feedback::Error).map_err(|_| malformed()),
            Some("position") => {
                let values = text
                    .split(',')
                    .map(|v| v.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| malformed())?;
                match values[..] {
                    [x, y, z] => Ok(Feedback::Position(Point::from_xyz(x, y, z))),
                    _ => Err(malformed()),
                }
            }
            _ => Err(TelemetryError::UnexpectedTopic(topic.to_string())),
        }
    }
}

/// What the run loop knows about the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    /// Last setpoint sent
    pub setpoint: Point,
    /// Last position reported; undefined until the first report
    pub position: Point,
    pub error: f64,
}

impl MachineState {
    pub fn new(machine: &Machine) -> Self {
        Self {
            setpoint: machine.zero().offset_by(&machine.offset()),
            position: Point::new(),
            error: machine.max_error,
        }
    }

    pub fn apply(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::Error(error) => self.error = error,
            Feedback::Position(position) => self.position = position,
        }
    }
}

pub struct TelemetryLink {
    client: AsyncClient,
    pub_topic: String,
    feedback: mpsc::Receiver<Feedback>,
    pump: JoinHandle<()>,
}

impl TelemetryLink {
    /// Connect to the broker, subscribe to feedback and start the event loop.
    pub async fn connect(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let client_id = format!("fresa_{}", uuid::Uuid::new_v4());

        let mut options = MqttOptions::new(&client_id, &config.broker_addr, config.broker_port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(options, 100);

        tracing::info!(
            broker = %config.broker_addr,
            port = config.broker_port,
            %client_id,
            "connecting to MQTT broker"
        );
        wait_for_connection(&mut event_loop, config.connect_timeout()).await?;

        client.subscribe(&config.sub_topic, QoS::AtMostOnce).await?;
        tracing::info!(topic = %config.sub_topic, "subscribed to feedback");

        let (tx, feedback) = mpsc::channel(FEEDBACK_CAPACITY);
        let pump = tokio::spawn(pump(event_loop, tx));

        Ok(Self {
            client,
            pub_topic: config.pub_topic.clone(),
            feedback,
            pump,
        })
    }

    pub async fn publish(&self, setpoint: &Point) -> Result<(), TelemetryError> {
        self.client
            .publish(
                &self.pub_topic,
                QoS::AtMostOnce,
                false,
                encode_setpoint(setpoint),
            )
            .await?;
        Ok(())
    }

    /// Next pending feedback message, without waiting.
    pub fn try_feedback(&mut self) -> Option<Feedback> {
        self.feedback.try_recv().ok()
    }

    pub async fn disconnect(self) -> Result<(), TelemetryError> {
        self.client.disconnect().await?;
        if tokio::time::timeout(Duration::from_secs(2), self.pump)
            .await
            .is_err()
        {
            tracing::warn!("MQTT event loop did not stop after disconnect");
        }
        Ok(())
    }
}

async fn wait_for_connection(
    event_loop: &mut EventLoop,
    timeout: Duration,
) -> Result<(), TelemetryError> {
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(TelemetryError::Timeout(timeout));
        }

        match tokio::time::timeout(Duration::from_millis(500), event_loop.poll()).await {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => return Ok(()),
            Ok(Ok(_)) => continue,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => continue,
        }
    }
}

/// Decode one controller message and hand it to the run loop.
///
/// Never waits on the receiver: when the channel is full the message is
/// dropped, since only the latest position and error matter. Returns `false`
/// once the receiver is gone.
fn forward(tx: &mpsc::Sender<Feedback>, topic: &str, payload: &[u8]) -> bool {
    let feedback = match Feedback::decode(topic, payload) {
        Ok(feedback) => feedback,
        Err(err) => {
            tracing::warn!(%err, "ignoring controller message");
            return true;
        }
    };
    match tx.try_send(feedback) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            tracing::trace!(?dropped, "feedback channel full, dropping message");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Drive the MQTT event loop and forward decoded feedback until the link is
/// closed from either side.
async fn pump(mut event_loop: EventLoop, tx: mpsc::Sender<Feedback>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if !forward(&tx, &publish.topic, &publish.payload) {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::error!(%err, "MQTT connection lost");
                break;
            }
        }
    }
    tracing::debug!("MQTT event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setpoint_encoding() {
        let p = Point::from_xyz(1.5, -2.0, 0.000_000_4);
        insta::assert_snapshot!(encode_setpoint(&p), @"1.500000,-2.000000,0.000000");
    }

    #[test]
    fn decodes_error_and_position() {
        assert_eq!(
            Feedback::decode("fresa/status/error", b"0.0012").unwrap(),
            Feedback::Error(0.0012)
        );
        assert_eq!(
            Feedback::decode("fresa/status/position", b"1.0, 2.5,-3\n").unwrap(),
            Feedback::Position(Point::from_xyz(1.0, 2.5, -3.0))
        );
    }

    #[test]
    fn rejects_unknown_topics_and_bad_payloads() {
        assert!(matches!(
            Feedback::decode("fresa/status/temperature", b"20"),
            Err(TelemetryError::UnexpectedTopic(t)) if t == "fresa/status/temperature"
        ));
        assert!(matches!(
            Feedback::decode("fresa/status/position", b"1,2"),
            Err(TelemetryError::Malformed { .. })
        ));
        assert!(matches!(
            Feedback::decode("error", b"lots"),
            Err(TelemetryError::Malformed { .. })
        ));
        assert!(matches!(
            Feedback::decode("fresa/status/error", &[0xff, 0xfe]),
            Err(TelemetryError::Malformed { .. })
        ));
    }

    #[test]
    fn forwarding_never_waits_on_a_full_channel() {
        let (tx, mut rx) = mpsc::channel(FEEDBACK_CAPACITY);
        for k in 0..FEEDBACK_CAPACITY * 3 {
            let payload = format!("{k},0,0");
            assert!(forward(&tx, "fresa/status/position", payload.as_bytes()));
        }
        assert!(forward(&tx, "fresa/status/temperature", b"20"));

        let mut received = 0;
        while let Ok(feedback) = rx.try_recv() {
            if received == 0 {
                assert_eq!(feedback, Feedback::Position(Point::from_xyz(0.0, 0.0, 0.0)));
            }
            received += 1;
        }
        assert_eq!(received, FEEDBACK_CAPACITY);

        // room again after draining
        assert!(forward(&tx, "fresa/status/error", b"0.5"));
        assert_eq!(rx.try_recv().unwrap(), Feedback::Error(0.5));

        drop(rx);
        assert!(!forward(&tx, "fresa/status/error", b"0.5"));
    }

    #[test]
    fn state_tracks_feedback() {
        let machine = Machine {
            offset: [1.0, 0.0, 0.0],
            ..Machine::default()
        };
        let mut state = MachineState::new(&machine);
        assert_eq!(state.error, machine.max_error);
        assert_eq!(state.setpoint, Point::from_xyz(1.0, 0.0, 0.0));
        assert!(!state.position.is_complete());

        state.apply(Feedback::Error(0.2));
        state.apply(Feedback::Position(Point::from_xyz(4.0, 5.0, 6.0)));
        assert_eq!(state.error, 0.2);
        assert_eq!(state.position, Point::from_xyz(4.0, 5.0, 6.0));
    }
}
