//! Simulated radio medium.
//!
//! Every frame put on the air reaches every attached node, each of which
//! may independently miss it with the configured loss probability. A node
//! transmits through a [`Transmitter`]: frames wait in a bounded queue and
//! a gate task puts them on the air one at a time, holding the channel
//! for the frame's airtime. A full queue drops the frame.
//!
//! The destination travels next to the encoded payload, never inside it.

use std::time::Duration;

use harbor_types::{Address, Channel, Destination, Message, Packet};
use rand::Rng;
use rand::rngs::SmallRng;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Tunables of the medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioSettings {
    /// Probability that a receiver misses a frame.
    pub loss_probability: f64,
    /// Time a frame occupies the sender's channel.
    pub airtime: Duration,
    /// Frames a node may queue for transmission.
    pub queue_capacity: usize,
    /// Frames buffered on the air for slow receivers.
    pub channel_capacity: usize,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
            airtime: Duration::from_millis(5),
            queue_capacity: 16,
            channel_capacity: 1024,
        }
    }
}

/// One transmission on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical channel of the payload.
    pub channel: Channel,
    /// Transmitting node.
    pub source: Address,
    /// Intended receivers.
    pub destination: Destination,
    /// Encoded [`Packet`].
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decode the payload, checking it against the frame's channel.
    ///
    /// Returns `None` (and logs) for anything that cannot be trusted.
    pub fn decode(&self) -> Option<Packet> {
        match Packet::decode(&self.payload) {
            Ok(packet) if packet.message.channel() == self.channel => Some(packet),
            Ok(packet) => {
                warn!(
                    source = %self.source,
                    channel = ?self.channel,
                    kind = ?packet.message.kind(),
                    "Message on the wrong channel dropped"
                );
                None
            }
            Err(e) => {
                debug!(source = %self.source, error = %e, "Undecodable frame dropped");
                None
            }
        }
    }
}

/// The shared medium.
#[derive(Debug, Clone)]
pub struct Radio {
    air: broadcast::Sender<Frame>,
    settings: RadioSettings,
}

impl Radio {
    /// An empty medium.
    pub fn new(settings: RadioSettings) -> Self {
        let (air, _) = broadcast::channel(settings.channel_capacity.max(1));
        Self { air, settings }
    }

    /// Start listening as `me`. Frames sent before this call are not seen.
    pub fn attach(&self, me: Address, rng: SmallRng) -> Inbox {
        Inbox {
            me,
            air: self.air.subscribe(),
            loss_probability: self.settings.loss_probability.clamp(0.0, 1.0),
            rng,
        }
    }

    /// A transmitter for `me` and the gate task draining it.
    ///
    /// The gate stops once every clone of the transmitter is dropped.
    /// Must be called inside a tokio runtime.
    pub fn transmitter(&self, me: Address) -> (Transmitter, JoinHandle<()>) {
        let (queue, pending) = mpsc::channel(self.settings.queue_capacity.max(1));
        let gate = tokio::spawn(run_gate(pending, self.air.clone(), self.settings.airtime));
        (Transmitter { me, queue }, gate)
    }
}

/// Put queued frames on the air, one airtime each.
async fn run_gate(mut pending: mpsc::Receiver<Frame>, air: broadcast::Sender<Frame>, airtime: Duration) {
    while let Some(frame) = pending.recv().await {
        tokio::time::sleep(airtime).await;
        let source = frame.source;
        if air.send(frame).is_err() {
            trace!(source = %source, "Nobody listening");
        }
    }
}

/// A node's sending side.
#[derive(Debug, Clone)]
pub struct Transmitter {
    me: Address,
    queue: mpsc::Sender<Frame>,
}

impl Transmitter {
    /// Queue `message` for `destination`. Returns whether it was queued.
    pub fn send(&self, destination: Destination, message: Message) -> bool {
        let channel = message.channel();
        let kind = message.kind();
        let payload = match Packet::new(self.me, message).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(node = %self.me, kind = ?kind, error = %e, "Message cannot be encoded");
                return false;
            }
        };
        let frame = Frame {
            channel,
            source: self.me,
            destination,
            payload,
        };
        match self.queue.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(node = %self.me, kind = ?kind, "Transmit queue full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(node = %self.me, kind = ?kind, "Transmitter closed");
                false
            }
        }
    }
}

/// A node's receiving side.
#[derive(Debug)]
pub struct Inbox {
    me: Address,
    air: broadcast::Receiver<Frame>,
    loss_probability: f64,
    rng: SmallRng,
}

impl Inbox {
    /// The next frame for this node that survived the air, or `None` once
    /// the medium is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.air.recv().await {
                Ok(frame) => {
                    if frame.source == self.me || !frame.destination.accepts(self.me) {
                        continue;
                    }
                    if self.loss_probability > 0.0 && self.rng.random_bool(self.loss_probability) {
                        trace!(node = %self.me, source = %frame.source, "Frame lost");
                        continue;
                    }
                    return Some(frame);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(node = %self.me, skipped, "Receiver fell behind, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use harbor_types::Command;
    use rand::SeedableRng;

    use super::*;

    fn rng(seed: u64) -> SmallRng {
        SmallRng::seed_from_u64(seed)
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_reaches_everyone_but_the_sender() {
        let radio = Radio::new(RadioSettings::default());
        let mut a = radio.attach(Address(1), rng(1));
        let mut b = radio.attach(Address(2), rng(2));
        let (tx, _gate) = radio.transmitter(Address(1));
        let (tx_b, _gate_b) = radio.transmitter(Address(2));

        assert!(tx.send(Destination::Broadcast, Message::RootClaim));
        let frame = b.recv().await.unwrap();
        assert_eq!(frame.source, Address(1));
        assert_eq!(frame.channel, Channel::Ship);
        assert_eq!(frame.decode().unwrap().message, Message::RootClaim);

        // `a` skips its own frame and sees the next one from `b`.
        assert!(tx_b.send(Destination::Broadcast, Message::Welcome));
        assert_eq!(a.recv().await.unwrap().source, Address(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unicast_reaches_only_its_addressee() {
        let radio = Radio::new(RadioSettings::default());
        let mut two = radio.attach(Address(2), rng(1));
        let mut three = radio.attach(Address(3), rng(2));
        let (tx, _gate) = radio.transmitter(Address(1));

        tx.send(Destination::Unicast(Address(3)), Message::StartCoop { target: Address(3) });
        tx.send(Destination::Broadcast, Message::RootClaim);

        assert_eq!(
            three.recv().await.unwrap().decode().unwrap().message,
            Message::StartCoop { target: Address(3) }
        );
        assert_eq!(
            two.recv().await.unwrap().decode().unwrap().message,
            Message::RootClaim
        );
    }

    #[tokio::test(start_paused = true)]
    async fn total_loss_hears_nothing() {
        let radio = Radio::new(RadioSettings {
            loss_probability: 1.0,
            ..RadioSettings::default()
        });
        let mut deaf = radio.attach(Address(2), rng(1));
        let (tx, _gate) = radio.transmitter(Address(1));
        tx.send(Destination::Broadcast, Message::RootClaim);
        let heard = tokio::time::timeout(Duration::from_secs(1), deaf.recv()).await;
        assert!(heard.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn airtime_serializes_frames() {
        let radio = Radio::new(RadioSettings {
            airtime: Duration::from_millis(40),
            ..RadioSettings::default()
        });
        let mut rx = radio.attach(Address(2), rng(1));
        let (tx, _gate) = radio.transmitter(Address(1));
        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            tx.send(
                Destination::Broadcast,
                Message::CraneCommand {
                    command: Command::Up,
                },
            );
        }
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops() {
        let radio = Radio::new(RadioSettings {
            queue_capacity: 1,
            airtime: Duration::from_secs(1),
            ..RadioSettings::default()
        });
        let (tx, _gate) = radio.transmitter(Address(1));
        // The gate takes the first frame off the queue only when it runs.
        assert!(tx.send(Destination::Broadcast, Message::RootClaim));
        assert!(!tx.send(Destination::Broadcast, Message::RootClaim));
    }

    #[test]
    fn wrong_channel_is_rejected() {
        let payload = Packet::new(Address(1), Message::RootClaim).encode().unwrap();
        let frame = Frame {
            channel: Channel::Crane,
            source: Address(1),
            destination: Destination::Broadcast,
            payload,
        };
        assert!(frame.decode().is_none());
    }
}
