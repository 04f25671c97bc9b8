//! Packet codec for the radio.
//!
//! Every packet starts with a one-byte [`MessageKind`] tag followed by the
//! sender's address (big-endian `u16`) and the kind-specific fields. Each
//! kind has an exact payload size (list kinds carry an explicit count); a
//! packet whose length disagrees with its kind is rejected as a whole and
//! never partially parsed.
//!
//! The radio destination is not part of the packet. It travels next to the
//! payload in the transport frame.

use serde::{Deserialize, Serialize};

use crate::enums::{Channel, Command};
use crate::ids::Address;
use crate::structs::{GridPoint, MAX_SHIPS, ShipRecord};

/// Tag byte plus sender address.
const HEADER_LEN: usize = 3;

/// Encoded size of a [`ShipRecord`]: address, deadline, x, y, cargo flag.
const SHIP_INFO_LEN: usize = 7;

/// x, y, cargo flag, crane round.
const LOCATION_LEN: usize = 7;

/// Crane round, round, value.
const PHASE1_LEN: usize = 7;

/// Crane round, round, value, decided flag.
const PHASE2_LEN: usize = 8;

/// Errors produced while decoding or encoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The packet has no bytes at all.
    #[error("empty packet")]
    Empty,

    /// The tag byte does not name a known message kind.
    #[error("unknown message kind {tag}")]
    UnknownKind {
        /// The offending tag byte.
        tag: u8,
    },

    /// The packet length does not match the declared size of its kind.
    #[error("{kind:?} packet must be {expected} bytes, got {actual}")]
    Length {
        /// The kind named by the tag byte.
        kind: MessageKind,
        /// The size this kind requires.
        expected: usize,
        /// The size actually received.
        actual: usize,
    },

    /// A command field holds a value outside the command set.
    #[error("unknown command value {value}")]
    UnknownCommand {
        /// The offending byte.
        value: u8,
    },

    /// A boolean field holds something other than 0 or 1.
    #[error("invalid flag byte {value}")]
    InvalidFlag {
        /// The offending byte.
        value: u8,
    },

    /// A list carries more entries than a game can have ships.
    #[error("list of {count} entries exceeds the ship limit")]
    TooManyEntries {
        /// Number of entries declared or supplied.
        count: usize,
    },
}

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// The tag identifying a message layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// A ship's vote for the next crane move.
    CraneCommand = 111,
    /// The crane's state after a round (or on request).
    CraneLocation = 112,
    /// A ship asks to join the game.
    Welcome = 115,
    /// Ask how long the game still runs.
    GameTimeQuery = 116,
    /// Ask for one ship's record.
    ShipQuery = 117,
    /// Ask for every registered ship address.
    AllShipsQuery = 118,
    /// Ask for every ship whose cargo was delivered.
    AllCargoQuery = 119,
    /// Registration reply carrying the new ship's record.
    WelcomeResponse = 121,
    /// Seconds left in the game.
    GameTimeResponse = 122,
    /// One ship's record.
    ShipResponse = 123,
    /// Every registered ship address.
    AllShipsResponse = 124,
    /// Every ship whose cargo was delivered.
    AllCargoResponse = 125,
    /// Cooperation handshake, step one.
    StartCoop = 131,
    /// Cooperation handshake, step two.
    AnswerCoop = 132,
    /// Cooperation handshake, step three.
    ConfirmCoop = 133,
    /// A ship announces which root it follows.
    BranchInfo = 134,
    /// A ship announces itself as a neighbourhood root.
    RootClaim = 135,
    /// Consensus phase-one vote.
    ConsensusPhase1 = 136,
    /// Consensus phase-two vote.
    ConsensusPhase2 = 137,
}

impl MessageKind {
    /// Decode a tag byte.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            111 => Some(Self::CraneCommand),
            112 => Some(Self::CraneLocation),
            115 => Some(Self::Welcome),
            116 => Some(Self::GameTimeQuery),
            117 => Some(Self::ShipQuery),
            118 => Some(Self::AllShipsQuery),
            119 => Some(Self::AllCargoQuery),
            121 => Some(Self::WelcomeResponse),
            122 => Some(Self::GameTimeResponse),
            123 => Some(Self::ShipResponse),
            124 => Some(Self::AllShipsResponse),
            125 => Some(Self::AllCargoResponse),
            131 => Some(Self::StartCoop),
            132 => Some(Self::AnswerCoop),
            133 => Some(Self::ConfirmCoop),
            134 => Some(Self::BranchInfo),
            135 => Some(Self::RootClaim),
            136 => Some(Self::ConsensusPhase1),
            137 => Some(Self::ConsensusPhase2),
            _ => None,
        }
    }

    /// The tag byte.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// The channel messages of this kind travel on.
    pub const fn channel(self) -> Channel {
        match self {
            Self::CraneCommand | Self::CraneLocation => Channel::Crane,
            Self::Welcome
            | Self::GameTimeQuery
            | Self::ShipQuery
            | Self::AllShipsQuery
            | Self::AllCargoQuery
            | Self::WelcomeResponse
            | Self::GameTimeResponse
            | Self::ShipResponse
            | Self::AllShipsResponse
            | Self::AllCargoResponse => Channel::System,
            Self::StartCoop
            | Self::AnswerCoop
            | Self::ConfirmCoop
            | Self::BranchInfo
            | Self::RootClaim
            | Self::ConsensusPhase1
            | Self::ConsensusPhase2 => Channel::Ship,
        }
    }

    /// Size of the fields after the header, or `None` for list kinds whose
    /// size depends on their entry count.
    const fn body_len(self) -> Option<usize> {
        match self {
            Self::Welcome
            | Self::GameTimeQuery
            | Self::AllShipsQuery
            | Self::AllCargoQuery
            | Self::RootClaim => Some(0),
            Self::CraneCommand => Some(1),
            Self::ShipQuery | Self::GameTimeResponse | Self::StartCoop | Self::BranchInfo => {
                Some(2)
            }
            Self::AnswerCoop | Self::ConfirmCoop => Some(3),
            Self::CraneLocation => Some(LOCATION_LEN),
            Self::WelcomeResponse | Self::ShipResponse => Some(SHIP_INFO_LEN),
            Self::ConsensusPhase1 => Some(PHASE1_LEN),
            Self::ConsensusPhase2 => Some(PHASE2_LEN),
            Self::AllShipsResponse | Self::AllCargoResponse => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A decoded message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A ship's vote for the next crane move.
    CraneCommand {
        /// The voted command.
        command: Command,
    },
    /// The crane's state.
    CraneLocation {
        /// Crane position.
        position: GridPoint,
        /// Whether cargo was placed at `position` in the last round.
        cargo_placed: bool,
        /// Number of rounds the crane has completed.
        crane_round: u32,
    },
    /// Join request.
    Welcome,
    /// Remaining game time request.
    GameTimeQuery,
    /// Ship record request.
    ShipQuery {
        /// The ship asked about.
        ship: Address,
    },
    /// Ship roster request.
    AllShipsQuery,
    /// Delivered-cargo roster request.
    AllCargoQuery,
    /// Registration reply.
    WelcomeResponse(ShipRecord),
    /// Remaining game time.
    GameTimeResponse {
        /// Whole seconds until the game ends.
        seconds_left: u16,
    },
    /// One ship's record.
    ShipResponse(ShipRecord),
    /// All registered ships.
    AllShipsResponse(Vec<Address>),
    /// All ships with delivered cargo.
    AllCargoResponse(Vec<Address>),
    /// Invite the nearest ship to cooperate.
    StartCoop {
        /// The invited ship.
        target: Address,
    },
    /// Reply to an invitation.
    AnswerCoop {
        /// Ship the pair should serve first.
        coop_addr: Address,
        /// Whether the invitation is accepted.
        agreement: bool,
    },
    /// Final handshake step.
    ConfirmCoop {
        /// Ship the pair serves.
        coop_addr: Address,
        /// Whether the pairing is confirmed.
        agreement: bool,
    },
    /// The sender follows `root`.
    BranchInfo {
        /// Root the sender parrots.
        root: Address,
    },
    /// The sender is a neighbourhood root.
    RootClaim,
    /// Consensus phase-one vote.
    ConsensusPhase1 {
        /// Crane round the vote belongs to.
        crane_round: u32,
        /// Consensus round within the crane round, starting at 1.
        round: u16,
        /// Proposed command.
        value: Command,
    },
    /// Consensus phase-two vote.
    ConsensusPhase2 {
        /// Crane round the vote belongs to.
        crane_round: u32,
        /// Consensus round within the crane round, starting at 1.
        round: u16,
        /// Tentative value, `NoCommand` when undecided.
        value: Command,
        /// Whether the sender saw a majority in phase one.
        decided: bool,
    },
}

impl Message {
    /// The kind tag of this message.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::CraneCommand { .. } => MessageKind::CraneCommand,
            Self::CraneLocation { .. } => MessageKind::CraneLocation,
            Self::Welcome => MessageKind::Welcome,
            Self::GameTimeQuery => MessageKind::GameTimeQuery,
            Self::ShipQuery { .. } => MessageKind::ShipQuery,
            Self::AllShipsQuery => MessageKind::AllShipsQuery,
            Self::AllCargoQuery => MessageKind::AllCargoQuery,
            Self::WelcomeResponse(_) => MessageKind::WelcomeResponse,
            Self::GameTimeResponse { .. } => MessageKind::GameTimeResponse,
            Self::ShipResponse(_) => MessageKind::ShipResponse,
            Self::AllShipsResponse(_) => MessageKind::AllShipsResponse,
            Self::AllCargoResponse(_) => MessageKind::AllCargoResponse,
            Self::StartCoop { .. } => MessageKind::StartCoop,
            Self::AnswerCoop { .. } => MessageKind::AnswerCoop,
            Self::ConfirmCoop { .. } => MessageKind::ConfirmCoop,
            Self::BranchInfo { .. } => MessageKind::BranchInfo,
            Self::RootClaim => MessageKind::RootClaim,
            Self::ConsensusPhase1 { .. } => MessageKind::ConsensusPhase1,
            Self::ConsensusPhase2 { .. } => MessageKind::ConsensusPhase2,
        }
    }

    /// The channel this message travels on.
    pub const fn channel(&self) -> Channel {
        self.kind().channel()
    }
}

/// A message together with its sender, as carried in a frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Address of the node that sent the packet.
    pub sender: Address,
    /// The message body.
    pub message: Message,
}

impl Packet {
    /// Wrap a message from `sender`.
    pub const fn new(sender: Address, message: Message) -> Self {
        Self { sender, message }
    }

    /// Encode into bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::TooManyEntries`] if a roster list is longer
    /// than [`MAX_SHIPS`].
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(HEADER_LEN.saturating_add(SHIP_INFO_LEN));
        out.push(self.message.kind().tag());
        out.extend_from_slice(&self.sender.0.to_be_bytes());

        match &self.message {
            Message::Welcome
            | Message::GameTimeQuery
            | Message::AllShipsQuery
            | Message::AllCargoQuery
            | Message::RootClaim => {}
            Message::CraneCommand { command } => out.push(command.as_u8()),
            Message::CraneLocation {
                position,
                cargo_placed,
                crane_round,
            } => {
                out.push(position.x);
                out.push(position.y);
                out.push(u8::from(*cargo_placed));
                out.extend_from_slice(&crane_round.to_be_bytes());
            }
            Message::ShipQuery { ship: addr }
            | Message::StartCoop { target: addr }
            | Message::BranchInfo { root: addr } => {
                out.extend_from_slice(&addr.0.to_be_bytes());
            }
            Message::WelcomeResponse(record) | Message::ShipResponse(record) => {
                write_ship_info(&mut out, record);
            }
            Message::GameTimeResponse { seconds_left } => {
                out.extend_from_slice(&seconds_left.to_be_bytes());
            }
            Message::AllShipsResponse(list) | Message::AllCargoResponse(list) => {
                let count = u8::try_from(list.len())
                    .ok()
                    .filter(|n| usize::from(*n) <= MAX_SHIPS)
                    .ok_or(WireError::TooManyEntries { count: list.len() })?;
                out.push(count);
                for addr in list {
                    out.extend_from_slice(&addr.0.to_be_bytes());
                }
            }
            Message::AnswerCoop {
                coop_addr,
                agreement,
            }
            | Message::ConfirmCoop {
                coop_addr,
                agreement,
            } => {
                out.extend_from_slice(&coop_addr.0.to_be_bytes());
                out.push(u8::from(*agreement));
            }
            Message::ConsensusPhase1 {
                crane_round,
                round,
                value,
            } => {
                out.extend_from_slice(&crane_round.to_be_bytes());
                out.extend_from_slice(&round.to_be_bytes());
                out.push(value.as_u8());
            }
            Message::ConsensusPhase2 {
                crane_round,
                round,
                value,
                decided,
            } => {
                out.extend_from_slice(&crane_round.to_be_bytes());
                out.extend_from_slice(&round.to_be_bytes());
                out.push(value.as_u8());
                out.push(u8::from(*decided));
            }
        }
        Ok(out)
    }

    /// Decode from bytes, checking the exact size for the kind first.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] describing the first violation found; no
    /// partially decoded packet is ever returned.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let tag = *bytes.first().ok_or(WireError::Empty)?;
        let kind = MessageKind::from_tag(tag).ok_or(WireError::UnknownKind { tag })?;
        let expected = expected_len(kind, bytes)?;
        if bytes.len() != expected {
            return Err(WireError::Length {
                kind,
                expected,
                actual: bytes.len(),
            });
        }

        let mut reader = Reader::new(bytes.get(1..).unwrap_or_default());
        let sender = Address(reader.u16()?);
        let message = match kind {
            MessageKind::CraneCommand => Message::CraneCommand {
                command: reader.command()?,
            },
            MessageKind::CraneLocation => Message::CraneLocation {
                position: GridPoint::new(reader.u8()?, reader.u8()?),
                cargo_placed: reader.flag()?,
                crane_round: reader.u32()?,
            },
            MessageKind::Welcome => Message::Welcome,
            MessageKind::GameTimeQuery => Message::GameTimeQuery,
            MessageKind::ShipQuery => Message::ShipQuery {
                ship: reader.address()?,
            },
            MessageKind::AllShipsQuery => Message::AllShipsQuery,
            MessageKind::AllCargoQuery => Message::AllCargoQuery,
            MessageKind::WelcomeResponse => Message::WelcomeResponse(reader.ship_info()?),
            MessageKind::GameTimeResponse => Message::GameTimeResponse {
                seconds_left: reader.u16()?,
            },
            MessageKind::ShipResponse => Message::ShipResponse(reader.ship_info()?),
            MessageKind::AllShipsResponse => Message::AllShipsResponse(reader.address_list()?),
            MessageKind::AllCargoResponse => Message::AllCargoResponse(reader.address_list()?),
            MessageKind::StartCoop => Message::StartCoop {
                target: reader.address()?,
            },
            MessageKind::AnswerCoop => Message::AnswerCoop {
                coop_addr: reader.address()?,
                agreement: reader.flag()?,
            },
            MessageKind::ConfirmCoop => Message::ConfirmCoop {
                coop_addr: reader.address()?,
                agreement: reader.flag()?,
            },
            MessageKind::BranchInfo => Message::BranchInfo {
                root: reader.address()?,
            },
            MessageKind::RootClaim => Message::RootClaim,
            MessageKind::ConsensusPhase1 => Message::ConsensusPhase1 {
                crane_round: reader.u32()?,
                round: reader.u16()?,
                value: reader.command()?,
            },
            MessageKind::ConsensusPhase2 => Message::ConsensusPhase2 {
                crane_round: reader.u32()?,
                round: reader.u16()?,
                value: reader.command()?,
                decided: reader.flag()?,
            },
        };
        Ok(Self { sender, message })
    }
}

/// Exact packet size for `kind`, reading the entry count for list kinds.
fn expected_len(kind: MessageKind, bytes: &[u8]) -> Result<usize, WireError> {
    if let Some(body) = kind.body_len() {
        return Ok(HEADER_LEN.saturating_add(body));
    }
    let count = usize::from(*bytes.get(HEADER_LEN).ok_or(WireError::Length {
        kind,
        expected: HEADER_LEN.saturating_add(1),
        actual: bytes.len(),
    })?);
    if count > MAX_SHIPS {
        return Err(WireError::TooManyEntries { count });
    }
    Ok(HEADER_LEN.saturating_add(1).saturating_add(count.saturating_mul(2)))
}

fn write_ship_info(out: &mut Vec<u8>, record: &ShipRecord) {
    out.extend_from_slice(&record.address.0.to_be_bytes());
    out.extend_from_slice(&record.load_deadline.to_be_bytes());
    out.push(record.position.x);
    out.push(record.position.y);
    out.push(u8::from(record.cargo_loaded));
}

/// Sequential big-endian reader over a length-checked payload.
struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        let (first, rest) = self.bytes.split_first().ok_or(WireError::Empty)?;
        self.bytes = rest;
        Ok(*first)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes([
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
        ]))
    }

    fn address(&mut self) -> Result<Address, WireError> {
        Ok(Address(self.u16()?))
    }

    fn flag(&mut self) -> Result<bool, WireError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(WireError::InvalidFlag { value }),
        }
    }

    fn command(&mut self) -> Result<Command, WireError> {
        let value = self.u8()?;
        Command::from_u8(value).ok_or(WireError::UnknownCommand { value })
    }

    fn ship_info(&mut self) -> Result<ShipRecord, WireError> {
        let address = self.address()?;
        let load_deadline = self.u16()?;
        let position = GridPoint::new(self.u8()?, self.u8()?);
        let cargo_loaded = self.flag()?;
        Ok(ShipRecord {
            address,
            in_game: true,
            position,
            cargo_loaded,
            load_deadline,
        })
    }

    fn address_list(&mut self) -> Result<Vec<Address>, WireError> {
        let count = self.u8()?;
        (0..count).map(|_| self.address()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn round_trip(message: Message) {
        let packet = Packet::new(Address(21), message);
        let bytes = packet.encode().unwrap();
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn representative_messages_round_trip() {
        round_trip(Message::CraneCommand {
            command: Command::PlaceCargo,
        });
        round_trip(Message::CraneLocation {
            position: GridPoint::new(7, 29),
            cargo_placed: true,
            crane_round: 70_000,
        });
        round_trip(Message::WelcomeResponse(ShipRecord::new(
            Address(21),
            GridPoint::new(3, 4),
            420,
        )));
        round_trip(Message::AllCargoResponse(vec![Address(1), Address(2)]));
        round_trip(Message::AllShipsResponse(Vec::new()));
        round_trip(Message::ConsensusPhase2 {
            crane_round: 9,
            round: 3,
            value: Command::NoCommand,
            decided: false,
        });
    }

    #[test]
    fn header_layout_is_tag_then_big_endian_sender() {
        let bytes = Packet::new(Address(0x0102), Message::Welcome)
            .encode()
            .unwrap();
        assert_eq!(bytes, vec![115, 0x01, 0x02]);
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let mut bytes = Packet::new(
            Address(5),
            Message::CraneCommand {
                command: Command::Up,
            },
        )
        .encode()
        .unwrap();
        bytes.push(0);
        assert_eq!(
            Packet::decode(&bytes),
            Err(WireError::Length {
                kind: MessageKind::CraneCommand,
                expected: 4,
                actual: 5,
            })
        );
    }

    #[test]
    fn undersized_packet_is_rejected() {
        let bytes = Packet::new(Address(5), Message::StartCoop { target: Address(6) })
            .encode()
            .unwrap();
        let short = bytes.get(..bytes.len().saturating_sub(1)).unwrap();
        assert!(matches!(
            Packet::decode(short),
            Err(WireError::Length { .. })
        ));
    }

    #[test]
    fn list_length_must_match_count() {
        // Declares two entries, carries one.
        let bytes = [124, 0, 13, 2, 0, 1];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(WireError::Length { expected: 8, .. })
        ));
        let too_many = [124, 0, 13, 11];
        assert_eq!(
            Packet::decode(&too_many),
            Err(WireError::TooManyEntries { count: 11 })
        );
    }

    #[test]
    fn unknown_kind_and_values_are_rejected() {
        assert_eq!(Packet::decode(&[]), Err(WireError::Empty));
        assert_eq!(
            Packet::decode(&[200, 0, 1]),
            Err(WireError::UnknownKind { tag: 200 })
        );
        assert_eq!(
            Packet::decode(&[111, 0, 1, 9]),
            Err(WireError::UnknownCommand { value: 9 })
        );
        assert_eq!(
            Packet::decode(&[132, 0, 1, 0, 2, 7]),
            Err(WireError::InvalidFlag { value: 7 })
        );
    }

    #[test]
    fn encoding_refuses_oversized_rosters() {
        let list = (0..11).map(Address).collect();
        let packet = Packet::new(Address(13), Message::AllShipsResponse(list));
        assert_eq!(
            packet.encode(),
            Err(WireError::TooManyEntries { count: 11 })
        );
    }

    #[test]
    fn channels_follow_kind() {
        assert_eq!(Message::Welcome.channel(), Channel::System);
        assert_eq!(Message::RootClaim.channel(), Channel::Ship);
        assert_eq!(
            Message::CraneCommand {
                command: Command::Up
            }
            .channel(),
            Channel::Crane
        );
    }
}
