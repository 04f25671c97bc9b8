//! Registry query protocol, crane side.
//!
//! Ships join with WELCOME and learn about the game through five queries.
//! Every answer is a unicast to the asking ship; queries the crane cannot
//! answer (unknown ship, full registry) get no reply and the ship retries.

use harbor_types::{Address, Message};
use harbor_world::{Registry, ShipDatabase};
use rand::Rng;
use tracing::{debug, warn};

/// Time facts a reply may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryContext {
    /// Whole seconds since the game started.
    pub elapsed_secs: u16,
    /// Whole seconds until the game ends.
    pub seconds_left: u16,
}

/// Answer a system-channel message from `sender`.
///
/// Returns the reply to unicast back, or `None` if the message is not a
/// query or cannot be answered.
pub fn answer<R: Rng + ?Sized>(
    database: &mut ShipDatabase,
    rng: &mut R,
    ctx: QueryContext,
    sender: Address,
    query: &Message,
) -> Option<Message> {
    match query {
        Message::Welcome => match database.register(sender, ctx.elapsed_secs, rng) {
            Ok(registration) => Some(Message::WelcomeResponse(*registration.record())),
            Err(e) => {
                warn!(ship = %sender, error = %e, "Registration refused");
                None
            }
        },
        Message::GameTimeQuery => Some(Message::GameTimeResponse {
            seconds_left: ctx.seconds_left,
        }),
        Message::ShipQuery { ship } => {
            let reply = database.lookup(*ship).copied().map(Message::ShipResponse);
            if reply.is_none() {
                debug!(asker = %sender, ship = %ship, "Query for unknown ship");
            }
            reply
        }
        Message::AllShipsQuery => Some(Message::AllShipsResponse(database.all_known_addresses())),
        Message::AllCargoQuery => Some(Message::AllCargoResponse(database.delivered_ships())),
        _ => None,
    }
}
