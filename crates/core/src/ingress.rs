//! Translates a decoded RADIUS request into an `Update` command and builds
//! the RADIUS response from the outcome.

use crate::actor::{SessionServerHandle, UpdateOutcome};
use crate::packet::{PacketCode, RadiusPacket, RadiusResponse};

/// Submit one decoded request to the actor and build the RADIUS response.
///
/// Appends this server's own name to `SessionStore-SeenBy` on the
/// *incoming* packet before submission, so that any outbound replication
/// this update triggers correctly avoids echoing back to whoever sent it
/// to us.
///
/// Returns `None` when the caller should drop the packet silently
/// (malformed input, or the actor has begun shutdown).
pub async fn handle_request(
    handle: &SessionServerHandle,
    mut packet: RadiusPacket,
    server_name: &str,
) -> Option<RadiusResponse> {
    packet.append_seen_by(server_name);
    let identifier = packet.identifier;
    let code = packet.code;

    match handle.update(packet).await {
        Ok(UpdateOutcome::Accepted) => Some(match code {
            PacketCode::AccessRequest => RadiusResponse::accept(identifier),
            _ => RadiusResponse::accounting_response(identifier),
        }),
        Ok(UpdateOutcome::DuplicateIndex { index }) => Some(RadiusResponse::reject(
            identifier,
            format!("Duplicated entry for index {index}"),
        )),
        Ok(UpdateOutcome::Malformed) | Err(_) => None,
    }
}
