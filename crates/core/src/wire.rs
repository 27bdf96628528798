//! Minimal wire transcoding for [`RadiusPacket`]/[`RadiusResponse`].
//!
//! The real RADIUS wire codec (binary framing, authenticator/HMAC
//! validation against shared secrets) is an external collaborator, out of
//! scope here. This module is **not** that codec — it is a small text
//! stand-in (`Code identifier\n`, one `Name: Value` line per AVP, blank
//! line terminator) that exists only so the ingestion state machine, the
//! query handler, and the replication loop-avoidance rule can be exercised
//! over real UDP sockets in integration tests and by the CLI binary. No
//! authenticator, no RFC 2865 attribute type codes.

use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{Result, StoreError};
use crate::packet::{Avp, PacketCode, RadiusPacket, RadiusResponse};

pub fn encode_request(packet: &RadiusPacket) -> Vec<u8> {
    let mut out = format!("{} {}\n", packet.code, packet.identifier);
    for avp in &packet.attributes {
        out.push_str(&format!("{}: {}\n", avp.name, avp.value));
    }
    out.push('\n');
    out.into_bytes()
}

pub fn encode_response(resp: &RadiusResponse) -> Vec<u8> {
    let mut out = format!("{} {}\n", resp.code, resp.identifier);
    for avp in &resp.attributes {
        out.push_str(&format!("{}: {}\n", avp.name, avp.value));
    }
    out.push('\n');
    out.into_bytes()
}

fn decode_lines(text: &str) -> Option<(PacketCode, u8, Vec<Avp>)> {
    let mut lines = text.lines();
    let first = lines.next()?;
    let (code_str, id_str) = first.rsplit_once(' ')?;
    let code: PacketCode = code_str.parse().ok()?;
    let identifier: u8 = id_str.trim().parse().ok()?;

    let mut attributes = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        attributes.push(Avp::new(name.trim(), value.trim()));
    }
    Some((code, identifier, attributes))
}

pub fn decode_request(bytes: &[u8]) -> Option<RadiusPacket> {
    let text = std::str::from_utf8(bytes).ok()?;
    let (code, identifier, attributes) = decode_lines(text)?;
    Some(RadiusPacket {
        code,
        identifier,
        attributes,
    })
}

pub fn decode_response(bytes: &[u8]) -> Option<RadiusResponse> {
    let text = std::str::from_utf8(bytes).ok()?;
    let (code, identifier, attributes) = decode_lines(text)?;
    Some(RadiusResponse {
        code,
        identifier,
        attributes,
    })
}

/// Send a packet to a peer and await its response, within `timeout`. Used
/// both by the replicator (outbound accounting fan-out) and by test
/// harnesses driving two in-process servers over loopback.
pub async fn send_and_await_response(
    address: &str,
    origin_port: u16,
    packet: &RadiusPacket,
    timeout: Duration,
) -> Result<RadiusResponse> {
    let bind_addr = format!("0.0.0.0:{origin_port}");
    let socket = UdpSocket::bind(&bind_addr).await?;
    socket.connect(address).await?;
    socket.send(&encode_request(packet)).await?;

    let mut buf = [0u8; 4096];
    let n = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| StoreError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;

    decode_response(&buf[..n])
        .ok_or_else(|| StoreError::MalformedPacket("unparseable replication response".into()))
}
