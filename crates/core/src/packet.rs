//! The decoded RADIUS packet model.
//!
//! This is the boundary type the out-of-scope RADIUS wire codec collaborator
//! produces (on ingestion) and consumes (on replication/response): by the
//! time a [`RadiusPacket`] reaches the store, framing, HMAC/authenticator
//! validation and shared-secret checks have already happened elsewhere.

use std::fmt;

/// An attribute-value pair, the unit of payload in a RADIUS packet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Avp {
    pub name: String,
    pub value: String,
}

impl Avp {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The RADIUS packet code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCode {
    AccessRequest,
    AccessAccept,
    AccessReject,
    AccountingRequest,
    AccountingResponse,
}

impl fmt::Display for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AccessRequest => "Access-Request",
            Self::AccessAccept => "Access-Accept",
            Self::AccessReject => "Access-Reject",
            Self::AccountingRequest => "Accounting-Request",
            Self::AccountingResponse => "Accounting-Response",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PacketCode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Access-Request" => Self::AccessRequest,
            "Access-Accept" => Self::AccessAccept,
            "Access-Reject" => Self::AccessReject,
            "Accounting-Request" => Self::AccountingRequest,
            "Accounting-Response" => Self::AccountingResponse,
            _ => return Err(()),
        })
    }
}

/// `Acct-Status-Type`, only meaningful on `Accounting-Request` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcctStatusType {
    Start,
    Interim,
    Stop,
}

impl std::str::FromStr for AcctStatusType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Start" => Self::Start,
            "Interim-Update" => Self::Interim,
            "Stop" => Self::Stop,
            _ => return Err(()),
        })
    }
}

/// Which RADIUS event most recently updated a session.
///
/// Ordering is the state-ordinal: `AcceptPending < Started < Interim <
/// Stopped`. `Started` and `Interim` are distinct variants (so a session's
/// `packet_type` can be reported precisely) but share ordinal rank relative
/// to `AcceptPending`/`Stopped` — merge acceptance compares `state_ordinal()`,
/// not derived `Ord`, because `Started`/`Interim` must each be able to
/// supersede the other only via the session-time/timestamp tie-breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    AcceptPending,
    Started,
    Interim,
    Stopped,
}

impl PacketType {
    /// Integer rank used for the monotone-merge comparison in
    /// [`SessionStore::push_packet`](crate::session::store::SessionStore::push_packet).
    pub fn state_ordinal(self) -> u8 {
        match self {
            Self::AcceptPending => 0,
            Self::Started => 1,
            Self::Interim => 1,
            Self::Stopped => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AcceptPending => "AcceptPending",
            Self::Started => "Start",
            Self::Interim => "Interim-Update",
            Self::Stopped => "Stop",
        }
    }
}

/// A decoded RADIUS packet, as produced by the (out-of-scope) wire codec.
#[derive(Debug, Clone)]
pub struct RadiusPacket {
    pub code: PacketCode,
    /// RADIUS identifier byte, echoed back in responses.
    pub identifier: u8,
    pub attributes: Vec<Avp>,
}

impl RadiusPacket {
    pub fn new(code: PacketCode, identifier: u8) -> Self {
        Self {
            code,
            identifier,
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Avp::new(name, value));
        self
    }

    /// First value for a given attribute name, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// All values for a given attribute name, in order (e.g. `SessionStore-SeenBy`).
    pub fn attrs(&self, name: &str) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.name == name)
            .map(|a| a.value.as_str())
            .collect()
    }

    /// Derive the `PacketType` from code + `Acct-Status-Type`. Returns
    /// `None` for an unrecognized code/status combination — caller rejects
    /// as malformed.
    pub fn packet_type(&self) -> Option<PacketType> {
        match self.code {
            PacketCode::AccessRequest => Some(PacketType::AcceptPending),
            PacketCode::AccountingRequest => match self.attr("Acct-Status-Type")?.parse().ok()? {
                AcctStatusType::Start => Some(PacketType::Started),
                AcctStatusType::Interim => Some(PacketType::Interim),
                AcctStatusType::Stop => Some(PacketType::Stopped),
            },
            _ => None,
        }
    }

    /// Append a `SessionStore-SeenBy` value, used for replication loop
    /// avoidance.
    pub fn append_seen_by(&mut self, server_name: &str) {
        self.attributes
            .push(Avp::new("SessionStore-SeenBy", server_name));
    }

    pub fn seen_by(&self) -> Vec<&str> {
        self.attrs("SessionStore-SeenBy")
    }
}

/// A RADIUS response packet built from an ingestion outcome.
#[derive(Debug, Clone)]
pub struct RadiusResponse {
    pub code: PacketCode,
    pub identifier: u8,
    pub attributes: Vec<Avp>,
}

impl RadiusResponse {
    pub fn accept(identifier: u8) -> Self {
        Self {
            code: PacketCode::AccessAccept,
            identifier,
            attributes: Vec::new(),
        }
    }

    pub fn accounting_response(identifier: u8) -> Self {
        Self {
            code: PacketCode::AccountingResponse,
            identifier,
            attributes: Vec::new(),
        }
    }

    pub fn reject(identifier: u8, reply_message: impl Into<String>) -> Self {
        Self {
            code: PacketCode::AccessReject,
            identifier,
            attributes: vec![Avp::new("Reply-Message", reply_message)],
        }
    }
}
