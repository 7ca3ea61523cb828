//! Subjects an approval can protect: a managed client endpoint or a hunt.
use std::fmt;

use crate::error::ApprovalError;

const CLIENT_PREFIX: &str = "C.";
const CLIENT_HEX_LEN: usize = 16;
const HUNT_PREFIX: &str = "H:";
const HUNT_MIN_LEN: usize = 1;
const HUNT_MAX_LEN: usize = 16;

/// Identifier of a managed client, `C.` followed by 16 hex digits, kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

/// Identifier of a hunt: up to 16 hex digits, optionally behind the legacy `H:`
/// prefix. Kept exactly as given so it matches the hunt it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HuntId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Client,
    Hunt,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Subject {
    #[n(0)]
    Client {
        #[n(0)]
        client_id: ClientId,
    },
    #[n(1)]
    Hunt {
        #[n(0)]
        hunt_id: HuntId,
    },
}

impl ClientId {
    pub fn parse(raw: &str) -> Result<Self, ApprovalError> {
        let digits = raw.strip_prefix(CLIENT_PREFIX).ok_or_else(|| {
            ApprovalError::InvalidSubject(format!("client id {raw:?} must start with {CLIENT_PREFIX}"))
        })?;
        if digits.len() != CLIENT_HEX_LEN || hex::decode(digits).is_err() {
            return Err(ApprovalError::InvalidSubject(format!(
                "client id {raw:?} must carry {CLIENT_HEX_LEN} hex digits"
            )));
        }

        Ok(Self(raw.to_owned()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl HuntId {
    pub fn parse(raw: &str) -> Result<Self, ApprovalError> {
        let digits = raw.strip_prefix(HUNT_PREFIX).unwrap_or(raw);
        let len_ok = (HUNT_MIN_LEN..=HUNT_MAX_LEN).contains(&digits.len());
        // legacy ids are formatted with %X, so odd lengths are fine
        if !len_ok || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ApprovalError::InvalidSubject(format!(
                "hunt id {raw:?} must carry {HUNT_MIN_LEN} to {HUNT_MAX_LEN} hex digits"
            )));
        }

        Ok(Self(raw.to_owned()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Subject {
    pub fn client(raw: &str) -> Result<Self, ApprovalError> {
        Ok(Subject::Client {
            client_id: ClientId::parse(raw)?,
        })
    }
    pub fn hunt(raw: &str) -> Result<Self, ApprovalError> {
        Ok(Subject::Hunt {
            hunt_id: HuntId::parse(raw)?,
        })
    }
    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Client { .. } => SubjectKind::Client,
            Subject::Hunt { .. } => SubjectKind::Hunt,
        }
    }
    /// Stable identifier of the protected resource, regardless of kind.
    pub fn id(&self) -> &str {
        match self {
            Subject::Client { client_id } => client_id.as_str(),
            Subject::Hunt { hunt_id } => hunt_id.as_str(),
        }
    }
    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            Subject::Client { client_id } => Some(client_id),
            Subject::Hunt { .. } => None,
        }
    }
    pub fn hunt_id(&self) -> Option<&HuntId> {
        match self {
            Subject::Hunt { hunt_id } => Some(hunt_id),
            Subject::Client { .. } => None,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Client => f.write_str("client"),
            SubjectKind::Hunt => f.write_str("hunt"),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for HuntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for ClientId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ClientId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        ClientId::parse(d.str()?).map_err(|_| minicbor::decode::Error::message("malformed client id"))
    }
}

impl<C> minicbor::Encode<C> for HuntId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for HuntId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        HuntId::parse(d.str()?).map_err(|_| minicbor::decode::Error::message("malformed hunt id"))
    }
}
