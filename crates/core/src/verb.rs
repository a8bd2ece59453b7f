//! Request verbs and the permission bitmask built from them.
//!
//! Every verb owns one stable bit. Grants and exception rules are stored as
//! the raw integer mask (`GET | POST | PUT | PATCH | DELETE == 31`).

use core::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GatewayError;

/// A recognized request verb.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// The single-bit mask for this verb.
    pub fn mask(self) -> VerbMask {
        match self {
            Verb::Get => VerbMask::GET,
            Verb::Post => VerbMask::POST,
            Verb::Put => VerbMask::PUT,
            Verb::Patch => VerbMask::PATCH,
            Verb::Delete => VerbMask::DELETE,
        }
    }
}

impl core::fmt::Display for Verb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = GatewayError;

    /// Anything outside the five recognized tokens is rejected; an unknown
    /// verb usually means verb tunneling and must never be masked to zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "PATCH" => Ok(Verb::Patch),
            "DELETE" => Ok(Verb::Delete),
            _ => Err(GatewayError::method_not_allowed(format!(
                "verb '{s}' is not supported"
            ))),
        }
    }
}

bitflags! {
    /// Set of verbs permitted on a (service, resource) pair.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VerbMask: u8 {
        const GET    = 0b0000_0001;
        const POST   = 0b0000_0010;
        const PUT    = 0b0000_0100;
        const PATCH  = 0b0000_1000;
        const DELETE = 0b0001_0000;
    }
}

impl VerbMask {
    pub const NONE: VerbMask = VerbMask::empty();
    pub const ALL: VerbMask = VerbMask::all();

    pub fn allows(self, verb: Verb) -> bool {
        self.intersects(verb.mask())
    }

    /// Verbs contained in the mask, in bit order.
    pub fn verbs(self) -> Vec<Verb> {
        Verb::ALL.into_iter().filter(|v| self.allows(*v)).collect()
    }
}

impl Default for VerbMask {
    fn default() -> Self {
        VerbMask::NONE
    }
}

impl From<Verb> for VerbMask {
    fn from(value: Verb) -> Self {
        value.mask()
    }
}

impl FromIterator<Verb> for VerbMask {
    fn from_iter<I: IntoIterator<Item = Verb>>(iter: I) -> Self {
        iter.into_iter().fold(VerbMask::NONE, |acc, v| acc | v.mask())
    }
}

impl Serialize for VerbMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for VerbMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        VerbMask::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid verb mask {bits}")))
    }
}
