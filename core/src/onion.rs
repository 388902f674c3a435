// Layered envelope codec
//
// One RSA ciphertext per plaintext character, one encryption layer per
// hop. Layer plaintext for a non-final hop is "<next_hop>|<inner wire>",
// where the inner wire form is itself a comma-joined ciphertext string;
// the innermost layer is "<destination>|<message>".

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use thiserror::Error;

use crate::crypto::{decrypt_char, encrypt_char, PrivateKey, PublicKey};

/// Separates the routing prefix from the rest of a layer plaintext.
pub const LAYER_DELIMITER: char = '|';

#[derive(Debug, Error)]
pub enum BuildError {
    /// An empty chain has no first hop to hand the envelope to.
    #[error("routing chain is empty")]
    EmptyChain,
    /// The key map is missing an entry for a hop in the chain.
    #[error("no public key for hop '{0}'")]
    MissingKey(String),
    /// A character code at or above the hop's modulus would silently wrap.
    #[error("character U+{code:04X} does not fit under the modulus of hop '{hop}'")]
    CharTooLarge { code: u32, hop: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Wire token that is not a non-empty run of ASCII digits.
    #[error("envelope token is not a decimal integer: {0:?}")]
    BadToken(String),
    /// Decrypted integer is not a valid Unicode scalar value.
    #[error("decrypted value is not a character code")]
    CharOutOfRange,
    /// Zero-length wire string.
    #[error("empty envelope")]
    Empty,
}

/// A sealed envelope: the ciphertext integers of the outermost layer.
///
/// Wire form is the comma-joined decimal rendering of each integer, in
/// order — plain ASCII, safe to log and to eyeball in a packet capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope(Vec<BigUint>);

impl Envelope {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as comma-joined decimal integers.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&value.to_str_radix(10));
        }
        out
    }

    /// Parse the wire form. Every comma-separated token must be a
    /// non-empty run of ASCII digits.
    pub fn from_wire(wire: &str) -> Result<Self, DecodeError> {
        if wire.is_empty() {
            return Err(DecodeError::Empty);
        }
        let mut values = Vec::new();
        for token in wire.split(',') {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DecodeError::BadToken(token.to_string()));
            }
            // Tokens are pure digits, so parsing cannot fail.
            match BigUint::parse_bytes(token.as_bytes(), 10) {
                Some(value) => values.push(value),
                None => return Err(DecodeError::BadToken(token.to_string())),
            }
        }
        Ok(Self(values))
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Outcome of peeling one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peeled {
    /// The remainder is another sealed layer bound for `next_hop`.
    Forward { next_hop: String, payload: Envelope },
    /// Innermost layer reached; the full plaintext (typically
    /// "<destination>|<message>") belongs to this node.
    Terminal { plaintext: String },
}

/// Seal `message` for `destination` under one layer per hop in `chain`,
/// outermost first. Layers are applied innermost-out, so the relay named
/// first peels first.
pub fn build(
    message: &str,
    destination: &str,
    chain: &[String],
    keys: &HashMap<String, PublicKey>,
) -> Result<Envelope, BuildError> {
    if chain.is_empty() {
        return Err(BuildError::EmptyChain);
    }

    let mut sealed: Option<Envelope> = None;
    for (i, hop) in chain.iter().enumerate().rev() {
        let key = keys
            .get(hop)
            .ok_or_else(|| BuildError::MissingKey(hop.clone()))?;
        let plain = match sealed {
            // Innermost layer: the delivery instruction itself.
            None => format!("{destination}{LAYER_DELIMITER}{message}"),
            Some(inner) => format!("{}{LAYER_DELIMITER}{}", chain[i + 1], inner.to_wire()),
        };
        sealed = Some(encrypt_layer(&plain, hop, key)?);
    }

    // chain is non-empty, so at least one layer was applied.
    Ok(sealed.unwrap_or(Envelope(Vec::new())))
}

fn encrypt_layer(plain: &str, hop: &str, key: &PublicKey) -> Result<Envelope, BuildError> {
    let mut values = Vec::with_capacity(plain.chars().count());
    for ch in plain.chars() {
        let code = ch as u32;
        if BigUint::from(code) >= key.n {
            return Err(BuildError::CharTooLarge {
                code,
                hop: hop.to_string(),
            });
        }
        values.push(encrypt_char(code, key));
    }
    Ok(Envelope(values))
}

/// Decrypt every integer in `envelope` and classify the result.
///
/// The remainder after the first delimiter is another sealed layer only
/// if it looks like one: solely ASCII digits and commas, with no empty
/// tokens. Anything else — including the innermost
/// "<destination>|<message>" — is terminal and returned whole.
pub fn peel(envelope: &Envelope, key: &PrivateKey) -> Result<Peeled, DecodeError> {
    if envelope.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut plain = String::with_capacity(envelope.len());
    for value in &envelope.0 {
        let code = decrypt_char(value, key)
            .to_u32()
            .ok_or(DecodeError::CharOutOfRange)?;
        let ch = char::from_u32(code).ok_or(DecodeError::CharOutOfRange)?;
        plain.push(ch);
    }

    match plain.split_once(LAYER_DELIMITER) {
        Some((next_hop, rest)) if looks_like_wire(rest) => Ok(Peeled::Forward {
            next_hop: next_hop.to_string(),
            payload: Envelope::from_wire(rest)?,
        }),
        _ => Ok(Peeled::Terminal { plaintext: plain }),
    }
}

/// Split a terminal plaintext into destination and message.
pub fn split_delivery(plaintext: &str) -> Option<(&str, &str)> {
    plaintext.split_once(LAYER_DELIMITER)
}

fn looks_like_wire(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit() || b == b',')
        && s.split(',').all(|token| !token.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
