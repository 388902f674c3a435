// RSA key material for the per-character onion cipher

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Prime size (in bits) used when no explicit size is configured.
pub const DEFAULT_PRIME_BITS: u64 = 256;

/// Smallest accepted prime size. Two primes of this size give a modulus
/// comfortably above the largest Unicode scalar value (0x10FFFF), so every
/// character code stays below n and the cipher never wraps.
pub const MIN_PRIME_BITS: u64 = 16;

/// Miller–Rabin witnesses tried deterministically before the random rounds.
const FIXED_BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Random Miller–Rabin rounds on top of the fixed bases.
const RANDOM_ROUNDS: usize = 16;

#[derive(Debug, Error)]
pub enum KeyError {
    /// Prime size below [`MIN_PRIME_BITS`]; the modulus could wrap
    /// character codes.
    #[error("prime size {0} bits is too small (minimum {MIN_PRIME_BITS})")]
    PrimesTooSmall(u64),
    /// No odd public exponent coprime to phi was found.
    #[error("no usable public exponent for the generated primes")]
    NoPublicExponent,
    /// Extended Euclid found gcd(e, phi) != 1.
    #[error("public exponent has no modular inverse")]
    NoInverse,
}

/// Public half of a keypair: exponent `e` and modulus `n`.
///
/// Serializes as a two-element array of decimal strings `["e", "n"]` so it
/// survives JSON without precision loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub e: BigUint,
    pub n: BigUint,
}

/// Private half: exponent `d` and the same modulus `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub d: BigUint,
    pub n: BigUint,
}

/// A freshly generated RSA keypair. Keys live only in memory; every node
/// generates a new pair at startup and nothing is ever persisted.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a keypair from two random primes of `prime_bits` bits each.
    ///
    /// The public exponent is 65537 when coprime to phi, otherwise the
    /// smallest odd exponent that is.
    pub fn generate(prime_bits: u64) -> Result<Self, KeyError> {
        if prime_bits < MIN_PRIME_BITS {
            return Err(KeyError::PrimesTooSmall(prime_bits));
        }

        let mut rng = rand::thread_rng();
        let p = random_prime(prime_bits, &mut rng);
        let q = loop {
            let q = random_prime(prime_bits, &mut rng);
            if q != p {
                break q;
            }
        };

        let n = &p * &q;
        let phi = (&p - 1u32) * (&q - 1u32);
        let e = choose_public_exponent(&phi)?;
        let d = mod_inverse(&e, &phi)?;

        Ok(Self {
            public: PublicKey { e, n: n.clone() },
            private: PrivateKey { d, n },
        })
    }
}

/// Encrypt a single character code: `code^e mod n`.
pub fn encrypt_char(code: u32, key: &PublicKey) -> BigUint {
    BigUint::from(code).modpow(&key.e, &key.n)
}

/// Decrypt a single ciphertext integer: `value^d mod n`.
///
/// Pure modular exponentiation; mapping the result back to a character is
/// the codec's job.
pub fn decrypt_char(value: &BigUint, key: &PrivateKey) -> BigUint {
    value.modpow(&key.d, &key.n)
}

fn random_prime<R: Rng>(bits: u64, rng: &mut R) -> BigUint {
    loop {
        let mut candidate = rng.gen_biguint(bits);
        // Force the exact bit length and oddness before testing.
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_probably_prime(&candidate, rng) {
            return candidate;
        }
    }
}

/// Miller–Rabin with the fixed small-prime bases plus random rounds.
fn is_probably_prime<R: Rng>(n: &BigUint, rng: &mut R) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    for base in FIXED_BASES {
        let base = BigUint::from(base);
        if &base >= n {
            // n is one of the small primes itself.
            return true;
        }
        if (n % &base).is_zero() {
            return false;
        }
    }

    // n - 1 = d * 2^s with d odd
    let n_minus_one = n - 1u32;
    let mut d = n_minus_one.clone();
    let mut s = 0u64;
    while !d.bit(0) {
        d >>= 1;
        s += 1;
    }

    let is_witness = |a: &BigUint| -> bool {
        // Returns true if `a` proves n composite.
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            return false;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                return false;
            }
        }
        true
    };

    for base in FIXED_BASES {
        let a = BigUint::from(base);
        if is_witness(&a) {
            return false;
        }
    }
    for _ in 0..RANDOM_ROUNDS {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        if is_witness(&a) {
            return false;
        }
    }
    true
}

fn choose_public_exponent(phi: &BigUint) -> Result<BigUint, KeyError> {
    let standard = BigUint::from(65_537u32);
    if gcd(standard.clone(), phi.clone()).is_one() {
        return Ok(standard);
    }
    // Fall back to the smallest odd exponent coprime to phi.
    let mut e = BigUint::from(3u32);
    while &e < phi {
        if gcd(e.clone(), phi.clone()).is_one() {
            return Ok(e);
        }
        e += 2u32;
    }
    Err(KeyError::NoPublicExponent)
}

fn gcd(mut a: BigUint, mut b: BigUint) -> BigUint {
    while !b.is_zero() {
        let r = &a % &b;
        a = std::mem::replace(&mut b, r);
    }
    a
}

/// Modular inverse of `e` mod `phi` via the extended Euclidean algorithm.
fn mod_inverse(e: &BigUint, phi: &BigUint) -> Result<BigUint, KeyError> {
    let phi_int = BigInt::from(phi.clone());
    let mut r0 = phi_int.clone();
    let mut r1 = BigInt::from(e.clone());
    let mut t0 = BigInt::zero();
    let mut t1 = BigInt::one();

    while !r1.is_zero() {
        let q = &r0 / &r1;
        let r = &r0 - &q * &r1;
        let t = &t0 - &q * &t1;
        r0 = std::mem::replace(&mut r1, r);
        t0 = std::mem::replace(&mut t1, t);
    }

    if !r0.is_one() {
        return Err(KeyError::NoInverse);
    }

    let d = ((t0 % &phi_int) + &phi_int) % &phi_int;
    d.to_biguint().ok_or(KeyError::NoInverse)
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.e.to_str_radix(10), self.n.to_str_radix(10)].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [e, n] = <[String; 2]>::deserialize(deserializer)?;
        let e = BigUint::parse_bytes(e.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom("public exponent is not a decimal integer"))?;
        let n = BigUint::parse_bytes(n.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom("modulus is not a decimal integer"))?;
        Ok(PublicKey { e, n })
    }
}

// ============================================================================
// TESTS
// ============================================================================
