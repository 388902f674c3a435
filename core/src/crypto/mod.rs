// Key Engine — textbook RSA over BigUint, one character code per ciphertext
//
// The transform is deliberately simple enough to trace by hand and
// deliberately NOT secure. Nothing here protects real traffic.

mod keys;

pub use keys::{
    decrypt_char, encrypt_char, KeyError, KeyPair, PrivateKey, PublicKey, DEFAULT_PRIME_BITS,
    MIN_PRIME_BITS,
};
