//! # Code & Token Generation
//!
//! Short codes come from a restricted alphabet with the visually ambiguous
//! characters (I, 1, O, 0) removed, since humans retype them between
//! platforms. Web tokens are long random alphanumerics pasted by machines,
//! where collision risk must be near zero.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Restricted alphabet for human-typed codes.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a short link code.
pub const CODE_LEN: usize = 6;

/// Length of a high-entropy web token.
pub const TOKEN_LEN: usize = 32;

/// Generates a short link code from the restricted alphabet.
pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generates a high-entropy alphanumeric token.
pub fn generate_token<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
