//! Join code generation and validation.
//!
//! Generated codes are only used as a stub when no real game server could
//! confirm a code. Codes parsed from server logs follow a looser contract.

use rand::Rng;

/// Alphabet for generated codes. Excludes `0`, `1`, `I` and `O`.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated code.
pub const GENERATED_LEN: usize = 6;

/// Shortest code accepted from server output.
pub const MIN_PARSED_LEN: usize = 6;

/// Longest code accepted from server output.
pub const MAX_PARSED_LEN: usize = 12;

/// Generate a random join code.
pub fn generate() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// Whether `code` could have been produced by [`generate`].
pub fn is_generated(code: &str) -> bool {
    code.len() == GENERATED_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}

/// Whether `code` satisfies the join code contract for server-issued codes:
/// 6 to 12 uppercase ASCII letters or digits.
pub fn is_valid(code: &str) -> bool {
    (MIN_PARSED_LEN..=MAX_PARSED_LEN).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
