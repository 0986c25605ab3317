//! Random password generation

use rand::seq::SliceRandom;
use rand::Rng;

/// Default generated password length
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Generate a password of `length` characters, none of them in `exclude`.
///
/// Every character class that still has members after exclusion contributes
/// at least one character. Returns `None` if `exclude` removes every
/// character, or if `length` is too short to cover the remaining classes.
pub fn generate_password<R: Rng + ?Sized>(rng: &mut R, length: usize, exclude: &str) -> Option<String> {
    let classes: Vec<Vec<char>> = [UPPERCASE, LOWERCASE, DIGITS, PUNCTUATION]
        .iter()
        .map(|class| class.chars().filter(|c| !exclude.contains(*c)).collect::<Vec<_>>())
        .filter(|class| !class.is_empty())
        .collect();

    if classes.is_empty() || length < classes.len() {
        return None;
    }

    let pool: Vec<char> = classes.iter().flatten().copied().collect();

    let mut password: Vec<char> = classes
        .iter()
        .filter_map(|class| class.choose(rng).copied())
        .collect();
    while password.len() < length {
        password.push(*pool.choose(rng)?);
    }
    password.shuffle(rng);

    Some(password.into_iter().collect())
}
