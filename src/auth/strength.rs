//! Password strength estimation.

/// Scores how hard a password is to guess, on a 0 (trivial) to 4 (strong)
/// scale.
///
/// `context` holds words an attacker can be expected to try first, such as
/// the components of the folder path.
pub trait StrengthEstimator: Send + Sync {
    /// Score `password`.
    fn score(&self, password: &str, context: &[&str]) -> u8;
}

/// Passwords that are always scored as weak.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "passwort", "123456", "12345678", "qwerty", "letmein", "admin", "welcome",
    "iloveyou", "monkey", "dragon", "secret",
];

/// Context words shorter than this are not considered guessable.
const MIN_CONTEXT_WORD: usize = 3;

/// Length and character-class based estimator.
///
/// - under 8 characters: 0
/// - 8 to 11 characters: 1, 12 to 15: 2, 16 and more: 3
/// - one extra point for three or more character classes
/// - capped at 1 if the password contains a common password or a
///   context word, 0 if it is a single repeated character
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl StrengthEstimator for HeuristicEstimator {
    fn score(&self, password: &str, context: &[&str]) -> u8 {
        let len = password.chars().count();
        if len < 8 {
            return 0;
        }

        let mut chars = password.chars();
        if let Some(first) = chars.next() {
            if chars.all(|c| c == first) {
                return 0;
            }
        }

        let mut score: u8 = match len {
            0..=11 => 1,
            12..=15 => 2,
            _ => 3,
        };

        let classes = [
            password.chars().any(|c| c.is_lowercase()),
            password.chars().any(|c| c.is_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_alphanumeric()),
        ];
        if classes.iter().filter(|&&present| present).count() >= 3 {
            score += 1;
        }

        let lowered = password.to_lowercase();
        let guessable = COMMON_PASSWORDS.iter().any(|w| lowered.contains(w))
            || context
                .iter()
                .filter(|w| w.chars().count() >= MIN_CONTEXT_WORD)
                .any(|w| lowered.contains(&w.to_lowercase()));
        if guessable {
            score = score.min(1);
        }

        score.min(4)
    }
}
