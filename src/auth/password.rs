//! Folder password hashing.
//!
//! Uses Argon2id. A password hash is a PHC string that embeds the salt it
//! was produced with, so the hash of a given (salt, password) pair is
//! deterministic and doubles as the proof stored in capability tokens.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, Params,
};
use rand_core::OsRng;
use tracing::error;

use super::strength::StrengthEstimator;
use crate::folder::{AccessKind, Folder, FolderConfig};
use crate::{Result, StoreError};

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Create the Argon2 hasher.
///
/// Parameters:
/// - Memory cost: 19 MiB (19456 KiB)
/// - Time cost: 2 iterations
/// - Parallelism: 1 thread
fn create_argon2() -> Result<Argon2<'static>> {
    let params = Params::new(19456, 2, 1, None).map_err(|e| {
        error!(error = %e, "invalid Argon2 params");
        StoreError::Storage
    })?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Generate a fresh random salt.
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).as_str().to_string()
}

/// Hash `password` with the given salt.
///
/// Returns a PHC-formatted hash string.
pub fn hash_password(salt: &str, password: &str) -> Result<String> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(StoreError::PasswordTooWeak);
    }

    let salt = SaltString::from_b64(salt).map_err(|e| {
        error!(error = %e, "invalid folder salt");
        StoreError::Storage
    })?;

    let hash = create_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            StoreError::Storage
        })?;

    Ok(hash.to_string())
}

/// Re-hash `candidate` with the salt embedded in `stored`.
fn rehash_like(stored: &str, candidate: &str) -> Option<String> {
    let parsed = PasswordHash::new(stored).ok()?;
    let salt = parsed.salt?;
    hash_password(salt.as_str(), candidate).ok()
}

/// Check a candidate password against the stored hash for `kind`.
///
/// An empty stored read hash marks a public folder; only the empty
/// candidate matches it. An empty stored write hash never matches.
pub fn test_password(config: &FolderConfig, kind: AccessKind, candidate: &str) -> bool {
    let stored = config.hash_for(kind);

    if stored.is_empty() {
        return kind == AccessKind::Read && candidate.is_empty();
    }
    if candidate.is_empty() {
        return false;
    }

    rehash_like(stored, candidate).is_some_and(|hash| hash == stored)
}

/// Change the password of `kind` on a config-owning folder.
///
/// Rotates the folder salt, which makes every token issued for the old
/// hash stale. Write passwords must score at least `min_write_score` with
/// the folder's path components as guessable context; an empty read
/// password makes the folder public again.
pub fn set_password(
    folder: &mut Folder,
    kind: AccessKind,
    new_password: &str,
    estimator: &dyn StrengthEstimator,
    min_write_score: u8,
) -> Result<()> {
    if folder.config_inherited {
        return Err(StoreError::InheritedConfigImmutable);
    }

    if kind == AccessKind::Write
        && estimator.score(new_password, &folder.path_words()) < min_write_score
    {
        return Err(StoreError::PasswordTooWeak);
    }

    if !new_password.is_empty() && test_password(&folder.config, kind.other(), new_password) {
        return Err(StoreError::PasswordsMustDiffer);
    }

    let salt = generate_salt();
    let hash = if new_password.is_empty() {
        String::new()
    } else {
        hash_password(&salt, new_password)?
    };

    folder.config.salt = salt;
    folder.config.set_hash(kind, hash);
    folder.config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::strength::HeuristicEstimator;
    use std::path::PathBuf;

    fn owned_folder(config: FolderConfig) -> Folder {
        Folder {
            root: PathBuf::from("/srv"),
            rel_path: "team".to_string(),
            config,
            config_inherited: false,
            config_root_path: "team".to_string(),
            cached_files: None,
            cached_subfolders: None,
        }
    }

    #[test]
    fn test_hash_password_deterministic() {
        let salt = generate_salt();
        let hash1 = hash_password(&salt, "secret").unwrap();
        let hash2 = hash_password(&salt, "secret").unwrap();

        assert!(hash1.starts_with("$argon2id$"));
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_password_salt_matters() {
        let hash1 = hash_password(&generate_salt(), "secret").unwrap();
        let hash2 = hash_password(&generate_salt(), "secret").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_test_password() {
        let config = FolderConfig::with_passwords("reader", "writer-pass").unwrap();

        assert!(test_password(&config, AccessKind::Read, "reader"));
        assert!(!test_password(&config, AccessKind::Read, "writer-pass"));
        assert!(test_password(&config, AccessKind::Write, "writer-pass"));
        assert!(!test_password(&config, AccessKind::Write, ""));
    }

    #[test]
    fn test_public_read_matches_only_empty() {
        let config = FolderConfig::public();

        assert!(test_password(&config, AccessKind::Read, ""));
        assert!(!test_password(&config, AccessKind::Read, "anything"));
        assert!(!test_password(&config, AccessKind::Write, ""));
    }

    #[test]
    fn test_set_password_rotates_salt() {
        let mut folder = owned_folder(FolderConfig::public());
        let old_salt = folder.config.salt.clone();

        set_password(
            &mut folder,
            AccessKind::Write,
            "Tr0mbone-Galaxy-Parade",
            &HeuristicEstimator,
            3,
        )
        .unwrap();

        assert_ne!(folder.config.salt, old_salt);
        assert!(test_password(
            &folder.config,
            AccessKind::Write,
            "Tr0mbone-Galaxy-Parade"
        ));
    }

    #[test]
    fn test_set_password_keeps_other_kind_valid() {
        let mut folder = owned_folder(FolderConfig::with_passwords("reader", "writer-pass").unwrap());

        set_password(&mut folder, AccessKind::Read, "new-reader", &HeuristicEstimator, 3).unwrap();

        assert!(test_password(&folder.config, AccessKind::Read, "new-reader"));
        assert!(test_password(&folder.config, AccessKind::Write, "writer-pass"));
    }

    #[test]
    fn test_set_password_too_weak() {
        let mut folder = owned_folder(FolderConfig::public());

        let result = set_password(&mut folder, AccessKind::Write, "weak", &HeuristicEstimator, 3);
        assert_eq!(result, Err(StoreError::PasswordTooWeak));
    }

    #[test]
    fn test_set_password_folder_name_is_guessable() {
        let mut folder = owned_folder(FolderConfig::public());

        let result = set_password(
            &mut folder,
            AccessKind::Write,
            "Team-Team-2024!x",
            &HeuristicEstimator,
            3,
        );
        assert_eq!(result, Err(StoreError::PasswordTooWeak));
    }

    #[test]
    fn test_set_password_must_differ() {
        let mut folder = owned_folder(
            FolderConfig::with_passwords("", "Tr0mbone-Galaxy-Parade").unwrap(),
        );

        let result = set_password(
            &mut folder,
            AccessKind::Read,
            "Tr0mbone-Galaxy-Parade",
            &HeuristicEstimator,
            3,
        );
        assert_eq!(result, Err(StoreError::PasswordsMustDiffer));
    }

    #[test]
    fn test_set_password_inherited() {
        let mut folder = owned_folder(FolderConfig::public());
        folder.config_inherited = true;

        let result = set_password(&mut folder, AccessKind::Read, "reader", &HeuristicEstimator, 3);
        assert_eq!(result, Err(StoreError::InheritedConfigImmutable));
    }

    #[test]
    fn test_clear_read_password() {
        let mut folder = owned_folder(FolderConfig::with_passwords("reader", "writer-pass").unwrap());

        set_password(&mut folder, AccessKind::Read, "", &HeuristicEstimator, 3).unwrap();
        assert!(folder.config.is_public());
    }

    #[test]
    fn test_password_with_unicode() {
        let salt = generate_salt();
        let hash = hash_password(&salt, "パスワード123").unwrap();
        let mut config = FolderConfig::public();
        config.read_password_hash = hash;

        assert!(test_password(&config, AccessKind::Read, "パスワード123"));
    }
}
