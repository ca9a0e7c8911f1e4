//! Layered dotenv loading tests. Each test gets its own base directory so
//! no process-wide environment mutation is needed.

use std::fs;

use base64::{Engine as _, engine::general_purpose};
use tempfile::TempDir;

use patreonizer::config::{ConfigError, ConfigLoader};

fn key_b64() -> String {
    general_purpose::STANDARD.encode([7u8; 32])
}

fn write_env(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn missing_crypto_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("no crypto key configured");
    assert!(matches!(err, ConfigError::MissingCryptoKey));
}

#[test]
fn base_env_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "PATREONIZER_CRYPTO_KEY={}\nPATREONIZER_DATABASE_URL=postgresql://base/db\nPATREONIZER_LOG_LEVEL=debug\n",
            key_b64()
        ),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    assert_eq!(config.profile, "local");
    assert_eq!(config.database_url, "postgresql://base/db");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.crypto_key.as_deref(), Some(&[7u8; 32][..]));
}

#[test]
fn local_overrides_base_and_profile_overrides_local() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "PATREONIZER_CRYPTO_KEY={}\nPATREONIZER_PROFILE=test\nPATREONIZER_DATABASE_URL=postgresql://base/db\n",
            key_b64()
        ),
    );
    write_env(&dir, ".env.local", "PATREONIZER_DATABASE_URL=postgresql://local/db\n");
    write_env(&dir, ".env.test", "PATREONIZER_DATABASE_URL=sqlite::memory:\n");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    assert_eq!(config.profile, "test");
    assert_eq!(config.database_url, "sqlite::memory:");
}

#[test]
fn non_local_profile_requires_oauth_credentials() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "PATREONIZER_CRYPTO_KEY={}\nPATREONIZER_PROFILE=production\n",
            key_b64()
        ),
    );

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("production needs OAuth credentials");
    assert!(matches!(err, ConfigError::MissingPatreonClientId));

    write_env(
        &dir,
        ".env.production",
        "PATREONIZER_PATREON_CLIENT_ID=cid\nPATREONIZER_PATREON_CLIENT_SECRET=csecret\n",
    );
    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    assert_eq!(config.patreon_client_id.as_deref(), Some("cid"));
}

#[test]
fn invalid_crypto_key_base64_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_env(&dir, ".env", "PATREONIZER_CRYPTO_KEY=@@not-base64@@\n");

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("key is not base64");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyBase64 { .. }));
}

#[test]
fn short_crypto_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "PATREONIZER_CRYPTO_KEY={}\n",
            general_purpose::STANDARD.encode([1u8; 16])
        ),
    );

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("key is too short");
    assert!(matches!(
        err,
        ConfigError::InvalidCryptoKeyLength { length: 16 }
    ));
}

#[test]
fn invalid_bind_addr_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "PATREONIZER_CRYPTO_KEY={}\nPATREONIZER_API_BIND_ADDR=not-an-addr\n",
            key_b64()
        ),
    );

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("bind address is invalid");
    assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
}

#[test]
fn sync_settings_come_from_env_and_are_validated() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "PATREONIZER_CRYPTO_KEY={}\nPATREONIZER_SYNC_PAGE_TIMEOUT_SECONDS=10\nPATREONIZER_SYNC_MAX_RUN_SECONDS=120\nPATREONIZER_SYNC_PAGE_SIZE=50\n",
            key_b64()
        ),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    assert_eq!(config.sync.page_timeout_seconds, 10);
    assert_eq!(config.sync.max_run_seconds, 120);
    assert_eq!(config.sync.page_size, 50);

    write_env(
        &dir,
        ".env.local",
        "PATREONIZER_SYNC_MAX_RUN_SECONDS=5\n",
    );
    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect_err("run shorter than page timeout");
    assert!(matches!(
        err,
        ConfigError::InvalidSyncMaxRunDuration { value: 5, .. }
    ));
}
