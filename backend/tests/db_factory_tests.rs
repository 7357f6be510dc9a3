//! Tests for db::factory module - repository creation and configuration.

mod support;

use std::io::Write;
use std::str::FromStr;

use cwms_data::db::factory::{RepositoryBuilder, RepositoryFactory, RepositoryType};

#[test]
fn test_repository_type_from_str() {
    for value in ["postgres", "POSTGRES", "pg", " Pg "] {
        assert_eq!(RepositoryType::from_str(value).unwrap(), RepositoryType::Postgres);
    }
    for value in ["local", "LOCAL"] {
        assert_eq!(RepositoryType::from_str(value).unwrap(), RepositoryType::Local);
    }
}

#[test]
fn test_repository_type_from_str_invalid() {
    let err = RepositoryType::from_str("oracle").unwrap_err();
    assert!(err.contains("Unknown repository type"));
}

#[test]
fn test_repository_type_from_env_default() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_with_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", Some("postgres://localhost/cwms")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Postgres);
        },
    );
}

#[test]
fn test_repository_type_from_env_with_pg_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", Some("postgres://localhost/cwms")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Postgres);
        },
    );
}

#[test]
fn test_repository_type_from_env_explicit_wins_over_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("local")),
            ("DATABASE_URL", Some("postgres://localhost/cwms")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_invalid_defaults_to_local() {
    support::with_scoped_env(&[("REPOSITORY_TYPE", Some("invalid"))], || {
        assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
    });
}

#[tokio::test]
async fn test_create_local_via_factory() {
    let repo = RepositoryFactory::create(RepositoryType::Local, None)
        .await
        .unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[cfg(feature = "postgres-repo")]
#[tokio::test]
async fn test_create_postgres_without_config_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("requires PostgresConfig"));
}

#[cfg(not(feature = "postgres-repo"))]
#[tokio::test]
async fn test_create_postgres_without_feature_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, cwms_data::db::RepositoryError::ConfigurationError { .. }));
    assert!(err.to_string().contains("feature not enabled"));
}

#[tokio::test]
async fn test_from_config_file_local() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[repository]\ntype = \"local\"\n\n[paging]\ncatalog_page_size = 10").unwrap();

    let repo = RepositoryFactory::from_config_file(file.path()).await.unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[tokio::test]
async fn test_from_config_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = RepositoryFactory::from_config_file(dir.path().join("repository.toml"))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[tokio::test]
async fn test_builder_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[repository]\ntype = \"LOCAL\"").unwrap();

    let repo = RepositoryBuilder::new()
        .from_config_file(file.path())
        .unwrap()
        .build()
        .await
        .unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[test]
fn test_builder_rejects_unknown_type_in_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[repository]\ntype = \"oracle\"").unwrap();

    let err = RepositoryBuilder::new()
        .from_config_file(file.path())
        .err()
        .unwrap();
    assert!(err.to_string().contains("Invalid repository type"));
}
