use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_root(label: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("callflow_server_{label}_{suffix}"))
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:data\\test.db"),
        "sqlite://data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let root = temp_root("db");
    let db_path = root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(root.join("data").exists());

    fs::remove_dir_all(root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let root = temp_root("open");
    let db_path = root.join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn file_then_environment_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
bind_addr = "0.0.0.0:9000"
keycloak_url = "https://auth.example.org"
mail_from = "requests@example.org"
unknown_key = "ignored"
"#,
    );
    assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    assert_eq!(
        settings.keycloak_url.as_deref(),
        Some("https://auth.example.org")
    );

    let env: HashMap<&str, &str> = [
        ("SERVER_BIND", "127.0.0.1:1"),
        ("APP__BIND_ADDR", "127.0.0.1:2"),
        ("APP__KEYCLOAK_CLIENT_SECRET", "s3cret"),
    ]
    .into_iter()
    .collect();
    apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.bind_addr, "127.0.0.1:2");
    assert_eq!(settings.keycloak_client_secret.as_deref(), Some("s3cret"));
    assert_eq!(settings.mail_from, "requests@example.org");
    assert_eq!(settings.database_url, Settings::default().database_url);
}

#[test]
fn malformed_settings_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "bind_addr = [");
    assert_eq!(settings, Settings::default());
}

#[test]
fn keycloak_base_url_gains_trailing_slash() {
    let url = keycloak_base_url("https://auth.example.org/auth").expect("url");
    assert_eq!(
        url.join("realms/research").expect("join").as_str(),
        "https://auth.example.org/auth/realms/research"
    );
    keycloak_base_url("not a url").expect_err("should fail");
}

#[test]
fn schemas_default_without_path_and_load_from_toml() {
    assert_eq!(load_schemas(None).expect("defaults"), RequestSchemas::default());

    let root = temp_root("schema");
    fs::create_dir_all(&root).expect("root");
    let path = root.join("schemas.toml");
    fs::write(
        &path,
        r#"
[[ta.general.fields]]
field = "title"
type = "string"

[[ta.general.fields]]
field = "crew[0].name"
type = "string"

[[ta.scoring.fields]]
field = "grade"
type = "list"

[[va.general.fields]]
field = "consent"
type = "boolean"
"#,
    )
    .expect("write");

    let schemas = load_schemas(path.to_str()).expect("schemas");
    assert_eq!(schemas.ta.general.fields.len(), 2);
    assert!(schemas.ta.institution.fields.is_empty());
    assert_eq!(schemas.va.general.fields[0].field.to_string(), "consent");

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn schemas_with_positioned_declarations_are_rejected() {
    let root = temp_root("bad_schema");
    fs::create_dir_all(&root).expect("root");
    let path = root.join("schemas.toml");
    fs::write(
        &path,
        r#"
[[ta.general.fields]]
field = "crew[2].name"
type = "string"

[va]
"#,
    )
    .expect("write");

    let err = load_schemas(path.to_str()).expect_err("should fail");
    assert!(format!("{err:#}").contains("position"));

    fs::remove_dir_all(root).expect("cleanup");
}
