use super::*;

#[test]
fn test_migrate_config_renames_message_table() {
    let input = serde_json::json!({
        "store": {"messageTableId": "tblOld"}
    });
    let result = migrate_config(input);
    let store = result.get("store").unwrap();
    assert_eq!(
        store.get("messagesTableId"),
        Some(&serde_json::json!("tblOld"))
    );
    assert!(store.get("messageTableId").is_none());
}

#[test]
fn test_migrate_config_no_overwrite_existing() {
    let input = serde_json::json!({
        "store": {"messageTableId": "tblOld", "messagesTableId": "tblNew"}
    });
    let result = migrate_config(input);
    assert_eq!(
        result["store"]["messagesTableId"],
        serde_json::json!("tblNew")
    );
}

#[test]
fn test_migrate_config_no_store_key() {
    let input = serde_json::json!({"gateway": {}});
    let result = migrate_config(input.clone());
    assert_eq!(result, input);
}

#[test]
fn test_load_config_missing_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.gateway.port, 3000);
    assert_eq!(config.store.base_url, "https://open.larksuite.com");
}

#[test]
fn test_load_config_minimal_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{}").unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.store.timeout_secs, 10);
    assert!(config.messaging.verify_signature);
}

#[test]
fn test_load_config_reads_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"store": {"appToken": "bascn1", "usersTableId": "tblA"}, "gateway": {"port": 9090}}"#,
    )
    .unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.store.app_token, "bascn1");
    assert_eq!(config.store.users_table_id, "tblA");
    assert_eq!(config.gateway.port, 9090);
}

#[test]
fn test_load_config_invalid_json_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = load_config(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config JSON"));
}

#[test]
fn test_load_config_validation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"gateway": {"port": 0}}"#).unwrap();
    let err = load_config(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("gateway.port"));
}
