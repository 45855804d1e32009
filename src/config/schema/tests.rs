use super::*;

fn complete_config() -> Config {
    let mut config = Config::default();
    config.store.app_id = "cli_a1b2".into();
    config.store.app_secret = "secret".into();
    config.store.app_token = "bascnApp".into();
    config.store.users_table_id = "tblUsers".into();
    config.store.messages_table_id = "tblMessages".into();
    config.messaging.channel_secret = "channel-secret".into();
    config.messaging.channel_access_token = "channel-token".into();
    config
}

#[test]
fn test_default_config_validates() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_config_not_ready_to_serve() {
    let err = Config::default().validate_for_serve().unwrap_err();
    assert!(matches!(err, LedgerError::Config(_)));
    assert!(err.to_string().contains("LARK_APP_ID"));
}

#[test]
fn test_complete_config_ready_to_serve() {
    assert!(complete_config().validate_for_serve().is_ok());
}

#[test]
fn test_missing_messages_table_fails_closed() {
    let mut config = complete_config();
    config.store.messages_table_id = "  ".into();
    let err = config.validate_for_serve().unwrap_err();
    assert!(err.to_string().contains("messagesTableId"));
}

#[test]
fn test_channel_secret_required_only_when_verifying() {
    let mut config = complete_config();
    config.messaging.channel_secret.clear();
    assert!(config.validate_for_serve().is_err());

    config.messaging.verify_signature = false;
    assert!(config.validate_for_serve().is_ok());
}

#[test]
fn test_access_token_required_to_serve() {
    let mut config = complete_config();
    config.messaging.channel_access_token.clear();
    let err = config.validate_for_serve().unwrap_err();
    assert!(err.to_string().contains("LINE_CHANNEL_ACCESS_TOKEN"));
}

#[test]
fn test_invalid_zero_port() {
    let mut config = Config::default();
    config.gateway.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_zero_store_timeout() {
    let mut config = Config::default();
    config.store.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_store_base_url() {
    let mut config = Config::default();
    config.store.base_url = "not a url".into();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("store.baseUrl"));
}

#[test]
fn test_safety_margin_upper_bound() {
    let mut config = Config::default();
    config.store.token_safety_margin_secs = 7200;
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_lookup_column_rejected() {
    let mut config = Config::default();
    config.fields.users.user_id = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_deserialize_camel_case_sections() {
    let json = serde_json::json!({
        "store": {
            "appId": "cli_x",
            "usersTableId": "tblU",
            "tokenSafetyMarginSecs": 60
        },
        "messaging": {"verifySignature": false},
        "gateway": {"port": 8080, "apiKey": "k"},
        "policy": {"postbackCountsEngagement": true},
        "fields": {"users": {"userId": "user_id", "lastActiveAt": "last_seen"}}
    });
    let config: Config = serde_json::from_value(json).unwrap();
    assert_eq!(config.store.app_id, "cli_x");
    assert_eq!(config.store.users_table_id, "tblU");
    assert_eq!(config.store.token_safety_margin_secs, 60);
    assert_eq!(config.store.base_url, "https://open.larksuite.com");
    assert!(!config.messaging.verify_signature);
    assert_eq!(config.gateway.port, 8080);
    assert!(config.policy.postback_counts_engagement);
    assert_eq!(config.fields.users.user_id, "user_id");
    assert_eq!(config.fields.users.last_active_at, "last_seen");
    // untouched mappings keep their defaults
    assert_eq!(config.fields.users.engagement_score, "engagement_score");
    assert_eq!(config.fields.activity.timestamp, "ts");
}

#[test]
fn test_debug_redacts_secrets() {
    let config = complete_config();
    let debug = format!("{:?}", config);
    assert!(!debug.contains("channel-secret"));
    assert!(!debug.contains("channel-token"));
    assert!(debug.contains("[REDACTED]"));
    // non-secret identifiers stay visible
    assert!(debug.contains("tblUsers"));
}

#[test]
fn test_debug_marks_empty_secret() {
    let debug = format!("{:?}", GatewayConfig::default());
    assert!(debug.contains("[empty]"));
}
