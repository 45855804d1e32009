use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// All known credential slot names.
        pub const CREDENTIAL_NAMES: &[&str] = &[$($name),*];

        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get a mutable reference to a credential field by slot name.
        pub fn get_credential_field<'a>(config: &'a mut Config, name: &str) -> Option<&'a mut String> {
            match name {
                $($name => Some(&mut config.$($path).+),)*
                _ => None,
            }
        }

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any listed env var that is set and non-empty overwrites the
        /// corresponding config field, so a deployment can run from the
        /// environment alone without a config file.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    // Record store service identity
    "store-app-id",              "LARK_APP_ID"                => store.app_id;
    "store-app-secret",          "LARK_APP_SECRET"            => store.app_secret;
    // Record store tables
    "store-app-token",           "LARK_APP_TOKEN"             => store.app_token;
    "store-users-table",         "LARK_TABLE_ID"              => store.users_table_id;
    "store-messages-table",      "LARK_MESSAGES_TABLE_ID"     => store.messages_table_id;
    // Messaging platform channel
    "channel-secret",            "LINE_CHANNEL_SECRET"        => messaging.channel_secret;
    "channel-access-token",      "LINE_CHANNEL_ACCESS_TOKEN"  => messaging.channel_access_token;
    // Operator API
    "gateway-api-key",           "CHATLEDGER_API_KEY"         => gateway.api_key;
}

/// Detect which source provided a credential value, for `chatledger check`.
pub fn detect_source(name: &str, config: &Config) -> &'static str {
    let env_var = CREDENTIAL_ENV_VARS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, e)| *e);

    if let Some(var) = env_var
        && let Ok(val) = std::env::var(var)
        && !val.is_empty()
    {
        return "env";
    }

    if let Some(val) = get_credential_value(config, name)
        && !val.is_empty()
    {
        return "config";
    }

    "[empty]"
}
