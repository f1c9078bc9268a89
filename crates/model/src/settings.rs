use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SettingsError;

/// Opaque per-plugin settings as persisted in the config document.
pub type PluginSettings = toml::Table;

/// Decode a plugin's typed settings. Missing keys fall back to serde defaults.
pub fn from_settings<T: DeserializeOwned>(
    alias: &str,
    settings: &PluginSettings,
) -> Result<T, SettingsError> {
    toml::Value::Table(settings.clone())
        .try_into()
        .map_err(|e: toml::de::Error| SettingsError::Invalid {
            alias: alias.to_string(),
            message: e.to_string(),
        })
}

/// Encode a plugin's typed settings.
pub fn to_settings<T: Serialize>(value: &T) -> PluginSettings {
    match toml::Value::try_from(value) {
        Ok(toml::Value::Table(table)) => table,
        Ok(_) => PluginSettings::new(),
        Err(e) => {
            tracing::warn!("Failed to encode plugin settings: {}", e);
            PluginSettings::new()
        }
    }
}

/// Parse CLI style `key=value` pairs into settings. Values that look like
/// booleans or integers are stored typed.
pub fn parse_pairs<'a>(
    alias: &str,
    pairs: impl IntoIterator<Item = &'a str>,
) -> Result<PluginSettings, SettingsError> {
    let mut table = PluginSettings::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(SettingsError::Invalid {
                alias: alias.to_string(),
                message: format!("expected key=value, got `{}`", pair),
            });
        };
        let value = match value {
            "true" => toml::Value::Boolean(true),
            "false" => toml::Value::Boolean(false),
            v => match v.parse::<i64>() {
                Ok(n) => toml::Value::Integer(n),
                Err(_) => toml::Value::String(v.to_string()),
            },
        };
        table.insert(key.trim().to_string(), value);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        host: String,
        port: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        enabled: bool,
    }

    #[test]
    fn test_round_trip_with_defaults() {
        let settings = parse_pairs("sample", ["host=localhost", "port=9091"]).unwrap();
        let sample: Sample = from_settings("sample", &settings).unwrap();

        assert_eq!(sample.host, "localhost");
        assert_eq!(sample.port, 9091);
        assert!(!sample.enabled);

        let encoded = to_settings(&sample);
        assert_eq!(encoded.get("port"), Some(&toml::Value::Integer(9091)));
        assert!(!encoded.contains_key("user"));
    }

    #[test]
    fn test_bad_pairs_are_rejected() {
        assert!(parse_pairs("sample", ["novalue"]).is_err());

        let settings = parse_pairs("sample", ["port=notanumber"]).unwrap();
        assert!(from_settings::<Sample>("sample", &settings).is_err());
    }
}
