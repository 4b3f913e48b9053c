//! JSON Schema of the flat configuration format.
//!
//! Ports and counters are plain non-negative integers instead of the `uint16` /
//! `uint32` formats schemars emits by default, and durations are strings.

use schemars::json_schema;
use schemars::{Schema, SchemaGenerator};

use crate::communicator::flat::FlatConfig;

/// Unsigned integer schema: `{"type": "integer", "minimum": 0}`
///
/// Use with `#[schemars(schema_with = "crate::communicator::schema::uint")]` on unsigned fields.
pub fn uint(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "minimum": 0
    })
}

/// Schema of every option accepted by [`Config::from_json`].
///
/// [`Config::from_json`]: crate::communicator::config::Config::from_json
pub fn config_schema() -> Schema {
    SchemaGenerator::default().into_root_schema_for::<FlatConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_json() -> serde_json::Value {
        serde_json::to_value(config_schema()).expect("Failed to serialize schema")
    }

    #[test]
    fn test_uint_schema_structure() {
        let mut generator = SchemaGenerator::default();
        let json = serde_json::to_value(uint(&mut generator)).expect("Failed to serialize schema");

        assert_eq!(json.get("type"), Some(&serde_json::json!("integer")));
        assert_eq!(json.get("minimum"), Some(&serde_json::json!(0)));
        assert!(json.get("format").is_none(), "Should not have format field");
    }

    #[test]
    fn test_config_schema_no_uint_format() {
        let json_str = serde_json::to_string(&config_schema()).expect("Failed to serialize schema");

        assert!(
            !json_str.contains("\"uint"),
            "FlatConfig schema should not contain 'uint' format: {}",
            json_str
        );
    }

    #[test]
    fn test_config_schema_lists_options() {
        let json = schema_json();
        let properties = json
            .get("properties")
            .and_then(|p| p.as_object())
            .expect("schema has properties");

        for option in [
            "communicator",
            "pause_before_connecting",
            "ssh_username",
            "ssh_private_key_file",
            "ssh_keep_alive_interval",
            "ssh_bastion_host",
            "ssh_local_tunnels",
            "winrm_use_ntlm",
        ] {
            assert!(properties.contains_key(option), "missing {}", option);
        }
    }

    #[test]
    fn test_durations_are_strings() {
        let json = schema_json();
        assert_eq!(
            json.pointer("/properties/ssh_timeout/type"),
            Some(&serde_json::json!("string"))
        );
        assert_eq!(
            json.pointer("/properties/ssh_keep_alive_interval/type"),
            Some(&serde_json::json!("string"))
        );
    }

    #[test]
    fn test_ports_are_non_negative_integers() {
        let json = schema_json();
        assert_eq!(
            json.pointer("/properties/ssh_port/minimum"),
            Some(&serde_json::json!(0))
        );
    }
}
