//! The routing configuration document.
//!
//! ```json
//! {
//!   "devices":  { "KBD": { "name": "USBKeys", "port": 0 } },
//!   "mappings": {
//!     "M": { "inputs": ["KBD"], "outputs": ["SYNTH"],
//!            "filters": { "transpose": { "step": 1 } } }
//!   },
//!   "clock": {}, "sysex": [], "options": {}
//! }
//! ```
//!
//! Devices, mappings and filters keep document order. `clock`, `sysex` and
//! `options` are carried verbatim so that any content deserializes; typed
//! views decode them leniently.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Product name of the device.
    pub name: String,
    #[serde(default)]
    pub port: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Filter key to filter settings, applied in this order.
    #[serde(default, with = "ordered_map")]
    pub filters: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default, with = "ordered_map")]
    pub devices: Vec<(String, DeviceConfig)>,
    /// Product names whose hotplug events are ignored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    #[serde(default, with = "ordered_map")]
    pub mappings: Vec<(String, MappingConfig)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysex: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    pub hotplug: bool,
    pub sync_config_to_usb: bool,
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            hotplug: true,
            sync_config_to_usb: false,
            verbose: false,
        }
    }
}

/// A sysex dump to send to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysexEntry {
    pub path: String,
    /// Output nickname.
    pub output: String,
}

impl RouterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects duplicate device nicknames or mapping names, and devices with
    /// an empty product name.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (nickname, device) in &self.devices {
            if !seen.insert(nickname.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate device '{nickname}'")));
            }
            if device.name.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("device '{nickname}' has no name")));
            }
        }
        seen.clear();
        for (name, _) in &self.mappings {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate mapping '{name}'")));
            }
        }
        Ok(())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn device(&self, nickname: &str) -> Option<&DeviceConfig> {
        self.devices
            .iter()
            .find(|(n, _)| n == nickname)
            .map(|(_, d)| d)
    }

    pub fn mapping(&self, name: &str) -> Option<&MappingConfig> {
        self.mappings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    /// The `options` section; malformed content falls back to defaults.
    pub fn options(&self) -> Options {
        match &self.options {
            None => Options::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("Ignoring malformed options section: {e}");
                Options::default()
            }),
        }
    }

    /// Entries of the `sysex` section; malformed entries are skipped.
    pub fn sysex_entries(&self) -> Vec<SysexEntry> {
        let Some(Value::Array(entries)) = &self.sysex else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Ignoring malformed sysex entry: {e}");
                    None
                }
            })
            .collect()
    }
}

/// (De)serializes `Vec<(String, T)>` as a map, keeping entry order.
mod ordered_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(entries: &Vec<(String, T)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }

    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(entry) = access.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "devices": {
            "KBD": { "name": "USBKeys", "port": 0 },
            "SYNTH": { "name": "USBSynth" }
        },
        "mappings": {
            "zeta": { "inputs": ["KBD"], "outputs": ["SYNTH"],
                      "filters": { "velocity": { "mode": "drop" }, "transpose": { "step": 1 }, "chord": { "chord": "MAJOR3" } } },
            "alpha": { "inputs": ["KBD"], "outputs": [], "listen": { "clock": true } }
        },
        "clock": { "bpm": 120, "ppqn": 24, "tapEnabled": true, "analog": [1, 2] },
        "sysex": [ { "path": "/tmp/a.syx", "output": "SYNTH" }, { "oops": 1 } ],
        "options": { "hotplug": false, "verbose": true }
    }"#;

    #[test]
    fn test_parse_keeps_document_order() {
        let config = RouterConfig::from_json_str(DOCUMENT).unwrap();
        let names: Vec<_> = config.mappings.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);

        let filters: Vec<_> = config.mapping("zeta").unwrap().filters.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(filters, vec!["velocity", "transpose", "chord"]);

        assert_eq!(config.device("SYNTH").unwrap().port, 0);
        assert!(config.mapping("alpha").unwrap().inputs.contains(&"KBD".to_string()));
    }

    #[test]
    fn test_extra_sections_are_tolerated() {
        let config = RouterConfig::from_json_str(DOCUMENT).unwrap();
        let options = config.options();
        assert!(!options.hotplug);
        assert!(options.verbose);
        assert!(!options.sync_config_to_usb);

        let sysex = config.sysex_entries();
        assert_eq!(sysex.len(), 1);
        assert_eq!(sysex[0].output, "SYNTH");

        let odd = RouterConfig::from_json_str(r#"{"clock": 5, "sysex": "none", "options": [1]}"#).unwrap();
        assert_eq!(odd.options(), Options::default());
        assert!(odd.sysex_entries().is_empty());
        assert!(odd.mappings.is_empty());
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let duplicate = r#"{"devices": {"A": {"name": "X"}, "A": {"name": "Y"}}}"#;
        assert!(matches!(
            RouterConfig::from_json_str(duplicate),
            Err(Error::InvalidConfig(_))
        ));
        let unnamed = r#"{"devices": {"A": {"name": " "}}}"#;
        assert!(RouterConfig::from_json_str(unnamed).is_err());
        let mappings = r#"{"mappings": {"M": {}, "M": {}}}"#;
        assert!(RouterConfig::from_json_str(mappings).is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = RouterConfig::from_json_str(DOCUMENT).unwrap();
        let reparsed = RouterConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, DOCUMENT).unwrap();
        assert_eq!(RouterConfig::from_path(&path).unwrap().devices.len(), 2);
        assert!(RouterConfig::from_path(dir.path().join("missing.json")).is_err());
    }
}
