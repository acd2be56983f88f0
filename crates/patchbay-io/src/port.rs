//! Logical port identity.

use std::fmt;

/// Identity of a logical MIDI port, independent of whether the hardware is
/// currently plugged in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRecord {
    name: String,
    port: usize,
    nickname: String,
}

impl PortRecord {
    /// An empty or missing nickname is derived from the product name and port.
    pub fn new(name: impl Into<String>, port: usize, nickname: Option<&str>) -> Self {
        let name = name.into();
        let nickname = match nickname {
            Some(nickname) if !nickname.is_empty() => nickname.to_string(),
            _ => Self::default_nickname(&name, port),
        };
        Self {
            name,
            port,
            nickname,
        }
    }

    pub fn default_nickname(name: &str, port: usize) -> String {
        format!("{name}___{port}")
    }

    /// Device product name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> usize {
        self.port
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub(crate) fn renamed(&self, nickname: &str) -> Self {
        Self::new(self.name.clone(), self.port, Some(nickname))
    }
}

impl fmt::Display for PortRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.nickname, self.name, self.port)
    }
}
