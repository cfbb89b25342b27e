use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Transport protocol of an exposed port.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl FromStr for Protocol {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "sctp" => Ok(Protocol::Sctp),
            other => Err(ModelError::UnknownProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Sctp => "SCTP",
        })
    }
}

/// Named container port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    pub name: String,
    pub number: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl PortSpec {
    pub fn validate(&self) -> ModelResult<()> {
        if self.number == 0 {
            return Err(ModelError::InvalidPort(format!(
                "{}: port number must be in 1..=65535",
                self.name
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ModelError::InvalidPort(format!(
                "{}: port name is empty",
                self.number
            )));
        }
        Ok(())
    }
}

/// Accepts `NUMBER`, `NUMBER/PROTO`, `NAME:NUMBER` or `NAME:NUMBER/PROTO`.
///
/// Unnamed ports are called `port-<number>`.
impl FromStr for PortSpec {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        let (head, protocol) = match s.split_once('/') {
            Some((head, proto)) => (head, proto.parse()?),
            None => (s, Protocol::Tcp),
        };
        let (name, number) = match head.split_once(':') {
            Some((name, number)) => (Some(name), number),
            None => (None, head),
        };
        let number: u16 = number
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidPort(s.to_string()))?;

        let port = PortSpec {
            name: name.map_or_else(|| format!("port-{number}"), str::to_string),
            number,
            protocol,
        };
        port.validate()?;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_forms() {
        let p: PortSpec = "8080".parse().unwrap();
        assert_eq!(p.name, "port-8080");
        assert_eq!(p.number, 8080);
        assert_eq!(p.protocol, Protocol::Tcp);

        let p: PortSpec = "dns:53/udp".parse().unwrap();
        assert_eq!(p.name, "dns");
        assert_eq!(p.number, 53);
        assert_eq!(p.protocol, Protocol::Udp);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!("0".parse::<PortSpec>().is_err());
        assert!("http:abc".parse::<PortSpec>().is_err());
        assert!("80/quic".parse::<PortSpec>().is_err());
        assert!("70000".parse::<PortSpec>().is_err());
    }
}
