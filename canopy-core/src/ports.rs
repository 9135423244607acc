//! Built-in port types and connection compatibility.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Source,
    Sink,
    Bidirectional,
    Relay,
    Intercept,
}

impl Polarity {
    /// Relay ports forward what they receive and count as sources.
    fn effective(self) -> Self {
        match self {
            Self::Relay => Self::Source,
            other => other,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortType {
    pub id: &'static str,
    pub polarity: Polarity,
    /// Port types this one may connect to; `*` accepts any.
    pub compatible_with: &'static [&'static str],
    pub description: &'static str,
}

impl PortType {
    fn accepts(&self, other: &str) -> bool {
        self.compatible_with.iter().any(|c| *c == "*" || *c == other)
    }
}

pub static PORT_TYPES: &[PortType] = &[
    PortType {
        id: "flow-in",
        polarity: Polarity::Sink,
        compatible_with: &["flow-out"],
        description: "Receives flow from upstream",
    },
    PortType {
        id: "flow-out",
        polarity: Polarity::Source,
        compatible_with: &["flow-in"],
        description: "Sends flow downstream",
    },
    PortType {
        id: "parent",
        polarity: Polarity::Source,
        compatible_with: &["child"],
        description: "Owns child constructs",
    },
    PortType {
        id: "child",
        polarity: Polarity::Sink,
        compatible_with: &["parent"],
        description: "Belongs to a parent construct",
    },
    PortType {
        id: "symmetric",
        polarity: Polarity::Bidirectional,
        compatible_with: &["symmetric"],
        description: "Peer-to-peer link",
    },
    PortType {
        id: "intercept",
        polarity: Polarity::Intercept,
        compatible_with: &["*"],
        description: "Observes traffic on a connection",
    },
    PortType {
        id: "relay",
        polarity: Polarity::Relay,
        compatible_with: &["*"],
        description: "Forwards to any port",
    },
];

pub fn port_type(id: &str) -> Option<&'static PortType> {
    PORT_TYPES.iter().find(|p| p.id == id)
}

/// Check whether a `source` port type may connect to a `target` port type.
/// The error is a human-readable reason.
pub fn can_connect(source: &str, target: &str) -> Result<(), String> {
    let s = port_type(source).ok_or_else(|| format!("unknown port type '{source}'"))?;
    let t = port_type(target).ok_or_else(|| format!("unknown port type '{target}'"))?;

    match (s.polarity.effective(), t.polarity.effective()) {
        (Polarity::Source, Polarity::Source) => {
            return Err(format!("'{source}' and '{target}' are both sources"))
        }
        (Polarity::Sink, Polarity::Sink) => {
            return Err(format!("'{source}' and '{target}' are both sinks"))
        }
        _ => {}
    }

    if s.accepts(t.id) || t.accepts(s.id) {
        Ok(())
    } else {
        Err(format!("'{source}' is not compatible with '{target}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_ports_connect() {
        assert!(can_connect("flow-out", "flow-in").is_ok());
        assert!(can_connect("flow-in", "flow-out").is_ok());
        assert!(can_connect("parent", "child").is_ok());
        assert!(can_connect("symmetric", "symmetric").is_ok());
    }

    #[test]
    fn test_same_polarity_rejected() {
        assert!(can_connect("flow-out", "flow-out").is_err());
        assert!(can_connect("flow-in", "child").is_err());
        // relay behaves as a source
        assert!(can_connect("relay", "flow-out").is_err());
        assert!(can_connect("relay", "flow-in").is_ok());
    }

    #[test]
    fn test_wildcards() {
        assert!(can_connect("intercept", "flow-out").is_ok());
        assert!(can_connect("symmetric", "intercept").is_ok());
        assert!(can_connect("symmetric", "flow-in").is_err());
    }

    #[test]
    fn test_unknown_type() {
        assert!(can_connect("bogus", "flow-in").unwrap_err().contains("bogus"));
    }
}
