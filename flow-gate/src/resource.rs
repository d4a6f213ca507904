use std::fmt;

/// Direction of the protected call relative to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrafficType {
    /// Traffic entering this process (e.g. an incoming HTTP request).
    Inbound,
    /// Traffic leaving this process (e.g. a downstream RPC).
    #[default]
    Outbound,
}

/// How the resource name was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceKind {
    /// A plain user-chosen name.
    #[default]
    Plain,
    /// A fully qualified method descriptor.
    Method,
}

/// Identifies a protected resource.
///
/// Two identifiers are equal iff all three fields are equal; this equality is
/// the key of the slot-chain registry, so the same name with a different
/// traffic type binds a distinct chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    name: String,
    traffic: TrafficType,
    kind: ResourceKind,
}

impl ResourceId {
    pub fn new(name: impl Into<String>, traffic: TrafficType, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            traffic,
            kind,
        }
    }

    /// A plain inbound resource.
    pub fn inbound(name: impl Into<String>) -> Self {
        Self::new(name, TrafficType::Inbound, ResourceKind::Plain)
    }

    /// A plain outbound resource.
    pub fn outbound(name: impl Into<String>) -> Self {
        Self::new(name, TrafficType::Outbound, ResourceKind::Plain)
    }

    /// A method resource identified by its fully qualified descriptor.
    pub fn method(descriptor: impl Into<String>, traffic: TrafficType) -> Self {
        Self::new(descriptor, traffic, ResourceKind::Method)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn traffic(&self) -> TrafficType {
        self.traffic
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// Bare names default to outbound, matching the plain-string entry shorthand.
impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::outbound(name)
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self::outbound(name)
    }
}
