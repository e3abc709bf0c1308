//! Camera source descriptors shared by configuration, capture and analytics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How frames are obtained from a camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportDescriptor {
    /// MJPEG stream over HTTP (`http://host:port/path`)
    Network { uri: String },
    /// Locally attached device, `/dev/video{index}`
    Local { index: u32 },
}

impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportDescriptor::Network { uri } => write!(f, "network({uri})"),
            TransportDescriptor::Local { index } => write!(f, "local(/dev/video{index})"),
        }
    }
}

/// Static description of one camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    /// Administrative flag: inactive sources are never started by `start_all`
    #[serde(default = "default_active")]
    pub active: bool,
    pub transport: TransportDescriptor,
}

fn default_active() -> bool {
    true
}

impl SourceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        transport: TransportDescriptor,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            active: true,
            transport,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
