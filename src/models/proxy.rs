use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Untested,
    Alive,
    Failed,
}

/// A proxy endpoint as listed in the proxy file, e.g. `10.0.0.5:3128`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub address: String,
    pub liveness: Liveness,
}

impl ProxyCandidate {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().trim().to_string(),
            liveness: Liveness::Untested,
        }
    }

    /// Address with an explicit scheme, as expected by HTTP clients and Chrome.
    pub fn server_url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }

    pub fn mark(&mut self, liveness: Liveness) {
        self.liveness = liveness;
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
