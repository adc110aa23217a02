//! Campus and service kind identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One of the three fixed campuses, each owning its own reservation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Campus {
    Dvl,
    Kkl,
    Wst,
}

impl Campus {
    /// All campuses in summary order
    pub const ALL: [Campus; 3] = [Campus::Dvl, Campus::Kkl, Campus::Wst];

    /// Canonical upper-case code used in booking ids and registry keys
    pub fn code(self) -> &'static str {
        match self {
            Campus::Dvl => "DVL",
            Campus::Kkl => "KKL",
            Campus::Wst => "WST",
        }
    }

    /// The other two campuses
    pub fn peers(self) -> impl Iterator<Item = Campus> {
        Self::ALL.into_iter().filter(move |c| *c != self)
    }
}

impl fmt::Display for Campus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Campus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dvl" => Ok(Campus::Dvl),
            "kkl" => Ok(Campus::Kkl),
            "wst" => Ok(Campus::Wst),
            other => Err(Error::InvalidArgument(format!(
                "Invalid campus '{}', must be one of (dvl, kkl, wst)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Campus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Campus> for String {
    fn from(campus: Campus) -> Self {
        campus.code().to_string()
    }
}

/// Kind of endpoint published in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Client-facing endpoint of a campus
    #[serde(alias = "web")]
    Directory,
    /// Campus-to-campus endpoint
    #[serde(alias = "udp")]
    InterNode,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Directory => "directory",
            ServiceKind::InterNode => "inter-node",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "directory" | "web" => Ok(ServiceKind::Directory),
            "inter-node" | "udp" => Ok(ServiceKind::InterNode),
            other => Err(Error::InvalidArgument(format!(
                "Unknown service kind '{}'",
                other
            ))),
        }
    }
}
