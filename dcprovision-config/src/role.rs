use std::{fmt::Display, str::FromStr};

use anyhow::bail;
use serde::Deserialize;

/// The part a server plays in its domain
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// Holds the domain's directory and authenticates its members
    #[default]
    #[serde(rename = "domain controller")]
    DomainController,
    /// Joined to a domain served by another controller
    #[serde(rename = "member server")]
    MemberServer,
    /// Not part of any domain
    #[serde(rename = "standalone")]
    Standalone,
}

impl ServerRole {
    /// The name used in configuration files and templates
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::DomainController => "domain controller",
            ServerRole::MemberServer => "member server",
            ServerRole::Standalone => "standalone",
        }
    }
}

impl Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "dc" | "domain controller" => ServerRole::DomainController,
            "member" | "member server" => ServerRole::MemberServer,
            "standalone" => ServerRole::Standalone,
            _ => bail!("Unknown server role \"{}\" (expected dc, member or standalone)", s),
        })
    }
}
