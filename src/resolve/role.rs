// src/resolve/role.rs

//! Server roles and the fixed role → script table.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subdirectory of the script root that holds the per-role scripts.
pub const ROLE_CONFIGURATION_DIR: &str = "role-configuration";

/// Logical server-configuration category.
///
/// Parsing never fails: names outside the known set become [`Role::Other`],
/// which resolves to the custom-vm script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    DomainController,
    FileServer,
    WebServer,
    SqlServer,
    DhcpServer,
    DnsServer,
    RemoteDesktopSessionHost,
    CustomVm,
    Other(String),
}

impl Role {
    /// The eight roles with a dedicated script, in table order.
    pub const KNOWN: [Role; 8] = [
        Role::DomainController,
        Role::FileServer,
        Role::WebServer,
        Role::SqlServer,
        Role::DhcpServer,
        Role::DnsServer,
        Role::RemoteDesktopSessionHost,
        Role::CustomVm,
    ];

    /// Kebab-case name; also the script file stem for known roles.
    pub fn slug(&self) -> &str {
        match self {
            Role::DomainController => "domain-controller",
            Role::FileServer => "file-server",
            Role::WebServer => "web-server",
            Role::SqlServer => "sql-server",
            Role::DhcpServer => "dhcp-server",
            Role::DnsServer => "dns-server",
            Role::RemoteDesktopSessionHost => "remote-desktop-session-host",
            Role::CustomVm => "custom-vm",
            Role::Other(name) => name,
        }
    }

    /// The role whose script this role runs: itself when known, otherwise
    /// [`Role::CustomVm`].
    pub fn script_role(&self) -> Role {
        match self {
            Role::Other(_) => Role::CustomVm,
            known => known.clone(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Role::Other(_))
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::CustomVm
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Lowercase with separators stripped, so `file-server`, `File_Server` and
/// `FileServer` all compare equal.
fn compact(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = compact(s.trim());
        let role = Role::KNOWN
            .iter()
            .find(|r| compact(r.slug()) == key)
            .cloned()
            .unwrap_or_else(|| Role::Other(s.trim().to_string()));
        Ok(role)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(role) => role,
            Err(never) => match never {},
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.slug().to_string()
    }
}
