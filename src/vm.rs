// src/vm.rs

//! Persisted VM configuration document and its mapping to script parameters.
//!
//! Documents are JSON, e.g.:
//!
//! ```json
//! {
//!   "name": "X",
//!   "role": "file-server",
//!   "hardware": { "processorCount": 2, "memoryGb": 4, "storageGb": 80 },
//!   "network": { "switchName": "Default Switch", "useDhcp": true },
//!   "os": { "version": "Windows Server 2022" }
//! }
//! ```
//!
//! Every section is optional and falls back to its defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::ParameterCollection;
use crate::resolve::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VmConfiguration {
    pub name: String,
    pub role: Role,
    /// Explicit script name; takes precedence over the role's script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    pub hardware: HardwareSection,
    pub network: NetworkSection,
    pub os: OsSection,
    pub additional: AdditionalSection,
    pub metadata: MetadataSection,
}

impl Default for VmConfiguration {
    fn default() -> Self {
        Self {
            name: "NewVM".to_string(),
            role: Role::CustomVm,
            script: None,
            hardware: HardwareSection::default(),
            network: NetworkSection::default(),
            os: OsSection::default(),
            additional: AdditionalSection::default(),
            metadata: MetadataSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardwareSection {
    pub processor_count: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
    /// Hyper-V style VM generation (1 or 2).
    pub generation: u8,
    pub secure_boot: bool,
    pub enable_tpm: bool,
    pub dynamic_memory: bool,
    pub additional_disks: Vec<DiskSpec>,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            processor_count: 2,
            memory_gb: 4,
            storage_gb: 80,
            generation: 2,
            secure_boot: true,
            enable_tpm: false,
            dynamic_memory: true,
            additional_disks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    #[serde(default)]
    pub name: String,
    pub size_gb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSection {
    pub switch_name: String,
    pub use_dhcp: bool,
    pub ip_address: String,
    pub subnet_mask: String,
    pub gateway: String,
    pub dns_servers: Vec<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            switch_name: "Default Switch".to_string(),
            use_dhcp: true,
            ip_address: String::new(),
            subnet_mask: String::new(),
            gateway: String::new(),
            dns_servers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OsSection {
    pub version: String,
    pub product_key: String,
    /// Placeholder only; real credentials are supplied at run time.
    pub admin_password: String,
    pub computer_name: String,
}

impl Default for OsSection {
    fn default() -> Self {
        Self {
            version: "Windows Server 2022".to_string(),
            product_key: String::new(),
            admin_password: String::new(),
            computer_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdditionalSection {
    pub auto_start: bool,
    pub enable_rdp: bool,
    pub enable_remote_management: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataSection {
    pub author: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl VmConfiguration {
    /// Script parameters for this configuration.
    ///
    /// Pure and total: every configuration maps to a collection. Static IP
    /// fields are only passed when DHCP is off; secrets only when set.
    pub fn to_parameters(&self) -> ParameterCollection {
        let hw = &self.hardware;
        let mut params = ParameterCollection::new()
            .with("VMName", self.name.as_str())
            .with("Role", self.role.slug())
            .with("CPUCount", i64::from(hw.processor_count))
            .with("MemoryGB", i64::from(hw.memory_gb))
            .with("StorageGB", i64::from(hw.storage_gb))
            .with("Generation", i64::from(hw.generation))
            .with("SecureBoot", hw.secure_boot)
            .with("EnableTPM", hw.enable_tpm)
            .with("DynamicMemory", hw.dynamic_memory)
            .with("SwitchName", self.network.switch_name.as_str())
            .with("UseDHCP", self.network.use_dhcp);

        if !self.network.use_dhcp {
            params.add("IPAddress", self.network.ip_address.as_str());
            params.add("SubnetMask", self.network.subnet_mask.as_str());
            params.add("Gateway", self.network.gateway.as_str());
            params.add("DNSServers", self.network.dns_servers.join(","));
        }

        params.add("OSVersion", self.os.version.as_str());
        let computer_name = if self.os.computer_name.trim().is_empty() {
            self.name.as_str()
        } else {
            self.os.computer_name.as_str()
        };
        params.add("ComputerName", computer_name);
        if !self.os.product_key.is_empty() {
            params.add("ProductKey", self.os.product_key.as_str());
        }
        if !self.os.admin_password.is_empty() {
            params.add("AdminPassword", self.os.admin_password.as_str());
        }

        params.add("AutoStart", self.additional.auto_start);
        params.add("EnableRDP", self.additional.enable_rdp);
        params.add("EnableRemoteManagement", self.additional.enable_remote_management);

        params.add("AdditionalDiskCount", hw.additional_disks.len() as i64);
        let sizes = hw
            .additional_disks
            .iter()
            .map(|d| d.size_gb.to_string())
            .collect::<Vec<_>>()
            .join(",");
        params.add("AdditionalDiskSizesGB", sizes);

        params
    }
}

/// Sizing and feature defaults for role provisioning.
///
/// Caller-supplied parameters are merged over these, so only what the
/// caller leaves out comes from here.
pub fn role_defaults(role: &Role) -> ParameterCollection {
    let role = role.script_role();
    let (cpu, memory_gb, storage_gb): (i64, i64, i64) = match role {
        Role::DomainController => (2, 4, 80),
        Role::FileServer => (2, 4, 500),
        Role::WebServer => (2, 4, 100),
        Role::SqlServer => (4, 16, 250),
        Role::DhcpServer | Role::DnsServer => (2, 2, 60),
        Role::RemoteDesktopSessionHost => (4, 16, 200),
        Role::CustomVm | Role::Other(_) => (2, 4, 80),
    };

    ParameterCollection::new()
        .with("VMName", format!("{}-vm", role.slug()))
        .with("Role", role.slug())
        .with("CPUCount", cpu)
        .with("MemoryGB", memory_gb)
        .with("StorageGB", storage_gb)
        .with("Generation", 2_i64)
        .with("SwitchName", "Default Switch")
        .with("UseDHCP", !matches!(role, Role::DomainController | Role::DhcpServer | Role::DnsServer))
        .with("EnableRDP", matches!(role, Role::RemoteDesktopSessionHost))
}
