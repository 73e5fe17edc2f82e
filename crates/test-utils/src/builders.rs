#![allow(dead_code)]

use std::path::Path;

use vmprov::config::{EngineConfig, PoolSection, RawEngineConfig, ScriptsSection, SessionSection};
use vmprov::resolve::Role;
use vmprov::vm::{DiskSpec, VmConfiguration};

/// Builder for `VmConfiguration` to simplify test setup.
pub struct VmConfigurationBuilder {
    config: VmConfiguration,
}

impl VmConfigurationBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: VmConfiguration {
                name: name.to_string(),
                ..VmConfiguration::default()
            },
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.config.role = role;
        self
    }

    pub fn script(mut self, name: &str) -> Self {
        self.config.script = Some(name.to_string());
        self
    }

    pub fn cpus(mut self, count: u32) -> Self {
        self.config.hardware.processor_count = count;
        self
    }

    pub fn memory_gb(mut self, gb: u32) -> Self {
        self.config.hardware.memory_gb = gb;
        self
    }

    pub fn storage_gb(mut self, gb: u32) -> Self {
        self.config.hardware.storage_gb = gb;
        self
    }

    pub fn disk(mut self, name: &str, size_gb: u32) -> Self {
        self.config.hardware.additional_disks.push(DiskSpec {
            name: name.to_string(),
            size_gb,
        });
        self
    }

    /// Switch to a static address.
    pub fn static_ip(mut self, ip: &str, mask: &str, gateway: &str, dns: &[&str]) -> Self {
        let net = &mut self.config.network;
        net.use_dhcp = false;
        net.ip_address = ip.to_string();
        net.subnet_mask = mask.to_string();
        net.gateway = gateway.to_string();
        net.dns_servers = dns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn computer_name(mut self, name: &str) -> Self {
        self.config.os.computer_name = name.to_string();
        self
    }

    pub fn admin_password(mut self, password: &str) -> Self {
        self.config.os.admin_password = password.to_string();
        self
    }

    pub fn build(self) -> VmConfiguration {
        self.config
    }
}

/// Builder for `EngineConfig`, validated on `build`.
pub struct EngineConfigBuilder {
    config: RawEngineConfig,
}

impl EngineConfigBuilder {
    pub fn new(script_root: impl AsRef<Path>) -> Self {
        Self {
            config: RawEngineConfig {
                pool: PoolSection::default(),
                scripts: ScriptsSection {
                    root: script_root.as_ref().to_path_buf(),
                    ..ScriptsSection::default()
                },
                session: SessionSection {
                    poll_interval_ms: 10,
                    stop_grace_ms: 2_000,
                    timeout_secs: None,
                },
            },
        }
    }

    pub fn pool(mut self, min_size: usize, max_size: usize) -> Self {
        self.config.pool = PoolSection { min_size, max_size };
        self
    }

    pub fn extension(mut self, ext: &str) -> Self {
        self.config.scripts.extension = ext.to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.session.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
