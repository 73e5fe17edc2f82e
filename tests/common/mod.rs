#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use vmprov::interp::InterpreterPool;
use vmprov::params::ParameterCollection;
use vmprov::provision::Provisioner;
use vmprov::resolve::ScriptHandle;
use vmprov::session::{ExecutionSession, SessionOptions};

pub use vmprov_test_utils::builders;
pub use vmprov_test_utils::{
    EngineConfigBuilder, RecordingSink, VmConfigurationBuilder, init_tracing, with_timeout,
};

/// Write `files` (relative path, contents) under a fresh temp directory.
pub fn script_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (rel, contents) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create script dir");
        }
        fs::write(&path, contents).expect("write script");
    }
    dir
}

/// Provisioner over `root` with a fast poll interval.
pub fn engine(root: &Path) -> Provisioner {
    Provisioner::from_config(&EngineConfigBuilder::new(root).build()).expect("start engine")
}

pub fn quick_options() -> SessionOptions {
    SessionOptions {
        poll_interval: Duration::from_millis(10),
        stop_grace: Duration::from_secs(2),
        timeout: None,
    }
}

pub fn inline_session(
    pool: &InterpreterPool,
    source: &str,
    params: ParameterCollection,
) -> ExecutionSession {
    ExecutionSession::new(
        pool.clone(),
        ScriptHandle::inline("test-script", source),
        params,
        quick_options(),
    )
}

/// Lua statement emitting a StatusUpdate record.
pub fn lua_status(percent: u8, message: &str) -> String {
    format!(
        "write_output({{ Type = \"StatusUpdate\", PercentComplete = {percent}, StatusMessage = {message:?} }})\n"
    )
}

/// Lua statement emitting a Result record.
pub fn lua_result(success: bool, message: &str) -> String {
    format!("write_output({{ Type = \"Result\", Success = {success}, Message = {message:?} }})\n")
}

/// The end-to-end provisioning script: three status updates, then a
/// success Result naming the VM.
pub const CREATE_VM_SCRIPT: &str = r#"
write_output({ Type = "StatusUpdate", PercentComplete = 25, StatusMessage = "Creating virtual machine..." })
write_output({ Type = "StatusUpdate", PercentComplete = 50, StatusMessage = "Configuring operating system..." })
write_output({ Type = "StatusUpdate", PercentComplete = 75, StatusMessage = "Finalizing VM creation..." })
write_output({
    Type = "Result",
    Success = true,
    Message = "VM '" .. VMName .. "' created successfully.",
    VMName = VMName,
    CPUCount = CPUCount,
})
"#;
