use serde::Serialize;
use sysinfo::System;

/// Identity of the sampled machine, stamped on exported batches.
#[derive(Debug, Serialize, Clone, Default)]
pub struct HostInfo {
    pub host_name: Option<String>,
    pub kernel_version: Option<String>,
    pub os_version: Option<String>,
}

pub fn collect() -> HostInfo {
    HostInfo {
        host_name: System::host_name(),
        kernel_version: System::kernel_version(),
        os_version: System::long_os_version(),
    }
}
