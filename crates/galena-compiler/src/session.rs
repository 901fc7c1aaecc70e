//! Per-compilation fragment registry.
//!
//! The external compiler builds one serialized graph fragment per partition
//! function and reports each through a registration callback. A [`Session`]
//! is the target of those callbacks: one table per device class, created
//! fresh for every top-level compilation so no state leaks between models
//! compiled in the same process.

use galena_core::Device;
use std::collections::HashMap;

/// One registered partition-function fragment: the serialized graph text plus
/// the ordered parameter names its codegen assigned.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub graph_text: String,
    pub param_names: Vec<String>,
}

/// Compilation-scoped registry of graph fragments, one table per device.
///
/// CPU and accelerator partitions are compiled through independent code
/// paths, hence the two tables. Registration is idempotent: re-entrant
/// compilation may report the same function more than once, and only the
/// first registration is kept.
#[derive(Debug, Default)]
pub struct Session {
    device: HashMap<String, Fragment>,
    cpu: HashMap<String, Fragment>,
}

impl Session {
    /// Empty session for one top-level compilation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled partition function. No-op if `function_name` is
    /// already present in the device's table.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut session = Session::new();
    /// session.register(Device::Tt, "galena_main_0", graph_json, param_names);
    /// ```
    pub fn register(
        &mut self,
        device: Device,
        function_name: &str,
        graph_text: impl Into<String>,
        param_names: Vec<String>,
    ) {
        let table = self.table_mut(device);
        if table.contains_key(function_name) {
            return;
        }
        table.insert(
            function_name.to_string(),
            Fragment {
                graph_text: graph_text.into(),
                param_names,
            },
        );
    }

    /// Look up a registered fragment.
    pub fn fragment(&self, device: Device, function_name: &str) -> Option<&Fragment> {
        self.table(device).get(function_name)
    }

    /// Number of fragments registered for `device`.
    pub fn len(&self, device: Device) -> usize {
        self.table(device).len()
    }

    /// Check whether no fragment is registered for `device`.
    pub fn is_empty(&self, device: Device) -> bool {
        self.table(device).is_empty()
    }

    /// Drop all registered fragments. A fresh session per compilation is
    /// preferred; this exists for callers that must reuse one.
    pub fn clear(&mut self) {
        self.device.clear();
        self.cpu.clear();
    }

    fn table(&self, device: Device) -> &HashMap<String, Fragment> {
        match device {
            Device::Tt => &self.device,
            Device::Cpu => &self.cpu,
        }
    }

    fn table_mut(&mut self, device: Device) -> &mut HashMap<String, Fragment> {
        match device {
            Device::Tt => &mut self.device,
            Device::Cpu => &mut self.cpu,
        }
    }
}
