//! Bucketing of partition call sites into the three-segment plan.

use crate::module::PartitionedModule;
use galena_core::Device;

/// Ordered segment buckets of a partitioned module: an optional CPU
/// pre-segment, the accelerator segment, and an optional CPU post-segment.
/// Each bucket lists partition function names in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentPlan {
    pub cpu_pre: Vec<String>,
    pub device: Vec<String>,
    pub cpu_post: Vec<String>,
}

impl SegmentPlan {
    /// Bucket the module's partition call sites by device.
    ///
    /// The call sites must form a `cpu* accelerator+ cpu*` run. Any other
    /// interleaving means the external compiler violated its partitioning
    /// contract, so it is a hard failure rather than a recoverable error.
    ///
    /// # Panics
    ///
    /// Panics when cpu and accelerator calls interleave, or when the module
    /// has no accelerator partition at all.
    pub fn from_module(module: &PartitionedModule) -> Self {
        let sites = module.call_sites();
        let devices: Vec<Device> = sites
            .iter()
            .map(|call| {
                // call_sites only returns calls to known functions
                module
                    .function(&call.callee)
                    .map(|f| f.device)
                    .unwrap_or_else(|| panic!("call site to unknown function {}", call.callee))
            })
            .collect();

        let mut plan = SegmentPlan::default();
        let mut idx = 0;
        while idx < sites.len() && devices[idx].is_cpu() {
            plan.cpu_pre.push(sites[idx].callee.clone());
            idx += 1;
        }
        while idx < sites.len() && !devices[idx].is_cpu() {
            plan.device.push(sites[idx].callee.clone());
            idx += 1;
        }
        while idx < sites.len() && devices[idx].is_cpu() {
            plan.cpu_post.push(sites[idx].callee.clone());
            idx += 1;
        }

        assert_eq!(
            idx,
            sites.len(),
            "cpu and accelerator partitions interleave; expected cpu*, accelerator+, cpu* call order"
        );
        assert!(
            !plan.device.is_empty(),
            "partitioned module has no accelerator segment"
        );
        plan
    }

    /// Check whether `name` belongs to the accelerator bucket.
    pub fn is_device_function(&self, name: &str) -> bool {
        self.device.iter().any(|f| f == name)
    }

    /// Check whether `name` belongs to the CPU pre-segment bucket.
    pub fn is_pre_function(&self, name: &str) -> bool {
        self.cpu_pre.iter().any(|f| f == name)
    }
}
