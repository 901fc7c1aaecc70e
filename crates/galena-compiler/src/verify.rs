//! Numerical verification hook.

use crate::{PartitionParams, Result};
use galena_core::Tensor;
use galena_module::PartitionedModule;

/// Hook asserting numerical equivalence between the framework's reference
/// outputs and the compiled module's outputs on the same sample inputs.
///
/// Execution of the partitioned module is outside this crate; implementors
/// bring their own evaluator. A mismatch is surfaced as
/// [`Error::Verification`](crate::Error::Verification) and never retried.
pub trait GraphVerifier {
    fn verify(
        &self,
        module: &PartitionedModule,
        params: &PartitionParams,
        inputs: &[Tensor],
        reference_outputs: &[Tensor],
    ) -> Result<()>;
}
