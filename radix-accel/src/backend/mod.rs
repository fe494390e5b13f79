//! The cryptographic capability boundary of the engine.
//!
//! The engine never looks inside the two expensive primitives it pipelines;
//! it only needs a pair of batched operations, supplied by a backend that
//! owns the (opaque) key material resident on the device:
//!
//! - `KeySwitch(lwe_in) -> lwe_small`, converting big post-bootstrap blocks
//!   to the small dimension the bootstrap consumes;
//! - `Bootstrap(lwe_in, lut) -> lwe_out`, evaluating an accumulator on a
//!   small block and producing a refreshed big block.
//!
//! Any implementation (accelerator vendor, bootstrap variant) substitutes
//! behind this same two-operation contract.

mod clear;

pub use clear::ClearBackend;

use crate::device::Stream;
use crate::parameters::RadixAccelParameters;

pub trait AccelBackend: Send + Sync {
    /// Keyswitches `num_blocks` big-LWE ciphertexts into `output` as
    /// small-LWE ciphertexts, consuming the backend's resident keyswitch
    /// key. `input` is a flat list of `num_blocks *
    /// (big_lwe_dimension + 1)` scalars, `output` of `num_blocks *
    /// (lwe_dimension + 1)`.
    fn keyswitch_batch(
        &self,
        stream: &Stream,
        params: &RadixAccelParameters,
        output: &mut [u64],
        input: &[u64],
        num_blocks: usize,
    );

    /// Bootstraps `num_blocks` small-LWE ciphertexts through the resident
    /// `accumulator`, consuming the backend's resident bootstrapping key,
    /// and writes one big-LWE block per input block.
    fn bootstrap_batch(
        &self,
        stream: &Stream,
        params: &RadixAccelParameters,
        output: &mut [u64],
        input: &[u64],
        accumulator: &[u64],
        num_blocks: usize,
    );
}

impl<B: AccelBackend + ?Sized> AccelBackend for &B {
    fn keyswitch_batch(
        &self,
        stream: &Stream,
        params: &RadixAccelParameters,
        output: &mut [u64],
        input: &[u64],
        num_blocks: usize,
    ) {
        (**self).keyswitch_batch(stream, params, output, input, num_blocks);
    }

    fn bootstrap_batch(
        &self,
        stream: &Stream,
        params: &RadixAccelParameters,
        output: &mut [u64],
        input: &[u64],
        accumulator: &[u64],
        num_blocks: usize,
    ) {
        (**self).bootstrap_batch(stream, params, output, input, accumulator, num_blocks);
    }
}
