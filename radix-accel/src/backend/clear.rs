//! Software model of the cryptographic backend.

use super::AccelBackend;
use crate::device::Stream;
use crate::parameters::RadixAccelParameters;
use rayon::prelude::*;

/// A backend operating on trivial ciphertexts only: the mask is ignored and
/// the body carries the plaintext encoding directly.
///
/// The bootstrap evaluates the accumulator at the genuine negacyclic
/// position (including the sign flip on the upper half of the cycle), so
/// every algorithm of the engine — and the accumulator layout itself — is
/// exercised exactly as it would be under encryption, without any key
/// material. This is the backend the test suite runs the engine against.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearBackend;

impl ClearBackend {
    pub fn new() -> Self {
        Self
    }

    fn blind_rotate_index(torus_input: u64, polynomial_size: usize) -> usize {
        let two_n = 2 * polynomial_size as u128;
        (((torus_input as u128 * two_n) + (1u128 << 63)) >> 64) as usize % (2 * polynomial_size)
    }
}

impl AccelBackend for ClearBackend {
    fn keyswitch_batch(
        &self,
        _stream: &Stream,
        params: &RadixAccelParameters,
        output: &mut [u64],
        input: &[u64],
        num_blocks: usize,
    ) {
        let small_size = params.lwe_dimension.to_lwe_size();
        let big_size = params.big_lwe_dimension().to_lwe_size();
        assert_eq!(output.len(), num_blocks * small_size);
        assert_eq!(input.len(), num_blocks * big_size);

        output
            .par_chunks_exact_mut(small_size)
            .zip(input.par_chunks_exact(big_size))
            .for_each(|(out_block, in_block)| {
                out_block.fill(0);
                *out_block.last_mut().unwrap() = *in_block.last().unwrap();
            });
    }

    fn bootstrap_batch(
        &self,
        _stream: &Stream,
        params: &RadixAccelParameters,
        output: &mut [u64],
        input: &[u64],
        accumulator: &[u64],
        num_blocks: usize,
    ) {
        let small_size = params.lwe_dimension.to_lwe_size();
        let big_size = params.big_lwe_dimension().to_lwe_size();
        let n = params.polynomial_size.0;
        assert_eq!(output.len(), num_blocks * big_size);
        assert_eq!(input.len(), num_blocks * small_size);
        assert_eq!(
            accumulator.len(),
            params.glwe_dimension.to_glwe_size() * n,
            "accumulator does not match the GLWE geometry"
        );
        let body_poly = &accumulator[accumulator.len() - n..];

        output
            .par_chunks_exact_mut(big_size)
            .zip(input.par_chunks_exact(small_size))
            .for_each(|(out_block, in_block)| {
                let index = Self::blind_rotate_index(*in_block.last().unwrap(), n);
                let value = if index < n {
                    body_poly[index]
                } else {
                    body_poly[index - n].wrapping_neg()
                };
                out_block.fill(0);
                *out_block.last_mut().unwrap() = value;
            });
    }
}
