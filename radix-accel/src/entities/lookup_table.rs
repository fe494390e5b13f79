//! Bootstrapping accumulators, host and device resident.

use super::Degree;
use crate::device::{DeviceVec, Stream};
use crate::parameters::{MessageModulus, PolynomialSize, RadixAccelParameters};

/// A host-built bootstrapping accumulator: a trivial GLWE ciphertext of
/// `(glwe_dimension + 1) * polynomial_size` scalars whose body polynomial
/// encodes a function in the negacyclic layout the bootstrap expects.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct LookupTableOwned {
    pub acc: Vec<u64>,
    pub degree: Degree,
}

impl LookupTableOwned {
    /// Evaluates the accumulator at the negacyclic position selected by a
    /// torus input, the way the bootstrap's blind rotation would: the input
    /// is switched to `Z_{2N}` and positions in the upper half of the cycle
    /// read the negated coefficient.
    pub fn evaluate_at_torus(&self, torus_input: u64, polynomial_size: PolynomialSize) -> u64 {
        let n = polynomial_size.0;
        let body = &self.acc[self.acc.len() - n..];
        let two_n = 2 * n as u128;
        let index = (((torus_input as u128 * two_n) + (1u128 << 63)) >> 64) as usize % (2 * n);
        if index < n {
            body[index]
        } else {
            body[index - n].wrapping_neg()
        }
    }
}

/// An accumulator for a two-argument function, sharing the input space
/// between both operands: the left operand is scaled by `ct_right_modulus`
/// before the bootstrap, the right one occupies the low part.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct BivariateLookupTableOwned {
    pub acc: LookupTableOwned,
    /// By how much the left operand is shifted in the packed input.
    pub ct_right_modulus: MessageModulus,
}

/// A device-resident accumulator, ready to be consumed by the bootstrap for
/// every block it is applied to within an operation.
#[derive(Debug)]
pub struct DeviceLut {
    d_vec: DeviceVec<u64>,
    degree: Degree,
}

impl DeviceLut {
    /// Uploads a host accumulator. The host copy is handed to the stream's
    /// deferred-release queue and dropped at the next synchronization point,
    /// once the transfer is complete.
    pub fn from_lookup_table(stream: &Stream, lut: LookupTableOwned) -> Self {
        let mut d_vec = DeviceVec::new(lut.acc.len(), stream);
        d_vec.copy_from_cpu_async(&lut.acc, stream);
        let degree = lut.degree;
        stream.defer_host_release(Box::new(lut));
        Self { d_vec, degree }
    }

    pub fn degree(&self) -> Degree {
        self.degree
    }

    /// The full resident accumulator (mask polynomials and body).
    pub(crate) fn accumulator(&self) -> &[u64] {
        self.d_vec.as_slice()
    }
}

/// Device-resident form of [`BivariateLookupTableOwned`]; the stored factor
/// is the shift the packing step must use, keeping both in agreement by
/// construction.
#[derive(Debug)]
pub struct DeviceBivariateLut {
    pub(crate) lut: DeviceLut,
    pub(crate) ct_right_modulus: MessageModulus,
}

impl DeviceBivariateLut {
    pub fn from_lookup_table(stream: &Stream, lut: BivariateLookupTableOwned) -> Self {
        Self {
            ct_right_modulus: lut.ct_right_modulus,
            lut: DeviceLut::from_lookup_table(stream, lut.acc),
        }
    }

    pub fn degree(&self) -> Degree {
        self.lut.degree()
    }
}

/// Writes a trivial encoding of `value` into one LWE block: zero mask, body
/// `value * delta`.
pub(crate) fn write_trivial_block(block: &mut [u64], value: u64, params: &RadixAccelParameters) {
    let (mask, body) = block.split_at_mut(block.len() - 1);
    mask.fill(0);
    body[0] = value.wrapping_mul(params.delta());
}

/// Decodes the plaintext of a trivial block, rounding away encoding noise.
pub(crate) fn read_trivial_block(block: &[u64], params: &RadixAccelParameters) -> u64 {
    let body = block[block.len() - 1];
    let delta = params.delta();
    (((body as u128 + (delta >> 1) as u128) / delta as u128) as u64) % params.total_modulus()
}
