//! Radix addition.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::device::DeviceStreams;
use crate::engine::PropagationBuffer;
use crate::entities::{DeviceBooleanBlock, DeviceRadixCiphertext};
use rayon::prelude::*;

impl<B: AccelBackend> RadixEngine<B> {
    /// Adds `rhs` into `lhs` block-wise, with no carry handling: each block
    /// holds the raw sum of the operand blocks afterwards. A pure linear
    /// combination, no bootstrap.
    pub fn unchecked_add_assign_async(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
    ) {
        lhs.assert_same_shape(rhs);
        assert_eq!(
            streams.stream(0).device_index(),
            lhs.d_blocks.device_index(),
            "device error: first stream is on device {}, output blocks on device {}",
            streams.stream(0).device_index().get(),
            lhs.d_blocks.device_index().get()
        );
        lhs.d_blocks
            .as_flat_mut()
            .par_iter_mut()
            .zip(rhs.d_blocks.as_flat().par_iter())
            .for_each(|(left, &right)| *left = left.wrapping_add(right));
        lhs.info = lhs.info.after_add(&rhs.info);
    }

    /// Adds `rhs` into `lhs` and propagates the carries, leaving every block
    /// carry empty. Both operands must come in with clean carries so that no
    /// block consumes more than one carry bit.
    pub fn add_assign_async(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) {
        let _carry_out = self.unsigned_overflowing_add_assign_async(streams, lhs, rhs, buffer);
    }

    /// Synchronizing wrapper of [`Self::add_assign_async`].
    pub fn add_assign(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) {
        self.add_assign_async(streams, lhs, rhs, buffer);
        streams.synchronize();
    }

    /// Like [`Self::add_assign_async`], additionally returning the carry
    /// out of the most significant block — the encrypted unsigned-overflow
    /// flag of the addition.
    pub fn unsigned_overflowing_add_assign_async(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) -> DeviceBooleanBlock {
        let message_modulus = self.parameters().message_modulus.0;
        let fits_single_carry = lhs
            .info
            .blocks
            .iter()
            .zip(rhs.info.blocks.iter())
            .all(|(left, right)| left.degree.get() + right.degree.get() < 2 * message_modulus);
        assert!(
            fits_single_carry,
            "adding the operands would consume more than one carry bit per block; \
             propagate their carries first"
        );

        self.unchecked_add_assign_async(streams, lhs, rhs);
        self.propagate_single_carry_assign_async(streams, lhs, buffer)
    }
}
