//! Radix subtraction, the structural mirror of addition with borrows in
//! place of carries.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::device::DeviceStreams;
use crate::engine::PropagationBuffer;
use crate::entities::{Degree, DeviceBooleanBlock, DeviceRadixCiphertext};
use rayon::prelude::*;

impl<B: AccelBackend> RadixEngine<B> {
    /// Subtracts `rhs` from `lhs` block-wise with no borrow handling: each
    /// block holds the raw difference `message_modulus + lhs_i - rhs_i`
    /// afterwards, offset so the value stays non-negative whatever the
    /// operand digits. A pure linear combination, no bootstrap.
    pub fn unchecked_sub_assign_async(
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
        let params = self.parameters();
        let message_modulus = params.message_modulus.0;
        let offset = message_modulus.wrapping_mul(params.delta());
        let size = lhs.d_blocks.lwe_size();

        lhs.d_blocks
            .as_flat_mut()
            .par_chunks_exact_mut(size)
            .zip(rhs.d_blocks.as_flat().par_chunks_exact(size))
            .for_each(|(left_block, right_block)| {
                for (left, &right) in left_block.iter_mut().zip(right_block) {
                    *left = left.wrapping_sub(right);
                }
                let body = left_block.last_mut().unwrap();
                *body = body.wrapping_add(offset);
            });

        for (left, right) in lhs
            .info
            .blocks
            .iter_mut()
            .zip(rhs.info.blocks.iter())
        {
            debug_assert!(right.degree.get() < message_modulus);
            left.degree = Degree::new(message_modulus + left.degree.get());
        }
    }

    /// Subtracts `rhs` from `lhs` and propagates the borrows, leaving every
    /// block carry empty. The result wraps modulo
    /// `message_modulus ^ num_blocks`. Both operands must come in with
    /// clean carries.
    pub fn sub_assign_async(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) {
        let _overflowed = self.unsigned_overflowing_sub_assign_async(streams, lhs, rhs, buffer);
    }

    /// Synchronizing wrapper of [`Self::sub_assign_async`].
    pub fn sub_assign(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) {
        self.sub_assign_async(streams, lhs, rhs, buffer);
        streams.synchronize();
    }

    /// Like [`Self::sub_assign_async`], additionally returning the borrow
    /// out of the most significant block — the encrypted flag telling
    /// whether `rhs` was larger than `lhs`.
    pub fn unsigned_overflowing_sub_assign_async(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) -> DeviceBooleanBlock {
        let message_modulus = self.parameters().message_modulus.0;
        let clean = lhs
            .info
            .blocks
            .iter()
            .chain(rhs.info.blocks.iter())
            .all(|block| block.degree.get() < message_modulus);
        assert!(
            clean,
            "subtraction expects operands with clean carries; propagate them first"
        );

        self.unchecked_sub_assign_async(streams, lhs, rhs);
        self.propagate_single_borrow_assign_async(streams, lhs, buffer)
    }
}
