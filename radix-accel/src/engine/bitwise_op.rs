//! Block-wise bitwise operations, one bivariate bootstrap per block.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::device::{launch_abort, DeviceStreams};
use crate::engine::LutApplicationBuffer;
use crate::entities::{Degree, DeviceBivariateLut, DeviceRadixCiphertext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOpType {
    And,
    Or,
    Xor,
}

/// Scratch of one bitwise operation shape: the resident bivariate table for
/// the chosen operator.
pub struct BitOpBuffer {
    apply: LutApplicationBuffer,
    lut: DeviceBivariateLut,
    op: BitOpType,
    num_blocks: usize,
    released: bool,
}

impl BitOpBuffer {
    pub fn release(&mut self, streams: &DeviceStreams) {
        self.apply.release(streams);
        self.released = true;
        tracing::debug!(op = ?self.op, "released bitop scratch");
    }
}

impl<B: AccelBackend> RadixEngine<B> {
    /// Allocates the scratch for block-wise `op` over `num_blocks` blocks.
    pub fn scratch_bitop(
        &self,
        streams: &DeviceStreams,
        num_blocks: usize,
        op: BitOpType,
    ) -> BitOpBuffer {
        let params = self.parameters();
        assert!(
            params.carry_modulus.0 >= params.message_modulus.0,
            "bitwise operations pack both operand digits into one bootstrap input and need \
             carry space at least as large as the message space"
        );
        let lut = match op {
            BitOpType::And => self.generate_lookup_table_bivariate(|lhs, rhs| lhs & rhs),
            BitOpType::Or => self.generate_lookup_table_bivariate(|lhs, rhs| lhs | rhs),
            BitOpType::Xor => self.generate_lookup_table_bivariate(|lhs, rhs| lhs ^ rhs),
        };
        BitOpBuffer {
            apply: LutApplicationBuffer::new(streams, params, num_blocks),
            lut: DeviceBivariateLut::from_lookup_table(streams.stream(0), lut),
            op,
            num_blocks,
            released: false,
        }
    }

    /// Applies the buffer's bitwise operator block-wise, writing the result
    /// over `lhs`. Expects clean carries on both operands.
    pub fn unchecked_bitop_assign_async(
        &self,
        streams: &DeviceStreams,
        lhs: &mut DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut BitOpBuffer,
    ) {
        if buffer.released {
            launch_abort!("usage error: bitop scratch used after release");
        }
        if buffer.num_blocks != lhs.num_blocks() {
            launch_abort!(
                "usage error: bitop scratch sized for {} blocks, invoked with {}",
                buffer.num_blocks,
                lhs.num_blocks()
            );
        }

        // The lookup table only bounds the output by message_modulus - 1;
        // the per-operator bound is tighter and kept host-side.
        let degrees: Vec<Degree> = lhs
            .info
            .blocks
            .iter()
            .zip(rhs.info.blocks.iter())
            .map(|(left, right)| match buffer.op {
                BitOpType::And => left.degree.after_bitand(right.degree),
                BitOpType::Or => left.degree.after_bitor(right.degree),
                BitOpType::Xor => left.degree.after_bitxor(right.degree),
            })
            .collect();

        self.apply_bivariate_lut_assign_async(streams, lhs, rhs, &buffer.lut, &mut buffer.apply);

        for (info, degree) in lhs.info.blocks.iter_mut().zip(degrees) {
            info.degree = degree;
        }
    }
}
