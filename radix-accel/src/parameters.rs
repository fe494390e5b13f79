//! Parameter types shared by every component of the engine.
//!
//! A [`RadixAccelParameters`] bundle is immutable and shared by reference
//! across all scratch buffers and operations of one logical operation; it is
//! never mutated mid-operation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimension of an LWE mask, i.e. the number of mask scalars.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LweDimension(pub usize);

impl LweDimension {
    /// Number of scalars of a full ciphertext: mask plus body.
    pub fn to_lwe_size(self) -> usize {
        self.0 + 1
    }
}

/// Dimension of a GLWE mask, i.e. the number of mask polynomials.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlweDimension(pub usize);

impl GlweDimension {
    pub fn to_glwe_size(self) -> usize {
        self.0 + 1
    }

    /// Dimension of the big LWE secret key obtained by sample extraction.
    pub fn to_equivalent_lwe_dimension(self, polynomial_size: PolynomialSize) -> LweDimension {
        LweDimension(self.0 * polynomial_size.0)
    }
}

/// Number of coefficients of the polynomials used in GLWE ciphertexts and
/// bootstrapping accumulators. Must be a power of two.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolynomialSize(pub usize);

/// Base log of a gadget decomposition.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecompositionBaseLog(pub usize);

/// Level count of a gadget decomposition.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecompositionLevelCount(pub usize);

/// Grouping factor of a multi-bit bootstrapping key. Zero for the classical
/// bootstrap variant.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LweBskGroupingFactor(pub usize);

/// Number of values a block's message digit can take.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageModulus(pub u64);

/// Headroom of a block on top of its message digit.
#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarryModulus(pub u64);

/// Which bootstrap implementation the backend runs.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum PbsType {
    Classical,
    MultiBit,
}

/// Immutable configuration bundle for one radix computation.
///
/// `lwe_dimension` is the dimension of the "small" ciphertexts produced by the
/// keyswitch; the "big" dimension of pre-keyswitch / post-bootstrap blocks is
/// `glwe_dimension * polynomial_size`.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub struct RadixAccelParameters {
    pub lwe_dimension: LweDimension,
    pub glwe_dimension: GlweDimension,
    pub polynomial_size: PolynomialSize,
    pub ks_base_log: DecompositionBaseLog,
    pub ks_level: DecompositionLevelCount,
    pub pbs_base_log: DecompositionBaseLog,
    pub pbs_level: DecompositionLevelCount,
    pub grouping_factor: LweBskGroupingFactor,
    pub message_modulus: MessageModulus,
    pub carry_modulus: CarryModulus,
    pub pbs_type: PbsType,
}

impl RadixAccelParameters {
    pub fn big_lwe_dimension(&self) -> LweDimension {
        self.glwe_dimension
            .to_equivalent_lwe_dimension(self.polynomial_size)
    }

    /// Full plaintext space of one block: message digit plus carry headroom.
    pub fn total_modulus(&self) -> u64 {
        self.message_modulus.0 * self.carry_modulus.0
    }

    /// Scaling factor between a cleartext value and its torus encoding, with
    /// one bit of padding reserved for the negacyclic bootstrap.
    pub fn delta(&self) -> u64 {
        (1u64 << 63) / self.total_modulus()
    }

    /// Width of the redundancy box one plaintext value occupies in an
    /// accumulator polynomial.
    pub fn box_size(&self) -> usize {
        self.polynomial_size.0 / self.total_modulus() as usize
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.polynomial_size.0.is_power_of_two() {
            return Err(ParameterError::PolynomialSizeNotPowerOfTwo(
                self.polynomial_size.0,
            ));
        }
        if !self.message_modulus.0.is_power_of_two() || !self.carry_modulus.0.is_power_of_two() {
            return Err(ParameterError::ModulusNotPowerOfTwo {
                message_modulus: self.message_modulus.0,
                carry_modulus: self.carry_modulus.0,
            });
        }
        if self.polynomial_size.0 < self.total_modulus() as usize {
            return Err(ParameterError::PlaintextSpaceTooLarge {
                polynomial_size: self.polynomial_size.0,
                total_modulus: self.total_modulus(),
            });
        }
        if self.pbs_type == PbsType::MultiBit && self.grouping_factor.0 == 0 {
            return Err(ParameterError::MissingGroupingFactor);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("polynomial size must be a power of two, got {0}")]
    PolynomialSizeNotPowerOfTwo(usize),
    #[error(
        "message modulus ({message_modulus}) and carry modulus ({carry_modulus}) \
         must be powers of two"
    )]
    ModulusNotPowerOfTwo {
        message_modulus: u64,
        carry_modulus: u64,
    },
    #[error(
        "polynomial size ({polynomial_size}) cannot hold the plaintext space \
         ({total_modulus}): every value needs at least one accumulator coefficient"
    )]
    PlaintextSpaceTooLarge {
        polynomial_size: usize,
        total_modulus: u64,
    },
    #[error("multi-bit bootstrap requires a non-zero grouping factor")]
    MissingGroupingFactor,
}

pub const PARAM_MESSAGE_1_CARRY_1_KS_PBS: RadixAccelParameters = RadixAccelParameters {
    lwe_dimension: LweDimension(781),
    glwe_dimension: GlweDimension(3),
    polynomial_size: PolynomialSize(512),
    ks_base_log: DecompositionBaseLog(4),
    ks_level: DecompositionLevelCount(3),
    pbs_base_log: DecompositionBaseLog(18),
    pbs_level: DecompositionLevelCount(1),
    grouping_factor: LweBskGroupingFactor(0),
    message_modulus: MessageModulus(2),
    carry_modulus: CarryModulus(2),
    pbs_type: PbsType::Classical,
};

pub const PARAM_MESSAGE_2_CARRY_2_KS_PBS: RadixAccelParameters = RadixAccelParameters {
    lwe_dimension: LweDimension(839),
    glwe_dimension: GlweDimension(1),
    polynomial_size: PolynomialSize(2048),
    ks_base_log: DecompositionBaseLog(3),
    ks_level: DecompositionLevelCount(5),
    pbs_base_log: DecompositionBaseLog(23),
    pbs_level: DecompositionLevelCount(1),
    grouping_factor: LweBskGroupingFactor(0),
    message_modulus: MessageModulus(4),
    carry_modulus: CarryModulus(4),
    pbs_type: PbsType::Classical,
};

pub const PARAM_MESSAGE_4_CARRY_4_KS_PBS: RadixAccelParameters = RadixAccelParameters {
    lwe_dimension: LweDimension(996),
    glwe_dimension: GlweDimension(1),
    polynomial_size: PolynomialSize(32768),
    ks_base_log: DecompositionBaseLog(3),
    ks_level: DecompositionLevelCount(7),
    pbs_base_log: DecompositionBaseLog(11),
    pbs_level: DecompositionLevelCount(3),
    grouping_factor: LweBskGroupingFactor(0),
    message_modulus: MessageModulus(16),
    carry_modulus: CarryModulus(16),
    pbs_type: PbsType::Classical,
};

pub const PARAM_MULTI_BIT_MESSAGE_2_CARRY_2_GROUP_3_KS_PBS: RadixAccelParameters =
    RadixAccelParameters {
        lwe_dimension: LweDimension(879),
        glwe_dimension: GlweDimension(1),
        polynomial_size: PolynomialSize(2048),
        ks_base_log: DecompositionBaseLog(3),
        ks_level: DecompositionLevelCount(5),
        pbs_base_log: DecompositionBaseLog(22),
        pbs_level: DecompositionLevelCount(1),
        grouping_factor: LweBskGroupingFactor(3),
        message_modulus: MessageModulus(4),
        carry_modulus: CarryModulus(4),
        pbs_type: PbsType::MultiBit,
    };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_parameter_sets_are_valid() {
        for params in [
            PARAM_MESSAGE_1_CARRY_1_KS_PBS,
            PARAM_MESSAGE_2_CARRY_2_KS_PBS,
            PARAM_MESSAGE_4_CARRY_4_KS_PBS,
            PARAM_MULTI_BIT_MESSAGE_2_CARRY_2_GROUP_3_KS_PBS,
        ] {
            params.validate().unwrap();
        }
    }

    #[test]
    fn delta_reserves_the_padding_bit() {
        let params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        assert_eq!(params.total_modulus(), 16);
        assert_eq!(params.delta(), 1u64 << 59);
        assert_eq!(params.box_size(), 2048 / 16);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        params.polynomial_size = PolynomialSize(1000);
        assert!(matches!(
            params.validate(),
            Err(ParameterError::PolynomialSizeNotPowerOfTwo(1000))
        ));

        let mut params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        params.polynomial_size = PolynomialSize(8);
        assert!(matches!(
            params.validate(),
            Err(ParameterError::PlaintextSpaceTooLarge { .. })
        ));

        let mut params = PARAM_MULTI_BIT_MESSAGE_2_CARRY_2_GROUP_3_KS_PBS;
        params.grouping_factor = LweBskGroupingFactor(0);
        assert!(matches!(
            params.validate(),
            Err(ParameterError::MissingGroupingFactor)
        ));
    }
}
