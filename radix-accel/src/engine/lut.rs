//! Host-side generation of bootstrapping accumulators.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::entities::{BivariateLookupTableOwned, Degree, LookupTableOwned};

impl<B: AccelBackend> RadixEngine<B> {
    /// Builds the accumulator encoding `f` over the block's full plaintext
    /// space (message and carry).
    ///
    /// The layout is negacyclic: `f(i)` scaled by delta fills a
    /// `polynomial_size / (message_modulus * carry_modulus)`-wide box for
    /// each input `i`, the first half-box is negated and the polynomial is
    /// rotated left by half a box so that the noisy values around each
    /// encoded input all land in the right box after blind rotation.
    pub fn generate_lookup_table<F>(&self, f: F) -> LookupTableOwned
    where
        F: Fn(u64) -> u64,
    {
        let params = self.parameters();
        let polynomial_size = params.polynomial_size.0;
        let glwe_size = params.glwe_dimension.to_glwe_size();
        let total_modulus = params.total_modulus();
        let box_size = params.box_size();
        let delta = params.delta();

        // Host scratch for the full trivial GLWE; the caller transfers it to
        // the device and the host copy is released once the transfer is done
        // (see DeviceLut::from_lookup_table).
        let mut acc = vec![0u64; glwe_size * polynomial_size];
        let body_start = (glwe_size - 1) * polynomial_size;

        let mut max_value = 0;
        {
            let body = &mut acc[body_start..];
            for i in 0..total_modulus {
                let value = f(i);
                max_value = max_value.max(value);
                let index = i as usize * box_size;
                body[index..index + box_size].fill(value.wrapping_mul(delta));
            }

            let half_box_size = box_size / 2;
            for coefficient in body[0..half_box_size].iter_mut() {
                *coefficient = coefficient.wrapping_neg();
            }
            body.rotate_left(half_box_size);
        }

        LookupTableOwned {
            acc,
            degree: Degree::new(max_value),
        }
    }

    /// Builds an accumulator for a two-argument function, packed so that a
    /// single bootstrap evaluates it once both operands share one input:
    /// `lhs` occupies the bits above `factor`, `rhs` the bits below.
    ///
    /// Panics if a packed pair of worst-case operands cannot fit the
    /// plaintext space, i.e. unless
    /// `factor * (message_modulus - 1) + (message_modulus - 1) <
    /// message_modulus * carry_modulus`. Fitting the *actual* operand
    /// degrees at application time remains the caller's contract.
    pub fn generate_lookup_table_bivariate_with_factor<F>(
        &self,
        f: F,
        factor: u64,
    ) -> BivariateLookupTableOwned
    where
        F: Fn(u64, u64) -> u64,
    {
        let message_modulus = self.parameters().message_modulus.0;
        assert!(
            factor >= message_modulus,
            "packing factor ({factor}) must be at least the message modulus ({message_modulus}), \
             otherwise unpacking is ambiguous"
        );
        let max_packed = factor * (message_modulus - 1) + (message_modulus - 1);
        assert!(
            max_packed < self.parameters().total_modulus(),
            "a packed pair can reach {max_packed}, which overflows the plaintext space ({})",
            self.parameters().total_modulus()
        );

        let wrapped = |x: u64| f((x / factor) % message_modulus, (x % factor) % message_modulus);
        BivariateLookupTableOwned {
            acc: self.generate_lookup_table(wrapped),
            ct_right_modulus: crate::parameters::MessageModulus(factor),
        }
    }

    /// [`Self::generate_lookup_table_bivariate_with_factor`] with the
    /// message modulus as packing factor.
    pub fn generate_lookup_table_bivariate<F>(&self, f: F) -> BivariateLookupTableOwned
    where
        F: Fn(u64, u64) -> u64,
    {
        let factor = self.parameters().message_modulus.0;
        self.generate_lookup_table_bivariate_with_factor(f, factor)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::ClearBackend;
    use crate::engine::RadixEngine;
    use crate::parameters::{
        RadixAccelParameters, PARAM_MESSAGE_1_CARRY_1_KS_PBS, PARAM_MESSAGE_2_CARRY_2_KS_PBS,
        PARAM_MESSAGE_4_CARRY_4_KS_PBS,
    };

    fn assert_lut_round_trip<F>(params: RadixAccelParameters, f: F)
    where
        F: Fn(u64) -> u64 + Copy,
    {
        let engine = RadixEngine::new(ClearBackend::new(), params);
        let lut = engine.generate_lookup_table(f);
        let delta = params.delta();
        for input in 0..params.total_modulus() {
            let torus = input.wrapping_mul(delta);
            let evaluated = lut.evaluate_at_torus(torus, params.polynomial_size);
            assert_eq!(
                evaluated,
                f(input).wrapping_mul(delta),
                "f({input}) did not survive the accumulator round trip"
            );
        }
    }

    #[test]
    fn lut_round_trip_identity_and_square() {
        for params in [
            PARAM_MESSAGE_1_CARRY_1_KS_PBS,
            PARAM_MESSAGE_2_CARRY_2_KS_PBS,
            PARAM_MESSAGE_4_CARRY_4_KS_PBS,
        ] {
            let m = params.total_modulus();
            assert_lut_round_trip(params, |x| x);
            assert_lut_round_trip(params, |x| (x * x) % m);
            assert_lut_round_trip(params, |x| (x + 1) % m);
        }
    }

    #[test]
    fn noisy_inputs_inside_a_box_decode_identically() {
        let params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        let engine = RadixEngine::new(ClearBackend::new(), params);
        let m = params.total_modulus();
        let lut = engine.generate_lookup_table(|x| (3 * x) % m);
        let delta = params.delta();
        // A quarter of a box worth of noise in both directions must not
        // change the selected box.
        let noise = delta / (params.box_size() as u64);
        for input in 0..m {
            let torus = input.wrapping_mul(delta);
            let expected = ((3 * input) % m).wrapping_mul(delta);
            for offset in [torus.wrapping_sub(noise), torus, torus.wrapping_add(noise)] {
                assert_eq!(lut.evaluate_at_torus(offset, params.polynomial_size), expected);
            }
        }
    }

    #[test]
    fn bivariate_packing_recovers_both_operands() {
        let params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        let msg = params.message_modulus.0;
        for factor in msg..=params.carry_modulus.0 {
            for lhs in 0..msg {
                for rhs in 0..msg {
                    let packed = lhs * factor + rhs;
                    assert_eq!((packed / factor) % msg, lhs);
                    assert_eq!((packed % factor) % msg, rhs);
                }
            }
        }
    }

    #[test]
    fn bivariate_lut_encodes_the_packed_function() {
        let params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        let engine = RadixEngine::new(ClearBackend::new(), params);
        let msg = params.message_modulus.0;
        let lut = engine.generate_lookup_table_bivariate(|a, b| (a + 2 * b) % msg);
        let delta = params.delta();
        for lhs in 0..msg {
            for rhs in 0..msg {
                let packed = lhs * lut.ct_right_modulus.0 + rhs;
                let evaluated = lut
                    .acc
                    .evaluate_at_torus(packed.wrapping_mul(delta), params.polynomial_size);
                assert_eq!(evaluated, ((lhs + 2 * rhs) % msg).wrapping_mul(delta));
            }
        }
    }

    #[test]
    #[should_panic(expected = "overflows the plaintext space")]
    fn oversized_packing_factor_is_rejected() {
        let params = PARAM_MESSAGE_2_CARRY_2_KS_PBS;
        let engine = RadixEngine::new(ClearBackend::new(), params);
        let _ = engine.generate_lookup_table_bivariate_with_factor(|a, _| a, 8);
    }
}
