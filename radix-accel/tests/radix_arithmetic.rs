//! End-to-end scenarios driving the whole engine through the software
//! backend: trivial encode, compute, trivial decode.

use radix_accel::engine::{BitOpType, IS_EQUAL, IS_INFERIOR, IS_SUPERIOR};
use radix_accel::parameters::PARAM_MESSAGE_2_CARRY_2_KS_PBS;
use radix_accel::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_BLOCKS: usize = 4;

fn setup(device_count: u32) -> (RadixEngine<ClearBackend>, DeviceStreams) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    (
        RadixEngine::new(ClearBackend::new(), PARAM_MESSAGE_2_CARRY_2_KS_PBS),
        DeviceStreams::new_multi(device_count),
    )
}

#[test]
fn addition_with_carry_chains() {
    let (engine, streams) = setup(1);
    let modulus = 1u64 << (2 * NUM_BLOCKS);
    let mut buffer = engine.scratch_propagate_single_carry(&streams, NUM_BLOCKS);
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..20 {
        let a = rng.gen_range(0..modulus);
        let b = rng.gen_range(0..modulus);
        let mut lhs = engine.create_trivial_radix_from_integer_async(&streams, a, NUM_BLOCKS);
        let rhs = engine.create_trivial_radix_from_integer_async(&streams, b, NUM_BLOCKS);

        let carry_out =
            engine.unsigned_overflowing_add_assign_async(&streams, &mut lhs, &rhs, &mut buffer);
        streams.synchronize();

        let digits = engine.decrypt_trivial_radix(&streams, &lhs);
        assert_eq!(engine.trivial_radix_to_integer(&digits), (a + b) % modulus);
        assert_eq!(
            engine.decrypt_trivial_radix(&streams, &carry_out.0),
            vec![u64::from(a + b >= modulus)]
        );
    }
    buffer.release(&streams);
}

#[test]
fn subtraction_reports_overflow() {
    let (engine, streams) = setup(1);
    let modulus = 1u64 << (2 * NUM_BLOCKS);
    let mut buffer = engine.scratch_propagate_single_borrow(&streams, NUM_BLOCKS);
    let mut rng = StdRng::seed_from_u64(2);

    for _ in 0..20 {
        let a = rng.gen_range(0..modulus);
        let b = rng.gen_range(0..modulus);
        let mut lhs = engine.create_trivial_radix_from_integer_async(&streams, a, NUM_BLOCKS);
        let rhs = engine.create_trivial_radix_from_integer_async(&streams, b, NUM_BLOCKS);

        let overflowed =
            engine.unsigned_overflowing_sub_assign_async(&streams, &mut lhs, &rhs, &mut buffer);
        streams.synchronize();

        let digits = engine.decrypt_trivial_radix(&streams, &lhs);
        assert_eq!(
            engine.trivial_radix_to_integer(&digits),
            a.wrapping_sub(b) % modulus
        );
        assert_eq!(
            engine.decrypt_trivial_radix(&streams, &overflowed.0),
            vec![u64::from(a < b)]
        );
    }
    buffer.release(&streams);
}

#[test]
fn bitwise_ops_match_plaintext() {
    let (engine, streams) = setup(1);
    let modulus = 1u64 << (2 * NUM_BLOCKS);
    let mut rng = StdRng::seed_from_u64(3);

    for (op, reference) in [
        (BitOpType::And, (|a, b| a & b) as fn(u64, u64) -> u64),
        (BitOpType::Or, |a, b| a | b),
        (BitOpType::Xor, |a, b| a ^ b),
    ] {
        let mut buffer = engine.scratch_bitop(&streams, NUM_BLOCKS, op);
        for _ in 0..10 {
            let a = rng.gen_range(0..modulus);
            let b = rng.gen_range(0..modulus);
            let mut lhs = engine.create_trivial_radix_from_integer_async(&streams, a, NUM_BLOCKS);
            let rhs = engine.create_trivial_radix_from_integer_async(&streams, b, NUM_BLOCKS);

            engine.unchecked_bitop_assign_async(&streams, &mut lhs, &rhs, &mut buffer);
            streams.synchronize();

            let digits = engine.decrypt_trivial_radix(&streams, &lhs);
            assert_eq!(
                engine.trivial_radix_to_integer(&digits),
                reference(a, b),
                "{op:?} over {a} and {b}"
            );
        }
        buffer.release(&streams);
    }
}

#[test]
fn comparison_and_arithmetic_compose() {
    // max(a, b) - min(a, b) computed homomorphically, then compared with
    // the plaintext distance.
    let (engine, streams) = setup(1);
    let modulus = 1u64 << (2 * NUM_BLOCKS);
    let mut compare = engine.scratch_compare(&streams, NUM_BLOCKS, |order| order);
    let mut borrow = engine.scratch_propagate_single_borrow(&streams, NUM_BLOCKS);
    let mut rng = StdRng::seed_from_u64(4);

    for _ in 0..10 {
        let a = rng.gen_range(0..modulus);
        let b = rng.gen_range(0..modulus);
        let lhs = engine.create_trivial_radix_from_integer_async(&streams, a, NUM_BLOCKS);
        let rhs = engine.create_trivial_radix_from_integer_async(&streams, b, NUM_BLOCKS);

        let order = engine.unchecked_compare_async(&streams, &lhs, &rhs, &mut compare);
        let order = engine.decrypt_trivial_radix(&streams, &order)[0];

        let (mut big, small) = if order == IS_INFERIOR {
            (rhs, lhs)
        } else {
            (lhs, rhs)
        };
        let overflowed =
            engine.unsigned_overflowing_sub_assign_async(&streams, &mut big, &small, &mut borrow);
        streams.synchronize();

        let digits = engine.decrypt_trivial_radix(&streams, &big);
        assert_eq!(engine.trivial_radix_to_integer(&digits), a.abs_diff(b));
        assert_eq!(engine.decrypt_trivial_radix(&streams, &overflowed.0), vec![0]);
        match a.cmp(&b) {
            std::cmp::Ordering::Less => assert_eq!(order, IS_INFERIOR),
            std::cmp::Ordering::Equal => assert_eq!(order, IS_EQUAL),
            std::cmp::Ordering::Greater => assert_eq!(order, IS_SUPERIOR),
        }
    }
    compare.release(&streams);
    borrow.release(&streams);
}

#[test]
fn multi_device_partitioning_matches_single_device() {
    let (engine, single) = setup(1);
    let multi = DeviceStreams::new_multi(4);
    let modulus = 1u64 << (2 * NUM_BLOCKS);
    let mut rng = StdRng::seed_from_u64(5);

    let mut buffer_single = engine.scratch_propagate_single_carry(&single, NUM_BLOCKS);
    let mut buffer_multi = engine.scratch_propagate_single_carry(&multi, NUM_BLOCKS);

    for _ in 0..10 {
        let a = rng.gen_range(0..modulus);
        let b = rng.gen_range(0..modulus);

        let mut on_single = engine.create_trivial_radix_from_integer_async(&single, a, NUM_BLOCKS);
        let rhs_single = engine.create_trivial_radix_from_integer_async(&single, b, NUM_BLOCKS);
        engine.add_assign(&single, &mut on_single, &rhs_single, &mut buffer_single);

        let mut on_multi = engine.create_trivial_radix_from_integer_async(&multi, a, NUM_BLOCKS);
        let rhs_multi = engine.create_trivial_radix_from_integer_async(&multi, b, NUM_BLOCKS);
        engine.add_assign(&multi, &mut on_multi, &rhs_multi, &mut buffer_multi);

        assert_eq!(
            engine.decrypt_trivial_radix(&single, &on_single),
            engine.decrypt_trivial_radix(&multi, &on_multi)
        );
    }
    buffer_single.release(&single);
    buffer_multi.release(&multi);
}

#[test]
fn one_shot_univariate_lut_squares_blocks() {
    let (engine, streams) = setup(2);
    let msg = engine.parameters().message_modulus.0;
    let mut ct = engine.create_trivial_radix_async(&streams, &[0, 1, 2, 3]);
    let lut = engine.generate_lookup_table(|x| (x * x) % msg);
    engine.apply_univariate_lut_assign(&streams, &mut ct, &lut);
    assert_eq!(
        engine.decrypt_trivial_radix(&streams, &ct),
        vec![0, 1, 0, 1]
    );
}

#[test]
fn bivariate_lut_applies_to_block_pairs() {
    let (engine, streams) = setup(1);
    let params = *engine.parameters();
    let msg = params.message_modulus.0;
    let mut buffer = LutApplicationBuffer::new(&streams, &params, NUM_BLOCKS);
    let lut = DeviceBivariateLut::from_lookup_table(
        streams.stream(0),
        engine.generate_lookup_table_bivariate(|a, b| (a * b) % msg),
    );

    let mut lhs = engine.create_trivial_radix_async(&streams, &[1, 2, 3, 0]);
    let rhs = engine.create_trivial_radix_async(&streams, &[3, 3, 2, 1]);
    engine.apply_bivariate_lut_assign_async(&streams, &mut lhs, &rhs, &lut, &mut buffer);
    streams.synchronize();

    assert_eq!(
        engine.decrypt_trivial_radix(&streams, &lhs),
        vec![3, 2, 2, 0]
    );
    buffer.release(&streams);
}
