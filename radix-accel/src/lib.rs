//! Accelerator-resident engine for homomorphic radix integer arithmetic.
//!
//! This crate batches and pipelines the expensive cryptographic step of
//! encrypted-integer computation — programmable bootstrapping — across many
//! ciphertext blocks and many accelerator devices at once. It covers:
//!
//! - encoding arbitrary functions into bootstrapping lookup tables
//!   (negacyclic accumulators);
//! - the univariate/bivariate lookup-table application pipeline
//!   (keyswitch → bootstrap), batched over radix blocks;
//! - parallel carry/borrow propagation turning per-block generate/propagate
//!   signals into a correctly chained multi-block sum or difference;
//! - the logarithmic-depth sign-reduction tree behind multi-block
//!   comparison;
//! - the block primitives (packing, rotation, trivial encoding) the above
//!   are built from.
//!
//! The bootstrap and keyswitch primitives themselves are opaque: the engine
//! drives them through the two-operation [`backend::AccelBackend`] contract
//! and never looks at key material. The crate ships a software backend
//! ([`backend::ClearBackend`]) evaluating accumulators on trivial
//! ciphertexts, which is what the test suite runs the whole engine against.

pub mod backend;
pub mod config;
pub mod device;
pub mod engine;
pub mod entities;
pub mod parameters;

pub mod prelude {
    pub use crate::backend::{AccelBackend, ClearBackend};
    pub use crate::config::AccelConfig;
    pub use crate::device::{DeviceIndex, DeviceStreams};
    pub use crate::engine::{
        BitOpBuffer, BitOpType, ComparisonBuffer, FullPropagationBuffer, LutApplicationBuffer,
        PropagationBuffer, RadixEngine, SignReductionBuffer,
    };
    pub use crate::entities::{
        BivariateLookupTableOwned, DeviceBivariateLut, DeviceBooleanBlock, DeviceLut,
        DeviceLweCiphertextList, DeviceRadixCiphertext, LookupTableOwned,
    };
    pub use crate::parameters::RadixAccelParameters;
}
