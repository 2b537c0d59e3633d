// Proof of work and block validation

pub mod pow;
pub mod validation;

pub use pow::{DEFAULT_DIFFICULTY, ProofOfWork, Seal, StopSignal, Target};
pub use validation::{BlockValidator, ValidationError};
