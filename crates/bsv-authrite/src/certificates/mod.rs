//! Identity certificates: signing, selective disclosure, and validation.

mod certificate;
mod provider;
mod validation;
mod verifiable;

pub use certificate::*;
pub use provider::*;
pub use validation::*;
pub use verifiable::*;
