mod controller;
mod probe;
#[cfg(test)]
pub(crate) mod testing;
mod token;

pub use controller::{AcquisitionController, AcquisitionError, AcquisitionResult, AcquisitionState};
pub use probe::{AuthDiscriminant, ProbeTarget, SessionProber};
pub use token::{extract, Credential, TokenExtractor};
