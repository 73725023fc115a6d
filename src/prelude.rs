//! Crate prelude

pub use crate::Ts;

pub use crate::dcf::{Dcf, DcfAccessListener};

pub use crate::params::{MacParameters, Ofdm80211a, PhyTimings};

pub use crate::timer::Timer as MacTimer;

#[cfg(feature = "mocks")]
pub use crate::timer::mock::MockTimer;
