
#![no_std]

#[cfg(any(test, feature="std"))]
extern crate std;

pub mod timer;

pub mod params;

pub mod dcf;

pub mod prelude;


/// Timestamps are 64-bit in microseconds
pub type Ts = u64;
