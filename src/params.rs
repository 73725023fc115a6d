//! 802.11 MAC timing parameters.
//! Shared read-only by every channel access instance of a MAC.

use crate::Ts;

/// CTS and ACK control frames: 2 octet frame control, 2 octet duration,
/// 6 octet RA, 4 octet FCS.
const CTL_FRAME_SIZE: u32 = 14;

/// Worst case station separation assumed for control response timeouts, m
const MAX_RANGE_M: u64 = 1000;

const SPEED_OF_LIGHT_M_S: u64 = 300_000_000;

/// Frame air time source, implemented by the PHY model
pub trait PhyTimings {
    /// Air time of a `size` byte frame at the PHY's base control rate
    fn tx_duration_us(&self, size: u32) -> Ts;
}

/// 802.11a OFDM frame timing at the 6 Mb/s mandatory rate.
///
/// 16 us long preamble, 4 us SIGNAL field, then one 4 us symbol per 24
/// data bits. The payload carries 16 service and 6 tail bits on top of
/// the MPDU.
#[derive(Debug, Clone, PartialEq)]
pub struct Ofdm80211a;

impl PhyTimings for Ofdm80211a {
    fn tx_duration_us(&self, size: u32) -> Ts {
        let bits = 8 * size as u64 + 16 + 6;
        let symbols = (bits + 23) / 24;
        16 + 4 + symbols * 4
    }
}

/// MAC timing and retry configuration.
///
/// Configured once at setup, read-only afterwards. Times in microseconds,
/// thresholds in octets.
#[derive(Debug, Clone, PartialEq)]
pub struct MacParameters {
    sifs: Ts,
    slot_time: Ts,

    /// Air time of an ACK at the base rate, folded into EIFS
    ack_tx_duration: Ts,

    cts_timeout: Ts,
    ack_timeout: Ts,

    max_ssrc: u32,
    max_slrc: u32,
    rts_cts_threshold: u32,
    fragmentation_threshold: u32,
}

impl Default for MacParameters {
    fn default() -> Self {
        Self {
            sifs: 16,
            slot_time: 9,

            ack_tx_duration: 44,

            cts_timeout: 76,
            ack_timeout: 76,

            max_ssrc: 7,
            max_slrc: 4,
            rts_cts_threshold: 2346,
            fragmentation_threshold: 2346,
        }
    }
}

impl MacParameters {
    pub fn new() -> Self {
        Default::default()
    }

    /// Derive the 802.11a timing set from PHY-reported control frame
    /// durations: SIFS 16 us, slot 9 us, and control response timeouts
    /// covering the response air time plus a round trip over the maximum
    /// expected range and one slot of margin.
    pub fn initialize_80211a<P: PhyTimings>(&mut self, phy: &P) {
        self.sifs = 16;
        self.slot_time = 9;

        let cts_tx_duration = phy.tx_duration_us(CTL_FRAME_SIZE);
        self.ack_tx_duration = phy.tx_duration_us(CTL_FRAME_SIZE);

        let round_trip = round_trip_propagation_us();
        self.cts_timeout = self.sifs + cts_tx_duration + self.slot_time + round_trip;
        self.ack_timeout = self.sifs + self.ack_tx_duration + self.slot_time + round_trip;
    }

    pub fn set_sifs(&mut self, sifs: Ts) {
        self.sifs = sifs;
    }

    pub fn set_slot_time(&mut self, slot_time: Ts) {
        self.slot_time = slot_time;
    }

    pub fn set_max_ssrc(&mut self, max_ssrc: u32) {
        self.max_ssrc = max_ssrc;
    }

    pub fn set_max_slrc(&mut self, max_slrc: u32) {
        self.max_slrc = max_slrc;
    }

    pub fn set_rts_cts_threshold(&mut self, threshold: u32) {
        self.rts_cts_threshold = threshold;
    }

    pub fn set_fragmentation_threshold(&mut self, threshold: u32) {
        self.fragmentation_threshold = threshold;
    }

    pub fn sifs(&self) -> Ts {
        self.sifs
    }

    pub fn slot_time(&self) -> Ts {
        self.slot_time
    }

    /// PIFS = SIFS + one slot
    pub fn pifs(&self) -> Ts {
        self.sifs + self.slot_time
    }

    /// DIFS = SIFS + two slots
    pub fn difs(&self) -> Ts {
        self.sifs + 2 * self.slot_time
    }

    /// EIFS = SIFS + ACK air time at the base rate + DIFS.
    /// Applied after a reception the PHY could not decode.
    pub fn eifs(&self) -> Ts {
        self.sifs + self.ack_tx_duration + self.difs()
    }

    pub fn cts_timeout(&self) -> Ts {
        self.cts_timeout
    }

    pub fn ack_timeout(&self) -> Ts {
        self.ack_timeout
    }

    /// Station short retry count limit
    pub fn max_ssrc(&self) -> u32 {
        self.max_ssrc
    }

    /// Station long retry count limit
    pub fn max_slrc(&self) -> u32 {
        self.max_slrc
    }

    pub fn rts_cts_threshold(&self) -> u32 {
        self.rts_cts_threshold
    }

    pub fn fragmentation_threshold(&self) -> u32 {
        self.fragmentation_threshold
    }
}

/// Round trip propagation delay over `MAX_RANGE_M`, rounded up to a
/// whole microsecond.
fn round_trip_propagation_us() -> Ts {
    let numerator = 2 * MAX_RANGE_M * 1_000_000;
    (numerator + SPEED_OF_LIGHT_M_S - 1) / SPEED_OF_LIGHT_M_S
}
