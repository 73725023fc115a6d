//! 802.11 DCF channel access.
//!
//! Tracks the recent history of the shared medium (receptions,
//! transmissions, physical carrier sense and NAV), runs the exponential
//! backoff countdown against it, and tells the registered listener the
//! instant it may transmit. Deferral follows the DIFS/EIFS rules of
//! IEEE 802.11 section 9.2.

use log::trace;

use rand_core::RngCore;

use crate::{params::MacParameters, timer::Timer, Ts};

/// Callbacks into the MAC queue contending for the medium.
///
/// The listener outlives every access sequence it starts; the engine
/// calls `access_granted_now` exactly once per granted access.
pub trait DcfAccessListener {
    /// The medium is available now. The listener must begin its access
    /// sequence before handing control back to the event kernel.
    fn access_granted_now(&mut self);

    /// Does the listener still have traffic waiting for the medium?
    fn access_needed(&self) -> bool;

    /// True while the listener is mid-sequence and will call
    /// `request_access` itself once the sequence completes.
    fn accessing_and_will_notify(&self) -> bool;
}

/// DCF contention state for one MAC queue.
/// Generic over a Timer (T), Listener (L) and backoff Rng (R)
pub struct Dcf<T, L, R> {
    timer: T,
    listener: L,
    rng: R,

    slot_time: Ts,
    difs: Ts,
    eifs: Ts,

    cw: u32,
    cw_min: u32,
    cw_max: u32,

    /// Instant from which `backoff_left` is measured
    backoff_start: Ts,
    backoff_left: Ts,

    last_nav_start: Ts,
    last_nav_duration: Ts,

    last_rx_start: Ts,
    last_rx_duration: Ts,
    last_rx_end: Ts,
    last_rx_received_ok: bool,

    last_tx_start: Ts,
    last_tx_duration: Ts,

    last_busy_start: Ts,
    last_busy_duration: Ts,

    rxing: bool,
}

impl <T, L, R> Dcf<T, L, R>
where
    T: Timer,
    L: DcfAccessListener,
    R: RngCore,
{
    /// Create a new channel access engine bound to its kernel timer,
    /// MAC queue listener and backoff rng.
    ///
    /// Timing and contention window bounds start zeroed; callers run the
    /// `set_*` methods once before the first notification or request.
    pub fn new(timer: T, listener: L, rng: R) -> Self {
        Self {
            timer,
            listener,
            rng,

            slot_time: 0,
            difs: 0,
            eifs: 0,

            cw: 0,
            cw_min: 0,
            cw_max: 0,

            backoff_start: 0,
            backoff_left: 0,

            last_nav_start: 0,
            last_nav_duration: 0,

            last_rx_start: 0,
            last_rx_duration: 0,
            last_rx_end: 0,
            last_rx_received_ok: true,

            last_tx_start: 0,
            last_tx_duration: 0,

            last_busy_start: 0,
            last_busy_duration: 0,

            rxing: false,
        }
    }

    /// Adopt the shared MAC timing set. Only the slot time is consulted
    /// by the contention logic, so it is copied out here; the parameters
    /// object is fixed after setup.
    pub fn set_parameters(&mut self, params: &MacParameters) {
        self.slot_time = params.slot_time();
    }

    pub fn set_difs(&mut self, difs: Ts) {
        self.difs = difs;
    }

    pub fn set_eifs(&mut self, eifs: Ts) {
        self.eifs = eifs;
    }

    pub fn set_cw_bounds(&mut self, min: u32, max: u32) {
        self.cw_min = min;
        self.cw_max = max;
        self.cw = min;
    }

    /// Ask for the medium on behalf of the listener.
    ///
    /// Either grants access synchronously through the listener callback,
    /// or leaves a single armed timeout that will re-evaluate later. The
    /// branch order encodes precedence: an in-flight access sequence and
    /// an already armed timeout both make this request a no-op.
    pub fn request_access(&mut self) {
        let now = self.timer.now_us();
        let delay_until_access_granted = self.delay_until_access_granted(now);
        if self.listener.accessing_and_will_notify() {
            // The txop will start a backoff and maybe a timeout itself
            // when it notifies us of the end of its access.
            trace!("accessing. will be notified");
        } else if self.timer.is_scheduled() {
            trace!("access timer running. will be notified");
        } else if self.backoff_left > 0 {
            // Timeout for the ongoing backoff.
            trace!("request access delayed for={} us", delay_until_access_granted);
            self.timer.schedule_us(delay_until_access_granted);
        } else if self.is_phy_busy(now) {
            // Someone else has accessed the medium, contend for the
            // next idle period.
            self.start_backoff();
        } else if delay_until_access_granted > 0 {
            // Medium is idle and no backoff is running, but the
            // deferral after the last activity has not elapsed yet.
            trace!("request access delayed for={} us", delay_until_access_granted);
            self.timer.schedule_us(delay_until_access_granted);
        } else {
            trace!("access granted immediately");
            self.listener.access_granted_now();
        }
    }

    /// Armed timeout fired. Invoked by the event kernel once the
    /// deadline passed to the Timer port is reached.
    ///
    /// Medium activity between arming and firing may have pushed the
    /// grant instant further out, so the decision is recomputed and the
    /// timeout re-armed if needed.
    pub fn access_timeout(&mut self) {
        let now = self.timer.now_us();
        self.update_backoff(now);
        if self.backoff_left == 0 {
            trace!("timeout access granted");
            self.listener.access_granted_now();
        } else {
            let delay_until_access_granted = self.delay_until_access_granted(now);
            trace!("timeout access delayed for {} us", delay_until_access_granted);
            self.timer.schedule_us(delay_until_access_granted);
        }
    }

    /// Draw a fresh backoff.
    ///
    /// Called internally when a request finds the medium busy, and by
    /// the owning MAC after every transmission attempt. If the listener
    /// still wants the medium this also arms the timeout or grants on
    /// the spot.
    pub fn start_backoff(&mut self) {
        let backoff_start = self.timer.now_us();
        let backoff_duration = self.pick_backoff_delay();
        assert!(self.backoff_start <= backoff_start);
        self.backoff_start = backoff_start;
        self.backoff_left = backoff_duration;
        if self.listener.access_needed() && !self.timer.is_scheduled() {
            let delay_until_access_granted = self.delay_until_access_granted(backoff_start);
            if delay_until_access_granted > 0 {
                trace!("start at={} us, for {} us", backoff_start, backoff_duration);
                self.timer.schedule_us(delay_until_access_granted);
            } else {
                trace!("access granted now");
                self.listener.access_granted_now();
            }
        } else {
            trace!("no access needed for now");
        }
    }

    pub fn reset_cw(&mut self) {
        self.cw = self.cw_min;
    }

    /// Double the contention window after a failed attempt, up to the
    /// configured bound.
    pub fn update_failed_cw(&mut self) {
        self.cw = (self.cw * 2).min(self.cw_max);
    }

    fn pick_backoff_delay(&mut self) -> Ts {
        let picked = self.rng.next_u32() % (self.cw + 1);
        trace!("cw={}<{}<{}, picked={}", self.cw_min, self.cw, self.cw_max, picked);
        Ts::from(picked) * self.slot_time
    }

    fn is_phy_busy(&self, now: Ts) -> bool {
        if self.rxing {
            return true;
        }
        self.last_tx_start + self.last_tx_duration > now
    }

    /// Earliest instant at which the deferral after the last channel
    /// activity is satisfied. May lie in the past or the future.
    ///
    /// Every tracked window must have released the medium, so the
    /// result is the latest of the four candidates. A corrupted
    /// reception defers by EIFS rather than DIFS, since the station
    /// cannot trust the duration it failed to decode. While a reception
    /// is still in flight its end is projected from the PHY-announced
    /// duration.
    fn access_granted_start(&self) -> Ts {
        let rx_access_start = if self.last_rx_end >= self.last_rx_start {
            if self.last_rx_received_ok {
                self.last_rx_end + self.difs
            } else {
                self.last_rx_end + self.eifs
            }
        } else {
            self.last_rx_start + self.last_rx_duration + self.difs
        };
        let busy_access_start = self.last_busy_start + self.last_busy_duration + self.difs;
        let tx_access_start = self.last_tx_start + self.last_tx_duration + self.difs;
        let nav_access_start = self.last_nav_start + self.last_nav_duration + self.difs;

        rx_access_start
            .max(busy_access_start)
            .max(tx_access_start)
            .max(nav_access_start)
    }

    /// Consume the backoff time elapsed up to `now`.
    ///
    /// The countdown only runs while the medium has been free per
    /// `access_granted_start`; time spent inside a deferral window does
    /// not count.
    fn update_backoff(&mut self, now: Ts) {
        if self.backoff_left == 0 {
            return;
        }

        assert!(now >= self.backoff_start);

        let most_recent_event = self.backoff_start.max(self.access_granted_start());
        if most_recent_event < now {
            self.backoff_left = self.backoff_left.saturating_sub(now - most_recent_event);
            trace!("at={} us, left={} us", now, self.backoff_left);
            self.backoff_start = now;
        }
    }

    /// Time from `now` until the listener may transmit: the gap to the
    /// deferral end plus whatever backoff then remains.
    ///
    /// The backoff is brought current as of `now` rather than as of the
    /// deferral end, so the sum can drift if the medium lights up in
    /// between; the notification handlers re-run the computation when
    /// that happens.
    fn delay_until_access_granted(&mut self, now: Ts) -> Ts {
        let delay_to = self.access_granted_start().saturating_sub(now);
        self.update_backoff(now);
        delay_to + self.backoff_left
    }

    /// NAV reset, e.g. after a CF-End or a truncated exchange. The new
    /// window replaces the old one outright and may pull the grant
    /// instant closer, in which case the armed timeout has to be
    /// re-armed earlier.
    pub fn notify_nav_reset(&mut self, nav_start: Ts, duration: Ts) {
        self.last_nav_start = nav_start;
        self.last_nav_duration = duration;
        let nav_end = nav_start + duration;
        let delay_until_access_granted = self.delay_until_access_granted(nav_end);
        assert!(delay_until_access_granted > 0);
        if self.timer.is_scheduled() {
            self.timer.cancel();
            self.timer.schedule_us(delay_until_access_granted);
        }
    }

    pub fn notify_nav_start(&mut self, nav_start: Ts, duration: Ts) {
        assert!(self.last_nav_start < nav_start);
        trace!("nav start at={} us, for={} us", nav_start, duration);
        self.update_backoff(nav_start);
        self.last_nav_start = nav_start;
        self.last_nav_duration = duration;
    }

    pub fn notify_nav_continue(&mut self, nav_start: Ts, duration: Ts) {
        self.notify_nav_start(nav_start, duration)
    }

    pub fn notify_rx_start_now(&mut self, duration: Ts) {
        let now = self.timer.now_us();
        trace!("rx start at={} us, for={} us", now, duration);
        self.update_backoff(now);
        self.last_rx_start = now;
        self.last_rx_duration = duration;
        self.rxing = true;
    }

    pub fn notify_rx_end_ok_now(&mut self) {
        let now = self.timer.now_us();
        trace!("rx end ok at={} us", now);
        self.last_rx_end = now;
        self.last_rx_received_ok = true;
        self.rxing = false;
    }

    pub fn notify_rx_end_error_now(&mut self) {
        let now = self.timer.now_us();
        trace!("rx end error at={} us", now);
        self.last_rx_end = now;
        self.last_rx_received_ok = false;
        self.rxing = false;
    }

    pub fn notify_tx_start_now(&mut self, duration: Ts) {
        let now = self.timer.now_us();
        trace!("tx start at={} us, for={} us", now, duration);
        self.update_backoff(now);
        self.last_tx_start = now;
        self.last_tx_duration = duration;
    }

    pub fn notify_cca_busy_start_now(&mut self, duration: Ts) {
        let now = self.timer.now_us();
        trace!("busy start at={} us, for={} us", now, duration);
        self.update_backoff(now);
        self.last_busy_start = now;
        self.last_busy_duration = duration;
    }
}
