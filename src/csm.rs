//! Camera State Manager: the single authoritative owner of "is there an
//! outstanding command to the camera right now".
//!
//! Two subsystems (the target selector and the scan controller) want to
//! move the camera; neither is allowed to race the other against the real
//! device. The CSM is an explicit `IDLE`/`MOVING` state machine with at
//! most one pending target; callers accept rejection silently and
//! re-evaluate on the next frame.
//!
//! State is guarded by a single lock covering state, pending target, and
//! command timestamps, matching the shared-resource policy in the design
//! notes: one mutex, callbacks dispatched outside the critical section.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::driver::CameraDriver;
use crate::ptz::{clamp_target, HardLimits, PtzPosition, SoftLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmState {
    Idle,
    Moving,
}

#[derive(Debug, Clone, Copy)]
pub struct CsmConfig {
    pub rate_limit_delay: Duration,
    pub settling_delay: Duration,
    pub max_command_time: Duration,
    pub poll_interval: Duration,
}

impl Default for CsmConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_millis(100),
            settling_delay: Duration::from_millis(100),
            max_command_time: Duration::from_secs(15),
            poll_interval: Duration::from_millis(800),
        }
    }
}

/// Observer for state transitions and arrivals. Dispatched outside the
/// critical section, so implementations may safely call back into the CSM.
pub trait CsmObserver: Send + Sync {
    fn state_changed(&self, _old: CsmState, _new: CsmState) {}
    fn arrived(&self, _target: PtzPosition) {}
}

struct Inner {
    state: CsmState,
    pending_target: Option<PtzPosition>,
    last_target: Option<PtzPosition>,
    last_known_position: Option<PtzPosition>,
    last_accepted_at: Option<Instant>,
    command_started_at: Option<Instant>,
    settling_since: Option<Instant>,
    /// Reserved while a `send_absolute_position` call is in flight, closing
    /// the window between the eligibility check and the state transition.
    sending: bool,
}

pub struct CameraStateManager<D: CameraDriver + ?Sized> {
    driver: Arc<D>,
    inner: Mutex<Inner>,
    config: CsmConfig,
    observers: Mutex<Vec<Arc<dyn CsmObserver>>>,
}

impl<D: CameraDriver + ?Sized + 'static> CameraStateManager<D> {
    pub fn new(driver: Arc<D>, config: CsmConfig, initial_position: Option<PtzPosition>) -> Self {
        Self {
            driver,
            inner: Mutex::new(Inner {
                state: CsmState::Idle,
                pending_target: None,
                last_target: initial_position,
                last_known_position: initial_position,
                last_accepted_at: None,
                command_started_at: None,
                settling_since: None,
                sending: false,
            }),
            config,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn CsmObserver>) {
        self.observers.lock().push(observer);
    }

    fn fire_state_changed(&self, old: CsmState, new: CsmState) {
        if old == new {
            return;
        }
        for obs in self.observers.lock().iter() {
            obs.state_changed(old, new);
        }
    }

    fn fire_arrived(&self, target: PtzPosition) {
        for obs in self.observers.lock().iter() {
            obs.arrived(target);
        }
    }

    /// Accept only if IDLE, the rate-limit delay has elapsed since the last
    /// accepted command, and the clamped target differs from the last
    /// commanded target. On acceptance, forwards to the driver and, if the
    /// driver accepts, transitions to MOVING. Returns true iff the driver
    /// accepted the command.
    pub async fn send_command(
        &self,
        pan: f64,
        tilt: f64,
        zoom: f64,
        soft: &SoftLimits,
        hard: &HardLimits,
    ) -> bool {
        let clamped = clamp_target(pan, tilt, zoom, soft, hard);
        let now = Instant::now();

        {
            let mut inner = self.inner.lock();
            if inner.state != CsmState::Idle || inner.sending {
                return false;
            }
            if let Some(last) = inner.last_accepted_at {
                if now.duration_since(last) < self.config.rate_limit_delay {
                    return false;
                }
            }
            if inner.last_target == Some(clamped) {
                return false;
            }
            inner.sending = true;
        }

        let result = self.driver.send_absolute_position(clamped).await;

        let mut inner = self.inner.lock();
        inner.sending = false;
        match result {
            Ok(()) => {
                let old = inner.state;
                inner.pending_target = Some(clamped);
                inner.last_target = Some(clamped);
                inner.last_accepted_at = Some(now);
                inner.command_started_at = Some(now);
                inner.settling_since = None;
                inner.state = CsmState::Moving;
                drop(inner);
                debug!(?clamped, "camera command accepted");
                self.fire_state_changed(old, CsmState::Moving);
                true
            }
            Err(e) => {
                warn!(error = %e, "camera driver rejected command");
                false
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.inner.lock().state == CsmState::Idle
    }

    pub fn is_moving(&self) -> bool {
        self.inner.lock().state == CsmState::Moving
    }

    pub fn get_target(&self) -> Option<PtzPosition> {
        self.inner.lock().pending_target
    }

    /// Cached position as of the last background poll. Reading this never
    /// blocks on the driver; only the arrival-monitor task talks to it.
    pub fn current_position(&self) -> Option<PtzPosition> {
        self.inner.lock().last_known_position
    }

    /// True iff the driver has reported the pending target continuously,
    /// per the most recent poll. Does not itself declare arrival (that
    /// happens once the settling delay elapses); this only reflects the
    /// current instantaneous match.
    pub fn has_arrived(&self) -> bool {
        let inner = self.inner.lock();
        match (inner.last_known_position, inner.pending_target) {
            (Some(pos), Some(target)) => pos == target,
            _ => false,
        }
    }

    pub fn force_idle(&self) {
        let mut inner = self.inner.lock();
        let old = inner.state;
        inner.state = CsmState::Idle;
        inner.pending_target = None;
        inner.settling_since = None;
        drop(inner);
        info!("camera forced to idle");
        self.fire_state_changed(old, CsmState::Idle);
    }

    /// Runs one arrival-monitor tick: query the driver, update the cached
    /// position, and advance the settling/timeout logic. Called by the
    /// background task at `poll_interval`; exposed directly so tests can
    /// drive it deterministically without sleeping.
    pub async fn poll_once(&self) {
        match self.driver.query_position().await {
            Ok(pos) => self.handle_polled_position(pos),
            Err(e) => {
                warn!(error = %e, "camera position query failed; retrying next tick");
            }
        }
    }

    fn handle_polled_position(&self, pos: PtzPosition) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.last_known_position = Some(pos);

        if inner.state != CsmState::Moving {
            return;
        }

        let Some(target) = inner.pending_target else {
            return;
        };

        if pos == target {
            let settled = match inner.settling_since {
                None => {
                    inner.settling_since = Some(now);
                    false
                }
                Some(since) => now.duration_since(since) >= self.config.settling_delay,
            };
            if settled {
                inner.state = CsmState::Idle;
                inner.settling_since = None;
                inner.pending_target = None;
                drop(inner);
                info!(?target, "camera arrived");
                self.fire_state_changed(CsmState::Moving, CsmState::Idle);
                self.fire_arrived(target);
                return;
            }
        } else {
            inner.settling_since = None;
        }

        if let Some(started) = inner.command_started_at {
            if now.duration_since(started) >= self.config.max_command_time {
                inner.state = CsmState::Idle;
                inner.pending_target = None;
                inner.settling_since = None;
                drop(inner);
                warn!("camera command timed out; forcing idle");
                self.fire_state_changed(CsmState::Moving, CsmState::Idle);
            }
        }
    }

    /// Spawn the background arrival-monitor task. Intended to be called
    /// once at startup with an `Arc<Self>`.
    pub fn spawn_arrival_monitor(self: Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        D: 'static,
    {
        let poll_interval = self.config.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}
