//! The camera wire-protocol boundary.
//!
//! The physical camera's transport (HTTP, VISCA-over-serial, whatever the
//! device speaks) is abstracted behind this trait. Implementations are
//! responsible for translating integer PTZ units into whatever the device
//! expects and for handling device-side authentication (e.g. re-deriving a
//! digest challenge on 401 and retrying once, surfacing a persistent 401 as
//! `Error::DriverAuth`).
//!
//! Calls are blocking from the caller's point of view (they complete or
//! time out); the camera-driver worker is responsible for serializing
//! outbound requests so at most one is in flight.

use async_trait::async_trait;

use crate::error::Result;
use crate::ptz::PtzPosition;

#[async_trait]
pub trait CameraDriver: Send + Sync {
    /// Send an absolute-position command. Succeeds when the device
    /// acknowledges receipt, not when it arrives.
    async fn send_absolute_position(&self, target: PtzPosition) -> Result<()>;

    /// Query the device's current reported position.
    async fn query_position(&self) -> Result<PtzPosition>;
}

/// A test/dry-run driver that tracks an idealized camera: it "arrives" at
/// whatever it was last commanded to after a configurable number of
/// queries, useful for exercising the CSM and Frame Pipeline without real
/// hardware.
#[derive(Debug)]
pub struct SimulatedDriver {
    inner: parking_lot::Mutex<SimulatedDriverInner>,
}

#[derive(Debug)]
struct SimulatedDriverInner {
    current: PtzPosition,
    target: PtzPosition,
    /// Number of `query_position` calls remaining before the simulated
    /// camera reports having arrived at `target`.
    queries_to_arrival: u32,
}

impl SimulatedDriver {
    pub fn new(initial: PtzPosition) -> Self {
        Self {
            inner: parking_lot::Mutex::new(SimulatedDriverInner {
                current: initial,
                target: initial,
                queries_to_arrival: 0,
            }),
        }
    }

    pub fn with_arrival_delay(initial: PtzPosition, queries_to_arrival: u32) -> Self {
        Self {
            inner: parking_lot::Mutex::new(SimulatedDriverInner {
                current: initial,
                target: initial,
                queries_to_arrival,
            }),
        }
    }

    pub fn set_position(&self, pos: PtzPosition) {
        let mut inner = self.inner.lock();
        inner.current = pos;
        inner.target = pos;
    }
}

#[async_trait]
impl CameraDriver for SimulatedDriver {
    async fn send_absolute_position(&self, target: PtzPosition) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.target = target;
        Ok(())
    }

    async fn query_position(&self) -> Result<PtzPosition> {
        let mut inner = self.inner.lock();
        if inner.current != inner.target {
            if inner.queries_to_arrival == 0 {
                inner.current = inner.target;
            } else {
                inner.queries_to_arrival -= 1;
            }
        }
        Ok(inner.current)
    }
}
