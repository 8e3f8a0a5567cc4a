use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::{AppError, Result};

#[derive(Default)]
struct Slot {
    waiters: VecDeque<oneshot::Sender<AdmissionPermit>>,
}

/// Per-key admission control: at most one permit per key is outstanding,
/// later requests for the same key are served in FIFO order.
///
/// Keys are independent; the gate never serializes across keys.
#[derive(Clone, Default)]
pub struct AdmissionGate {
    // A key is present exactly while a permit for it is outstanding
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request admission for `key`.
    ///
    /// The place in line is taken synchronously, so requests made in order
    /// are admitted in order regardless of when they are awaited.
    pub fn acquire(&self, key: &str) -> PendingAdmission {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        match slots.get_mut(key) {
            Some(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.waiters.push_back(tx);
                PendingAdmission::Queued {
                    key: key.to_string(),
                    position: slot.waiters.len(),
                    receiver: rx,
                }
            }
            None => {
                slots.insert(key.to_string(), Slot::default());
                PendingAdmission::Ready(AdmissionPermit::new(key, self.clone()))
            }
        }
    }

    pub fn is_busy(&self, key: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.contains_key(key)
    }

    pub fn queued(&self, key: &str) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map_or(0, |s| s.waiters.len())
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = slots.get_mut(key) else {
            return;
        };

        while let Some(waiter) = slot.waiters.pop_front() {
            match waiter.send(AdmissionPermit::new(key, self.clone())) {
                Ok(()) => return,
                // Waiter gave up; hand the slot to the next one
                Err(mut permit) => permit.disarm(),
            }
        }

        slots.remove(key);
    }
}

/// Held for the duration of a run; dropping it admits the next waiter.
pub struct AdmissionPermit {
    key: String,
    gate: Option<AdmissionGate>,
}

impl AdmissionPermit {
    fn new(key: &str, gate: AdmissionGate) -> Self {
        Self {
            key: key.to_string(),
            gate: Some(gate),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn disarm(&mut self) {
        self.gate = None;
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release(&self.key);
        }
    }
}

pub enum PendingAdmission {
    Ready(AdmissionPermit),
    Queued {
        key: String,
        position: usize,
        receiver: oneshot::Receiver<AdmissionPermit>,
    },
}

impl PendingAdmission {
    /// 1-based place in line at the time of the request, or `None` if
    /// admission was immediate.
    pub fn queue_position(&self) -> Option<usize> {
        match self {
            PendingAdmission::Ready(_) => None,
            PendingAdmission::Queued { position, .. } => Some(*position),
        }
    }

    pub async fn wait(self) -> Result<AdmissionPermit> {
        match self {
            PendingAdmission::Ready(permit) => Ok(permit),
            PendingAdmission::Queued { key, receiver, .. } => receiver.await.map_err(|_| {
                AppError::Internal(format!("Admission gate closed while waiting on key {key}"))
            }),
        }
    }
}
