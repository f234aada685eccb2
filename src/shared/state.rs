// This is free and unencumbered software released into the public domain.

use crate::shared::CameraError;
use core::ops::{Deref, DerefMut};
use derive_more::Display;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::debug;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CameraState {
    #[display("opening")]
    Opening,
    #[display("configuring")]
    Configuring,
    #[display("started")]
    Started,
    #[display("stopped")]
    Stopped,
}

impl CameraState {
    /// Opening and configuring always resolve into started or stopped.
    pub const fn is_settling(self) -> bool {
        matches!(self, Self::Opening | Self::Configuring)
    }
}

/// The lifecycle state together with the resources it guards.
///
/// The state itself can only be changed through
/// [`CameraStateMachine::transition`].
pub struct Lifecycle<R> {
    state: CameraState,
    resources: R,
}

impl<R> Lifecycle<R> {
    pub fn state(&self) -> CameraState {
        self.state
    }
}

impl<R> Deref for Lifecycle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resources
    }
}

impl<R> DerefMut for Lifecycle<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resources
    }
}

pub struct CameraStateMachine<R> {
    inner: Mutex<Lifecycle<R>>,
    changed: Condvar,
}

impl<R> CameraStateMachine<R> {
    pub fn new(resources: R) -> Self {
        Self {
            inner: Mutex::new(Lifecycle {
                state: CameraState::Stopped,
                resources,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Lifecycle<R>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> CameraState {
        self.lock().state
    }

    /// Changes state and wakes every waiter. Requires the lock to be held.
    pub fn transition(&self, lifecycle: &mut Lifecycle<R>, to: CameraState) {
        if lifecycle.state != to {
            debug!(from = %lifecycle.state, %to, "camera state");
        }
        lifecycle.state = to;
        self.changed.notify_all();
    }

    /// Moves into opening, unless a previous open is still settling.
    pub fn begin_opening(&self) -> Result<MutexGuard<'_, Lifecycle<R>>, CameraError> {
        let mut lifecycle = self.lock();
        if lifecycle.state.is_settling() {
            return Err(CameraError::Busy(lifecycle.state));
        }
        self.transition(&mut lifecycle, CameraState::Opening);
        Ok(lifecycle)
    }

    /// Blocks until the state is started or stopped.
    pub fn wait_settled(&self) -> MutexGuard<'_, Lifecycle<R>> {
        let mut lifecycle = self.lock();
        while lifecycle.state.is_settling() {
            lifecycle = self
                .changed
                .wait(lifecycle)
                .unwrap_or_else(|p| p.into_inner());
        }
        lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn starts_stopped() {
        let machine = CameraStateMachine::new(());
        assert_eq!(machine.state(), CameraState::Stopped);
    }

    #[test]
    fn opening_twice_is_rejected() {
        let machine = CameraStateMachine::new(());
        drop(machine.begin_opening().unwrap());
        assert!(matches!(
            machine.begin_opening(),
            Err(CameraError::Busy(CameraState::Opening))
        ));

        let mut lifecycle = machine.lock();
        machine.transition(&mut lifecycle, CameraState::Configuring);
        drop(lifecycle);
        assert!(matches!(
            machine.begin_opening(),
            Err(CameraError::Busy(CameraState::Configuring))
        ));
    }

    #[test]
    fn reopening_after_stop_is_allowed() {
        let machine = CameraStateMachine::new(());
        let mut lifecycle = machine.begin_opening().unwrap();
        machine.transition(&mut lifecycle, CameraState::Stopped);
        drop(lifecycle);
        assert!(machine.begin_opening().is_ok());
    }

    #[test]
    fn waiter_wakes_when_open_resolves() {
        let machine = Arc::new(CameraStateMachine::new(0u32));
        drop(machine.begin_opening().unwrap());

        let resolver = {
            let machine = Arc::clone(&machine);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                let mut lifecycle = machine.lock();
                machine.transition(&mut lifecycle, CameraState::Configuring);
                drop(lifecycle);

                thread::sleep(Duration::from_millis(30));
                let mut lifecycle = machine.lock();
                **lifecycle = 7;
                machine.transition(&mut lifecycle, CameraState::Started);
            })
        };

        let lifecycle = machine.wait_settled();
        assert_eq!(lifecycle.state(), CameraState::Started);
        assert_eq!(**lifecycle, 7);
        drop(lifecycle);
        resolver.join().unwrap();
    }

    #[test]
    fn waiting_on_a_settled_machine_returns_at_once() {
        let machine = CameraStateMachine::new(());
        assert_eq!(machine.wait_settled().state(), CameraState::Stopped);
    }
}
