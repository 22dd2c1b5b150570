//! Fixed-capacity ID registry.
//!
//! One `Registry` is instantiated per peripheral class (and per concrete device
//! driver). It maps a small integer ID to the configuration record the ID was
//! bound with plus the runtime state the driver keeps for it.
//!
//! # Slot lifecycle
//!
//! ```text
//!                init (validated, bound)
//! Unconfigured ──────────────────────────► Configured ◄──┐
//!                                           │    ▲       │ init / reconfigure
//!                               set_busy(true)   │ set_busy(false)
//!                                           ▼    │       │
//!                                           Busy ─┘──────┘
//! ```
//!
//! Every access is bounds-checked: an ID outside `0..N` is `InvalidId`, an ID
//! inside the table that was never bound is `NotConfigured`. Binding
//! conflicts are detected against every other configured slot through
//! [`ResourceConfig::conflicts_with`]; a slot never conflicts with its own
//! previous binding, which is what makes a repeated `init` an idempotent
//! re-bind.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HalError, Result};
use crate::types::PeripheralClass;

/// Configuration record that can be bound to a registry slot.
pub trait ResourceConfig: Clone + fmt::Debug {
    /// Class tag used in errors raised by the registry.
    const CLASS: PeripheralClass;

    /// Check every field against the class's closed enumerations and ranges.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidParameter`] describing the first offending field.
    fn validate(&self) -> Result<()>;

    /// True when `self` and `other` cannot be bound at the same time.
    ///
    /// Implementations allow sharing of a bus port where the class
    /// multiplexes it and reject any pin or channel collision.
    fn conflicts_with(&self, other: &Self) -> bool;
}

/// State tag of a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotState {
    /// Never bound.
    Unconfigured,

    /// Bound and idle.
    Configured,

    /// Bound and held by a multi-step transaction (e.g. a locked chip select).
    Busy,
}

/// A bound registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<C, S> {
    config: C,
    state: S,
    busy: bool,
}

impl<C, S> Slot<C, S> {
    /// Parameters the slot was bound with.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Driver runtime state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable driver runtime state.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

/// Fixed-size table of `N` slots binding IDs to configurations.
#[derive(Debug, Clone)]
pub struct Registry<C, S, const N: usize> {
    slots: [Option<Slot<C, S>>; N],
}

impl<C: ResourceConfig, S, const N: usize> Registry<C, S, N> {
    /// Create a registry with every slot unconfigured.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Number of IDs the table can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Peripheral class of the table.
    pub const fn class(&self) -> PeripheralClass {
        C::CLASS
    }

    /// Convert an ID into a table index.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidId`] if `id >= N`.
    pub fn check_id(&self, id: u8) -> Result<usize> {
        let index = usize::from(id);
        if index >= N {
            return Err(HalError::invalid_id(C::CLASS, id, N));
        }
        Ok(index)
    }

    /// First configured ID (other than `id`) whose binding collides with `config`.
    pub fn find_conflict(&self, id: u8, config: &C) -> Option<u8> {
        self.iter()
            .filter(|(other, _)| *other != id)
            .find(|(_, slot)| config.conflicts_with(&slot.config))
            .map(|(other, _)| other)
    }

    /// Run every check `init` performs without binding anything.
    ///
    /// # Errors
    ///
    /// `InvalidId`, `InvalidParameter` or `ConfigurationConflict`, checked in that order.
    pub fn validate(&self, id: u8, config: &C) -> Result<()> {
        self.check_id(id)?;
        config.validate()?;
        if let Some(other) = self.find_conflict(id, config) {
            return Err(HalError::conflict(C::CLASS, id, other));
        }
        Ok(())
    }

    /// Validate `config` and bind it to `id`.
    ///
    /// `bind` performs the physical binding and produces the slot's runtime
    /// state; the slot only becomes `Configured` if it succeeds. Calling
    /// `init` on an already configured ID re-validates and re-binds it.
    ///
    /// # Errors
    ///
    /// Any error from [`Registry::validate`] or from `bind`.
    pub fn init<F>(&mut self, id: u8, config: C, bind: F) -> Result<&mut Slot<C, S>>
    where
        F: FnOnce(&C) -> Result<S>,
    {
        self.validate(id, &config)?;
        let state = bind(&config)?;
        let slot = &mut self.slots[usize::from(id)];
        Ok(slot.insert(Slot {
            config,
            state,
            busy: false,
        }))
    }

    /// Re-bind an already configured ID, keeping its runtime state.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the ID was never bound, then the same checks as `init`.
    pub fn reconfigure<F>(&mut self, id: u8, config: C, rebind: F) -> Result<&mut Slot<C, S>>
    where
        F: FnOnce(&C, &mut S) -> Result<()>,
    {
        self.get(id)?;
        self.validate(id, &config)?;
        let slot = self.get_mut(id)?;
        rebind(&config, &mut slot.state)?;
        slot.config = config;
        Ok(slot)
    }

    /// Bind `id` unless it already holds a different binding.
    ///
    /// Claiming an ID with the configuration it is bound to leaves the slot
    /// untouched and does not call `bind`, so several users can share one
    /// binding. Moving a live binding elsewhere goes through
    /// [`Registry::reconfigure`].
    ///
    /// # Errors
    ///
    /// `ConfigurationConflict` (naming `id` itself) if the ID is bound to
    /// another configuration, otherwise the same errors as `init`.
    pub fn claim<F>(&mut self, id: u8, config: C, bind: F) -> Result<&mut Slot<C, S>>
    where
        C: PartialEq,
        F: FnOnce(&C) -> Result<S>,
    {
        let index = self.check_id(id)?;
        let bound = self.slots[index].as_ref().map(|slot| slot.config == config);
        match bound {
            Some(false) => Err(HalError::conflict(C::CLASS, id, id)),
            Some(true) => self.get_mut(id),
            None => self.init(id, config, bind),
        }
    }

    /// Bound slot of `id`.
    ///
    /// # Errors
    ///
    /// `InvalidId` or `NotConfigured`.
    pub fn get(&self, id: u8) -> Result<&Slot<C, S>> {
        let index = self.check_id(id)?;
        self.slots[index]
            .as_ref()
            .ok_or_else(|| HalError::not_configured(C::CLASS, id))
    }

    /// Mutable bound slot of `id`.
    ///
    /// # Errors
    ///
    /// `InvalidId` or `NotConfigured`.
    pub fn get_mut(&mut self, id: u8) -> Result<&mut Slot<C, S>> {
        let index = self.check_id(id)?;
        self.slots[index]
            .as_mut()
            .ok_or_else(|| HalError::not_configured(C::CLASS, id))
    }

    /// State tag of `id`.
    ///
    /// # Errors
    ///
    /// `InvalidId` if `id` is outside the table.
    pub fn state(&self, id: u8) -> Result<SlotState> {
        let index = self.check_id(id)?;
        Ok(match &self.slots[index] {
            None => SlotState::Unconfigured,
            Some(slot) if slot.busy => SlotState::Busy,
            Some(_) => SlotState::Configured,
        })
    }

    /// Mark a configured slot as held by (or released from) a transaction.
    ///
    /// # Errors
    ///
    /// `InvalidId` or `NotConfigured`.
    pub fn set_busy(&mut self, id: u8, busy: bool) -> Result<()> {
        self.get_mut(id)?.busy = busy;
        Ok(())
    }

    /// Unbind `id`, returning the slot it held.
    ///
    /// # Errors
    ///
    /// `InvalidId` if `id` is outside the table.
    pub fn release(&mut self, id: u8) -> Result<Option<Slot<C, S>>> {
        let index = self.check_id(id)?;
        Ok(self.slots[index].take())
    }

    pub fn is_configured(&self, id: u8) -> bool {
        self.get(id).is_ok()
    }

    /// Configured slots with their IDs, in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Slot<C, S>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|slot| (index as u8, slot)))
    }

    /// Mutable configured slots with their IDs, in ID order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u8, &mut Slot<C, S>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|slot| (index as u8, slot)))
    }

    /// IDs of every configured slot.
    pub fn configured_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.iter().map(|(id, _)| id)
    }
}

impl<C: ResourceConfig, S, const N: usize> Default for Registry<C, S, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;
    use rstest::rstest;

    /// Port/pin binding where the port may be shared but the pin may not.
    #[derive(Debug, Clone, PartialEq)]
    struct Binding {
        port: u8,
        pin: u8,
    }

    impl ResourceConfig for Binding {
        const CLASS: PeripheralClass = PeripheralClass::Gpio;

        fn validate(&self) -> Result<()> {
            if self.pin > 15 {
                return Err(HalError::invalid_parameter(format!(
                    "pin {} out of range",
                    self.pin
                )));
            }
            Ok(())
        }

        fn conflicts_with(&self, other: &Self) -> bool {
            self.port == other.port && self.pin == other.pin
        }
    }

    type TestRegistry = Registry<Binding, u32, 4>;

    fn binding(port: u8, pin: u8) -> Binding {
        Binding { port, pin }
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = TestRegistry::new();
        assert_eq!(registry.capacity(), 4);
        assert_eq!(registry.class(), PeripheralClass::Gpio);
        assert_eq!(registry.configured_ids().count(), 0);
        assert_eq!(registry.state(0).unwrap(), SlotState::Unconfigured);
    }

    #[test]
    fn test_init_binds_slot() {
        let mut registry = TestRegistry::new();
        registry.init(2, binding(0, 5), |_| Ok(7)).unwrap();

        let slot = registry.get(2).unwrap();
        assert_eq!(slot.config(), &binding(0, 5));
        assert_eq!(*slot.state(), 7);
        assert_eq!(registry.state(2).unwrap(), SlotState::Configured);
        assert_eq!(registry.configured_ids().collect::<Vec<_>>(), vec![2]);
    }

    #[rstest]
    #[case(4)]
    #[case(5)]
    #[case(255)]
    fn test_init_rejects_out_of_range_id(#[case] id: u8) {
        let mut registry = TestRegistry::new();
        let error = registry.init(id, binding(0, 0), |_| Ok(0)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidId);
    }

    #[test]
    fn test_invalid_id_wins_over_invalid_parameter() {
        let mut registry = TestRegistry::new();
        let error = registry.init(9, binding(0, 99), |_| Ok(0)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidId);
    }

    #[test]
    fn test_init_rejects_invalid_parameter() {
        let mut registry = TestRegistry::new();
        let error = registry.init(0, binding(0, 16), |_| Ok(0)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert!(!registry.is_configured(0));
    }

    #[test]
    fn test_pin_collision_is_a_conflict() {
        let mut registry = TestRegistry::new();
        registry.init(0, binding(1, 3), |_| Ok(0)).unwrap();

        let error = registry.init(1, binding(1, 3), |_| Ok(0)).unwrap_err();
        assert_eq!(error, HalError::conflict(PeripheralClass::Gpio, 1, 0));
        assert!(!registry.is_configured(1));
    }

    #[test]
    fn test_port_sharing_is_allowed() {
        let mut registry = TestRegistry::new();
        registry.init(0, binding(1, 3), |_| Ok(0)).unwrap();
        registry.init(1, binding(1, 4), |_| Ok(0)).unwrap();
        assert_eq!(registry.configured_ids().count(), 2);
    }

    #[test]
    fn test_reinit_same_id_rebinds() {
        let mut registry = TestRegistry::new();
        registry.init(0, binding(1, 3), |_| Ok(1)).unwrap();
        registry.init(0, binding(1, 3), |_| Ok(2)).unwrap();
        registry.init(0, binding(2, 9), |_| Ok(3)).unwrap();

        let slot = registry.get(0).unwrap();
        assert_eq!(slot.config(), &binding(2, 9));
        assert_eq!(*slot.state(), 3);
    }

    #[test]
    fn test_claim_shares_identical_binding() {
        let mut registry = TestRegistry::new();
        registry.claim(0, binding(1, 3), |_| Ok(1)).unwrap();

        let mut rebound = false;
        registry
            .claim(0, binding(1, 3), |_| {
                rebound = true;
                Ok(2)
            })
            .unwrap();
        assert!(!rebound);
        assert_eq!(*registry.get(0).unwrap().state(), 1);
    }

    #[test]
    fn test_claim_refuses_to_move_live_binding() {
        let mut registry = TestRegistry::new();
        registry.claim(0, binding(1, 3), |_| Ok(1)).unwrap();

        let error = registry.claim(0, binding(2, 9), |_| Ok(2)).unwrap_err();
        assert_eq!(error, HalError::conflict(PeripheralClass::Gpio, 0, 0));
        assert_eq!(registry.get(0).unwrap().config(), &binding(1, 3));

        let error = registry.claim(4, binding(2, 9), |_| Ok(2)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidId);
    }

    #[test]
    fn test_failed_bind_leaves_slot_unconfigured() {
        let mut registry = TestRegistry::new();
        let error = registry
            .init(0, binding(0, 0), |_| Err(HalError::hardware_fault("clock off")))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HardwareFault);
        assert_eq!(registry.state(0).unwrap(), SlotState::Unconfigured);
    }

    #[test]
    fn test_get_unconfigured_id() {
        let registry = TestRegistry::new();
        let error = registry.get(1).unwrap_err();
        assert_eq!(error, HalError::not_configured(PeripheralClass::Gpio, 1));
    }

    #[test]
    fn test_reconfigure_requires_configured_id() {
        let mut registry = TestRegistry::new();
        let error = registry
            .reconfigure(0, binding(0, 1), |_, _| Ok(()))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotConfigured);
    }

    #[test]
    fn test_reconfigure_keeps_state() {
        let mut registry = TestRegistry::new();
        registry.init(0, binding(0, 1), |_| Ok(41)).unwrap();
        registry
            .reconfigure(0, binding(0, 2), |_, state| {
                *state += 1;
                Ok(())
            })
            .unwrap();

        let slot = registry.get(0).unwrap();
        assert_eq!(slot.config(), &binding(0, 2));
        assert_eq!(*slot.state(), 42);
    }

    #[test]
    fn test_reconfigure_detects_conflict() {
        let mut registry = TestRegistry::new();
        registry.init(0, binding(0, 1), |_| Ok(0)).unwrap();
        registry.init(1, binding(0, 2), |_| Ok(0)).unwrap();

        let error = registry
            .reconfigure(1, binding(0, 1), |_, _| Ok(()))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConfigurationConflict);
        assert_eq!(registry.get(1).unwrap().config(), &binding(0, 2));
    }

    #[test]
    fn test_busy_state() {
        let mut registry = TestRegistry::new();
        registry.init(3, binding(0, 1), |_| Ok(0)).unwrap();

        registry.set_busy(3, true).unwrap();
        assert_eq!(registry.state(3).unwrap(), SlotState::Busy);

        registry.set_busy(3, false).unwrap();
        assert_eq!(registry.state(3).unwrap(), SlotState::Configured);

        assert!(registry.set_busy(2, true).is_err());
    }

    #[test]
    fn test_release() {
        let mut registry = TestRegistry::new();
        registry.init(1, binding(0, 1), |_| Ok(5)).unwrap();

        let slot = registry.release(1).unwrap().unwrap();
        assert_eq!(*slot.state(), 5);
        assert!(!registry.is_configured(1));
        assert!(registry.release(1).unwrap().is_none());
    }

    proptest! {
        /// Property: any ID past the capacity is rejected as InvalidId,
        /// regardless of the parameters it is bound with.
        #[test]
        fn prop_out_of_range_id_always_invalid(
            id in 4u8..=u8::MAX,
            port in any::<u8>(),
            pin in any::<u8>(),
        ) {
            let mut registry = TestRegistry::new();
            let error = registry.init(id, binding(port, pin), |_| Ok(0)).unwrap_err();
            prop_assert_eq!(error.kind(), ErrorKind::InvalidId);
        }

        /// Property: no two configured slots ever hold colliding bindings.
        #[test]
        fn prop_no_two_slots_collide(
            requests in prop::collection::vec((0u8..4, 0u8..2, 0u8..4), 0..20),
        ) {
            let mut registry = TestRegistry::new();
            for (id, port, pin) in requests {
                let _ = registry.init(id, binding(port, pin), |_| Ok(0));
            }

            let bound: Vec<_> = registry.iter().map(|(_, slot)| slot.config().clone()).collect();
            for (i, a) in bound.iter().enumerate() {
                for b in &bound[i + 1..] {
                    prop_assert!(!a.conflicts_with(b));
                }
            }
        }
    }
}
