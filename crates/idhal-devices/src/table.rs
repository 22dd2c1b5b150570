//! Per-driver device table.
//!
//! Every concrete chip driver owns one [`DeviceTable`]: a registry of device
//! IDs, each bound to the bus ID the chip sits on and flagged once its
//! power-up sequence has run. The table is what makes the bring-up order
//! checkable: [`DeviceTable::configure`] refuses IDs that were never bound
//! and [`DeviceTable::ready`] refuses IDs that were never configured.

use std::fmt::Debug;
use std::marker::PhantomData;

use tracing::{debug, warn};

use idhal_core::{HalError, PeripheralClass, Registry, ResourceConfig, Result};

/// Marker for a device class.
pub trait DeviceClass: Debug + Clone + Copy {
    const CLASS: PeripheralClass;
}

#[derive(Debug, Clone, Copy)]
pub struct Display;

#[derive(Debug, Clone, Copy)]
pub struct Imu;

#[derive(Debug, Clone, Copy)]
pub struct Storage;

impl DeviceClass for Display {
    const CLASS: PeripheralClass = PeripheralClass::Display;
}

impl DeviceClass for Imu {
    const CLASS: PeripheralClass = PeripheralClass::Imu;
}

impl DeviceClass for Storage {
    const CLASS: PeripheralClass = PeripheralClass::Storage;
}

/// Bus ID a device ID is bound to.
#[derive(Debug, Clone, Copy)]
pub struct DeviceBinding<K> {
    pub bus_id: u8,
    class: PhantomData<K>,
}

impl<K> DeviceBinding<K> {
    pub fn new(bus_id: u8) -> Self {
        Self {
            bus_id,
            class: PhantomData,
        }
    }
}

impl<K: DeviceClass> ResourceConfig for DeviceBinding<K> {
    const CLASS: PeripheralClass = K::CLASS;

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    // Two devices of one driver cannot drive the same bus ID.
    fn conflicts_with(&self, other: &Self) -> bool {
        self.bus_id == other.bus_id
    }
}

#[derive(Debug, Default)]
struct DeviceSlot<S> {
    ready: bool,
    state: S,
}

/// Device IDs of one concrete driver.
#[derive(Debug)]
pub struct DeviceTable<K: DeviceClass, S, const N: usize> {
    registry: Registry<DeviceBinding<K>, DeviceSlot<S>, N>,
}

impl<K: DeviceClass, S: Default, const N: usize> DeviceTable<K, S, N> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Bind `id` to `bus_id`, running `bind_bus` to initialize the bus ID.
    ///
    /// The device ID is checked before the bus is touched. Re-binding an ID
    /// clears its configured flag.
    ///
    /// # Errors
    ///
    /// `InvalidId` or `ConfigurationConflict` for the device ID, or any error
    /// from `bind_bus`.
    pub fn bind<F>(&mut self, id: u8, bus_id: u8, bind_bus: F) -> Result<()>
    where
        F: FnOnce(u8) -> Result<()>,
    {
        self.registry
            .init(id, DeviceBinding::new(bus_id), |binding| {
                bind_bus(binding.bus_id)?;
                Ok(DeviceSlot::default())
            })
            .inspect_err(|e| warn!(class = %K::CLASS, id, bus_id, error = %e, "device bind rejected"))?;

        debug!(class = %K::CLASS, id, bus_id, "device bound");
        Ok(())
    }

    /// Run the power-up sequence `f` for a bound ID and mark it ready.
    ///
    /// `f` receives the bus ID and the driver's per-device state. The ID is
    /// only ready if `f` succeeds.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the ID was never bound (without calling `f`), or
    /// any error from `f`.
    pub fn configure<F>(&mut self, id: u8, f: F) -> Result<()>
    where
        F: FnOnce(u8, &mut S) -> Result<()>,
    {
        let slot = self.registry.get_mut(id)?;
        let bus_id = slot.config().bus_id;
        let entry = slot.state_mut();

        entry.ready = false;
        f(bus_id, &mut entry.state)
            .inspect_err(|e| warn!(class = %K::CLASS, id, error = %e, "device power-up failed"))?;
        entry.ready = true;

        debug!(class = %K::CLASS, id, "device ready");
        Ok(())
    }

    /// Bus ID and state of a configured ID.
    ///
    /// # Errors
    ///
    /// `InvalidId`, or `NotConfigured` unless both bring-up steps have run.
    pub fn ready(&mut self, id: u8) -> Result<(u8, &mut S)> {
        let slot = self.registry.get_mut(id)?;
        let bus_id = slot.config().bus_id;
        let entry = slot.state_mut();
        if !entry.ready {
            return Err(HalError::not_configured(K::CLASS, id));
        }
        Ok((bus_id, &mut entry.state))
    }

    pub fn is_ready(&self, id: u8) -> bool {
        self.registry
            .get(id)
            .is_ok_and(|slot| slot.state().ready)
    }

    pub fn bus_id(&self, id: u8) -> Result<u8> {
        Ok(self.registry.get(id)?.config().bus_id)
    }
}

impl<K: DeviceClass, S: Default, const N: usize> Default for DeviceTable<K, S, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idhal_core::ErrorKind;

    type Table = DeviceTable<Display, u32, 2>;

    #[test]
    fn test_configure_before_bind() {
        let mut table = Table::new();
        let mut called = false;

        let error = table
            .configure(0, |_, _| {
                called = true;
                Ok(())
            })
            .unwrap_err();

        assert_eq!(error, HalError::not_configured(PeripheralClass::Display, 0));
        assert!(!called);
    }

    #[test]
    fn test_ready_requires_configure() {
        let mut table = Table::new();
        table.bind(0, 2, |_| Ok(())).unwrap();

        assert_eq!(table.ready(0).unwrap_err().kind(), ErrorKind::NotConfigured);

        table.configure(0, |_, state| {
            *state = 7;
            Ok(())
        })
        .unwrap();
        let (bus_id, state) = table.ready(0).unwrap();
        assert_eq!((bus_id, *state), (2, 7));
    }

    #[test]
    fn test_failed_power_up_is_not_ready() {
        let mut table = Table::new();
        table.bind(0, 0, |_| Ok(())).unwrap();

        let result = table.configure(0, |_, _| Err(HalError::nack(0x3C)));
        assert!(result.is_err());
        assert!(!table.is_ready(0));
    }

    #[test]
    fn test_rebind_clears_ready() {
        let mut table = Table::new();
        table.bind(0, 0, |_| Ok(())).unwrap();
        table.configure(0, |_, _| Ok(())).unwrap();
        assert!(table.is_ready(0));

        table.bind(0, 1, |_| Ok(())).unwrap();
        assert!(!table.is_ready(0));
        assert_eq!(table.bus_id(0).unwrap(), 1);
    }

    #[test]
    fn test_bind_checks_device_id_before_bus() {
        let mut table = Table::new();
        let mut touched = false;

        let error = table
            .bind(2, 0, |_| {
                touched = true;
                Ok(())
            })
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::InvalidId);
        assert!(!touched);
    }

    #[test]
    fn test_two_devices_on_one_bus_id_conflict() {
        let mut table = Table::new();
        table.bind(0, 1, |_| Ok(())).unwrap();

        let error = table.bind(1, 1, |_| Ok(())).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConfigurationConflict);
    }
}
