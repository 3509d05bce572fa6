//! # Accelerator Pool
//!
//! Owns the engines opened for one workload for the lifetime of the process.
//! Capacities are queried once at creation and cached; the pool never asks
//! the hardware again.

use tokio::sync::Mutex;
use tracing::{error, info};
use crate::accelerator::{AcceleratorFactory, AcceleratorHandle};
use crate::config::PoolConfig;
use crate::error::{DispatchError, Result};

/// One engine and its cached capacity.
///
/// The mutex keeps a handle from being invoked concurrently with itself when
/// several dispatches share the pool.
struct PooledHandle {
    capacity: usize,
    handle: Mutex<Box<dyn AcceleratorHandle>>,
}

pub struct AcceleratorPool {
    workload: String,
    handles: Vec<PooledHandle>,
    capacities: Vec<usize>,
    total_capacity: usize,
}

impl AcceleratorPool {
    /// Opens `instance_count` engines for `workload`, device ids `0..instance_count`.
    ///
    /// Any failure is fatal: the engines opened so far are dropped and a
    /// [`DispatchError::DeviceInit`] is returned. Zero instances, or an engine
    /// reporting a capacity of zero, are rejected the same way.
    pub fn create<F>(factory: &F, workload: &str, instance_count: usize) -> Result<Self>
    where F: AcceleratorFactory + ?Sized
    {
        if instance_count == 0 {
            return Err(DispatchError::DeviceInit {
                workload: workload.to_string(),
                device_id: 0,
                reason: "pool needs at least one instance".to_string(),
            });
        }

        let mut handles = Vec::with_capacity(instance_count);
        for device_id in 0..instance_count {
            let handle = factory.create(workload, device_id).map_err(|e| {
                error!(workload, device_id, error = %e, "failed to open accelerator");
                DispatchError::DeviceInit {
                    workload: workload.to_string(),
                    device_id,
                    reason: e.to_string(),
                }
            })?;
            let capacity = handle.batch();
            if capacity == 0 {
                return Err(DispatchError::DeviceInit {
                    workload: workload.to_string(),
                    device_id,
                    reason: "accelerator reports a batch capacity of 0".to_string(),
                });
            }
            handles.push(PooledHandle {
                capacity,
                handle: Mutex::new(handle),
            });
        }

        let capacities: Vec<usize> = handles.iter().map(|h| h.capacity).collect();
        let total_capacity = capacities.iter().sum();
        info!(workload, ?capacities, total_capacity, "accelerator pool ready");

        Ok(Self {
            workload: workload.to_string(),
            handles,
            capacities,
            total_capacity,
        })
    }

    pub fn from_config<F>(factory: &F, config: &PoolConfig) -> Result<Self>
    where F: AcceleratorFactory + ?Sized
    {
        Self::create(factory, &config.workload, config.instances)
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// Per-call capacity of every engine, in device id order
    pub fn capacities(&self) -> &[usize] {
        &self.capacities
    }

    /// Sum of all capacities, the size of one full dispatch round
    pub fn total_capacity(&self) -> usize {
        self.total_capacity
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn handle(&self, index: usize) -> &Mutex<Box<dyn AcceleratorHandle>> {
        &self.handles[index].handle
    }
}

impl std::fmt::Debug for AcceleratorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceleratorPool")
            .field("workload", &self.workload)
            .field("capacities", &self.capacities)
            .field("total_capacity", &self.total_capacity)
            .finish()
    }
}
