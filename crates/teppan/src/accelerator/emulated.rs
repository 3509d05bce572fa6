//! A software stand-in for a hardware engine.
//!
//! The emulated engine validates every call the way a driver would (sizes,
//! declared byte count, capacity) and produces a deterministic output that
//! depends on nothing but the input row, which makes batch-order bugs visible.
//! Calls are recorded in a shared [`CallLog`], and faults or latency can be
//! injected per factory.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use crate::error::DeviceRunError;
use crate::tensor::constant::BYTES_PER_VALUE;
use super::core_trait::{AcceleratorFactory, AcceleratorHandle, OpenError};

const EINVAL: i32 = -22;
const E2BIG: i32 = -7;
const EIO: i32 = -5;

/// One observed hardware call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
    pub device_id: usize,
    pub item_count: usize,
    pub frame_count: usize,
    pub declared_bytes: usize,
}

/// Calls seen by every engine of one factory, in issue order.
#[derive(Debug, Default)]
pub struct CallLog {
    records: Mutex<Vec<CallRecord>>,
}

impl CallLog {
    /// Appends a record and returns its position in the log.
    fn push(&self, record: CallRecord) -> usize {
        let mut records = self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        records.push(record);
        records.len() - 1
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// # EmulatedAccelerator
///
/// Output channel `k` of a frame is input channel `k % input_width` of the
/// same frame, offset by `k % 64`. See [`EmulatedAccelerator::transform_row`].
#[derive(Debug)]
pub struct EmulatedAccelerator {
    device_id: usize,
    capacity: usize,
    input_width: usize,
    output_width: usize,
    latency: Option<Duration>,
    fail_at: Option<usize>,
    log: Arc<CallLog>,
}

impl EmulatedAccelerator {
    /// Computes the output of one item, for `frames` frames.
    pub fn transform_row(
        input: &[i16],
        output: &mut [i16],
        frames: usize,
        input_width: usize,
        output_width: usize,
    ) {
        for frame in 0..frames {
            let src = &input[frame * input_width..(frame + 1) * input_width];
            let dst = &mut output[frame * output_width..(frame + 1) * output_width];
            for (channel, value) in dst.iter_mut().enumerate() {
                *value = src[channel % input_width].saturating_add((channel % 64) as i16);
            }
        }
    }

    fn invalid(message: String) -> DeviceRunError {
        DeviceRunError::new(EINVAL, message)
    }
}

#[async_trait]
impl AcceleratorHandle for EmulatedAccelerator {
    fn batch(&self) -> usize {
        self.capacity
    }

    async fn run(
        &self,
        input: &[i16],
        declared_bytes: usize,
        output: &mut [i16],
        frame_count: usize,
        item_count: usize,
    ) -> Result<(), DeviceRunError> {
        let index = self.log.push(CallRecord {
            device_id: self.device_id,
            item_count,
            frame_count,
            declared_bytes,
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_at == Some(index) {
            return Err(DeviceRunError::new(EIO, format!("injected fault on call {index}")));
        }
        if item_count == 0 {
            return Err(Self::invalid("call with no items".to_string()));
        }
        if item_count > self.capacity {
            return Err(DeviceRunError::new(
                E2BIG,
                format!("{item_count} items exceed capacity {}", self.capacity),
            ));
        }

        let input_row = frame_count * self.input_width;
        let output_row = frame_count * self.output_width;
        if input.len() != item_count * input_row {
            return Err(Self::invalid(format!(
                "input holds {} values, expected {}",
                input.len(),
                item_count * input_row
            )));
        }
        if declared_bytes != input.len() * BYTES_PER_VALUE {
            return Err(Self::invalid(format!(
                "declared {declared_bytes} bytes for {} input bytes",
                input.len() * BYTES_PER_VALUE
            )));
        }
        if output.len() != item_count * output_row {
            return Err(Self::invalid(format!(
                "output holds {} values, expected {}",
                output.len(),
                item_count * output_row
            )));
        }

        for item in 0..item_count {
            Self::transform_row(
                &input[item * input_row..(item + 1) * input_row],
                &mut output[item * output_row..(item + 1) * output_row],
                frame_count,
                self.input_width,
                self.output_width,
            );
        }
        Ok(())
    }
}

/// # EmulatedFactory
///
/// Opens one [`EmulatedAccelerator`] per configured capacity; device id `i`
/// gets `capacities[i]`.
///
/// ```
/// use teppan::accelerator::{AcceleratorFactory, EmulatedFactory};
///
/// let factory = EmulatedFactory::new(vec![4, 2], 224, 300);
/// let handle = factory.create("openie", 1).unwrap();
/// assert_eq!(handle.batch(), 2);
/// assert!(factory.create("openie", 2).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EmulatedFactory {
    capacities: Vec<usize>,
    input_width: usize,
    output_width: usize,
    latency: Option<Duration>,
    fail_at: Option<usize>,
    offline: Vec<usize>,
    log: Arc<CallLog>,
}

impl EmulatedFactory {
    pub fn new(capacities: Vec<usize>, input_width: usize, output_width: usize) -> Self {
        Self {
            capacities,
            input_width,
            output_width,
            latency: None,
            fail_at: None,
            offline: vec![],
            log: Arc::new(CallLog::default()),
        }
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The call at position `call_index` of the shared log fails with a
    /// driver fault, whichever engine it lands on.
    pub fn with_fault_at(mut self, call_index: usize) -> Self {
        self.fail_at = Some(call_index);
        self
    }

    /// Opening `device_id` fails as if the device were absent.
    pub fn with_offline(mut self, device_id: usize) -> Self {
        self.offline.push(device_id);
        self
    }

    pub fn log(&self) -> Arc<CallLog> {
        self.log.clone()
    }
}

impl AcceleratorFactory for EmulatedFactory {
    fn create(&self, workload: &str, device_id: usize) -> Result<Box<dyn AcceleratorHandle>, OpenError> {
        if workload.is_empty() {
            return Err("empty workload name".into());
        }
        let Some(&capacity) = self.capacities.get(device_id) else {
            return Err(format!("no device with id {device_id}").into());
        };
        if self.offline.contains(&device_id) {
            return Err(format!("device {device_id} is offline").into());
        }
        Ok(Box::new(EmulatedAccelerator {
            device_id,
            capacity,
            input_width: self.input_width,
            output_width: self.output_width,
            latency: self.latency,
            fail_at: self.fail_at,
            log: self.log.clone(),
        }))
    }
}
