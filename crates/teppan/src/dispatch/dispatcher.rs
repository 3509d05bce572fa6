use std::sync::Arc;
use std::time::Duration;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, error, Instrument};
use uuid::Uuid;
use crate::config::{DispatchConfig, LayoutConfig};
use crate::error::{DispatchError, Result};
use crate::pool::AcceleratorPool;
use crate::tensor::{FixedPointBuffer, OutputBlock};
use super::plan::{Assignment, DispatchPlan};

/// How the calls of one dispatch round are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundMode {
    /// One call at a time, each awaited before the next is issued
    #[default]
    Sequential,

    /// All calls of a round in flight together, joined before the next round.
    /// Only sound when the engines are independent devices.
    Concurrent,
}

/// # BatchDispatcher
///
/// Drives a fixed point batch through an [`AcceleratorPool`].
///
/// Each dispatch builds a fresh [`DispatchPlan`], hands every assignment a
/// borrowed window of the input rows and the matching window of the output
/// block, and checks afterwards that every row was written exactly once.
/// Row `i` of the output always belongs to row `i` of the input, whichever
/// engine processed it.
///
/// Errors are never downgraded: the first failing or timed out call aborts
/// the dispatch and no further calls are issued.
pub struct BatchDispatcher {
    pool: Arc<AcceleratorPool>,
    output_width: usize,
    call_timeout: Option<Duration>,
    round_mode: RoundMode,
}

impl BatchDispatcher {
    /// Creates a sequential dispatcher without call timeout.
    pub fn new(pool: Arc<AcceleratorPool>, output_width: usize) -> Self {
        Self {
            pool,
            output_width,
            call_timeout: None,
            round_mode: RoundMode::Sequential,
        }
    }

    pub fn from_config(pool: Arc<AcceleratorPool>, layout: &LayoutConfig, config: &DispatchConfig) -> Self {
        let dispatcher = Self::new(pool, layout.output_width).with_round_mode(config.round_mode);
        match config.call_timeout() {
            Some(limit) => dispatcher.with_call_timeout(limit),
            None => dispatcher,
        }
    }

    /// Bounds every hardware call; expiry fails the dispatch with
    /// [`DispatchError::DeviceTimeout`].
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    pub fn with_round_mode(mut self, mode: RoundMode) -> Self {
        self.round_mode = mode;
        self
    }

    pub fn pool(&self) -> &AcceleratorPool {
        &self.pool
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// The plan a batch of `flow_batch` rows would be dispatched with.
    pub fn plan(&self, flow_batch: usize) -> Result<DispatchPlan> {
        let plan = DispatchPlan::build(self.pool.capacities(), flow_batch)?;
        plan.validate(self.pool.capacities())?;
        Ok(plan)
    }

    /// Dispatches `input` and returns a freshly allocated output block of
    /// shape `(batch, frames, output_width)`.
    pub async fn dispatch(&self, input: &FixedPointBuffer) -> Result<OutputBlock> {
        let mut output = OutputBlock::zeros(input.batch(), input.frames(), self.output_width);
        self.dispatch_into(input, &mut output).await?;
        Ok(output)
    }

    /// Dispatches `input` into a caller owned block.
    ///
    /// On error the block keeps whatever rows were written before the failing
    /// call; the remaining rows are left untouched.
    pub async fn dispatch_into(&self, input: &FixedPointBuffer, output: &mut OutputBlock) -> Result<()> {
        let expected = [input.batch(), input.frames(), self.output_width];
        if output.shape() != expected {
            return Err(DispatchError::Shape(format!(
                "output block {:?} does not match {expected:?}",
                output.shape()
            )));
        }

        let flow_batch = input.batch();
        let plan = self.plan(flow_batch)?;
        let span = debug_span!(
            "dispatch",
            dispatch_id = %Uuid::new_v4(),
            flow_batch,
            frames = input.frames(),
            rounds = plan.round_count(),
        );

        let written = match self.round_mode {
            RoundMode::Sequential => self.run_sequential(&plan, input, output).instrument(span).await?,
            RoundMode::Concurrent => self.run_concurrent(&plan, input, output).instrument(span).await?,
        };

        if written != flow_batch {
            error!(flow_batch, written, "dispatch left rows unwritten");
            return Err(DispatchError::DispatchConsistency { expected: flow_batch, written });
        }
        Ok(())
    }

    async fn run_sequential(
        &self,
        plan: &DispatchPlan,
        input: &FixedPointBuffer,
        output: &mut OutputBlock,
    ) -> Result<usize> {
        let mut written = 0;
        for assignment in plan.assignments() {
            self.call(
                *assignment,
                input,
                output.rows_mut(assignment.start, assignment.count),
            ).await?;
            written += assignment.count;
        }
        Ok(written)
    }

    async fn run_concurrent(
        &self,
        plan: &DispatchPlan,
        input: &FixedPointBuffer,
        output: &mut OutputBlock,
    ) -> Result<usize> {
        let row_len = output.row_len();
        let mut written = 0;
        for round in plan.rounds() {
            let (Some(first), Some(last)) = (round.first(), round.last()) else {
                continue;
            };
            // a round covers one contiguous range; carve it into disjoint windows
            let mut rest = output.rows_mut(first.start, last.end() - first.start);
            let mut calls = Vec::with_capacity(round.len());
            for assignment in round {
                let (window, tail) = std::mem::take(&mut rest).split_at_mut(assignment.count * row_len);
                rest = tail;
                calls.push(self.call(*assignment, input, window));
            }
            try_join_all(calls).await?;
            written += last.end() - first.start;
        }
        Ok(written)
    }

    async fn call(&self, assignment: Assignment, input: &FixedPointBuffer, output: &mut [i16]) -> Result<()> {
        let Assignment { handle: index, start, count, .. } = assignment;
        let declared_bytes = input.item_bytes() * count;
        let handle = self.pool.handle(index).lock().await;

        debug!(handle = index, start, count, declared_bytes, "issuing accelerator call");
        let run = handle.run(input.rows(start, count), declared_bytes, output, input.frames(), count);
        let outcome = match self.call_timeout {
            None => run.await,
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(handle = index, start, count, ?limit, "accelerator call timed out");
                    return Err(DispatchError::DeviceTimeout {
                        handle: index,
                        start,
                        end: assignment.end(),
                        timeout: limit,
                    });
                }
            },
        };

        outcome.map_err(|source| {
            error!(handle = index, start, count, error = %source, "accelerator call failed");
            DispatchError::DeviceRun {
                handle: index,
                start,
                end: assignment.end(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::{CallRecord, EmulatedAccelerator, EmulatedFactory};
    use proptest::prelude::*;

    const IN_W: usize = 3;
    const OUT_W: usize = 4;

    fn pool(factory: &EmulatedFactory, instances: usize) -> Arc<AcceleratorPool> {
        Arc::new(AcceleratorPool::create(factory, "openie", instances).unwrap())
    }

    /// Row `r` holds values derived from `r` so misplaced rows are visible.
    fn input(batch: usize, frames: usize) -> FixedPointBuffer {
        let data = (0..batch * frames * IN_W)
            .map(|v| (v as i16).wrapping_mul(7))
            .collect();
        FixedPointBuffer::from_vec(batch, frames, IN_W, data).unwrap()
    }

    fn expected_row(input: &FixedPointBuffer, row: usize) -> Vec<i16> {
        let mut out = vec![0; input.frames() * OUT_W];
        EmulatedAccelerator::transform_row(input.row(row), &mut out, input.frames(), IN_W, OUT_W);
        out
    }

    fn item_counts(records: &[CallRecord]) -> Vec<(usize, usize)> {
        records.iter().map(|r| (r.device_id, r.item_count)).collect()
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let factory = EmulatedFactory::new(vec![4, 2], IN_W, OUT_W);
        let dispatcher = BatchDispatcher::new(pool(&factory, 2), OUT_W);

        let output = dispatcher.dispatch(&input(0, 5)).await.unwrap();

        assert_eq!(output.shape(), [0, 5, OUT_W]);
        assert!(factory.log().is_empty());
    }

    #[tokio::test]
    async fn test_full_round_plus_tail() {
        let factory = EmulatedFactory::new(vec![4, 2], IN_W, OUT_W);
        let dispatcher = BatchDispatcher::new(pool(&factory, 2), OUT_W);
        let batch = input(7, 2);

        let output = dispatcher.dispatch(&batch).await.unwrap();

        let records = factory.log().records();
        assert_eq!(item_counts(&records), vec![(0, 4), (1, 2), (0, 1)]);
        assert_eq!(records[0].declared_bytes, 4 * 2 * IN_W * 2);
        assert_eq!(records[2].frame_count, 2);
        for row in 0..7 {
            assert_eq!(output.row(row), expected_row(&batch, row).as_slice());
        }
    }

    #[tokio::test]
    async fn test_remainder_goes_to_second_handle() {
        let factory = EmulatedFactory::new(vec![4, 2], IN_W, OUT_W);
        let dispatcher = BatchDispatcher::new(pool(&factory, 2), OUT_W);

        dispatcher.dispatch(&input(5, 1)).await.unwrap();

        assert_eq!(item_counts(&factory.log().records()), vec![(0, 4), (1, 1)]);
    }

    #[tokio::test]
    async fn test_exactly_total_capacity() {
        let factory = EmulatedFactory::new(vec![4, 2], IN_W, OUT_W);
        let dispatcher = BatchDispatcher::new(pool(&factory, 2), OUT_W);

        dispatcher.dispatch(&input(6, 1)).await.unwrap();

        assert_eq!(item_counts(&factory.log().records()), vec![(0, 4), (1, 2)]);
    }

    #[tokio::test]
    async fn test_fault_aborts_and_keeps_partial_rows() {
        // calls: h0 rows 0..4, h1 rows 4..6, h0 rows 6..10 <- fails, h1 never called again
        let factory = EmulatedFactory::new(vec![4, 2], IN_W, OUT_W).with_fault_at(2);
        let dispatcher = BatchDispatcher::new(pool(&factory, 2), OUT_W);
        let batch = input(12, 1);
        let mut output = OutputBlock::zeros(12, 1, OUT_W);

        let err = dispatcher.dispatch_into(&batch, &mut output).await.unwrap_err();

        match err {
            DispatchError::DeviceRun { handle, start, end, source } => {
                assert_eq!((handle, start, end), (0, 6, 10));
                assert!(source.message.contains("injected fault"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(factory.log().len(), 3);
        for row in 0..6 {
            assert_eq!(output.row(row), expected_row(&batch, row).as_slice());
        }
        for row in 6..12 {
            assert!(output.row(row).iter().all(|&v| v == 0));
        }
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let factory = EmulatedFactory::new(vec![2], IN_W, OUT_W)
            .with_latency(Duration::from_millis(500));
        let dispatcher = BatchDispatcher::new(pool(&factory, 1), OUT_W)
            .with_call_timeout(Duration::from_millis(20));

        let err = dispatcher.dispatch(&input(3, 1)).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::DeviceTimeout { handle: 0, start: 0, end: 2, .. }
        ));
        assert_eq!(factory.log().len(), 1);
    }

    #[tokio::test]
    async fn test_output_shape_checked() {
        let factory = EmulatedFactory::new(vec![2], IN_W, OUT_W);
        let dispatcher = BatchDispatcher::new(pool(&factory, 1), OUT_W);
        let mut output = OutputBlock::zeros(2, 1, OUT_W + 1);

        let err = dispatcher.dispatch_into(&input(2, 1), &mut output).await.unwrap_err();

        assert!(matches!(err, DispatchError::Shape(_)));
        assert!(factory.log().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_rounds_match_sequential() {
        let factory = EmulatedFactory::new(vec![3, 2, 1], IN_W, OUT_W)
            .with_latency(Duration::from_millis(5));
        let shared = pool(&factory, 3);
        let sequential = BatchDispatcher::new(shared.clone(), OUT_W);
        let concurrent = BatchDispatcher::new(shared, OUT_W).with_round_mode(RoundMode::Concurrent);
        let batch = input(17, 3);

        let expected = sequential.dispatch(&batch).await.unwrap();
        let actual = concurrent.dispatch(&batch).await.unwrap();

        assert_eq!(expected, actual);
        assert_eq!(factory.log().len(), 2 * concurrent.plan(17).unwrap().len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shared_pool_serves_parallel_dispatches() {
        let factory = EmulatedFactory::new(vec![2, 2], IN_W, OUT_W)
            .with_latency(Duration::from_millis(2));
        let dispatcher = Arc::new(BatchDispatcher::new(pool(&factory, 2), OUT_W));

        let handles = (0..4).map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let batch = input(9, 2);
                let output = dispatcher.dispatch(&batch).await.unwrap();
                (0..9).all(|row| output.row(row) == expected_row(&batch, row).as_slice())
            })
        }).collect::<Vec<_>>();

        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap());
        }
    }

    #[test]
    fn test_from_config() {
        let factory = EmulatedFactory::new(vec![1], IN_W, OUT_W);
        let layout = LayoutConfig { model_input_width: 2, hardware_pad_channels: 1, output_width: OUT_W };
        let config = DispatchConfig {
            call_timeout_ms: Some(50),
            round_mode: RoundMode::Concurrent,
            ..Default::default()
        };
        let dispatcher = BatchDispatcher::from_config(pool(&factory, 1), &layout, &config);

        assert_eq!(dispatcher.output_width(), OUT_W);
        assert_eq!(dispatcher.call_timeout, Some(Duration::from_millis(50)));
        assert_eq!(dispatcher.round_mode, RoundMode::Concurrent);
        assert_eq!(dispatcher.pool().capacities(), &[1]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: a row comes out the same whether it is dispatched alone
        /// or inside a full batch
        #[test]
        fn prop_row_matches_single_row_dispatch(
            capacities in prop::collection::vec(1usize..=5, 1..=3),
            flow_batch in 1usize..=24,
            frames in 1usize..=3,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let factory = EmulatedFactory::new(capacities.clone(), IN_W, OUT_W);
            let dispatcher = BatchDispatcher::new(pool(&factory, capacities.len()), OUT_W);
            let batch = input(flow_batch, frames);

            let full = runtime.block_on(dispatcher.dispatch(&batch)).unwrap();
            for row in 0..flow_batch {
                let single = FixedPointBuffer::from_vec(1, frames, IN_W, batch.row(row).to_vec()).unwrap();
                let alone = runtime.block_on(dispatcher.dispatch(&single)).unwrap();
                prop_assert_eq!(full.row(row), alone.row(0));
            }
        }
    }
}
