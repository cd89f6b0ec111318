//! Submitting calldata through the relay and following the resulting task.

use std::time::Duration;

use ethers::types::{Address, Bytes};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zkgm_common::Settings;

use crate::{
    client::{GelatoRelay, RelayApi, RelayRequest},
    error::{RelayError, Result},
    task::{RelayTask, TaskState},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How a polling loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The task reached `ExecSuccess`, `ExecReverted` or `Cancelled`.
    Terminal(RelayTask),
    /// The caller cancelled before the task settled.
    Cancelled,
}

/// Client that relays proofs and polls their tasks to completion.
#[derive(Clone, Debug)]
pub struct ProofSubmissionClient<R = GelatoRelay> {
    relay: R,
    chain_id: u64,
    fee_token: Address,
    poll_interval: Duration,
}

impl ProofSubmissionClient<GelatoRelay> {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let relay = GelatoRelay::new(settings.relay.base_url.clone())
            .with_api_key(settings.relay.api_key.clone());
        let fee_token = parse_address(&settings.relay.fee_token)?;
        Ok(Self::new(relay, settings.chain.chain_id, fee_token)
            .with_poll_interval(Duration::from_millis(settings.relay.poll_interval_ms)))
    }
}

impl<R: RelayApi> ProofSubmissionClient<R> {
    pub fn new(relay: R, chain_id: u64, fee_token: Address) -> Self {
        Self {
            relay,
            chain_id,
            fee_token,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Zero is bumped to one millisecond; tokio intervals need a period.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Relay `calldata` to `target`; returns the task id to poll.
    pub async fn submit(&self, target: Address, calldata: Bytes) -> Result<String> {
        let request = RelayRequest {
            chain_id: self.chain_id,
            target,
            data: calldata,
            fee_token: self.fee_token,
        };
        let task_id = self.relay.submit(&request).await?;
        info!("Relay accepted submission as task {}", task_id);
        Ok(task_id)
    }

    /// Poll `task_id` on a fixed interval until it settles or `cancel` fires.
    ///
    /// `observer` sees every status read, terminal or not. A failed status
    /// query ends polling with [`RelayError::StatusCheckFailed`]; a cancelled
    /// poll cannot be resumed.
    pub async fn poll_status<F>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        mut observer: F,
    ) -> Result<PollOutcome>
    where
        F: FnMut(&RelayTask),
    {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Polling of task {} cancelled", task_id);
                    return Ok(PollOutcome::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Polling of task {} cancelled", task_id);
                    return Ok(PollOutcome::Cancelled);
                }
                status = self.relay.task_status(task_id) => status,
            };

            let status = status.map_err(|e| {
                warn!("Status check for task {} failed: {}", task_id, e);
                RelayError::StatusCheckFailed {
                    task_id: task_id.to_string(),
                    reason: e.to_string(),
                }
            })?;

            let task = RelayTask::new(task_id, status);
            if let TaskState::Unknown(raw) = &task.state {
                warn!("Task {} reported unknown state {}", task_id, raw);
            }
            debug!("Task {}: {}", task_id, task.status_message());
            observer(&task);

            if task.is_terminal() {
                match &task.state {
                    TaskState::ExecSuccess => info!(
                        "Task {} executed in {}",
                        task_id,
                        task.transaction_hash.as_deref().unwrap_or("unknown transaction")
                    ),
                    state => warn!(
                        "Task {} ended as {}: {}",
                        task_id,
                        state,
                        task.last_message.as_deref().unwrap_or("no message")
                    ),
                }
                return Ok(PollOutcome::Terminal(task));
            }
        }
    }
}

pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|_| RelayError::InvalidAddress(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a scripted sequence of status reads.
    struct ScriptedRelay {
        statuses: Mutex<Vec<Result<TaskStatus>>>,
        reads: Mutex<usize>,
    }

    impl ScriptedRelay {
        fn new(states: Vec<Result<TaskStatus>>) -> Self {
            let mut statuses = states;
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                reads: Mutex::new(0),
            }
        }

        fn reads(&self) -> usize {
            *self.reads.lock().unwrap()
        }
    }

    #[async_trait]
    impl RelayApi for ScriptedRelay {
        async fn submit(&self, _request: &RelayRequest) -> Result<String> {
            Ok("0xtask".into())
        }

        async fn task_status(&self, _task_id: &str) -> Result<TaskStatus> {
            *self.reads.lock().unwrap() += 1;
            self.statuses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(status(TaskState::CheckPending, None)))
        }
    }

    fn status(task_state: TaskState, tx: Option<&str>) -> TaskStatus {
        TaskStatus {
            task_state,
            transaction_hash: tx.map(str::to_string),
            last_check_message: None,
        }
    }

    fn client(relay: &ScriptedRelay) -> ProofSubmissionClient<&ScriptedRelay> {
        ProofSubmissionClient::new(relay, 80002, Address::zero())
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_terminal_state() {
        let relay = ScriptedRelay::new(vec![
            Ok(status(TaskState::CheckPending, None)),
            Ok(status(TaskState::WaitingForConfirmation, Some("0x01"))),
            Ok(status(TaskState::ExecSuccess, Some("0x01"))),
            Ok(status(TaskState::CheckPending, None)),
        ]);
        let mut seen = Vec::new();
        let outcome = client(&relay)
            .poll_status("0xtask", &CancellationToken::new(), |task| {
                seen.push(task.status_message())
            })
            .await
            .unwrap();

        match outcome {
            PollOutcome::Terminal(task) => {
                assert_eq!(task.state, TaskState::ExecSuccess);
                assert_eq!(task.transaction_hash.as_deref(), Some("0x01"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(relay.reads(), 3);
        assert_eq!(
            seen,
            vec![
                "Verifying Submission...",
                "Submission approved. Waiting for confirmations...",
                "Verification successful!"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_task_stops_immediately() {
        let relay = ScriptedRelay::new(vec![Ok(status(TaskState::ExecReverted, None))]);
        let started = Instant::now();
        let outcome = client(&relay)
            .poll_status("0xtask", &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            PollOutcome::Terminal(RelayTask { state: TaskState::ExecReverted, .. })
        ));
        assert_eq!(relay.reads(), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_POLL_INTERVAL && elapsed < DEFAULT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_states_keep_polling() {
        let relay = ScriptedRelay::new(vec![
            Ok(status(TaskState::Unknown("NotFound".into()), None)),
            Ok(status(TaskState::Cancelled, None)),
        ]);
        let outcome = client(&relay)
            .poll_status("0xtask", &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            PollOutcome::Terminal(RelayTask { state: TaskState::Cancelled, .. })
        ));
        assert_eq!(relay.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn status_failure_stops_polling() {
        let relay = ScriptedRelay::new(vec![
            Ok(status(TaskState::ExecPending, None)),
            Err(RelayError::Transport("connection reset".into())),
        ]);
        let result = client(&relay)
            .poll_status("0xtask", &CancellationToken::new(), |_| {})
            .await;
        match result {
            Err(RelayError::StatusCheckFailed { task_id, reason }) => {
                assert_eq!(task_id, "0xtask");
                assert!(reason.contains("connection reset"));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(relay.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_polling() {
        let relay = ScriptedRelay::new(vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let outcome = client(&relay)
            .poll_status("0xtask", &cancel, |_| {})
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(relay.reads(), 3);
    }

    #[tokio::test]
    async fn already_cancelled_token_never_polls() {
        let relay = ScriptedRelay::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = client(&relay).poll_status("0xtask", &cancel, |_| {}).await.unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(relay.reads(), 0);
    }

    #[test]
    fn settings_configure_the_client() {
        let mut settings = Settings::default();
        settings.relay.poll_interval_ms = 250;
        let client = ProofSubmissionClient::from_settings(&settings).unwrap();
        assert_eq!(client.poll_interval(), Duration::from_millis(250));
        assert_eq!(client.relay().base_url(), "https://api.gelato.digital");

        settings.relay.fee_token = "nope".into();
        assert!(matches!(
            ProofSubmissionClient::from_settings(&settings),
            Err(RelayError::InvalidAddress(_))
        ));
    }
}
