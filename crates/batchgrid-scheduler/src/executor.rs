//! Dispatch executor — hands a DispatchSet to the sink.
//!
//! Every `Dispatch` becomes a `DispatchCommand` addressed to its node with a
//! JSON payload. A command the sink rejects is recorded and the rest still
//! go out; there is no rollback of commands already sent.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use batchgrid_core::{NodeId, OperationKind, TargetId};
use batchgrid_placement::{Dispatch, DispatchSet};
use batchgrid_planner::PhaseRole;

use crate::error::SchedulerResult;
use crate::providers::DispatchSink;

/// A command for one worker node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchCommand {
    pub node_id: NodeId,
    pub operation: OperationKind,
    pub payload: String,
}

/// Payload carried by a [`DispatchCommand`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchPayload {
    pub target_id: TargetId,
    pub role: PhaseRole,
    pub threads: u32,
    pub start_delay_ms: f64,
}

impl DispatchCommand {
    pub fn encode(dispatch: &Dispatch) -> SchedulerResult<Self> {
        let payload = DispatchPayload {
            target_id: dispatch.target_id.clone(),
            role: dispatch.role,
            threads: dispatch.thread_count,
            start_delay_ms: dispatch.start_delay_ms,
        };
        Ok(Self {
            node_id: dispatch.node_id.clone(),
            operation: dispatch.operation,
            payload: serde_json::to_string(&payload)?,
        })
    }

    pub fn decode_payload(&self) -> SchedulerResult<DispatchPayload> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// A dispatch that did not reach its node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub node_id: NodeId,
    pub target_id: TargetId,
    pub reason: String,
}

/// Result of executing a dispatch set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub sent: usize,
    pub threads_sent: u64,
    pub failures: Vec<DispatchFailure>,
}

/// Send every dispatch in `set` to `sink`, in order.
pub fn execute<S: DispatchSink + ?Sized>(set: &DispatchSet, sink: &mut S) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for dispatch in &set.dispatches {
        let result = DispatchCommand::encode(dispatch).and_then(|cmd| sink.dispatch(&cmd));
        match result {
            Ok(()) => {
                report.sent += 1;
                report.threads_sent += u64::from(dispatch.thread_count);
                debug!(
                    target = %dispatch.target_id,
                    node = %dispatch.node_id,
                    role = %dispatch.role,
                    threads = dispatch.thread_count,
                    delay_ms = dispatch.start_delay_ms,
                    "dispatched"
                );
            }
            Err(e) => {
                warn!(
                    target = %dispatch.target_id,
                    node = %dispatch.node_id,
                    role = %dispatch.role,
                    error = %e,
                    "dispatch failed"
                );
                report.failures.push(DispatchFailure {
                    node_id: dispatch.node_id.clone(),
                    target_id: dispatch.target_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if !set.dispatches.is_empty() {
        info!(
            sent = report.sent,
            threads = report.threads_sent,
            failed = report.failures.len(),
            "dispatch set executed"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;

    #[derive(Default)]
    struct RecordingSink {
        received: Vec<DispatchCommand>,
        down: Option<String>,
    }

    impl DispatchSink for RecordingSink {
        fn dispatch(&mut self, command: &DispatchCommand) -> SchedulerResult<()> {
            if self.down.as_deref() == Some(command.node_id.as_str()) {
                return Err(SchedulerError::Dispatch {
                    node: command.node_id.clone(),
                    reason: "unreachable".to_string(),
                });
            }
            self.received.push(command.clone());
            Ok(())
        }
    }

    fn dispatch(node: &str, role: PhaseRole, threads: u32, delay: f64) -> Dispatch {
        Dispatch {
            node_id: node.to_string(),
            target_id: "alpha".to_string(),
            role,
            operation: role.operation(),
            thread_count: threads,
            start_delay_ms: delay,
        }
    }

    fn set(dispatches: Vec<Dispatch>) -> DispatchSet {
        DispatchSet {
            dispatches,
            reports: Vec::new(),
        }
    }

    #[test]
    fn payload_carries_threads_and_delay() {
        let cmd = DispatchCommand::encode(&dispatch("w-0", PhaseRole::Restore, 31, 1_200.0)).unwrap();
        assert_eq!(cmd.node_id, "w-0");
        assert_eq!(cmd.operation, OperationKind::Restore);

        let payload = cmd.decode_payload().unwrap();
        assert_eq!(payload.target_id, "alpha");
        assert_eq!(payload.role, PhaseRole::Restore);
        assert_eq!(payload.threads, 31);
        assert_eq!(payload.start_delay_ms, 1_200.0);
    }

    #[test]
    fn payload_delay_survives_encoding_bit_for_bit() {
        let delay: f64 = 2_979.976_299_999_999_8;
        let cmd = DispatchCommand::encode(&dispatch("w-0", PhaseRole::Restore, 1, delay)).unwrap();
        let payload = cmd.decode_payload().unwrap();
        assert_eq!(payload.start_delay_ms.to_bits(), delay.to_bits());
    }

    #[test]
    fn malformed_payload_is_a_payload_error() {
        let cmd = DispatchCommand {
            node_id: "w-0".to_string(),
            operation: OperationKind::Extract,
            payload: "{not json".to_string(),
        };
        assert!(matches!(cmd.decode_payload(), Err(SchedulerError::Payload(_))));
    }

    #[test]
    fn executes_in_order() {
        let mut sink = RecordingSink::default();
        let report = execute(
            &set(vec![
                dispatch("w-0", PhaseRole::Extract, 50, 0.0),
                dispatch("w-0", PhaseRole::CorrectPrimary, 3, 3_100.0),
            ]),
            &mut sink,
        );

        assert_eq!(report.sent, 2);
        assert_eq!(report.threads_sent, 53);
        assert!(report.failures.is_empty());
        assert_eq!(sink.received[0].operation, OperationKind::Extract);
        assert_eq!(sink.received[1].operation, OperationKind::Correct);
    }

    #[test]
    fn failure_does_not_stop_remaining_dispatches() {
        let mut sink = RecordingSink {
            down: Some("w-0".to_string()),
            ..RecordingSink::default()
        };
        let report = execute(
            &set(vec![
                dispatch("w-0", PhaseRole::CorrectPrimary, 10, 0.0),
                dispatch("w-1", PhaseRole::CorrectPrimary, 5, 0.0),
            ]),
            &mut sink,
        );

        assert_eq!(report.sent, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node_id, "w-0");
        assert_eq!(sink.received.len(), 1);
        assert_eq!(sink.received[0].node_id, "w-1");
    }

    #[test]
    fn empty_set_sends_nothing() {
        let mut sink = RecordingSink::default();
        let report = execute(&DispatchSet::default(), &mut sink);
        assert_eq!(report, ExecutionReport::default());
    }
}
