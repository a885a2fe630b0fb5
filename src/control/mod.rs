//! Control Channel Module
//!
//! Message boundary between an invoking context and the fill worker.
//!
//! ## Messages
//! - Inbound: `{"stringArraySize": N}` starts a fill to `N` records
//! - Outbound: zero or more `checkProgress` events, then `done` or `failed`
//!
//! ```text
//! ┌──────────────┐   ControlMessage    ┌──────────────┐
//! │   invoker    │ ──────────────────► │    worker    │
//! │ (UI, CLI...) │ ◄────────────────── │  (thread)    │
//! └──────────────┘    WorkerEvent      └──────────────┘
//! ```

mod worker;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StringDbError};
use crate::filler::{FillProgress, FillReport};

pub use worker::{Worker, WorkerHandle};

/// Commands accepted by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Fill the store up to `target` records
    Start { target: u64 },
    /// Stop the worker after the current fill
    Shutdown,
}

/// Events emitted by the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WorkerEvent {
    /// User-visible message (unsupported environment, outdated store)
    Notice { message: String },
    /// One batch acknowledged
    #[serde(rename = "checkProgress")]
    Progress(FillProgress),
    /// Fill reached its target
    Done(FillReport),
    /// Fill stopped with an error
    Failed { error: String },
}

/// Start command as it arrives on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct StartCommand {
    #[serde(rename = "stringArraySize")]
    pub string_array_size: serde_json::Number,
}

impl StartCommand {
    /// Parse one JSON start command and validate its target
    pub fn parse(json: &str) -> Result<ControlMessage> {
        let command: StartCommand = serde_json::from_str(json)
            .map_err(|e| StringDbError::Protocol(format!("invalid start command: {}", e)))?;
        let target = FillTarget::try_from(&command.string_array_size)?;
        Ok(ControlMessage::Start { target: target.get() })
    }
}

/// A validated, non-negative whole-number target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FillTarget(u64);

impl FillTarget {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<&serde_json::Number> for FillTarget {
    type Error = StringDbError;

    fn try_from(n: &serde_json::Number) -> Result<Self> {
        if let Some(v) = n.as_u64() {
            return Ok(FillTarget(v));
        }
        if n.as_i64().is_some() {
            return Err(StringDbError::InvalidTarget(format!("{} is negative", n)));
        }
        match n.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => {
                Ok(FillTarget(f as u64))
            }
            _ => Err(StringDbError::InvalidTarget(format!(
                "{} is not a non-negative whole number",
                n
            ))),
        }
    }
}

impl TryFrom<i64> for FillTarget {
    type Error = StringDbError;

    fn try_from(v: i64) -> Result<Self> {
        u64::try_from(v)
            .map(FillTarget)
            .map_err(|_| StringDbError::InvalidTarget(format!("{} is negative", v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_command() {
        let msg = StartCommand::parse(r#"{"stringArraySize": 1003}"#).unwrap();
        assert_eq!(msg, ControlMessage::Start { target: 1003 });
    }

    #[test]
    fn test_whole_float_accepted() {
        let msg = StartCommand::parse(r#"{"stringArraySize": 5.0}"#).unwrap();
        assert_eq!(msg, ControlMessage::Start { target: 5 });
    }

    #[test]
    fn test_negative_and_fractional_rejected() {
        for json in [r#"{"stringArraySize": -1}"#, r#"{"stringArraySize": 2.5}"#] {
            let err = StartCommand::parse(json).unwrap_err();
            assert!(matches!(err, StringDbError::InvalidTarget(_)), "{json}");
        }
        assert!(FillTarget::try_from(-3i64).is_err());
    }

    #[test]
    fn test_target_beyond_u64_rejected() {
        // 2^64 parses as a float equal to u64::MAX as f64
        let err = StartCommand::parse(r#"{"stringArraySize": 18446744073709551616}"#).unwrap_err();
        assert!(matches!(err, StringDbError::InvalidTarget(_)));
    }

    #[test]
    fn test_malformed_command_is_protocol_error() {
        let err = StartCommand::parse(r#"{"size": 5}"#).unwrap_err();
        assert!(matches!(err, StringDbError::Protocol(_)));
    }

    #[test]
    fn test_progress_event_wire_name() {
        let event = WorkerEvent::Progress(FillProgress {
            target: 10,
            inserted: 5,
            deficit: 10,
            batches_done: 1,
            batches_total: 2,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "checkProgress");
        assert_eq!(json["inserted"], 5);
    }
}
