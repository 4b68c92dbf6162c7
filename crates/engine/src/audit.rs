// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort audit sink consumed by the command pipeline.
//!
//! Implementations must never block the caller; the gateway's default
//! writes structured records to the log stream and real deployments
//! substitute a persistent sink.

use serde_json::Value;

/// Records security-relevant actions. Best effort: failures are the
/// sink's problem, never the caller's.
pub trait AuditSink: Send + Sync {
    fn log(
        &self,
        action: &str,
        user_id: Option<u32>,
        client_ip: Option<&str>,
        resource: &str,
        meta: Value,
    );
}

/// Audit sink that emits structured tracing records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn log(
        &self,
        action: &str,
        user_id: Option<u32>,
        client_ip: Option<&str>,
        resource: &str,
        meta: Value,
    ) {
        tracing::info!(
            target: "audit",
            action,
            user_id,
            client_ip,
            resource,
            meta = %meta,
            "audit"
        );
    }
}

/// Audit sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn log(&self, _: &str, _: Option<u32>, _: Option<&str>, _: &str, _: Value) {}
}

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::AuditSink;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;

    /// Recorded audit call.
    #[derive(Debug, Clone)]
    pub struct AuditCall {
        pub action: String,
        pub user_id: Option<u32>,
        pub client_ip: Option<String>,
        pub resource: String,
        pub meta: Value,
    }

    /// Audit sink that records calls for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingAudit {
        calls: Arc<Mutex<Vec<AuditCall>>>,
    }

    impl RecordingAudit {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<AuditCall> {
            self.calls.lock().clone()
        }
    }

    impl AuditSink for RecordingAudit {
        fn log(
            &self,
            action: &str,
            user_id: Option<u32>,
            client_ip: Option<&str>,
            resource: &str,
            meta: Value,
        ) {
            self.calls.lock().push(AuditCall {
                action: action.to_string(),
                user_id,
                client_ip: client_ip.map(str::to_string),
                resource: resource.to_string(),
                meta,
            });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::{AuditCall, RecordingAudit};
