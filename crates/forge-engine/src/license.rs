//! License resolution and worker admission.
//!
//! The license is resolved once per process (environment, then file, then
//! the free default), cached, and never refetched. Enforcement is explicit
//! and explainable: a worker is either admitted or refused with a record
//! naming current/max. No silent throttling.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use forge_models::{FailureTag, License, LicenseTier};

use crate::error::{EngineError, EngineResult};

/// Environment override for the license tier.
pub const LICENSE_TYPE_ENV: &str = "FORGE_LICENSE_TYPE";

/// Environment variable pointing at a JSON license file.
pub const LICENSE_FILE_ENV: &str = "FORGE_LICENSE_FILE";

static LICENSE: OnceLock<License> = OnceLock::new();

/// Resolve the process license: environment, then file, then default Free.
pub fn resolve_license() -> &'static License {
    LICENSE.get_or_init(|| {
        if let Ok(tier) = std::env::var(LICENSE_TYPE_ENV) {
            let license = License::from_tier_name(&tier);
            info!("license resolved from environment: {license}");
            return license;
        }

        if let Ok(path) = std::env::var(LICENSE_FILE_ENV) {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<License>(&contents) {
                    Ok(license) => {
                        info!("license resolved from file {path}: {license}");
                        return license;
                    }
                    Err(err) => warn!("license file {path} is invalid ({err}); using default"),
                },
                Err(err) => warn!("license file {path} unreadable ({err}); using default"),
            }
        }

        let license = License::default_free();
        info!("no license configured; {license}");
        license
    })
}

/// Record of a refused worker, kept for observability.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedWorker {
    pub worker_id: String,
    pub reason: FailureTag,
    pub rejected_at: DateTime<Utc>,
    pub license_tier: LicenseTier,
    pub current_workers: u32,
    pub max_workers: u32,
}

/// Enforces the per-license worker cap at heartbeat time.
pub struct LicenseEnforcer {
    license: License,
    active: Mutex<HashSet<String>>,
    rejected: Mutex<HashMap<String, RejectedWorker>>,
}

impl LicenseEnforcer {
    pub fn new(license: License) -> Self {
        Self {
            license,
            active: Mutex::new(HashSet::new()),
            rejected: Mutex::new(HashMap::new()),
        }
    }

    pub fn license(&self) -> &License {
        &self.license
    }

    pub fn active_count(&self) -> u32 {
        self.active.lock().expect("enforcer mutex poisoned").len() as u32
    }

    pub fn active_workers(&self) -> Vec<String> {
        let mut workers: Vec<String> = self
            .active
            .lock()
            .expect("enforcer mutex poisoned")
            .iter()
            .cloned()
            .collect();
        workers.sort_unstable();
        workers
    }

    pub fn rejected_workers(&self) -> Vec<RejectedWorker> {
        self.rejected
            .lock()
            .expect("enforcer mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Non-mutating admission check.
    pub fn can_accept(&self, worker_id: &str) -> bool {
        let active = self.active.lock().expect("enforcer mutex poisoned");
        if active.contains(worker_id) {
            return true;
        }
        match self.license.max_workers {
            None => true,
            Some(max) => (active.len() as u32) < max,
        }
    }

    /// Register a heartbeat: admit the worker or refuse it with a record.
    ///
    /// Returns true when admitted. Admission of an already-active worker is
    /// a no-op; a previously refused worker may be admitted later once room
    /// frees up.
    pub fn register_heartbeat(&self, worker_id: &str) -> bool {
        let mut active = self.active.lock().expect("enforcer mutex poisoned");
        if active.contains(worker_id) {
            return true;
        }

        let mut rejected = self.rejected.lock().expect("enforcer mutex poisoned");
        rejected.remove(worker_id);

        let admitted = match self.license.max_workers {
            None => true,
            Some(max) => (active.len() as u32) < max,
        };

        if admitted {
            active.insert(worker_id.to_string());
            info!(
                "worker {worker_id} accepted ({}/{})",
                active.len(),
                self.license
                    .max_workers
                    .map_or_else(|| "unlimited".to_string(), |m| m.to_string())
            );
            return true;
        }

        let max = self.license.max_workers.expect("limited license");
        let record = RejectedWorker {
            worker_id: worker_id.to_string(),
            reason: FailureTag::WorkerLimitExceeded,
            rejected_at: Utc::now(),
            license_tier: self.license.tier,
            current_workers: active.len() as u32,
            max_workers: max,
        };
        warn!(
            "worker {worker_id} REJECTED: worker limit reached ({}/{max}) for tier {}",
            active.len(),
            self.license.tier
        );
        rejected.insert(worker_id.to_string(), record);
        false
    }

    /// Remove a worker on clean shutdown or staleness purge.
    pub fn deregister(&self, worker_id: &str) {
        self.active
            .lock()
            .expect("enforcer mutex poisoned")
            .remove(worker_id);
        self.rejected
            .lock()
            .expect("enforcer mutex poisoned")
            .remove(worker_id);
        info!("worker {worker_id} deregistered");
    }

    pub fn is_rejected(&self, worker_id: &str) -> bool {
        self.rejected
            .lock()
            .expect("enforcer mutex poisoned")
            .contains_key(worker_id)
    }

    pub fn rejection(&self, worker_id: &str) -> Option<RejectedWorker> {
        self.rejected
            .lock()
            .expect("enforcer mutex poisoned")
            .get(worker_id)
            .cloned()
    }

    /// Admission as a hard gate, for callers that must not proceed refused.
    pub fn require_admission(&self, worker_id: &str) -> EngineResult<()> {
        if self.register_heartbeat(worker_id) {
            return Ok(());
        }
        let record = self.rejection(worker_id).expect("refusal was just recorded");
        Err(EngineError::WorkerLimitExceeded {
            tier: record.license_tier,
            current: record.current_workers,
            max: record.max_workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer(tier: LicenseTier) -> LicenseEnforcer {
        LicenseEnforcer::new(License::for_tier(tier, None))
    }

    #[test]
    fn test_freelance_admits_three_rejects_fourth() {
        let enforcer = enforcer(LicenseTier::Freelance);

        assert!(enforcer.register_heartbeat("w1"));
        assert!(enforcer.register_heartbeat("w2"));
        assert!(enforcer.register_heartbeat("w3"));
        assert!(!enforcer.register_heartbeat("w4"));

        let record = enforcer.rejection("w4").unwrap();
        assert_eq!(record.current_workers, 3);
        assert_eq!(record.max_workers, 3);
        assert_eq!(record.reason, FailureTag::WorkerLimitExceeded);
        assert_eq!(enforcer.active_count(), 3);
    }

    #[test]
    fn test_reheartbeat_is_idempotent() {
        let enforcer = enforcer(LicenseTier::Free);
        assert!(enforcer.register_heartbeat("w1"));
        assert!(enforcer.register_heartbeat("w1"));
        assert_eq!(enforcer.active_count(), 1);
    }

    #[test]
    fn test_facility_is_unlimited() {
        let enforcer = enforcer(LicenseTier::Facility);
        for i in 0..50 {
            assert!(enforcer.register_heartbeat(&format!("w{i}")));
        }
        assert_eq!(enforcer.active_count(), 50);
    }

    #[test]
    fn test_deregistration_frees_a_slot() {
        let enforcer = enforcer(LicenseTier::Free);
        assert!(enforcer.register_heartbeat("w1"));
        assert!(!enforcer.register_heartbeat("w2"));

        enforcer.deregister("w1");
        assert!(enforcer.register_heartbeat("w2"));
        assert!(!enforcer.is_rejected("w2"));
    }

    #[test]
    fn test_require_admission_carries_limits() {
        let enforcer = enforcer(LicenseTier::Free);
        enforcer.register_heartbeat("w1");

        match enforcer.require_admission("w2") {
            Err(EngineError::WorkerLimitExceeded { current, max, tier }) => {
                assert_eq!(current, 1);
                assert_eq!(max, 1);
                assert_eq!(tier, LicenseTier::Free);
            }
            other => panic!("expected limit error, got {other:?}"),
        }
    }

    #[test]
    fn test_can_accept_does_not_mutate() {
        let enforcer = enforcer(LicenseTier::Free);
        assert!(enforcer.can_accept("w1"));
        assert_eq!(enforcer.active_count(), 0);
    }
}
