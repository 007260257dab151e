//! Process-wide outbound network policy for live judge calls.

use std::sync::{Mutex, MutexGuard, OnceLock};

pub const POLICY_ENV: &str = "TRIBUNAL_NETWORK_POLICY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkPolicy {
    Allow,
    Deny(String),
}

fn state() -> MutexGuard<'static, NetworkPolicy> {
    static STATE: OnceLock<Mutex<NetworkPolicy>> = OnceLock::new();
    STATE
        .get_or_init(|| Mutex::new(NetworkPolicy::Allow))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Scoped override; the previous policy comes back on drop.
pub struct NetworkPolicyGuard {
    previous: NetworkPolicy,
}

impl NetworkPolicyGuard {
    pub fn set(policy: NetworkPolicy) -> Self {
        let mut s = state();
        let previous = std::mem::replace(&mut *s, policy);
        Self { previous }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::set(NetworkPolicy::Deny(reason.into()))
    }
}

impl Drop for NetworkPolicyGuard {
    fn drop(&mut self) {
        *state() = self.previous.clone();
    }
}

pub fn check_outbound(target: &str) -> anyhow::Result<()> {
    match effective_policy() {
        NetworkPolicy::Allow => Ok(()),
        NetworkPolicy::Deny(reason) => anyhow::bail!(
            "outbound network blocked by policy (target={}): {}",
            target,
            reason
        ),
    }
}

fn effective_policy() -> NetworkPolicy {
    if let Ok(raw) = std::env::var(POLICY_ENV) {
        if raw.trim().eq_ignore_ascii_case("deny") {
            return NetworkPolicy::Deny(format!("{}=deny", POLICY_ENV));
        }
    }
    state().clone()
}
