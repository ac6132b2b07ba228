// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Brute-force attack patterns for security testing.

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of failed attempts to report
    pub total_attempts: usize,
    /// Number of remote hosts the attacker rotates through
    pub unique_hosts: usize,
    /// Number of resources (accounts, endpoints) attacked
    pub unique_resources: usize,
    /// Report a successful login after every n failures
    pub success_every: Option<usize>,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_attempts: 100,
            unique_hosts: 1,
            unique_resources: 1,
            success_every: None,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Password guessing - one host hammering one account.
    pub fn password_guessing() -> Self {
        Self {
            total_attempts: 200,
            ..Default::default()
        }
    }

    /// Credential stuffing - one host trying many accounts.
    pub fn credential_stuffing() -> Self {
        Self {
            total_attempts: 500,
            unique_resources: 50,
            ..Default::default()
        }
    }

    /// Distributed guessing - a botnet against one account.
    pub fn distributed_guessing() -> Self {
        Self {
            total_attempts: 500,
            unique_hosts: 100,
            ..Default::default()
        }
    }

    /// Reset abuse - the attacker owns a valid login and uses it to clear
    /// the counter before reaching the threshold.
    pub fn reset_abuse(threshold: u32) -> Self {
        Self {
            total_attempts: 200,
            success_every: Some(threshold as usize),
            ..Default::default()
        }
    }

    /// Failures that land on each (resource, host) key when attempts are
    /// spread round-robin.
    pub fn attempts_per_key(&self) -> usize {
        let keys = lcm(self.unique_hosts.max(1), self.unique_resources.max(1));
        self.total_attempts / keys
    }

    /// Number of distinct (resource, host) keys the attack touches.
    pub fn key_count(&self) -> usize {
        lcm(self.unique_hosts.max(1), self.unique_resources.max(1)).min(self.total_attempts)
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

/// Expected outcomes for different attack types.
pub struct AttackExpectations {
    /// Failed attempts that are still reported as granted
    pub max_granted: usize,
    /// Description of expected behavior
    pub description: &'static str,
}

impl AttackConfig {
    /// Get expected outcomes for this attack pattern against `threshold`.
    pub fn expectations(&self, threshold: u32) -> AttackExpectations {
        let threshold = threshold as usize;
        if self.success_every.is_some_and(|n| n <= threshold) {
            AttackExpectations {
                max_granted: self.total_attempts,
                description: "Successes below the threshold reset the counter",
            }
        } else if self.key_count() == 1 {
            AttackExpectations {
                max_granted: threshold.min(self.total_attempts),
                description: "One key is capped at the threshold",
            }
        } else {
            AttackExpectations {
                max_granted: self.key_count() * threshold.min(self.attempts_per_key()),
                description: "Each key is capped at the threshold independently",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_distribution() {
        let config = AttackConfig::credential_stuffing();
        assert_eq!(config.key_count(), 50);
        assert_eq!(config.attempts_per_key(), 10);

        let config = AttackConfig::distributed_guessing();
        assert_eq!(config.key_count(), 100);
        assert_eq!(config.attempts_per_key(), 5);
    }

    #[test]
    fn test_expectations() {
        assert_eq!(AttackConfig::password_guessing().expectations(10).max_granted, 10);
        assert_eq!(AttackConfig::credential_stuffing().expectations(3).max_granted, 150);
        assert_eq!(AttackConfig::reset_abuse(10).expectations(10).max_granted, 200);
    }
}
