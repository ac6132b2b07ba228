// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Generate a pool of remote hosts for testing.
///
/// Every fourth host is IPv6 so both address forms flow through the keys.
pub fn generate_hosts(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let ip = if i % 4 == 3 {
                IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, i as u16))
            } else {
                // Use 10.x.x.x private range
                let a = ((i >> 16) & 0xFF) as u8;
                let b = ((i >> 8) & 0xFF) as u8;
                let c = (i & 0xFF) as u8;
                IpAddr::V4(Ipv4Addr::new(10, a, b, c))
            };
            ip.to_string()
        })
        .collect()
}

/// Generate a pool of resource ids (accounts) for testing.
pub fn generate_resources(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("login:user-{i:04}")).collect()
}

/// Remote host values that must be rejected before anything is written.
pub fn generate_blank_hosts() -> Vec<&'static str> {
    vec!["", " ", "   ", "\t", "\n", " \t\r\n "]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hosts() {
        let hosts = generate_hosts(256);
        assert_eq!(hosts.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = hosts.iter().collect();
        assert_eq!(unique.len(), 256);
        assert!(hosts[3].contains(':'));
    }

    #[test]
    fn test_generate_resources() {
        let resources = generate_resources(100);
        assert_eq!(resources.len(), 100);
        assert_eq!(resources[7], "login:user-0007");
    }
}
