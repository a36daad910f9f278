use std::net::IpAddr;

use ipnetwork::ip_mask_to_prefix;

/// Compare two rule lines token by token, treating operationally identical
/// address/mask notations as equal: a bare address is its host network
/// (`/32`, `/128`), and a dotted-decimal netmask is its prefix length.
pub fn rules_equal(a: &str, b: &str) -> bool {
    let mut left = a.split_whitespace();
    let mut right = b.split_whitespace();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(l), Some(r)) => {
                if l != r && normalize_token(l) != normalize_token(r) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Canonicalize one token: `address[/mask]` forms become `address/prefix`,
/// anything else passes through unchanged.
fn normalize_token(token: &str) -> String {
    if let Ok(address) = token.parse::<IpAddr>() {
        return format!("{address}/{}", full_prefix(&address));
    }

    let Some((address, mask)) = token.split_once('/') else {
        return token.to_string();
    };
    let Ok(address) = address.parse::<IpAddr>() else {
        return token.to_string();
    };

    if let Ok(prefix) = mask.parse::<u8>() {
        return format!("{address}/{prefix}");
    }
    if let Ok(mask) = mask.parse::<IpAddr>() {
        if let Ok(prefix) = ip_mask_to_prefix(mask) {
            return format!("{address}/{prefix}");
        }
    }
    token.to_string()
}

fn full_prefix(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}
