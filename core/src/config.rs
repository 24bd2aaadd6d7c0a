//! Startup configuration loaders.
//!
//! Both tables come up from whitespace-separated text records, one per line,
//! with `#` comments and blank lines ignored:
//!
//! ```text
//! # routes:        dest gateway mask iface
//! 0.0.0.0  192.168.1.254  0.0.0.0        eth1
//! 10.0.0.0 0.0.0.0        255.255.255.0  eth0
//!
//! # interfaces:    name mac ip mask
//! eth0  00:11:22:33:44:55  10.0.0.1     255.255.255.0
//! ```
//!
//! Record order is preserved — the routing table's tie-break depends on it.

use core::fmt;

use vroute_wire::{Ipv4Addr, MacAddr};

use crate::iface::{IFACE_NAME_MAX, IfaceTable, Interface};
use crate::route::{RouteEntry, RouteTable};

/// A rejected configuration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// 1-based line number of the offending record.
    pub line: usize,
    /// What was wrong with it.
    pub msg: String,
}

impl ConfigError {
    fn new(line: usize, msg: String) -> Self {
        Self { line, msg }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.msg)
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// Routing table records
// =============================================================================

/// Parse routing table records (`dest gateway mask iface`).
///
/// A gateway of `0.0.0.0` marks a directly attached network.
pub fn parse_routes(text: &str) -> Result<RouteTable, ConfigError> {
    let mut routes = Vec::new();
    for (idx, record) in records(text) {
        let mut fields = record.split_whitespace();
        let dest = ipv4_field(idx, &mut fields, "destination")?;
        let gateway = ipv4_field(idx, &mut fields, "gateway")?;
        let mask = ipv4_field(idx, &mut fields, "mask")?;
        let iface = name_field(idx, &mut fields)?;
        reject_trailing(idx, &mut fields)?;
        routes.push(RouteEntry {
            dest,
            mask,
            gateway,
            iface,
        });
    }
    Ok(RouteTable::new(routes))
}

// =============================================================================
// Interface records
// =============================================================================

/// Parse interface records (`name mac ip mask`).
pub fn parse_ifaces(text: &str) -> Result<IfaceTable, ConfigError> {
    let mut ifaces: Vec<Interface> = Vec::new();
    for (idx, record) in records(text) {
        let mut fields = record.split_whitespace();
        let name = name_field(idx, &mut fields)?;
        if ifaces.iter().any(|i| i.name == name) {
            return Err(ConfigError::new(
                idx,
                format!("duplicate interface name '{}'", name),
            ));
        }
        let mac = match fields.next() {
            Some(field) => parse_mac(field)
                .ok_or_else(|| ConfigError::new(idx, format!("bad MAC address '{}'", field)))?,
            None => return Err(ConfigError::new(idx, "missing MAC address".to_string())),
        };
        let ip = ipv4_field(idx, &mut fields, "address")?;
        let mask = ipv4_field(idx, &mut fields, "mask")?;
        reject_trailing(idx, &mut fields)?;
        ifaces.push(Interface {
            name,
            mac,
            ip,
            mask,
        });
    }
    Ok(IfaceTable::new(ifaces))
}

// =============================================================================
// Field helpers
// =============================================================================

/// Non-empty, non-comment lines with their 1-based line numbers.
fn records(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, raw)| (i + 1, raw.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn ipv4_field<'a>(
    line: usize,
    fields: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<Ipv4Addr, ConfigError> {
    match fields.next() {
        Some(field) => parse_ipv4(field)
            .ok_or_else(|| ConfigError::new(line, format!("bad {} '{}'", what, field))),
        None => Err(ConfigError::new(line, format!("missing {}", what))),
    }
}

fn name_field<'a>(
    line: usize,
    fields: &mut impl Iterator<Item = &'a str>,
) -> Result<String, ConfigError> {
    match fields.next() {
        Some(field) if field.len() <= IFACE_NAME_MAX => Ok(field.to_string()),
        Some(field) => Err(ConfigError::new(
            line,
            format!("interface name '{}' exceeds {} bytes", field, IFACE_NAME_MAX),
        )),
        None => Err(ConfigError::new(line, "missing interface name".to_string())),
    }
}

fn reject_trailing<'a>(
    line: usize,
    fields: &mut impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    match fields.next() {
        Some(extra) => Err(ConfigError::new(
            line,
            format!("unexpected trailing field '{}'", extra),
        )),
        None => Ok(()),
    }
}

/// Parse a dotted-quad IPv4 address.
fn parse_ipv4(field: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = field.split('.');
    for slot in octets.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr(octets))
}

/// Parse a colon-separated MAC address.
fn parse_mac(field: &str) -> Option<MacAddr> {
    let mut bytes = [0u8; 6];
    let mut parts = field.split(':');
    for slot in bytes.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 2 {
            return None;
        }
        *slot = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(MacAddr(bytes))
}
