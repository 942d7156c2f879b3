//! Static port to service-name guesses, used for reporting only.
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Label returned for ports that are not in the table.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// The well-known ports scanned by `--common`, in dispatch order.
const COMMON_SERVICES: [(u16, &str); 17] = [
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (3306, "MySQL"),
    (1433, "MSSQL"),
    (27017, "MongoDB"),
    (6379, "Redis"),
];

static CATALOG: Lazy<HashMap<u16, &'static str>> =
    Lazy::new(|| COMMON_SERVICES.iter().copied().collect());

/// Returns the conventional service label for `port`, or
/// [`UNKNOWN_SERVICE`] when the port is not in the table.
///
/// ```rust
/// # use tcpsweep::services::lookup;
/// assert_eq!(lookup(22), "SSH");
/// assert_eq!(lookup(31337), "Unknown");
/// ```
pub fn lookup(port: u16) -> &'static str {
    CATALOG.get(&port).copied().unwrap_or(UNKNOWN_SERVICE)
}

/// Ports of the fixed well-known set.
pub fn common_ports() -> Vec<u16> {
    COMMON_SERVICES.iter().map(|&(port, _)| port).collect()
}

#[cfg(test)]
mod tests {
    use super::{common_ports, lookup, UNKNOWN_SERVICE};
    use parameterized::parameterized;

    #[parameterized(port = {
        21, 22, 23, 25, 53, 80, 443, 3306, 6379, 27017,
    }, label = {
        "FTP", "SSH", "Telnet", "SMTP", "DNS", "HTTP", "HTTPS", "MySQL", "Redis", "MongoDB",
    })]
    fn known_ports_have_labels(port: u16, label: &str) {
        assert_eq!(lookup(port), label);
    }

    #[test]
    fn unknown_ports_fall_back() {
        assert_eq!(lookup(1), UNKNOWN_SERVICE);
        assert_eq!(lookup(65535), UNKNOWN_SERVICE);
    }

    #[test]
    fn every_common_port_is_labelled() {
        let ports = common_ports();
        assert_eq!(ports.first(), Some(&21));
        assert_eq!(ports.last(), Some(&6379));
        assert!(ports.iter().all(|&p| lookup(p) != UNKNOWN_SERVICE));
    }
}
