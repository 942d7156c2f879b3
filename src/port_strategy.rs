//! Port sets to scan and the order in which they are dispatched.
use crate::error::ScanError;
use crate::input::ScanOrder;
use crate::services;
use rand::rng;
use rand::seq::SliceRandom;

pub const LOWEST_PORT_NUMBER: u16 = 1;
pub const TOP_PORT_NUMBER: u16 = 65535;

/// Checks a raw port value against the valid port space.
fn checked_port(port: u32) -> Option<u16> {
    u16::try_from(port)
        .ok()
        .filter(|&p| p >= LOWEST_PORT_NUMBER)
}

/// A closed interval of ports, `start..=end`.
///
/// Construction is the only way to obtain one, so every `PortRange` in the
/// program already satisfies `1 <= start <= end <= 65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Validates raw bounds. They are taken as `u32` so that `0` and
    /// `65536` are rejected instead of silently wrapping.
    pub fn new(start: u32, end: u32) -> Result<Self, ScanError> {
        match (checked_port(start), checked_port(end)) {
            (Some(s), Some(e)) if s <= e => Ok(Self { start: s, end: e }),
            _ => Err(ScanError::InvalidRange { start, end }),
        }
    }

    pub const fn start(&self) -> u16 {
        self.start
    }

    pub const fn end(&self) -> u16 {
        self.end
    }

    pub const fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

/// The set of ports requested for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSet {
    /// Contiguous range given by the operator.
    Range(PortRange),
    /// Explicit list of distinct ports, in the order given.
    List(Vec<u16>),
}

impl PortSet {
    pub fn range(start: u32, end: u32) -> Result<Self, ScanError> {
        PortRange::new(start, end).map(Self::Range)
    }

    /// Builds an explicit list. Duplicates are dropped, keeping the first
    /// occurrence.
    pub fn list<I>(ports: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut seen = vec![false; usize::from(TOP_PORT_NUMBER) + 1];
        let mut list = Vec::new();
        for raw in ports {
            let port = checked_port(raw).ok_or(ScanError::InvalidPort(raw))?;
            if !seen[usize::from(port)] {
                seen[usize::from(port)] = true;
                list.push(port);
            }
        }

        if list.is_empty() {
            return Err(ScanError::EmptyPortList);
        }
        Ok(Self::List(list))
    }

    /// The fixed well-known set used by `--common`.
    pub fn common() -> Self {
        Self::List(services::common_ports())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Range(range) => range.len(),
            Self::List(ports) => ports.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable description used in console output and the scan log.
    pub fn descriptor(&self) -> String {
        match self {
            Self::Range(range) => format!("{}-{}", range.start, range.end),
            Self::List(ports) => {
                let min = ports.iter().min().copied().unwrap_or(LOWEST_PORT_NUMBER);
                let max = ports.iter().max().copied().unwrap_or(LOWEST_PORT_NUMBER);
                format!("{min}-{max} ({} ports)", ports.len())
            }
        }
    }
}

/// Represents the dispatch order of a scan.
///
/// The order never changes what a scan finds, only the sequence in which
/// probes leave the coordinator.
#[derive(Debug)]
pub enum PortStrategy {
    Manual(Vec<u16>),
    Serial(SerialRange),
    Random(RandomRange),
}

impl PortStrategy {
    pub fn pick(ports: &PortSet, order: ScanOrder) -> Self {
        match (ports, order) {
            (PortSet::Range(range), ScanOrder::Serial) => Self::Serial(SerialRange {
                start: range.start,
                end: range.end,
            }),
            (PortSet::Range(range), ScanOrder::Random) => Self::Random(RandomRange {
                start: range.start,
                end: range.end,
            }),
            (PortSet::List(ports), ScanOrder::Serial) => Self::Manual(ports.clone()),
            (PortSet::List(ports), ScanOrder::Random) => {
                let mut ports = ports.clone();
                ports.shuffle(&mut rng());
                Self::Manual(ports)
            }
        }
    }

    pub fn order(&self) -> Vec<u16> {
        match self {
            Self::Manual(ports) => ports.clone(),
            Self::Serial(range) => range.generate(),
            Self::Random(range) => range.generate(),
        }
    }
}

/// Trait associated with a port strategy. Each PortStrategy must be able
/// to generate an order for future port scanning.
trait RangeOrder {
    fn generate(&self) -> Vec<u16>;
}

/// As the name implies SerialRange will always generate a vector in
/// ascending order.
#[derive(Debug)]
pub struct SerialRange {
    start: u16,
    end: u16,
}

impl RangeOrder for SerialRange {
    fn generate(&self) -> Vec<u16> {
        (self.start..=self.end).collect()
    }
}

/// RandomRange generates every port of the range exactly once, shuffled.
#[derive(Debug)]
pub struct RandomRange {
    start: u16,
    end: u16,
}

impl RangeOrder for RandomRange {
    fn generate(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = (self.start..=self.end).collect();
        ports.shuffle(&mut rng());
        ports
    }
}

#[cfg(test)]
mod tests {
    use super::{PortRange, PortSet, PortStrategy};
    use crate::error::ScanError;
    use crate::input::ScanOrder;
    use parameterized::parameterized;

    #[parameterized(bounds = {
        (1, 1), (1, 65535), (65535, 65535), (54320, 54322),
    })]
    fn accepts_valid_bounds(bounds: (u32, u32)) {
        let range = PortRange::new(bounds.0, bounds.1).unwrap();
        assert_eq!(u32::from(range.start()), bounds.0);
        assert_eq!(u32::from(range.end()), bounds.1);
    }

    #[parameterized(bounds = {
        (0, 10), (1, 65536), (0, 65536), (10, 5), (70000, 70001),
    })]
    fn rejects_invalid_bounds(bounds: (u32, u32)) {
        assert_eq!(
            PortRange::new(bounds.0, bounds.1),
            Err(ScanError::InvalidRange {
                start: bounds.0,
                end: bounds.1
            })
        );
    }

    #[test]
    fn range_length_and_descriptor() {
        let ports = PortSet::range(1, 1000).unwrap();
        assert_eq!(ports.len(), 1000);
        assert_eq!(ports.descriptor(), "1-1000");
        let order = PortStrategy::pick(&ports, ScanOrder::Serial).order();
        assert_eq!(order.first(), Some(&1));
        assert_eq!(order.last(), Some(&1000));

        let full = PortSet::range(1, 65535).unwrap();
        assert_eq!(full.len(), 65535);
    }

    #[test]
    fn list_drops_duplicates_keeping_first() {
        let ports = PortSet::list([443, 80, 443, 22, 80]).unwrap();
        assert_eq!(ports, PortSet::List(vec![443, 80, 22]));
        assert_eq!(ports.descriptor(), "22-443 (3 ports)");
    }

    #[test]
    fn list_rejects_out_of_range_ports() {
        assert_eq!(PortSet::list([80, 0]), Err(ScanError::InvalidPort(0)));
        assert_eq!(PortSet::list([65536]), Err(ScanError::InvalidPort(65536)));
        assert_eq!(
            PortSet::list(Vec::<u32>::new()),
            Err(ScanError::EmptyPortList)
        );
    }

    #[test]
    fn common_set_contains_well_known_ports() {
        let ports = PortSet::common();
        assert_eq!(ports.len(), 17);
        let order = PortStrategy::pick(&ports, ScanOrder::Serial).order();
        assert!(order.contains(&80));
        assert!(order.contains(&27017));
        assert_eq!(ports.descriptor(), "21-27017 (17 ports)");
    }

    #[test]
    fn serial_strategy_with_range() {
        let ports = PortSet::range(1, 100).unwrap();
        let result = PortStrategy::pick(&ports, ScanOrder::Serial).order();
        let expected = (1..=100).collect::<Vec<u16>>();
        assert_eq!(expected, result);
    }

    #[test]
    fn random_strategy_with_range() {
        let ports = PortSet::range(1, 100).unwrap();
        let mut result = PortStrategy::pick(&ports, ScanOrder::Random).order();
        let expected = (1..=100).collect::<Vec<u16>>();
        assert_ne!(expected, result);

        result.sort_unstable();
        assert_eq!(expected, result);
    }

    #[test]
    fn serial_strategy_with_ports() {
        let ports = PortSet::list([80, 443]).unwrap();
        let result = PortStrategy::pick(&ports, ScanOrder::Serial).order();
        assert_eq!(vec![80, 443], result);
    }

    #[test]
    fn random_strategy_with_ports() {
        let ports = PortSet::list(1..=500).unwrap();
        let mut result = PortStrategy::pick(&ports, ScanOrder::Random).order();
        let expected = (1..=500).collect::<Vec<u16>>();
        assert_ne!(expected, result);

        result.sort_unstable();
        assert_eq!(expected, result);
    }

    #[test]
    fn boundary_ports_are_dispatched() {
        let ports = PortSet::range(65534, 65535).unwrap();
        let result = PortStrategy::pick(&ports, ScanOrder::Serial).order();
        assert_eq!(vec![65534, 65535], result);
    }
}
