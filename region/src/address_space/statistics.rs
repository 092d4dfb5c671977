//! Partition of a subnet into classified runs plus allocation suggestions.
//!
//! Every address of the subnet is assigned exactly one [`AddressClass`]. When
//! several sources claim the same address the one with the highest precedence
//! wins, in this order: unusable, gateway, dynamic range, reserved range,
//! allocated, free. The per-class counts therefore always add up to the size
//! of the subnet.

use core::net::IpAddr;
use std::collections::BTreeMap;

use ipnet::IpNet;
use serde::Serialize;

use super::ordinal::{Span, address, ordinal};
use crate::{
    error::CoreError,
    model::{IpRange, IpRangeKind, same_family, unusable_addresses},
};

/// Classification of an address. Declaration order is precedence order,
/// lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Free,
    Allocated,
    Reserved,
    Dynamic,
    Gateway,
    /// Network address, and the IPv4 broadcast address.
    Unusable,
}

impl From<IpRangeKind> for AddressClass {
    fn from(kind: IpRangeKind) -> Self {
        match kind {
            IpRangeKind::Dynamic => Self::Dynamic,
            IpRangeKind::Reserved => Self::Reserved,
        }
    }
}

/// Knobs for [`compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSettings {
    /// Smallest free block, in addresses, worth suggesting. Values below 1 act as 1.
    pub min_suggestion_size: u128,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            min_suggestion_size: 1,
        }
    }
}

/// Consistent view of one subnet, taken under the inventory lock.
#[derive(Debug, Clone, Copy)]
pub struct SubnetSnapshot<'snap> {
    pub cidr: IpNet,
    pub gateway: Option<IpAddr>,
    pub ranges: &'snap [IpRange],
    pub allocated: &'snap [IpAddr],
}

/// Contiguous run of addresses sharing a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: IpAddr,
    pub end: IpAddr,
    pub num_addresses: u128,
    pub purpose: AddressClass,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub free: u128,
    pub allocated: u128,
    pub reserved: u128,
    pub dynamic: u128,
    pub gateway: u128,
    pub unusable: u128,
}

impl ClassCounts {
    fn add(&mut self, class: AddressClass, n: u128) {
        let slot = match class {
            AddressClass::Free => &mut self.free,
            AddressClass::Allocated => &mut self.allocated,
            AddressClass::Reserved => &mut self.reserved,
            AddressClass::Dynamic => &mut self.dynamic,
            AddressClass::Gateway => &mut self.gateway,
            AddressClass::Unusable => &mut self.unusable,
        };
        *slot += n;
    }

    #[must_use]
    pub const fn sum(&self) -> u128 {
        self.free + self.allocated + self.reserved + self.dynamic + self.gateway + self.unusable
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpaceReport {
    pub cidr: IpNet,
    pub total_addresses: u128,
    pub counts: ClassCounts,
    /// Ordered, adjacent runs of equal class merged.
    pub segments: Vec<Segment>,
    pub largest_free: u128,
    pub suggested_dynamic_range: Option<Segment>,
    pub suggested_reserved_range: Option<Segment>,
    /// Only offered when the subnet has no gateway.
    pub suggested_gateway: Option<IpAddr>,
}

/// Which optional parts to include when rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub include_ranges: bool,
    pub include_suggestions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedStatistics {
    pub ip_version: u8,
    pub total_addresses: u128,
    pub num_available: u128,
    pub largest_available: u128,
    pub num_unavailable: u128,
    pub num_dynamic: u128,
    pub num_reserved: u128,
    pub num_allocated: u128,
    pub num_gateway: u128,
    pub num_unusable: u128,
    pub usage_percent: u128,
    pub usage_string: String,
    pub first_address: IpAddr,
    pub last_address: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<Segment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_gateway: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_dynamic_range: Option<Segment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_reserved_range: Option<Segment>,
}

impl AddressSpaceReport {
    /// Addresses that could ever be handed out.
    #[must_use]
    pub const fn usable(&self) -> u128 {
        self.total_addresses - self.counts.unusable
    }

    /// Usable addresses that are not free.
    #[must_use]
    pub const fn unavailable(&self) -> u128 {
        self.usable() - self.counts.free
    }

    /// Floor of the used share of usable addresses, in percent.
    #[must_use]
    pub fn usage_percent(&self) -> u128 {
        percent(self.unavailable(), self.usable())
    }

    #[must_use]
    pub fn render(&self, options: RenderOptions) -> RenderedStatistics {
        let suggestions = options.include_suggestions;
        RenderedStatistics {
            ip_version: match self.cidr {
                IpNet::V4(_) => 4,
                IpNet::V6(_) => 6,
            },
            total_addresses: self.total_addresses,
            num_available: self.counts.free,
            largest_available: self.largest_free,
            num_unavailable: self.unavailable(),
            num_dynamic: self.counts.dynamic,
            num_reserved: self.counts.reserved,
            num_allocated: self.counts.allocated,
            num_gateway: self.counts.gateway,
            num_unusable: self.counts.unusable,
            usage_percent: self.usage_percent(),
            usage_string: format!("{}%", self.usage_percent()),
            first_address: self.cidr.network(),
            last_address: self.cidr.broadcast(),
            ranges: options.include_ranges.then(|| self.segments.clone()),
            suggested_gateway: self.suggested_gateway.filter(|_| suggestions),
            suggested_dynamic_range: self
                .suggested_dynamic_range
                .clone()
                .filter(|_| suggestions),
            suggested_reserved_range: self
                .suggested_reserved_range
                .clone()
                .filter(|_| suggestions),
        }
    }
}

fn percent(part: u128, whole: u128) -> u128 {
    if whole == 0 {
        return 0;
    }
    // Only subnets beyond 2^121 addresses overflow the exact form; the share
    // is then computed on a coarser scale.
    part.checked_mul(100)
        .map_or_else(|| part / (whole / 100), |scaled| scaled / whole)
        .min(100)
}

/// Raises the class stored for a single address if `class` outranks it.
fn raise(points: &mut BTreeMap<u128, AddressClass>, at: u128, class: AddressClass) {
    let current = points.entry(at).or_insert(class);
    if class > *current {
        *current = class;
    }
}

/// Appends a span, merging it into the previous one when adjacent and equal.
fn push(spans: &mut Vec<Span<AddressClass>>, first: u128, last: u128, class: AddressClass) {
    if let Some(prev) = spans.last_mut()
        && prev.class == class
        && prev.last + 1 == first
    {
        prev.last = last;
        return;
    }
    spans.push(Span { first, last, class });
}

/// Lays the declared ranges over the subnet, filling the gaps with free space.
/// Overlapping ranges are tolerated: the earlier start wins.
fn range_layer(
    first: u128,
    last: u128,
    ranges: &[IpRange],
    family: IpAddr,
) -> Vec<Span<AddressClass>> {
    let mut declared: Vec<Span<AddressClass>> = ranges
        .iter()
        .filter(|r| same_family(r.start, family) && same_family(r.end, family))
        .filter_map(|r| {
            let start = ordinal(r.start).max(first);
            let end = ordinal(r.end).min(last);
            (start <= end).then_some(Span {
                first: start,
                last: end,
                class: r.kind.into(),
            })
        })
        .collect();
    declared.sort_unstable_by_key(|s| s.first);

    let mut layer = Vec::with_capacity(declared.len() * 2 + 1);
    let mut cursor = Some(first);
    for span in declared {
        let Some(from) = cursor else { break };
        let start = span.first.max(from);
        if start > span.last {
            continue;
        }
        if start > from {
            layer.push(Span {
                first: from,
                last: start - 1,
                class: AddressClass::Free,
            });
        }
        layer.push(Span {
            first: start,
            last: span.last,
            class: span.class,
        });
        cursor = (span.last < last).then(|| span.last + 1);
    }
    if let Some(from) = cursor {
        layer.push(Span {
            first: from,
            last,
            class: AddressClass::Free,
        });
    }
    layer
}

/// Picks the largest block of at least `min` addresses, lowest start on ties.
fn largest(blocks: &[Span<AddressClass>], min: u128, skip: Option<usize>) -> Option<usize> {
    let mut best: Option<(usize, u128)> = None;
    for (i, block) in blocks.iter().enumerate() {
        if Some(i) == skip || block.size() < min {
            continue;
        }
        if best.is_none_or(|(_, size)| block.size() > size) {
            best = Some((i, block.size()));
        }
    }
    best.map(|(i, _)| i)
}

/// Computes the statistics report for one subnet snapshot.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] for `::/0`, whose size doesn't fit the
/// counting domain.
pub fn compute(
    snapshot: &SubnetSnapshot<'_>,
    settings: StatisticsSettings,
) -> Result<AddressSpaceReport, CoreError> {
    let cidr = snapshot.cidr.trunc();
    if matches!(cidr, IpNet::V6(_)) && cidr.prefix_len() == 0 {
        return Err(CoreError::validation(
            "The IPv6 default route ::/0 can't be counted",
        ));
    }
    let first = ordinal(cidr.network());
    let last = ordinal(cidr.broadcast());
    let family = cidr.addr();

    let mut points = BTreeMap::new();
    for ip in snapshot.allocated.iter().filter(|ip| cidr.contains(*ip)) {
        raise(&mut points, ordinal(*ip), AddressClass::Allocated);
    }
    if let Some(gateway) = snapshot.gateway.filter(|gw| cidr.contains(gw)) {
        raise(&mut points, ordinal(gateway), AddressClass::Gateway);
    }
    for ip in unusable_addresses(cidr) {
        raise(&mut points, ordinal(ip), AddressClass::Unusable);
    }

    let mut spans = Vec::new();
    for base in range_layer(first, last, snapshot.ranges, family) {
        let mut next = Some(base.first);
        for (&at, &class) in points.range(base.first..=base.last) {
            if class <= base.class {
                continue;
            }
            let Some(from) = next else { break };
            if at > from {
                push(&mut spans, from, at - 1, base.class);
            }
            push(&mut spans, at, at, class);
            next = at.checked_add(1);
        }
        if let Some(from) = next
            && from <= base.last
        {
            push(&mut spans, from, base.last, base.class);
        }
    }

    let mut counts = ClassCounts::default();
    for span in &spans {
        counts.add(span.class, span.size());
    }

    let free: Vec<_> = spans
        .iter()
        .filter(|s| s.class == AddressClass::Free)
        .copied()
        .collect();
    let min = settings.min_suggestion_size.max(1);
    let dynamic = largest(&free, min, None);
    let reserved = dynamic.and_then(|d| largest(&free, min, Some(d)));

    let to_segment = |span: &Span<AddressClass>| Segment {
        start: address(cidr, span.first),
        end: address(cidr, span.last),
        num_addresses: span.size(),
        purpose: span.class,
    };

    Ok(AddressSpaceReport {
        cidr,
        total_addresses: last - first + 1,
        counts,
        largest_free: free.iter().map(Span::size).max().unwrap_or(0),
        suggested_dynamic_range: dynamic.and_then(|i| free.get(i)).map(to_segment),
        suggested_reserved_range: reserved.and_then(|i| free.get(i)).map(to_segment),
        suggested_gateway: match snapshot.gateway {
            Some(_) => None,
            None => free.first().map(|span| address(cidr, span.first)),
        },
        segments: spans.iter().map(to_segment).collect(),
    })
}
