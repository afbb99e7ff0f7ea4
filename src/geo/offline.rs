//! Bundled offline geo/ASN database
//!
//! A compact range table embedded at build time and parsed once. Rows map
//! an address range to a country code, a continent code and the
//! organization owning the containing network block. Lookups that land in a
//! block without a country-level code fall back to the continent-level
//! code.

use std::net::IpAddr;

/// Embedded snapshot, parsed by [`OfflineDb::bundled`].
const BUNDLED_RANGES: &str = include_str!("../../data/geo-ranges.csv");

/// Result of an offline lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineRecord {
    pub country_code: String,
    pub organization: String,
}

struct Range {
    start: u128,
    end: u128,
    country: String,
    continent: String,
    organization: String,
}

/// Parsed range table. Load once and share.
pub struct OfflineDb {
    ranges: Vec<Range>,
}

impl OfflineDb {
    /// Parse the bundled snapshot.
    pub fn bundled() -> Self {
        Self::parse(BUNDLED_RANGES)
    }

    fn parse(text: &str) -> Self {
        let mut ranges: Vec<Range> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.splitn(5, ',');
                let start: IpAddr = fields.next()?.parse().ok()?;
                let end: IpAddr = fields.next()?.parse().ok()?;
                let country = fields.next()?.to_string();
                let continent = fields.next()?.to_string();
                let organization = fields.next()?.to_string();
                Some(Range {
                    start: ip_key(start),
                    end: ip_key(end),
                    country,
                    continent,
                    organization,
                })
            })
            .collect();

        ranges.sort_by_key(|range| range.start);

        Self { ranges }
    }

    /// Number of loaded ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Direct lookup by address.
    ///
    /// Returns `None` when no range contains the address - the caller then
    /// moves on to the external fallback path.
    pub fn lookup(&self, ip: IpAddr) -> Option<OfflineRecord> {
        let key = ip_key(ip);

        let idx = self.ranges.partition_point(|range| range.start <= key);
        let range = self.ranges.get(idx.checked_sub(1)?)?;
        if key > range.end {
            return None;
        }

        // country-level code first, continent-level on a structural miss
        let country_code = if range.country.is_empty() {
            range.continent.clone()
        } else {
            range.country.clone()
        };

        Some(OfflineRecord {
            country_code,
            organization: range.organization.clone(),
        })
    }
}

/// Order v4 and v6 addresses on one keyspace (v4 in its mapped block).
fn ip_key(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}
