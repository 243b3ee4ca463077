use std::net::IpAddr;
use std::path::{Path, PathBuf};

use maxminddb::{geoip2, MaxMindDBError, Reader};
use tracing::{debug, info};

use crate::error::{EnrichError, Result};
use crate::util::env as env_util;

/// Reserved ISO 3166-1 code standing in for "unknown or unresolvable".
/// Stored instead of NULL so a processed row is distinguishable from an
/// unprocessed one.
pub const UNKNOWN_COUNTRY: &str = "ZZ";

const DEFAULT_DB_PATH: &str = "resources/geoip/GeoLite2-Country.mmdb";

/// Country-level geolocation over a preloaded GeoLite2 database.
///
/// Lookups fail closed: invalid input, addresses absent from the dataset and
/// reader errors all yield [`UNKNOWN_COUNTRY`]. Only a missing database file
/// is fatal, and only at construction time.
pub struct GeoProvider {
    reader: Reader<Vec<u8>>,
}

impl GeoProvider {
    /// Resolve the database path from `GEOIP_DB_PATH` or the default
    /// location under `resources/`.
    pub fn db_path() -> PathBuf {
        env_util::env_opt("GEOIP_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let reader = Reader::open_readfile(path).map_err(|e| {
            EnrichError::ReferenceDataMissing(format!(
                "GeoIP country database not found at {} ({e}); download GeoLite2-Country.mmdb \
                 from MaxMind and place it there, or set GEOIP_DB_PATH",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "geoip country database loaded");
        Ok(Self { reader })
    }

    /// Country staged for a candidate's raw IP field, [`UNKNOWN_COUNTRY`]
    /// when anything about the input or the lookup is off. Never errors and
    /// never empty, so the merge always writes the country column and the
    /// row is not reselected on the next incremental run.
    pub fn staged_country(&self, raw: Option<&str>) -> String {
        country_or_unknown(raw, |ip| self.lookup(ip))
    }

    fn lookup(&self, ip: IpAddr) -> String {
        match self.reader.lookup::<geoip2::Country>(ip) {
            Ok(record) => record
                .country
                .and_then(|c| c.iso_code)
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
            Err(MaxMindDBError::AddressNotFoundError(_)) => UNKNOWN_COUNTRY.to_string(),
            Err(e) => {
                debug!(ip = %ip, error = %e, "country lookup failed");
                UNKNOWN_COUNTRY.to_string()
            }
        }
    }
}

/// Route a raw IP field through `lookup` when it parses, otherwise fall back
/// to [`UNKNOWN_COUNTRY`]. Absent, blank and syntactically invalid inputs all
/// take the fallback, so the result is always a non-empty code.
pub fn country_or_unknown<L>(raw: Option<&str>, lookup: L) -> String
where
    L: FnOnce(IpAddr) -> String,
{
    match raw.and_then(parse_ip) {
        Some(ip) => lookup(ip),
        None => UNKNOWN_COUNTRY.to_string(),
    }
}

/// Syntactic IP validation; whitespace is tolerated, anything else is not.
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_v4_and_v6() {
        assert!(parse_ip("8.8.8.8").is_some());
        assert!(parse_ip(" 2001:4860:4860::8888 ").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_ip("").is_none());
        assert!(parse_ip("not-an-ip").is_none());
        assert!(parse_ip("999.1.1.1").is_none());
        assert!(parse_ip("8.8.8").is_none());
    }

    #[test]
    fn unusable_ip_fields_stage_the_unknown_sentinel() {
        let lookup = |_: IpAddr| "US".to_string();
        for raw in [None, Some(""), Some("   "), Some("not-an-ip")] {
            let country = country_or_unknown(raw, lookup);
            assert_eq!(country, UNKNOWN_COUNTRY, "raw: {raw:?}");
            assert!(!country.is_empty());
        }
        assert_eq!(country_or_unknown(Some("8.8.8.8"), lookup), "US");
    }
}
