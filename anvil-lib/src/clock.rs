//! `clock` is a module providing the timestamp conversions used by the
//! DHCPv6 identifiers.
//!
//! The DUID-LLT identifier defined in RFC 8415, section 11.2, carries a
//! timestamp expressed in seconds since midnight (UTC), January 1, 2000,
//! modulo 2^32. This differs from the UNIX epoch used virtually anywhere
//! else, so the conversions are kept in one place.

use chrono::{DateTime, TimeZone, Utc};

/// Offset between the UNIX epoch and the DUID-LLT epoch in seconds.
///
/// It corresponds to 2000-01-01T00:00:00Z expressed as a UNIX timestamp.
const DUID_EPOCH_OFFSET: i64 = 946_684_800;

/// Returns the DUID-LLT timestamp for the current time.
pub fn duid_time_now() -> u32 {
    duid_time_at(Utc::now())
}

/// Returns the DUID-LLT timestamp for the specified time.
///
/// # Parameters
///
/// - `time` is the wall clock time to be converted.
///
/// The returned value wraps around modulo 2^32, as required by the RFC.
/// Times before the DUID epoch yield 0.
pub fn duid_time_at(time: DateTime<Utc>) -> u32 {
    let seconds = time.timestamp() - DUID_EPOCH_OFFSET;
    if seconds < 0 {
        return 0;
    }
    (seconds % (u32::MAX as i64 + 1)) as u32
}

/// Converts a DUID-LLT timestamp back to the wall clock time.
///
/// The conversion assumes the timestamp has not wrapped around. It is
/// a safe assumption until the year 2136.
pub fn duid_time_to_utc(duid_time: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(duid_time as i64 + DUID_EPOCH_OFFSET, 0)
        .unwrap()
}
