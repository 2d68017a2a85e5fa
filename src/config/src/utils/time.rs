// Copyright 2025 Alertmesh Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

// check format: 1s, 1m, 1h, 1d, 1w, 1y, 1h10m30s
static TIME_UNITS: [(char, u64); 7] = [
    ('!', 1), // ms
    ('s', 1000),
    ('m', 60 * 1000),
    ('h', 3600 * 1000),
    ('d', 24 * 3600 * 1000),
    ('w', 7 * 24 * 3600 * 1000),
    ('y', 365 * 24 * 3600 * 1000),
];

pub const MICROS_PER_SEC: i64 = 1_000_000;

#[inline(always)]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[inline(always)]
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

#[inline(always)]
pub fn seconds_micros(secs: i64) -> i64 {
    secs * MICROS_PER_SEC
}

#[inline(always)]
pub fn duration_micros(d: Duration) -> i64 {
    d.as_micros() as i64
}

#[inline(always)]
pub fn micros_to_time(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or_else(|| Utc.timestamp_micros(0).unwrap())
}

pub fn parse_milliseconds(s: &str) -> Result<u64, anyhow::Error> {
    let chars = s.chars().collect::<Vec<char>>();

    // without unit, default is second
    if chars.iter().all(|c| c.is_ascii_digit()) {
        return Ok(s.parse::<u64>().unwrap_or(0) * 1000);
    }

    let mut unit_pos = TIME_UNITS.len();
    let mut start = 0;
    let mut total = 0;

    let chars_count = chars.len();
    let mut i = 0;
    while i < chars_count {
        let c = chars.get(i).unwrap();
        if c.is_ascii_digit() {
            i += 1;
            continue;
        }
        if i == 0 {
            return Err(anyhow::anyhow!("Invalid time format: {c}"));
        }
        let step_value = chars[start..i]
            .iter()
            .collect::<String>()
            .parse::<u64>()
            .unwrap_or(0);
        start = i + 1;
        // check unit
        let pos = TIME_UNITS[..unit_pos].iter().position(|&x| x.0 == *c);
        if pos.is_none() && *c != 'm' {
            return Err(anyhow::anyhow!("Invalid time format: {c}"));
        }
        // check unit: ms
        let cur_unit = if *c == 'm' && i + 1 < chars_count && chars.get(i + 1).unwrap() == &'s' {
            i += 1;
            unit_pos = 0;
            &TIME_UNITS[unit_pos]
        } else {
            unit_pos = pos.unwrap();
            &TIME_UNITS[unit_pos]
        };
        // calc
        total += step_value * cur_unit.1;
        i += 1;
    }
    Ok(total)
}

pub fn parse_duration(s: &str) -> Result<Duration, anyhow::Error> {
    Ok(Duration::from_millis(parse_milliseconds(s)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_milliseconds() {
        assert_eq!(parse_milliseconds("30s").unwrap(), 30 * 1000);
        assert_eq!(parse_milliseconds("5m").unwrap(), 5 * 60 * 1000);
        assert_eq!(parse_milliseconds("4h").unwrap(), 4 * 3600 * 1000);
        assert_eq!(parse_milliseconds("1h10m30s").unwrap(), 4230 * 1000);
        assert_eq!(parse_milliseconds("500ms").unwrap(), 500);
        assert_eq!(parse_milliseconds("10").unwrap(), 10 * 1000);
        assert!(parse_milliseconds("10x").is_err());
        assert!(parse_milliseconds("x10").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_micros_round_trip() {
        let now = now_micros();
        assert_eq!(micros_to_time(now).timestamp_micros(), now);
    }
}
