use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sgp4::Elements;
use utoipa::ToSchema;

use crate::predict::error::ResolveError;
use crate::predict::types::TleSource;

pub const LINE1_MARKER: &str = "1 ";
pub const LINE2_MARKER: &str = "2 ";

/// Columns 19-32 of line 1: `YYDDD.DDDDDDDD`.
const EPOCH_COLUMNS: std::ops::Range<usize> = 18..32;
/// Two-digit years below this pivot belong to the 21st century.
const CENTURY_PIVOT: i32 = 57;

/// A two-line element set together with where and when it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ElementSet {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
    pub epoch: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub source: TleSource,
}

impl ElementSet {
    /// Locate the first line-1/line-2 pair inside an arbitrary text body.
    pub fn parse(
        text: &str,
        source: TleSource,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, ResolveError> {
        let (name, line1, line2) = find_tle_lines(text).ok_or_else(|| {
            ResolveError::MalformedData("no line-1/line-2 pair in response".into())
        })?;
        Self::from_lines(name, line1, line2, source, fetched_at)
    }

    pub fn from_lines(
        name: Option<String>,
        line1: String,
        line2: String,
        source: TleSource,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, ResolveError> {
        if !line1.starts_with(LINE1_MARKER) || !line2.starts_with(LINE2_MARKER) {
            return Err(ResolveError::MalformedData(
                "lines do not start with the catalog markers".into(),
            ));
        }

        // The propagation library is the authority on columns and checksums.
        Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes())
            .map_err(|e| ResolveError::MalformedData(e.to_string()))?;

        let epoch = parse_epoch(&line1)?;

        Ok(Self {
            id: element_set_id(fetched_at),
            name,
            line1,
            line2,
            epoch,
            fetched_at,
            source,
        })
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.epoch
    }

    pub fn norad_id(&self) -> Option<u32> {
        self.line1.get(2..7).and_then(|s| s.trim().parse().ok())
    }
}

pub fn element_set_id(fetched_at: DateTime<Utc>) -> String {
    format!("tle-{}", fetched_at.timestamp())
}

/// Decode the epoch embedded in TLE line 1.
pub fn parse_epoch(line1: &str) -> Result<DateTime<Utc>, ResolveError> {
    let field = line1
        .get(EPOCH_COLUMNS)
        .ok_or_else(|| ResolveError::MalformedData("line 1 too short for epoch".into()))?
        .trim();

    let malformed = || ResolveError::MalformedData(format!("invalid epoch field '{}'", field));

    let two_digit_year: i32 = field.get(..2).and_then(|s| s.parse().ok()).ok_or_else(malformed)?;
    let day_of_year: f64 = field.get(2..).and_then(|s| s.parse().ok()).ok_or_else(malformed)?;
    if !(1.0..367.0).contains(&day_of_year) {
        return Err(malformed());
    }

    let year = if two_digit_year < CENTURY_PIVOT {
        2000 + two_digit_year
    } else {
        1900 + two_digit_year
    };

    let start_of_year = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(malformed)?;
    let offset_ms = ((day_of_year - 1.0) * 86_400_000.0).round() as i64;

    Ok(start_of_year + Duration::milliseconds(offset_ms))
}

/// Find the first TLE in `content`, with the optional name line preceding it.
fn find_tle_lines(content: &str) -> Option<(Option<String>, String, String)> {
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .windows(2)
        .position(|pair| pair[0].starts_with(LINE1_MARKER) && pair[1].starts_with(LINE2_MARKER))
        .map(|i| {
            let name = i
                .checked_sub(1)
                .map(|n| lines[n])
                .filter(|l| !l.starts_with(LINE1_MARKER) && !l.starts_with(LINE2_MARKER))
                .map(String::from);
            (name, lines[i].to_string(), lines[i + 1].to_string())
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    pub const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    pub fn iss() -> ElementSet {
        ElementSet::from_lines(
            Some("ISS (ZARYA)".into()),
            ISS_LINE1.into(),
            ISS_LINE2.into(),
            TleSource::Primary,
            Utc.with_ymd_and_hms(2008, 9, 20, 13, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn epoch_uses_century_pivot() {
        let epoch = parse_epoch(ISS_LINE1).unwrap();
        assert_eq!(epoch.format("%Y-%m-%d").to_string(), "2008-09-20");

        let old = ISS_LINE1.replacen("08264", "98264", 1);
        assert_eq!(parse_epoch(&old).unwrap().format("%Y").to_string(), "1998");

        let pivot = ISS_LINE1.replacen("08264", "57001", 1);
        assert_eq!(parse_epoch(&pivot).unwrap().format("%Y").to_string(), "1957");
    }

    #[test]
    fn fractional_day_becomes_time_of_day() {
        let line = ISS_LINE1.replacen("08264.51782528", "24001.50000000", 1);
        let epoch = parse_epoch(&line).unwrap();
        assert_eq!(epoch, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn finds_lines_inside_larger_body() {
        let body = format!(
            "<pre>\nISS (ZARYA)\n{}\n{}\nSOMETHING ELSE\n</pre>",
            ISS_LINE1, ISS_LINE2
        );
        let set = ElementSet::parse(&body, TleSource::Backup, Utc::now()).unwrap();
        assert_eq!(set.line1, ISS_LINE1);
        assert_eq!(set.line2, ISS_LINE2);
        assert_eq!(set.name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(set.norad_id(), Some(25544));
        assert_eq!(set.source, TleSource::Backup);
    }

    #[test]
    fn missing_line_two_is_malformed() {
        let err = ElementSet::parse(ISS_LINE1, TleSource::Primary, Utc::now()).unwrap_err();
        assert!(matches!(err, ResolveError::MalformedData(_)));
    }

    #[test]
    fn bad_checksum_is_malformed() {
        let broken = ISS_LINE2.replacen("563537", "563538", 1);
        let err = ElementSet::from_lines(
            None,
            ISS_LINE1.into(),
            broken,
            TleSource::Primary,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedData(_)));
    }
}
