use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::Value;

use crate::bbox::BoundingBox;
use crate::error::{Error, Result};
use crate::util::compact_date;

const ISO_DATE: &str = "%Y-%m-%d";

/// Inclusive calendar date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.format(ISO_DATE),
            self.end.format(ISO_DATE)
        )
    }
}

impl FromStr for DateRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| Error::Validation(format!("expected `start/end`, got `{}`", s)))?;
        let parse = |v: &str| {
            NaiveDate::parse_from_str(v.trim(), ISO_DATE)
                .map_err(|e| Error::Validation(format!("invalid date `{}`: {}", v, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

/// Nominal time of day of a model run, on the full hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SensingTime(NaiveTime);

impl SensingTime {
    pub fn from_hour(hour: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, 0, 0)
            .map(Self)
            .ok_or_else(|| Error::Validation(format!("invalid sensing hour {}", hour)))
    }
}

impl fmt::Display for SensingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Grib,
    NetCdf,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Grib => "grib",
            OutputFormat::NetCdf => "netcdf",
        }
    }
}

/// Which CAMS product is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductKind {
    /// EAC4 global reanalysis.
    Reanalysis,
    /// Global atmospheric composition forecast at the given lead times (hours).
    Forecast { leadtime_hours: Vec<u32> },
}

impl ProductKind {
    /// Resource name under `/resources/`.
    pub fn product_name(&self) -> &'static str {
        match self {
            ProductKind::Reanalysis => "cams-global-reanalysis-eac4",
            ProductKind::Forecast { .. } => "cams-global-atmospheric-composition-forecasts",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRequest {
    kind: ProductKind,
    variable: String,
    dates: DateRange,
    times: Vec<SensingTime>,
    format: OutputFormat,
    area: Option<BoundingBox>,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    variable: &'a str,
    time: Vec<String>,
    date: String,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    area: Option<&'a BoundingBox>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    leadtime_hour: Option<Vec<String>>,
}

impl ProductRequest {
    pub fn new(
        kind: ProductKind,
        variable: impl Into<String>,
        dates: DateRange,
        times: Vec<SensingTime>,
        format: OutputFormat,
    ) -> Result<Self> {
        let variable = variable.into();
        if variable.trim().is_empty() {
            return Err(Error::Validation("variable name is empty".to_string()));
        }
        // The name becomes part of the output file name.
        if variable.contains(['/', '\\']) || variable.contains("..") {
            return Err(Error::Validation(format!(
                "variable name {:?} must not contain path separators or '..'",
                variable
            )));
        }
        if times.is_empty() {
            return Err(Error::Validation(
                "at least one sensing time is required".to_string(),
            ));
        }
        if let ProductKind::Forecast { leadtime_hours } = &kind {
            if leadtime_hours.is_empty() {
                return Err(Error::Validation(
                    "forecast requests need at least one lead time".to_string(),
                ));
            }
        }
        Ok(Self {
            kind,
            variable,
            dates,
            times,
            format,
            area: None,
        })
    }

    /// Restricts the request to `area`.
    pub fn with_area(mut self, area: BoundingBox) -> Self {
        self.area = Some(area);
        self
    }

    pub fn kind(&self) -> &ProductKind {
        &self.kind
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn dates(&self) -> DateRange {
        self.dates
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn area(&self) -> Option<&BoundingBox> {
        self.area.as_ref()
    }

    /// Wire body for `POST /resources/{product}`; the key order is fixed.
    pub fn to_body(&self) -> Result<Value> {
        let (kind, leadtime_hour) = match &self.kind {
            ProductKind::Reanalysis => (None, None),
            ProductKind::Forecast { leadtime_hours } => (
                Some("forecast"),
                Some(leadtime_hours.iter().map(|h| h.to_string()).collect()),
            ),
        };
        let body = RequestBody {
            variable: &self.variable,
            time: self.times.iter().map(|t| t.to_string()).collect(),
            date: self.dates.to_string(),
            format: self.format.as_str(),
            area: self.area.as_ref(),
            kind,
            leadtime_hour,
        };
        serde_json::to_value(&body)
            .map_err(|e| Error::Validation(format!("failed to encode request: {}", e)))
    }

    /// `{output_dir}/{variable}_{start:YYYYMMDD}{end:YYYYMMDD}.{format}`
    pub fn destination(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!(
            "{}_{}{}.{}",
            self.variable,
            compact_date(self.dates.start),
            compact_date(self.dates.end),
            self.format.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january() -> DateRange {
        DateRange::new(date(2020, 1, 1), date(2020, 1, 31)).unwrap()
    }

    fn hours(hs: &[u32]) -> Vec<SensingTime> {
        hs.iter().map(|&h| SensingTime::from_hour(h).unwrap()).collect()
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let err = DateRange::new(date(2020, 2, 1), date(2020, 1, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn single_day_range_is_allowed() {
        assert!(DateRange::new(date(2020, 2, 1), date(2020, 2, 1)).is_ok());
    }

    #[test]
    fn date_range_round_trips_through_its_wire_form() {
        let range = DateRange::new(date(2003, 12, 31), date(2004, 2, 29)).unwrap();
        let text = range.to_string();
        assert_eq!(text, "2003-12-31/2004-02-29");
        assert_eq!(text.parse::<DateRange>().unwrap(), range);
    }

    #[test]
    fn date_range_parse_rejects_garbage() {
        assert!("2020-01-01".parse::<DateRange>().is_err());
        assert!("2020-01-01/2020-13-01".parse::<DateRange>().is_err());
        assert!("2020-02-01/2020-01-01".parse::<DateRange>().is_err());
    }

    #[test]
    fn sensing_time_formats_as_hh_mm() {
        assert_eq!(SensingTime::from_hour(3).unwrap().to_string(), "03:00");
        assert_eq!(SensingTime::from_hour(21).unwrap().to_string(), "21:00");
        assert!(SensingTime::from_hour(24).is_err());
    }

    #[test]
    fn reanalysis_body_without_area() {
        let req = ProductRequest::new(
            ProductKind::Reanalysis,
            "total_column_water_vapour",
            january(),
            hours(&[0, 12]),
            OutputFormat::Grib,
        )
        .unwrap();
        assert_eq!(req.kind().product_name(), "cams-global-reanalysis-eac4");
        assert_eq!(
            req.to_body().unwrap(),
            json!({
                "variable": "total_column_water_vapour",
                "time": ["00:00", "12:00"],
                "date": "2020-01-01/2020-01-31",
                "format": "grib",
            })
        );
    }

    #[test]
    fn forecast_body_carries_type_and_lead_times() {
        let area = BoundingBox::new(60.0, 30.0, 40.0, -10.0).unwrap();
        let req = ProductRequest::new(
            ProductKind::Forecast {
                leadtime_hours: vec![0, 24],
            },
            "total_aerosol_optical_depth_550nm",
            january(),
            hours(&[0]),
            OutputFormat::NetCdf,
        )
        .unwrap()
        .with_area(area);
        let body = req.to_body().unwrap();
        assert_eq!(body["type"], json!("forecast"));
        assert_eq!(body["leadtime_hour"], json!(["0", "24"]));
        assert_eq!(body["area"], json!([60.0, -10.0, 40.0, 30.0]));
        assert_eq!(body["format"], json!("netcdf"));
    }

    #[test]
    fn body_serialization_is_stable() {
        let req = ProductRequest::new(
            ProductKind::Reanalysis,
            "ozone",
            january(),
            hours(&[6]),
            OutputFormat::Grib,
        )
        .unwrap();
        let a = serde_json::to_string(&req.to_body().unwrap()).unwrap();
        let b = serde_json::to_string(&req.to_body().unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn forecast_without_lead_times_is_rejected() {
        let err = ProductRequest::new(
            ProductKind::Forecast {
                leadtime_hours: vec![],
            },
            "ozone",
            january(),
            hours(&[0]),
            OutputFormat::Grib,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_variable_or_times_are_rejected() {
        assert!(
            ProductRequest::new(ProductKind::Reanalysis, " ", january(), hours(&[0]), OutputFormat::Grib)
                .is_err()
        );
        assert!(
            ProductRequest::new(ProductKind::Reanalysis, "ozone", january(), vec![], OutputFormat::Grib)
                .is_err()
        );
    }

    #[test]
    fn variable_cannot_leave_the_output_directory() {
        for name in ["../../x", "a/b", "a\\b", "..", "ozone.."] {
            let err =
                ProductRequest::new(ProductKind::Reanalysis, name, january(), hours(&[0]), OutputFormat::Grib)
                    .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{name}");
        }
    }

    #[test]
    fn destination_uses_compact_dates() {
        let req = ProductRequest::new(
            ProductKind::Reanalysis,
            "total_column_water_vapour",
            january(),
            hours(&[0]),
            OutputFormat::Grib,
        )
        .unwrap();
        assert_eq!(
            req.destination(Path::new("/data/cams")),
            PathBuf::from("/data/cams/total_column_water_vapour_2020010120200131.grib")
        );
    }
}
