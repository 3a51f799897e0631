use chrono::NaiveDate;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// `YYYYMMDD`, as used in output file names.
pub(crate) fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urljoin_keeps_absolute_locations() {
        assert_eq!(
            urljoin("https://ads/api/v2", "https://download.ads/cache/x.grib"),
            "https://download.ads/cache/x.grib"
        );
        assert_eq!(urljoin("https://ads/api/v2/", "/cache/x"), "https://ads/api/v2/cache/x");
        assert_eq!(urljoin("https://ads/api/v2", "cache/x"), "https://ads/api/v2/cache/x");
    }

    #[test]
    fn compact_date_has_no_separators() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 7).unwrap();
        assert_eq!(compact_date(d), "20210307");
    }
}
