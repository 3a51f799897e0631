use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default latitude margin in degrees.
pub const LATITUDE_MARGIN: f64 = 5.4;
/// Default longitude margin in degrees.
pub const LONGITUDE_MARGIN: f64 = 12.35;

/// Extent added around the outermost coordinates. Each coordinate is the
/// centre of a ground tile, so the margins are half a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            latitude: LATITUDE_MARGIN,
            longitude: LONGITUDE_MARGIN,
        }
    }
}

/// Geographic extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub east: f64,
    pub south: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, east: f64, south: f64, west: f64) -> Result<Self> {
        let bbox = Self {
            north,
            east,
            south,
            west,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Reads `longitude latitude [ignored...]` records from `path`.
    pub fn from_coordinate_file(path: &Path, padding: Padding) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Io {
            action: "open coordinate file",
            path: path.to_path_buf(),
            source,
        })?;
        let coords = read_coordinates(BufReader::new(file)).map_err(|source| Error::Io {
            action: "read coordinate file",
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), count = coords.len(), "read coordinates");
        Self::from_coordinates(&coords, padding)
    }

    /// Builds the padded box around `(longitude, latitude)` pairs.
    pub fn from_coordinates(coords: &[(f64, f64)], padding: Padding) -> Result<Self> {
        if coords.is_empty() {
            return Err(Error::Validation(
                "no coordinates to derive a bounding box from".to_string(),
            ));
        }

        let mut lons: Vec<f64> = coords.iter().map(|&(lon, _)| lon).collect();
        let mut lats: Vec<f64> = coords.iter().map(|&(_, lat)| lat).collect();
        lons.sort_by(f64::total_cmp);
        lats.sort_by(f64::total_cmp);

        // Both vectors have the same, non-zero length.
        let (west, east) = (lons[0], lons[lons.len() - 1]);
        let (south, north) = (lats[0], lats[lats.len() - 1]);

        Self::new(
            (north.ceil() + padding.latitude).min(90.0),
            (east.ceil() + padding.longitude).min(180.0),
            (south.floor() - padding.latitude).max(-90.0),
            (west.floor() - padding.longitude).max(-180.0),
        )
    }

    /// The `[north, west, south, east]` order expected by the `area` field.
    pub fn area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }

    fn validate(&self) -> Result<()> {
        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);
        let lon_ok = |v: f64| (-180.0..=180.0).contains(&v);
        if !(lat_ok(self.north) && lat_ok(self.south) && lon_ok(self.east) && lon_ok(self.west)) {
            return Err(Error::Validation(format!(
                "bounding box {:?} lies outside [-90, 90] x [-180, 180]",
                self
            )));
        }
        if self.south > self.north || self.west > self.east {
            return Err(Error::Validation(format!(
                "bounding box {:?} is inverted",
                self
            )));
        }
        Ok(())
    }
}

impl Serialize for BoundingBox {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.area().serialize(serializer)
    }
}

/// Collects coordinate pairs until the first line that does not start with two
/// finite numbers. The remainder of the input is not consumed.
fn read_coordinates<R: BufRead>(reader: R) -> std::io::Result<Vec<(f64, f64)>> {
    let mut coords = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(&line) {
            Some(pair) => coords.push(pair),
            None => {
                warn!(
                    line = idx + 1,
                    content = %line.trim(),
                    "unparseable coordinate record, ignoring it and the rest of the file"
                );
                break;
            }
        }
    }
    Ok(coords)
}

fn parse_record(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.split_whitespace();
    let lon: f64 = fields.next()?.parse().ok()?;
    let lat: f64 = fields.next()?.parse().ok()?;
    if lon.is_finite() && lat.is_finite() {
        Some((lon, lat))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::{Cursor, Write};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn pads_and_rounds_outward() {
        let bbox =
            BoundingBox::from_coordinates(&[(10.0, 50.0), (12.0, 48.0)], Padding::default())
                .unwrap();
        assert!(approx(bbox.north, 50.0 + 5.4));
        assert!(approx(bbox.south, 48.0 - 5.4));
        assert!(approx(bbox.east, 12.0 + 12.35));
        assert!(approx(bbox.west, 10.0 - 12.35));
        assert!(bbox.south <= bbox.north && bbox.west <= bbox.east);
    }

    #[test]
    fn fractional_coordinates_use_ceil_and_floor() {
        let bbox =
            BoundingBox::from_coordinates(&[(10.2, 50.1), (11.7, 47.9)], Padding::default())
                .unwrap();
        assert!(approx(bbox.north, 51.0 + 5.4));
        assert!(approx(bbox.south, 47.0 - 5.4));
        assert!(approx(bbox.east, 12.0 + 12.35));
        assert!(approx(bbox.west, 10.0 - 12.35));
    }

    #[test]
    fn clamps_at_the_poles_and_antimeridian() {
        let bbox =
            BoundingBox::from_coordinates(&[(179.5, 89.0), (-179.5, -88.0)], Padding::default())
                .unwrap();
        assert_eq!(bbox.north, 90.0);
        assert_eq!(bbox.south, -90.0);
        assert_eq!(bbox.east, 180.0);
        assert_eq!(bbox.west, -180.0);
    }

    #[test]
    fn custom_padding_is_honoured() {
        let padding = Padding {
            latitude: 1.0,
            longitude: 2.0,
        };
        let bbox = BoundingBox::from_coordinates(&[(0.0, 0.0)], padding).unwrap();
        assert_eq!(bbox.area(), [1.0, -2.0, -1.0, 2.0]);
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = BoundingBox::from_coordinates(&[], Padding::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn inverted_box_is_rejected() {
        assert!(BoundingBox::new(10.0, 5.0, 20.0, 0.0).is_err());
        assert!(BoundingBox::new(95.0, 5.0, 20.0, 0.0).is_err());
    }

    #[test]
    fn trailing_fields_are_ignored() {
        let input = "10.0 50.0 X0069_Y0042\n12.0\t48.0 extra fields\n";
        let coords = read_coordinates(Cursor::new(input)).unwrap();
        assert_eq!(coords, vec![(10.0, 50.0), (12.0, 48.0)]);
    }

    #[test]
    fn collection_stops_at_first_bad_record() {
        let input = "10.0 50.0\n\nlon lat\n12.0 48.0\n";
        let coords = read_coordinates(Cursor::new(input)).unwrap();
        assert_eq!(coords, vec![(10.0, 50.0)]);
    }

    #[test]
    fn non_finite_values_stop_collection() {
        let input = "NaN 50.0\n12.0 48.0\n";
        assert!(read_coordinates(Cursor::new(input)).unwrap().is_empty());
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10.0 50.0").unwrap();
        writeln!(file, "12.0 48.0").unwrap();
        let bbox = BoundingBox::from_coordinate_file(file.path(), Padding::default()).unwrap();
        assert!(approx(bbox.north, 55.4));
    }

    #[test]
    fn file_without_coordinates_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = BoundingBox::from_coordinate_file(file.path(), Padding::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn serializes_in_area_order() {
        let bbox = BoundingBox::new(60.0, 30.0, 40.0, -10.0).unwrap();
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[60.0,-10.0,40.0,30.0]");
    }
}
