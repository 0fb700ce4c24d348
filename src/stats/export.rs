//! CSV dumps of histogram and regression data for offline inspection.
//! Write-only: nothing here is read back.

use crate::errors::QuantResult;
use crate::stats::distribution::HistogramBucket;
use std::io::Write;

/// One `x,y` row per point.
pub fn write_xy<W: Write>(out: W, points: &[(f64, f64)]) -> QuantResult<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    for &(x, y) in points {
        wtr.serialize((x, y))?;
    }
    wtr.flush()?;
    Ok(())
}

/// One `index,x,y` row per point.
pub fn write_indexed_xy<W: Write>(out: W, points: &[(f64, f64)]) -> QuantResult<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    for (i, &(x, y)) in points.iter().enumerate() {
        wtr.serialize((i, x, y))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Bucket midpoint against density.
pub fn histogram_points(buckets: &[HistogramBucket]) -> Vec<(f64, f64)> {
    buckets.iter().map(|b| (b.midpoint(), b.density)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xy_rows() {
        let mut buf = Vec::new();
        write_xy(&mut buf, &[(1.0, 2.5), (3.0, -4.0)]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1.0,2.5\n3.0,-4.0\n");
    }

    #[test]
    fn test_indexed_rows() {
        let mut buf = Vec::new();
        write_indexed_xy(&mut buf, &[(0.5, 1.0), (1.5, 2.0)]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "0,0.5,1.0\n1,1.5,2.0\n");
    }

    #[test]
    fn test_histogram_points_use_midpoints() {
        let buckets = [HistogramBucket {
            lower: 0.0,
            upper: 2.0,
            count: 4,
            density: 0.5,
        }];
        assert_eq!(histogram_points(&buckets), vec![(1.0, 0.5)]);
    }
}
