use crate::types::{is_valid, EtError, EtResult, Raster, NODATA};

/// Median of the valid values, averaging the middle pair for even counts
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Per-pixel median over a stack of same-shaped rasters, ignoring nodata.
///
/// Pixels with no valid value in any layer stay nodata. The result does not
/// depend on layer order.
pub fn median_composite(layers: &[&Raster]) -> EtResult<Raster> {
    let first = layers
        .first()
        .ok_or_else(|| EtError::Processing("median composite of zero layers".to_string()))?;
    let shape = first.dim();

    if let Some(bad) = layers.iter().find(|layer| layer.dim() != shape) {
        return Err(EtError::ShapeMismatch {
            expected: shape,
            found: bad.dim(),
        });
    }

    log::debug!("Median composite of {} layers at {}x{}", layers.len(), shape.0, shape.1);

    let mut scratch = Vec::with_capacity(layers.len());
    Ok(Raster::from_shape_fn(shape, |idx| {
        scratch.clear();
        scratch.extend(layers.iter().map(|layer| layer[idx]).filter(|v| is_valid(*v)));
        median(&mut scratch).unwrap_or(NODATA)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_composite_ignores_nodata_and_outliers() {
        let a = array![[1.0f32, NODATA], [5.0, NODATA]];
        let b = array![[2.0f32, 7.0], [50.0, NODATA]];
        let c = array![[3.0f32, NODATA], [6.0, NODATA]];

        let out = median_composite(&[&a, &b, &c]).unwrap();
        assert_eq!(out, array![[2.0f32, 7.0], [6.0, NODATA]]);

        let reversed = median_composite(&[&c, &b, &a]).unwrap();
        assert_eq!(out, reversed);
    }

    #[test]
    fn test_composite_shape_mismatch() {
        let a = Raster::zeros((2, 2));
        let b = Raster::zeros((3, 2));
        assert!(matches!(
            median_composite(&[&a, &b]),
            Err(EtError::ShapeMismatch { .. })
        ));
        assert!(median_composite(&[]).is_err());
    }
}
