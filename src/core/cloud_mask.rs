use crate::core::sensor::SensorProfile;
use crate::core::stage::Stage;
use crate::types::{is_valid, Band, EtResult, Image, NODATA};
use ndarray::{Array2, Zip};

/// True where the quality band flags cloud (or is itself nodata)
pub fn cloud_mask(image: &Image, profile: &SensorProfile) -> EtResult<Array2<bool>> {
    Stage::CloudMask.check(image)?;
    let quality = image.band(Band::Quality, Stage::CloudMask.name())?;
    let bit = profile.cloud_bit;

    Ok(quality.mapv(|q| {
        if !is_valid(q) || q < 0.0 {
            return true;
        }
        (q as u32 >> bit) & 1 == 1
    }))
}

/// Mark cloudy pixels as nodata in every band. Band count is unchanged.
pub fn apply_cloud_mask(mut image: Image, profile: &SensorProfile) -> EtResult<Image> {
    let mask = cloud_mask(&image, profile)?;
    let cloudy = mask.iter().filter(|m| **m).count();

    log::debug!(
        "{}: masking {} of {} pixels as cloud (bit {})",
        image.id,
        cloudy,
        mask.len(),
        profile.cloud_bit
    );

    if cloudy > 0 {
        for (band, data) in image.bands_mut() {
            if *band == Band::Quality {
                continue;
            }
            Zip::from(data).and(&mask).for_each(|value, &masked| {
                if masked {
                    *value = NODATA;
                }
            });
        }
    }

    Ok(image)
}
