use std::path::{Path, PathBuf};

use image::{
    GrayImage,
    error::{ImageError, ParameterError, ParameterErrorKind},
};
use log::info;

use crate::{
    OrchestraErr, Result,
    data::{FEATURES, IMAGE_SIDE, PIXEL_MAX},
};

/// Writes one inference sample back out as a 28x28 grayscale image, for eyeballing.
#[derive(Debug, Clone)]
pub struct ImageDump {
    path: PathBuf,
    index: usize,
}

impl ImageDump {
    /// # Arguments
    /// * `path` - Where the image goes, its extension picks the format.
    /// * `index` - Zero based index of the sample to dump.
    pub fn new(path: impl Into<PathBuf>, index: usize) -> Self {
        Self {
            path: path.into(),
            index,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Denormalizes `features` (`v * 255`, truncated) and writes them as an image.
    ///
    /// Anything after the first 784 values, such as a trailing label column, is ignored.
    pub fn dump(&self, features: &[f32]) -> Result<()> {
        let image_err = |source| OrchestraErr::Image {
            path: self.path.clone(),
            source,
        };

        let pixels: Vec<u8> = features
            .iter()
            .take(FEATURES)
            .map(|&v| (v * PIXEL_MAX) as u8)
            .collect();

        let image = GrayImage::from_raw(IMAGE_SIDE, IMAGE_SIDE, pixels).ok_or_else(|| {
            image_err(ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            )))
        })?;

        image.save(&self.path).map_err(image_err)?;
        info!(index = self.index; "sample written to {}", self.path.display());
        Ok(())
    }

    /// Dumps `features` only if they belong to the configured sample.
    ///
    /// # Returns
    /// Whether the image was written.
    pub fn dump_if(&self, index: usize, features: &[f32]) -> Result<bool> {
        if index != self.index {
            return Ok(false);
        }

        self.dump(features)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_a_denormalized_square() {
        let dir = tempfile::tempdir().unwrap();
        let dump = ImageDump::new(dir.path().join("sample.png"), 16);
        let mut features = vec![0.0; FEATURES + 1];
        features[0] = 1.0;
        features[29] = 0.5;

        assert!(!dump.dump_if(3, &features).unwrap());
        assert!(!dump.path().exists());
        assert!(dump.dump_if(16, &features).unwrap());

        let image = image::open(dump.path()).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (28, 28));
        assert_eq!(image.get_pixel(0, 0).0, [255]);
        assert_eq!(image.get_pixel(1, 1).0, [127]);
        assert_eq!(image.get_pixel(2, 0).0, [0]);
    }

    #[test]
    fn short_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dump = ImageDump::new(dir.path().join("sample.png"), 0);

        let err = dump.dump(&[0.5; 10]).unwrap_err();
        assert!(matches!(err, OrchestraErr::Image { .. }));
    }
}
