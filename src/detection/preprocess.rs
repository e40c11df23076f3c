use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Scales frames to the detector's input size and normalizes each channel.
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    mean: f32,
    scale: f32,
}

impl Preprocessor {
    /// `value = (pixel - mean) * scale` for every channel.
    pub fn new(target_width: u32, target_height: u32, mean: f32, scale: f32) -> Self {
        Self {
            target_width,
            target_height,
            mean,
            scale,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Shape of the result is `[1, 3, input_height, input_width]`.
    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] =
                    (pixel[channel] as f32 - self.mean) * self.scale;
            }
        }

        Ok(tensor)
    }
}
