use image::{
    imageops::{self, FilterType},
    GrayImage, RgbImage,
};

use super::Similarity;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = u8::MAX as f64;
const C1: f64 = (K1 * L) * (K1 * L);
const C2: f64 = (K2 * L) * (K2 * L);

/// Mean structural similarity over non-overlapping square windows of the luma channel.
/// Frames are downscaled first so that large videos stay cheap to compare.
#[derive(Clone, Copy, Debug)]
pub struct Ssim {
    window: u32,
    max_side: u32,
}

impl Default for Ssim {
    fn default() -> Self {
        Self {
            window: 8,
            max_side: 256,
        }
    }
}

impl Ssim {
    fn prepare(&self, img: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(img);
        let (w, h) = gray.dimensions();
        let longest = w.max(h);
        if longest <= self.max_side {
            return gray;
        }

        let new_w = ((w as u64 * self.max_side as u64) / longest as u64).max(1) as u32;
        let new_h = ((h as u64 * self.max_side as u64) / longest as u64).max(1) as u32;
        imageops::resize(&gray, new_w, new_h, FilterType::Triangle)
    }

    fn window_score(&self, a: &GrayImage, b: &GrayImage, x0: u32, y0: u32) -> f64 {
        let x1 = (x0 + self.window).min(a.width());
        let y1 = (y0 + self.window).min(a.height());

        let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for y in y0..y1 {
            for x in x0..x1 {
                let px = a.get_pixel(x, y).0[0] as f64;
                let py = b.get_pixel(x, y).0[0] as f64;
                sx += px;
                sy += py;
                sxx += px * px;
                syy += py * py;
                sxy += px * py;
            }
        }

        let n = ((x1 - x0) * (y1 - y0)) as f64;
        let mx = sx / n;
        let my = sy / n;
        let vx = sxx / n - mx * mx;
        let vy = syy / n - my * my;
        let cov = sxy / n - mx * my;

        ((2.0 * mx * my + C1) * (2.0 * cov + C2))
            / ((mx * mx + my * my + C1) * (vx + vy + C2))
    }
}

impl Similarity for Ssim {
    /// Frames of different dimensions are never similar.
    fn score(&self, a: &RgbImage, b: &RgbImage) -> f64 {
        if a.dimensions() != b.dimensions() {
            return 0.0;
        }
        if a.width() == 0 || a.height() == 0 {
            return 1.0;
        }

        let a = self.prepare(a);
        let b = self.prepare(b);

        let mut total = 0.0;
        let mut windows = 0usize;
        for y0 in (0..a.height()).step_by(self.window as usize) {
            for x0 in (0..a.width()).step_by(self.window as usize) {
                total += self.window_score(&a, &b, x0, y0);
                windows += 1;
            }
        }

        (total / windows as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::Rgb;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn noise(seed: u64, w: u32, h: u32) -> RgbImage {
        let mut rng = SmallRng::seed_from_u64(seed);
        RgbImage::from_fn(w, h, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    #[test]
    fn identical_is_one() {
        let img = noise(1, 64, 48);
        assert_eq!(1.0, Ssim::default().score(&img, &img.clone()));
    }

    #[test]
    fn noise_is_dissimilar() {
        let score = Ssim::default().score(&noise(1, 64, 48), &noise(2, 64, 48));
        assert!(score < 0.2, "{score}");
    }

    #[test]
    fn black_and_white_are_dissimilar() {
        let black = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        let white = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
        assert!(Ssim::default().score(&black, &white) < 0.01);
    }

    #[test]
    fn different_dimensions() {
        assert_eq!(
            0.0,
            Ssim::default().score(&noise(1, 10, 10), &noise(1, 10, 11))
        );
    }

    #[test]
    fn large_frames_are_downscaled() {
        let img = noise(3, 1280, 720);
        let ssim = Ssim::default();
        assert_eq!((256, 144), ssim.prepare(&img).dimensions());
        assert_eq!(1.0, ssim.score(&img, &img));
    }

    #[test]
    fn odd_sizes_use_partial_windows() {
        let img = noise(4, 13, 5);
        assert_eq!(1.0, Ssim::default().score(&img, &img));
    }
}
