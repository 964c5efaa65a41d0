//! Turns a stream of sampled frames into one frame per slide.
//!
//! The detector holds a single candidate: the first frame seen of the slide currently
//! on screen. A sample that is at least `threshold` similar to the candidate belongs to
//! the same slide and is dropped, the candidate is *not* advanced, so slow fades are
//! measured against the start of the slide. A less similar sample means a new slide
//! started: the candidate is emitted and the sample takes its place. Whatever is held
//! when the video ends is emitted as well.

use std::time::Duration;

use slidex_common::{
    bin_common::termination::Cookie,
    similarity::{Similarity, Ssim, Threshold},
    utils::time::Every,
};

use crate::{
    error::{Error, Result},
    frame_source::{Decode, FrameSample, FrameSource},
};

pub struct ChangeDetector<S = Ssim> {
    similarity: S,
    threshold: Threshold,
    candidate: Option<FrameSample>,
}

impl ChangeDetector<Ssim> {
    pub fn new(threshold: Threshold) -> Self {
        Self::with_similarity(Ssim::default(), threshold)
    }
}

impl<S: Similarity> ChangeDetector<S> {
    pub fn with_similarity(similarity: S, threshold: Threshold) -> Self {
        Self {
            similarity,
            threshold,
            candidate: None,
        }
    }

    pub fn candidate(&self) -> Option<&FrameSample> {
        self.candidate.as_ref()
    }

    /// Returns the previous candidate if `sample` starts a new slide.
    pub fn feed(&mut self, sample: FrameSample) -> Option<FrameSample> {
        let Some(candidate) = &self.candidate else {
            log::debug!("First slide candidate at frame {}", sample.index);
            self.candidate = Some(sample);
            return None;
        };

        let score = self.similarity.score(&candidate.image, &sample.image);
        if self.threshold.is_same(score) {
            log::trace!(
                "Frame {} is the same slide as {} ({score:.3})",
                sample.index,
                candidate.index
            );
            return None;
        }

        log::debug!(
            "Frame {} starts a new slide, similarity to {} was {score:.3}",
            sample.index,
            candidate.index
        );
        self.candidate.replace(sample)
    }

    /// The end of the video. Returns the last slide, if any frame was fed at all.
    pub fn finish(self) -> Option<FrameSample> {
        self.candidate
    }

    /// Feeds every sample of `source` through the detector and hands each slide to
    /// `on_slide`, the last one included. Returns the number of slides.
    pub fn run<D, F>(
        mut self,
        source: &mut FrameSource<D>,
        cookie: &Cookie,
        mut on_slide: F,
    ) -> Result<usize>
    where
        D: Decode,
        F: FnMut(FrameSample) -> Result<()>,
    {
        let mut slides = 0;
        let mut log_every = Every::new(Duration::from_secs(1));

        while let Some(sample) = source.next_sampled_frame()? {
            if cookie.is_terminating() {
                log::warn!("Termination signal received, abandoning the sampling");
                return Err(Error::Interrupted);
            }

            if let Some(slide) = self.feed(sample) {
                on_slide(slide)?;
                slides += 1;
            }

            log_every.perform(|| match source.progress() {
                Some(percent) => log::info!("Sampled {percent} of the video"),
                None => log::info!("Found {slides} slides so far"),
            });
        }

        if let Some(slide) = self.finish() {
            on_slide(slide)?;
            slides += 1;
        }

        Ok(slides)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame_source::{
        test::{gray, Synthetic},
        PlaybackIndex,
    };
    use image::{Rgb, RgbImage};
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn noise(seed: u64) -> RgbImage {
        let mut rng = SmallRng::seed_from_u64(seed);
        RgbImage::from_fn(32, 32, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    fn thresholds() -> Vec<Threshold> {
        [0.01, 0.3, 0.5, 0.9, 0.99, 1.0]
            .into_iter()
            .map(|t| Threshold::new(t).unwrap())
            .collect()
    }

    fn detect<F>(threshold: Threshold, decoder: Synthetic<F>, stride: Duration) -> Vec<u64>
    where
        F: FnMut(u64) -> RgbImage,
    {
        detect_with(Ssim::default(), threshold, decoder, stride)
    }

    fn detect_with<S, F>(
        similarity: S,
        threshold: Threshold,
        decoder: Synthetic<F>,
        stride: Duration,
    ) -> Vec<u64>
    where
        S: Similarity,
        F: FnMut(u64) -> RgbImage,
    {
        let mut source = FrameSource::new(decoder, stride);
        let mut slides = vec![];
        let count = ChangeDetector::with_similarity(similarity, threshold)
            .run(&mut source, &Cookie::detached(), |slide| {
                slides.push(slide.index.0);
                Ok(())
            })
            .unwrap();
        assert_eq!(count, slides.len());
        slides
    }

    /// Scores by comparing the first pixel only
    struct FirstPixel;

    impl Similarity for FirstPixel {
        fn score(&self, a: &RgbImage, b: &RgbImage) -> f64 {
            let a = a.get_pixel(0, 0).0[0] as f64;
            let b = b.get_pixel(0, 0).0[0] as f64;
            1.0 - (a - b).abs() / 255.0
        }
    }

    fn sample(index: u64, level: u8) -> FrameSample {
        FrameSample {
            index: PlaybackIndex(index),
            image: gray(level),
        }
    }

    #[test]
    fn identical_frames_give_one_slide() {
        for threshold in thresholds() {
            for n in [1, 2, 7, 50] {
                let decoder = Synthetic::new(1.0, n, |_| noise(42));
                assert_eq!(
                    vec![0],
                    detect(threshold, decoder, Duration::from_secs(1)),
                    "{threshold} {n}"
                );
            }
        }
    }

    #[test]
    fn different_frames_are_all_slides() {
        for threshold in [0.5, 0.9, 0.99, 1.0] {
            let threshold = Threshold::new(threshold).unwrap();
            let decoder = Synthetic::new(2.0, 20, noise);
            assert_eq!(
                vec![0, 4, 8, 12, 16],
                detect(threshold, decoder, Duration::from_secs(2)),
                "{threshold}"
            );
        }
    }

    #[test]
    fn alternating_frames_are_all_slides_for_every_threshold() {
        // black and white score 0.0, below every valid threshold
        for threshold in thresholds() {
            let decoder =
                Synthetic::new(1.0, 6, |pos| gray(if pos % 2 == 0 { 0 } else { 255 }));
            assert_eq!(
                vec![0, 1, 2, 3, 4, 5],
                detect_with(FirstPixel, threshold, decoder, Duration::from_secs(1)),
                "{threshold}"
            );
        }
    }

    #[test]
    fn single_sample_is_emitted_at_the_end() {
        let decoder = Synthetic::new(30.0, 10, noise);
        assert_eq!(
            vec![0],
            detect(Threshold::DEFAULT, decoder, Duration::from_secs(50))
        );
    }

    #[test]
    fn empty_video_has_no_slides() {
        let decoder = Synthetic::new(30.0, 0, noise);
        assert!(detect(Threshold::DEFAULT, decoder, Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn holds_the_first_frame_of_a_slide() {
        let threshold = Threshold::new(0.9).unwrap();
        let mut detector = ChangeDetector::with_similarity(FirstPixel, threshold);
        assert!(detector.feed(sample(0, 0)).is_none());
        assert!(detector.feed(sample(10, 0)).is_none());
        assert_eq!(PlaybackIndex(0), detector.candidate().unwrap().index);

        let slide = detector.feed(sample(20, 255)).unwrap();
        assert_eq!(PlaybackIndex(0), slide.index);
        assert_eq!(PlaybackIndex(20), detector.candidate().unwrap().index);

        assert_eq!(PlaybackIndex(20), detector.finish().unwrap().index);
    }

    #[test]
    fn slow_fade_is_compared_to_the_start() {
        // Each step is within the threshold of the previous one, but not of the first.
        let threshold = Threshold::new(0.9).unwrap();
        let mut detector = ChangeDetector::with_similarity(FirstPixel, threshold);
        let mut emitted = vec![];
        for (i, level) in [0, 20, 40, 60, 80].into_iter().enumerate() {
            if let Some(slide) = detector.feed(sample(i as u64, level)) {
                emitted.push(slide.index.0);
            }
        }
        emitted.extend(detector.finish().map(|s| s.index.0));
        assert_eq!(vec![0, 2, 4], emitted);
    }

    #[test]
    fn slide_every_45_seconds() {
        // 30 fps, 5 minutes, a new slide every 45 seconds
        let decoder = Synthetic::new(30.0, 9000, |pos| noise(pos / (45 * 30)));
        let slides = detect(Threshold::DEFAULT, decoder, Duration::from_secs(50));
        assert!((5..=6).contains(&slides.len()), "{slides:?}");
        assert_eq!(0, slides[0]);
        assert!(slides.windows(2).all(|w| w[0] < w[1]));
        assert!(slides.iter().all(|i| i % 1500 == 0));
    }

    #[test]
    fn sink_errors_stop_the_run() {
        let decoder = Synthetic::new(1.0, 5, noise);
        let mut source = FrameSource::new(decoder, Duration::from_secs(1));
        let res = ChangeDetector::new(Threshold::DEFAULT).run(
            &mut source,
            &Cookie::detached(),
            |slide| Err(Error::write(format!("{}", slide.index), "disk full")),
        );
        assert!(matches!(res, Err(Error::WriteError { .. })));
    }

    #[test]
    fn interrupted() {
        let decoder = Synthetic::new(1.0, 5, noise);
        let mut source = FrameSource::new(decoder, Duration::from_secs(1));
        let cookie = Cookie::detached();
        cookie.terminate();
        let res = ChangeDetector::new(Threshold::DEFAULT).run(&mut source, &cookie, |_| Ok(()));
        assert!(matches!(res, Err(Error::Interrupted)));
    }
}
