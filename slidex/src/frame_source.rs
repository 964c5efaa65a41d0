use std::{fmt, time::Duration};

use image::RgbImage;
use slidex_common::{bin_common::termination::Cookie, utils::percent::Percent64};

use crate::error::{Error, Result};

mod ffmpeg;
mod ffmpeg_log;

pub use self::ffmpeg::FfmpegDecoder;

/// The position of a frame among all decoded frames of a video, counting from zero.
/// Not the position among the sampled frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackIndex(pub u64);

impl fmt::Display for PlaybackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct FrameSample {
    pub index: PlaybackIndex,
    pub image: RgbImage,
}

/// The outcome of decoding one raw frame.
pub enum RawFrame {
    /// The frame, only produced if it was asked for.
    Kept(RgbImage),
    /// A frame was decoded but thrown away without being converted.
    Discarded,
    /// The frame at this position couldn't be decoded.
    Corrupt,
    /// There are no more frames.
    End,
}

/// Something that decodes a video one raw frame at a time.
pub trait Decode {
    fn frame_rate(&self) -> f64;

    /// Often only an estimate, don't rely on it to know when the video ends.
    fn frame_count(&self) -> Option<u64>;

    /// Decodes the next raw frame. The frame is only converted to an image if `keep`.
    fn advance(&mut self, keep: bool) -> Result<RawFrame>;
}

impl<D: Decode + ?Sized> Decode for Box<D> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn frame_count(&self) -> Option<u64> {
        (**self).frame_count()
    }

    fn advance(&mut self, keep: bool) -> Result<RawFrame> {
        (**self).advance(keep)
    }
}

/// Emits every `spacing`:th raw frame of a decoder, where `spacing` is the number of
/// raw frames in one stride of playback time.
pub struct FrameSource<D> {
    decoder: D,
    spacing: u64,
    position: u64,
    finished: bool,
    cookie: Cookie,
}

impl<D: Decode> FrameSource<D> {
    pub fn new(decoder: D, stride: Duration) -> Self {
        let spacing = sample_spacing(decoder.frame_rate(), stride);
        log::debug!(
            "Sampling every {spacing} frames ({} at {} fps)",
            humantime::Duration::from(stride),
            decoder.frame_rate()
        );
        Self {
            decoder,
            spacing,
            position: 0,
            finished: false,
            cookie: Cookie::detached(),
        }
    }

    /// Checks `cookie` before decoding each raw frame, not only at sample points.
    pub fn with_cookie(mut self, cookie: &Cookie) -> Self {
        self.cookie = cookie.clone();
        self
    }

    pub fn nominal_frame_rate(&self) -> f64 {
        self.decoder.frame_rate()
    }

    pub fn total_frame_count(&self) -> Option<u64> {
        self.decoder.frame_count()
    }

    pub fn sample_spacing(&self) -> u64 {
        self.spacing
    }

    /// How far into the video the source is, according to the frame count hint.
    pub fn progress(&self) -> Option<Percent64> {
        match self.decoder.frame_count() {
            Some(count) if count > 0 => Percent64::of(self.position as f64, count as f64)
                .ok()
                .map(|percent| percent.min(Percent64::HUNDRED)),
            _ => None,
        }
    }

    /// Returns `None` once the video is exhausted, and keeps doing so.
    pub fn next_sampled_frame(&mut self) -> Result<Option<FrameSample>> {
        while !self.finished {
            if self.cookie.is_terminating() {
                log::warn!(
                    "Termination signal received, stopped decoding at frame {}",
                    self.position
                );
                return Err(Error::Interrupted);
            }

            let position = self.position;
            let keep = position % self.spacing == 0;
            match self.decoder.advance(keep)? {
                RawFrame::End => self.finished = true,
                RawFrame::Corrupt => {
                    self.position += 1;
                    log::warn!("Skipping the unreadable frame at position {position}");
                }
                RawFrame::Discarded => self.position += 1,
                RawFrame::Kept(image) => {
                    self.position += 1;
                    if keep {
                        return Ok(Some(FrameSample {
                            index: PlaybackIndex(position),
                            image,
                        }));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// The number of raw frames between two samples, never less than one.
pub fn sample_spacing(frame_rate: f64, stride: Duration) -> u64 {
    let spacing = (frame_rate * stride.as_secs_f64()).floor();
    if spacing.is_finite() && spacing >= 1.0 {
        spacing as u64
    } else {
        1
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use image::Rgb;

    /// A decoder of generated frames where each frame is drawn by a closure.
    pub struct Synthetic<F> {
        pub fps: f64,
        pub frames: u64,
        pub corrupt: Vec<u64>,
        pub draw: F,
        pub position: u64,
        pub converted: u64,
    }

    impl<F: FnMut(u64) -> RgbImage> Synthetic<F> {
        pub fn new(fps: f64, frames: u64, draw: F) -> Self {
            Self {
                fps,
                frames,
                corrupt: vec![],
                draw,
                position: 0,
                converted: 0,
            }
        }
    }

    impl<F: FnMut(u64) -> RgbImage> Decode for Synthetic<F> {
        fn frame_rate(&self) -> f64 {
            self.fps
        }

        fn frame_count(&self) -> Option<u64> {
            Some(self.frames)
        }

        fn advance(&mut self, keep: bool) -> Result<RawFrame> {
            if self.position >= self.frames {
                return Ok(RawFrame::End);
            }
            let position = self.position;
            self.position += 1;

            if self.corrupt.contains(&position) {
                Ok(RawFrame::Corrupt)
            } else if keep {
                self.converted += 1;
                Ok(RawFrame::Kept((self.draw)(position)))
            } else {
                Ok(RawFrame::Discarded)
            }
        }
    }

    pub fn gray(level: u8) -> RgbImage {
        RgbImage::from_pixel(16, 16, Rgb([level, level, level]))
    }

    /// Requests termination while decoding raw frame `at`
    struct TerminateAt {
        at: u64,
        cookie: Cookie,
        position: u64,
        after_signal: u64,
    }

    impl Decode for TerminateAt {
        fn frame_rate(&self) -> f64 {
            30.0
        }

        fn frame_count(&self) -> Option<u64> {
            Some(9000)
        }

        fn advance(&mut self, keep: bool) -> Result<RawFrame> {
            if self.cookie.is_terminating() {
                self.after_signal += 1;
            }
            let position = self.position;
            self.position += 1;
            if position == self.at {
                self.cookie.terminate();
            }
            if keep {
                Ok(RawFrame::Kept(gray(0)))
            } else {
                Ok(RawFrame::Discarded)
            }
        }
    }

    fn indices<D: Decode>(source: &mut FrameSource<D>) -> Vec<u64> {
        let mut indices = vec![];
        while let Some(sample) = source.next_sampled_frame().unwrap() {
            indices.push(sample.index.0);
        }
        indices
    }

    #[test]
    fn spacing_multiplies_the_frame_rate() {
        assert_eq!(1500, sample_spacing(30.0, Duration::from_secs(50)));
        assert_eq!(12, sample_spacing(25.0, Duration::from_millis(500)));
        assert_eq!(29, sample_spacing(29.97, Duration::from_secs(1)));
    }

    #[test]
    fn spacing_is_at_least_one() {
        assert_eq!(1, sample_spacing(30.0, Duration::ZERO));
        assert_eq!(1, sample_spacing(0.5, Duration::from_secs(1)));
        assert_eq!(1, sample_spacing(f64::NAN, Duration::from_secs(1)));
    }

    #[test]
    fn samples_on_spacing() {
        let decoder = Synthetic::new(30.0, 9000, |_| gray(0));
        let mut source = FrameSource::new(decoder, Duration::from_secs(50));
        assert_eq!(1500, source.sample_spacing());
        assert_eq!(vec![0, 1500, 3000, 4500, 6000, 7500], indices(&mut source));
        assert_eq!(6, source.decoder.converted);
    }

    #[test]
    fn end_is_sticky() {
        let decoder = Synthetic::new(1.0, 2, |_| gray(0));
        let mut source = FrameSource::new(decoder, Duration::from_secs(1));
        assert_eq!(vec![0, 1], indices(&mut source));
        assert!(source.next_sampled_frame().unwrap().is_none());
        assert!(source.next_sampled_frame().unwrap().is_none());
    }

    #[test]
    fn empty_video() {
        let decoder = Synthetic::new(25.0, 0, |_| gray(0));
        let mut source = FrameSource::new(decoder, Duration::from_secs(1));
        assert!(source.next_sampled_frame().unwrap().is_none());
        assert_eq!(None, source.progress());
    }

    #[test]
    fn corrupt_frames_are_skipped() {
        let mut decoder = Synthetic::new(1.0, 10, |_| gray(0));
        decoder.corrupt = vec![3, 4];
        let mut source = FrameSource::new(decoder, Duration::from_secs(2));
        assert_eq!(vec![0, 2, 6, 8], indices(&mut source));
    }

    #[test]
    fn interrupted_between_samples() {
        let cookie = Cookie::detached();
        let decoder = TerminateAt {
            at: 2,
            cookie: cookie.clone(),
            position: 0,
            after_signal: 0,
        };
        let mut source = FrameSource::new(decoder, Duration::from_secs(50)).with_cookie(&cookie);

        assert_eq!(0, source.next_sampled_frame().unwrap().unwrap().index.0);
        assert!(matches!(
            source.next_sampled_frame(),
            Err(Error::Interrupted)
        ));
        assert!(source.decoder.after_signal <= 1);
        assert_eq!(3, source.decoder.position);
    }

    #[test]
    fn progress_follows_position() {
        let decoder = Synthetic::new(1.0, 4, |_| gray(0));
        let mut source = FrameSource::new(decoder, Duration::from_secs(2));
        assert_eq!(Some(Percent64::ZERO), source.progress());
        source.next_sampled_frame().unwrap();
        assert_eq!(Some(Percent64::new(25.0).unwrap()), source.progress());
        indices(&mut source);
        assert_eq!(Some(Percent64::HUNDRED), source.progress());
    }
}
