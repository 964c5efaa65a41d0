//! Runs the stages in order: get the video onto disk, find and save its slides, merge
//! them into a document. A stage only starts once the previous one is completely done.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use slidex_common::{
    bin_common::{args::sampling::SamplingArgs, termination::Cookie},
    utils::fsutils,
};

use crate::{
    assembler,
    detector::ChangeDetector,
    error::{Error, Result},
    frame_source::{FfmpegDecoder, FrameSample, FrameSource},
    sink::SlideSink,
    transfer::{self, Locator, Session},
};

const DEFAULT_VIDEO_EXTENSION: &str = "mp4";
const DOCUMENT_EXTENSION: &str = "pdf";

/// What to process and where to put the results.
#[derive(Clone, Debug)]
pub struct SourceDescriptor {
    pub locator: Locator,
    pub dest_dir: PathBuf,
    pub base_name: String,
}

impl SourceDescriptor {
    /// Where a remote video is downloaded to
    pub fn download_path(&self) -> PathBuf {
        let ext = self
            .locator
            .extension()
            .unwrap_or_else(|| DEFAULT_VIDEO_EXTENSION.to_string());
        self.dest_dir.join(format!("{}.{ext}", self.base_name))
    }

    pub fn document_path(&self) -> PathBuf {
        self.dest_dir
            .join(format!("{}.{DOCUMENT_EXTENSION}", self.base_name))
    }
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub sampling: SamplingArgs,
    /// Remove the downloaded video afterwards. Local videos are never removed.
    pub remove_source: bool,
    pub merge: bool,
    pub chunk_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sampling: SamplingArgs::default(),
            remove_source: false,
            merge: true,
            chunk_size: transfer::CHUNK_SIZE,
        }
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub video: PathBuf,
    pub slides: usize,
    /// `None` if merging was disabled or there was nothing to merge
    pub document: Option<PathBuf>,
}

pub fn run(source: &SourceDescriptor, opts: &RunOptions, cookie: &Cookie) -> Result<Outcome> {
    fs::create_dir_all(&source.dest_dir).map_err(|e| {
        Error::io(format!("creating {}", source.dest_dir.display()), e)
    })?;

    let (video, downloaded) = materialize(source, opts, cookie)?;
    let slides = detect_slides(&video, source, &opts.sampling, cookie)?;
    log::info!("Found {slides} slides in {}", video.display());

    let document = if opts.merge {
        match assembler::assemble_to_file(
            &source.dest_dir,
            &source.base_name,
            source.document_path(),
        ) {
            Ok(doc) => Some(doc),
            Err(e @ Error::NoSlidesFound { .. }) => {
                log::warn!("Nothing to merge: {e}");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    if opts.remove_source && downloaded {
        log::info!("Removing {}", video.display());
        fsutils::remove_if_exists(&video)
            .map_err(|e| Error::io(format!("removing {}", video.display()), e))?;
    }

    Ok(Outcome {
        video,
        slides,
        document,
    })
}

/// Returns the path to a complete local copy of the video, and whether it was
/// downloaded. A download from an earlier run is reused.
pub fn materialize(
    source: &SourceDescriptor,
    opts: &RunOptions,
    cookie: &Cookie,
) -> Result<(PathBuf, bool)> {
    match &source.locator {
        Locator::Local(path) => Ok((path.clone(), false)),
        remote @ Locator::Remote(_) => {
            let dest = source.download_path();
            if dest.is_file() {
                log::info!("Reusing the earlier download at {}", dest.display());
                return Ok((dest, true));
            }

            let session = Session::open(remote)?;
            let path = transfer::download(session, &dest, opts.chunk_size, cookie)?;
            Ok((path, true))
        }
    }
}

/// Samples `video` and saves every slide, replacing the slides of an earlier run.
/// Detection and writing run on separate threads; both are joined before this returns.
pub fn detect_slides(
    video: &Path,
    source: &SourceDescriptor,
    sampling: &SamplingArgs,
    cookie: &Cookie,
) -> Result<usize> {
    let sink = SlideSink::new(&source.dest_dir, &source.base_name);
    sink.clear()?;
    let stride = sampling.stride_duration();
    let threshold = sampling.similarity_threshold();

    let (tx, rx) = mpsc::sync_channel::<FrameSample>(4);

    thread::scope(|s| {
        let detector = thread::Builder::new()
            .name("detect".into())
            .spawn_scoped(s, move || -> Result<usize> {
                let decoder = FfmpegDecoder::open(video)?;
                let mut frames = FrameSource::new(decoder, stride).with_cookie(cookie);
                log::info!(
                    "Sampling {} at {} fps, about {} frames",
                    video.display(),
                    frames.nominal_frame_rate(),
                    frames
                        .total_frame_count()
                        .map_or_else(|| "?".to_string(), |n| n.to_string())
                );

                ChangeDetector::new(threshold).run(&mut frames, cookie, |slide| {
                    tx.send(slide).map_err(|_| {
                        Error::io(
                            "handing a slide to the writer",
                            io::Error::new(io::ErrorKind::BrokenPipe, "the writer stopped"),
                        )
                    })
                })
            })
            .map_err(|e| Error::io("spawning the detector thread", e))?;

        let writer = thread::Builder::new()
            .name("write".into())
            .spawn_scoped(s, move || -> Result<usize> {
                let mut written = 0;
                for slide in rx {
                    sink.persist(&slide)?;
                    written += 1;
                }
                Ok(written)
            })
            .map_err(|e| Error::io("spawning the writer thread", e))?;

        let detected = detector
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let written = writer
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        // A failed writer makes the detector fail too, report the cause.
        let written = written?;
        let detected = detected?;
        debug_assert_eq!(detected, written);
        Ok(written)
    })
}
