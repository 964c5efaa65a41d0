extern crate ffmpeg_next as ffmpeg;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use color_eyre::eyre::{self, Context};
use ffmpeg::codec::Context as CodecContext;
use ffmpeg::decoder::Video as DecoderVideo;
use ffmpeg::format::context::Input as FormatContext;
use ffmpeg::format::{input_with_dictionary, Pixel};
use ffmpeg::frame::Video as FrameVideo;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::context::Context as ScalingContext;
use ffmpeg::{Dictionary, Packet as CodecPacket};
use ffmpeg_sys_next::AV_TIME_BASE;
use image::RgbImage;

use super::{ffmpeg_log, Decode, RawFrame};
use crate::error::{Error, Result};

static FFMPEG_INITIALIZED: OnceLock<std::result::Result<(), ffmpeg::Error>> =
    OnceLock::new();

/// Decodes the best video stream of a file with ffmpeg. Everything ffmpeg allocated is
/// released when this is dropped.
pub struct FfmpegDecoder {
    path: PathBuf,

    ictx: FormatContext,
    decoder: DecoderVideo,
    converter: ScalingContext,

    video_stream_index: usize,
    orientation: Orientation,
    frame_rate: f64,
    frame_count: Option<u64>,
}

impl FfmpegDecoder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let res = Self::open_internal(path);
        ffmpeg_log::drain(path);
        res.map_err(|e| Error::UnreadableMedia {
            path: path.to_owned(),
            source: e.into(),
        })
    }

    fn open_internal(path: &Path) -> eyre::Result<Self> {
        if let Err(e) = FFMPEG_INITIALIZED.get_or_init(|| {
            ffmpeg::init()?;
            ffmpeg_log::install();
            Ok(())
        }) {
            return Err(e).wrap_err("Failed to initialize ffmpeg");
        }

        let options = {
            let mut options = Dictionary::new();
            options.set("analyzeduration", "10M");
            options.set("probesize", "5M");
            options
        };
        let mut ictx =
            input_with_dictionary(&path, options).wrap_err("Failed to open the file")?;

        let video = ictx
            .streams()
            .best(Type::Video)
            .ok_or(eyre::eyre!("No video stream"))?;
        let video_stream_index = video.index();

        let frame_rate = [video.avg_frame_rate(), video.rate()]
            .into_iter()
            .filter(|rate| rate.numerator() > 0 && rate.denominator() > 0)
            .map(f64::from)
            .find(|rate| rate.is_finite() && *rate > 0.0)
            .ok_or(eyre::eyre!("Does not have a frame rate"))?;

        let frame_count = match video.frames() {
            n if n > 0 => Some(n as u64),
            _ => estimate_frame_count(ictx.duration(), frame_rate),
        };

        let orientation = match get_orientation(&video) {
            Some(x) => x,
            None => {
                log::warn!("Got a weird orientation angle in {path:?}, ignoring");
                Orientation::Normal
            }
        };

        let decoder = CodecContext::from_parameters(video.parameters())
            .wrap_err("No codec found")?
            .decoder()
            .video()
            .wrap_err("No codec found, of type video (?)")?;

        let converter = pixel_converter(&decoder)?;

        ictx.streams_mut()
            .filter(|stream| stream.index() != video_stream_index)
            .for_each(|mut stream| stream_set_discard_all(&mut stream));

        Ok(Self {
            path: path.to_owned(),
            ictx,
            decoder,
            converter,
            video_stream_index,
            orientation,
            frame_rate,
            frame_count,
        })
    }

    fn advance_internal(&mut self, keep: bool) -> eyre::Result<RawFrame> {
        loop {
            let mut frame = FrameVideo::empty();
            // avcodec_receive_frame
            // https://ffmpeg.org/doxygen/trunk/group__lavc__decoding.html#ga11e6542c4e66d3028668788a1a74217c
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(self.convert(&frame, keep)),
                Err(ffmpeg::Error::Other {
                    errno: libc::EAGAIN,
                }) => (),
                Err(ffmpeg::Error::Eof) => return Ok(RawFrame::End),
                Err(e) => {
                    return Err(e).wrap_err("Decoder error when receiving a frame from it");
                }
            }

            loop {
                // http://ffmpeg.org/doxygen/trunk/group__lavf__decoding.html#ga4fdb3084415a82e3810de6ee60e46a61
                let mut packet = CodecPacket::empty();
                match packet.read(&mut self.ictx) {
                    Ok(()) if packet.stream() == self.video_stream_index => {
                        match self.decoder.send_packet(&packet) {
                            Ok(()) => break,
                            Err(e) => {
                                log::error!(
                                    "Failed to decode a packet of {:?}: {}",
                                    self.path,
                                    e
                                );
                                return Ok(RawFrame::Corrupt);
                            }
                        }
                    }
                    Ok(()) => continue,
                    Err(ffmpeg::Error::Eof) => {
                        self.decoder
                            .send_eof()
                            .wrap_err("Failed to send EOF to the decoder")?;
                        break;
                    }
                    Err(e) => {
                        eyre::bail!("Failed to read a packet from the stream: {e}");
                    }
                }
            }
        }
    }

    fn convert(&mut self, frame: &FrameVideo, keep: bool) -> RawFrame {
        if !keep {
            return RawFrame::Discarded;
        }

        let mut converted = FrameVideo::empty();
        if let Err(e) = self.converter.run(frame, &mut converted) {
            log::error!("Failed to convert a decoded frame of {:?}: {}", self.path, e);
            return RawFrame::Corrupt;
        }

        match create_rust_image(&converted) {
            Some(img) => RawFrame::Kept(undo_rotation(img, self.orientation)),
            None => {
                log::error!("A converted frame of {:?} has an odd layout", self.path);
                RawFrame::Corrupt
            }
        }
    }
}

impl Decode for FfmpegDecoder {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn advance(&mut self, keep: bool) -> Result<RawFrame> {
        let res = self.advance_internal(keep);
        ffmpeg_log::drain(&self.path);
        res.map_err(|e| Error::Decode {
            path: self.path.clone(),
            source: e.into(),
        })
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        ffmpeg_log::drain(&self.path);
    }
}

impl fmt::Debug for FfmpegDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegDecoder")
            .field("path", &self.path)
            .field("stream", &self.video_stream_index)
            .field("fps", &self.frame_rate)
            .field("frames", &self.frame_count)
            .finish()
    }
}

fn estimate_frame_count(duration: i64, frame_rate: f64) -> Option<u64> {
    if duration <= 0 {
        return None;
    }
    let seconds = duration as f64 / AV_TIME_BASE as f64;
    Some((seconds * frame_rate).round() as u64)
}

fn pixel_converter(decoder: &DecoderVideo) -> eyre::Result<ScalingContext> {
    eyre::ensure!(decoder.format() != Pixel::None, "No pixel format");
    Ok(ScalingContext::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        // http://git.videolan.org/?p=ffmpeg.git;a=blob;f=libavutil/pixfmt.h;hb=HEAD
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::Flags::FAST_BILINEAR,
    )?)
}

#[derive(Clone, Copy, Debug)]
enum Orientation {
    Normal,
    Left,
    Right,
    Upside,
}

fn get_orientation(video: &ffmpeg::Stream) -> Option<Orientation> {
    for data in video.side_data() {
        if data.kind() != ffmpeg::packet::side_data::Type::DisplayMatrix {
            continue;
        }
        let rot = unsafe {
            ffmpeg_sys_next::av_display_rotation_get(data.data().as_ptr() as *const i32)
        };

        if rot.is_finite() {
            return match rot.round() as i32 {
                -90 => Some(Orientation::Right),
                90 => Some(Orientation::Left),
                0 => Some(Orientation::Normal),
                180 | -180 => Some(Orientation::Upside),
                _ => None,
            };
        }
    }

    Some(Orientation::Normal)
}

fn undo_rotation(img: RgbImage, ori: Orientation) -> RgbImage {
    match ori {
        Orientation::Normal => img,
        Orientation::Right => image::imageops::rotate90(&img),
        Orientation::Left => image::imageops::rotate270(&img),
        Orientation::Upside => image::imageops::rotate180(&img),
    }
}

/// Copies an RGB24 frame into an image, dropping any row padding ffmpeg added.
fn create_rust_image(converted: &FrameVideo) -> Option<RgbImage> {
    if converted.format() != Pixel::RGB24 || converted.planes() != 1 {
        return None;
    }

    let width = converted.width();
    let height = converted.height();
    let src_linesize = converted.stride(0);
    let trg_linesize = 3 * width as usize;
    if src_linesize < trg_linesize {
        return None;
    }

    // https://stackoverflow.com/a/57666844
    let data = converted.data(0);
    let data = if src_linesize == trg_linesize {
        data.get(..trg_linesize * height as usize)?.to_vec()
    } else {
        let mut nopadding = Vec::with_capacity(trg_linesize * height as usize);
        for row in data.chunks(src_linesize).take(height as usize) {
            nopadding.extend_from_slice(row.get(..trg_linesize)?);
        }
        nopadding
    };

    RgbImage::from_vec(width, height, data)
}

fn stream_set_discard_all(stream: &mut ffmpeg::StreamMut<'_>) {
    unsafe {
        let ptr = stream.as_mut_ptr();
        if !ptr.is_null() {
            (*ptr).discard = ffmpeg_sys_next::AVDiscard::AVDISCARD_ALL;
        }
    }
}
