//! Collects the persisted slides of a run into one PDF, one slide per page.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, ObjectId, Stream,
};
use rayon::prelude::*;
use slidex_common::utils::fsutils::{all_files, PartialFile};

use crate::{
    error::{Error, Result},
    frame_source::PlaybackIndex,
    sink::SlideName,
};

/// Finds all slides of `base` in `dir`, sorted by playback index.
pub fn find_slides(dir: impl AsRef<Path>, base: &str) -> Result<Vec<(PlaybackIndex, PathBuf)>> {
    let dir = dir.as_ref();
    let files: Vec<PathBuf> = all_files(dir)
        .map_err(|e| Error::io(format!("listing {}", dir.display()), e))?;

    let mut slides = Vec::new();
    for path in files {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        match SlideName::parse(base, file_name) {
            None => continue,
            Some(Ok(name)) => slides.push((name.index, path)),
            Some(Err(())) => return Err(Error::MalformedFilename { path }),
        }
    }

    if slides.is_empty() {
        return Err(Error::NoSlidesFound {
            dir: dir.to_owned(),
            base: base.to_string(),
        });
    }

    slides.sort_by_key(|(index, _)| *index);
    Ok(slides)
}

/// The PDF of all slides of `base` in `dir`, in playback order.
pub fn assemble(dir: impl AsRef<Path>, base: &str) -> Result<Vec<u8>> {
    let slides = find_slides(dir, base)?;
    log::info!("Assembling {} slides", slides.len());

    let pages: Vec<Page> = slides
        .par_iter()
        .map(|(_, path)| Page::read(path))
        .collect::<Result<_>>()?;

    let mut doc = PdfBuilder::new();
    for page in pages {
        doc.add_page(page)?;
    }
    doc.finish()
}

/// Like `assemble`, but writes the document to `out`, which only appears once it is
/// complete.
pub fn assemble_to_file(
    dir: impl AsRef<Path>,
    base: &str,
    out: impl AsRef<Path>,
) -> Result<PathBuf> {
    let out = out.as_ref();
    let bytes = assemble(dir, base)?;

    let partial = PartialFile::new(out).map_err(|e| Error::write(out, e))?;
    let mut file = fs::File::create(partial.path()).map_err(|e| Error::write(out, e))?;
    file.write_all(&bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::write(out, e))?;
    drop(file);

    let out = partial.commit().map_err(|e| Error::write(out, e))?;
    log::info!("Wrote {}", out.display());
    Ok(out)
}

/// A saved slide, its JPEG bytes are embedded as they are.
struct Page {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

impl Page {
    fn read(path: &Path) -> Result<Self> {
        let (width, height) = image::image_dimensions(path).map_err(|source| Error::Image {
            path: path.to_owned(),
            source,
        })?;
        let jpeg =
            fs::read(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;

        Ok(Self {
            width,
            height,
            jpeg,
        })
    }
}

struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// A page exactly as large as the image, one pixel per point.
    fn add_page(&mut self, page: Page) -> Result<()> {
        let width = i64::from(page.width);
        let height = i64::from(page.height);

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            page.jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0_i64.into(),
                        0_i64.into(),
                        height.into(),
                        0_i64.into(),
                        0_i64.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Slide".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0_i64.into(), 0_i64.into(), width.into(), height.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Slide" => image_id,
                },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| Error::Pdf(e.into()))?;
        Ok(bytes)
    }
}
