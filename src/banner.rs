//! Banner synthesis: a sharp poster of the cover pasted over a blurred,
//! stretched slice of the same cover.
//!
//! Geometry is integer pixel arithmetic throughout. The poster width is
//! `540 * w / h` truncated toward zero (minimum 1). Both resizes use the
//! bilinear (`Triangle`) filter. The blur is a separable box filter with edge
//! clamping whose per-pass averages round to nearest. Given the same input
//! pixels the output is bit-for-bit reproducible.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageReader, Rgb, RgbImage};
use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::PipelineError;
use crate::http;
use crate::storage::ObjectStorage;

pub const POSTER_HEIGHT: u32 = 540;
pub const CANVAS_WIDTH: u32 = 1500;
pub const CANVAS_HEIGHT: u32 = 600;
pub const POSTER_OFFSET_X: i64 = 573;
pub const POSTER_OFFSET_Y: i64 = 30;
pub const CROP_LEFT_INSET: u32 = 5;
pub const BLUR_RADIUS: u32 = 30;
pub const MIN_COVER_EDGE: u32 = 50;
pub const JPEG_QUALITY: u8 = 90;

/// Written for both cover and banner when the source image is too small.
pub const NO_COVER_URL: &str = "https://pipedream-api.s3.us-east-2.amazonaws.com/icons/noCover.jpeg";

pub fn cover_key(record_id: &str) -> String {
    format!("book_covers/{record_id}.jpg")
}

pub fn banner_key(record_id: &str) -> String {
    format!("book_banners/{record_id}.jpg")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCover {
    pub image_url: String,
    pub validated: bool,
    pub width: u32,
    pub height: u32,
}

/// Public URLs written back to the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerAsset {
    pub cover_url: String,
    pub banner_url: String,
}

impl BannerAsset {
    pub fn no_cover() -> Self {
        Self {
            cover_url: NO_COVER_URL.to_owned(),
            banner_url: NO_COVER_URL.to_owned(),
        }
    }
}

/// Result of synthesis for one record.
///
/// Holds on to the downloaded scratch file; it is removed when the outcome
/// is dropped, which the pipeline does once the record is finished.
#[derive(Debug)]
pub struct BannerOutcome {
    pub cover: ResolvedCover,
    pub asset: BannerAsset,
    scratch: tempfile::TempPath,
}

impl BannerOutcome {
    pub fn scratch_path(&self) -> &Path {
        &self.scratch
    }

    pub fn is_no_cover(&self) -> bool {
        !self.cover.validated
    }
}

pub fn meets_min_size(width: u32, height: u32) -> bool {
    width >= MIN_COVER_EDGE && height >= MIN_COVER_EDGE
}

pub fn poster_size(width: u32, height: u32) -> (u32, u32) {
    if height == 0 {
        return (1, POSTER_HEIGHT);
    }
    let scaled = u64::from(POSTER_HEIGHT) * u64::from(width) / u64::from(height);
    let scaled = u32::try_from(scaled).unwrap_or(u32::MAX).max(1);
    (scaled, POSTER_HEIGHT)
}

/// Pure composition step. The input must already pass [`meets_min_size`].
pub fn compose_banner(cover: &RgbImage) -> RgbImage {
    let (width, height) = cover.dimensions();

    let poster = render_poster(cover);

    let top = height / 3;
    let bottom = 2 * height / 3;
    let crop_x = CROP_LEFT_INSET.min(width.saturating_sub(1));
    let crop = imageops::crop_imm(
        cover,
        crop_x,
        top,
        (width - crop_x).max(1),
        (bottom - top).max(1),
    )
    .to_image();
    let stretched = imageops::resize(&crop, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Triangle);
    let mut backdrop = box_blur(&stretched, BLUR_RADIUS);

    imageops::replace(&mut backdrop, &poster, POSTER_OFFSET_X, POSTER_OFFSET_Y);
    backdrop
}

/// Width of the poster that can land on the canvas right of the paste offset.
pub const POSTER_VISIBLE_WIDTH: u32 = CANVAS_WIDTH - POSTER_OFFSET_X as u32;

/// Scales the cover to [`POSTER_HEIGHT`]. A poster wider than the visible
/// strip is made from a proportional left crop, so the clipped part is never
/// resampled.
fn render_poster(cover: &RgbImage) -> RgbImage {
    let (width, height) = cover.dimensions();
    let (poster_w, poster_h) = poster_size(width, height);
    if poster_w <= POSTER_VISIBLE_WIDTH {
        return imageops::resize(cover, poster_w, poster_h, FilterType::Triangle);
    }

    let source_w = (u64::from(POSTER_VISIBLE_WIDTH) * u64::from(height))
        .div_ceil(u64::from(POSTER_HEIGHT));
    let source_w = u32::try_from(source_w).unwrap_or(width).clamp(1, width);
    let visible = imageops::crop_imm(cover, 0, 0, source_w, height).to_image();
    imageops::resize(&visible, POSTER_VISIBLE_WIDTH, poster_h, FilterType::Triangle)
}

/// Separable box blur; each output channel is the rounded mean of a
/// `(2r + 1)`-wide window, with edge pixels repeated past the border.
pub fn box_blur(image: &RgbImage, radius: u32) -> RgbImage {
    if radius == 0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let horizontal = blur_pass(image, radius, true);
    blur_pass(&horizontal, radius, false)
}

fn blur_pass(src: &RgbImage, radius: u32, horizontal: bool) -> RgbImage {
    let (width, height) = src.dimensions();
    let (lines, len) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    let radius = i64::from(radius);
    let window = (2 * radius + 1) as u64;
    let last = i64::from(len) - 1;
    let mut out = RgbImage::new(width, height);

    for line in 0..lines {
        let at = |i: i64| -> Rgb<u8> {
            let i = i.clamp(0, last) as u32;
            if horizontal {
                *src.get_pixel(i, line)
            } else {
                *src.get_pixel(line, i)
            }
        };

        let mut sums = [0_u64; 3];
        for i in -radius..=radius {
            let px = at(i);
            for (sum, value) in sums.iter_mut().zip(px.0) {
                *sum += u64::from(value);
            }
        }

        for i in 0..=last {
            let mean = sums.map(|sum| ((sum + window / 2) / window) as u8);
            if horizontal {
                out.put_pixel(i as u32, line, Rgb(mean));
            } else {
                out.put_pixel(line, i as u32, Rgb(mean));
            }

            let entering = at(i + radius + 1);
            let leaving = at(i - radius);
            for c in 0..3 {
                sums[c] = sums[c] + u64::from(entering.0[c]) - u64::from(leaving.0[c]);
            }
        }
    }

    out
}

pub fn encode_jpeg(image: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(image)
        .context("encode banner jpeg")?;
    Ok(encoded)
}

/// Decodes `bytes` and composes the banner, or `None` when the image is
/// below the size gate.
pub fn render_banner(bytes: &[u8]) -> anyhow::Result<Option<RgbImage>> {
    let decoded = image::load_from_memory(bytes).context("decode cover image")?;
    let rgb = decoded.to_rgb8();
    if !meets_min_size(rgb.width(), rgb.height()) {
        return Ok(None);
    }
    Ok(Some(compose_banner(&rgb)))
}

struct Download {
    bytes: Vec<u8>,
    image: RgbImage,
    scratch: tempfile::TempPath,
}

pub struct BannerSynthesizer {
    client: Client,
    placeholder_url: String,
    scratch_dir: Option<PathBuf>,
}

impl BannerSynthesizer {
    pub fn new(
        client: Client,
        placeholder_url: impl Into<String>,
        scratch_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            client,
            placeholder_url: placeholder_url.into(),
            scratch_dir,
        }
    }

    fn scratch_file(&self) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cover-").suffix(".img");
        match self.scratch_dir.as_deref() {
            Some(dir) => builder
                .tempfile_in(dir)
                .with_context(|| format!("create scratch file in {}", dir.display())),
            None => builder.tempfile().context("create scratch file"),
        }
    }

    fn download(&self, url: &str) -> anyhow::Result<Download> {
        let parsed = url::Url::parse(url).with_context(|| format!("parse image url {url}"))?;
        let bytes = http::get_bytes(&self.client, &parsed)?;

        let mut file = self.scratch_file()?;
        file.write_all(&bytes).context("write scratch image")?;
        file.flush().context("flush scratch image")?;
        let scratch = file.into_temp_path();

        let image = ImageReader::open(&scratch)
            .context("open scratch image")?
            .with_guessed_format()
            .context("guess image format")?
            .decode()
            .with_context(|| format!("decode image from {url}"))?
            .to_rgb8();

        Ok(Download {
            bytes,
            image,
            scratch,
        })
    }

    pub fn synthesize(
        &self,
        image_url: &str,
        record_id: &str,
        storage: &dyn ObjectStorage,
    ) -> Result<BannerOutcome, PipelineError> {
        let (source_url, download) = match self.download(image_url) {
            Ok(download) => (image_url.to_owned(), download),
            Err(first) => {
                tracing::warn!(
                    record_id,
                    url = image_url,
                    err = format!("{first:#}"),
                    "cover fetch failed; retrying with placeholder"
                );
                let download = self.download(&self.placeholder_url).map_err(|second| {
                    PipelineError::ImageUnusable {
                        url: self.placeholder_url.clone(),
                        reason: format!("{second:#} (after: {first:#})"),
                    }
                })?;
                (self.placeholder_url.clone(), download)
            }
        };

        let Download {
            bytes,
            image,
            scratch,
        } = download;
        let (width, height) = image.dimensions();

        if !meets_min_size(width, height) {
            tracing::info!(record_id, url = %source_url, width, height, "cover too small; using no-cover sentinel");
            return Ok(BannerOutcome {
                cover: ResolvedCover {
                    image_url: source_url,
                    validated: false,
                    width,
                    height,
                },
                asset: BannerAsset::no_cover(),
                scratch,
            });
        }

        let banner = compose_banner(&image);
        let banner_bytes = encode_jpeg(&banner).map_err(|err| PipelineError::ImageUnusable {
            url: source_url.clone(),
            reason: format!("{err:#}"),
        })?;

        let store = |payload: &[u8], key: String| {
            storage
                .store(payload, &key)
                .map_err(|err| PipelineError::Storage {
                    key,
                    reason: format!("{err:#}"),
                })
        };
        let cover_url = store(&bytes, cover_key(record_id))?;
        let banner_url = store(&banner_bytes, banner_key(record_id))?;

        tracing::info!(record_id, %cover_url, %banner_url, "stored cover and banner");
        Ok(BannerOutcome {
            cover: ResolvedCover {
                image_url: source_url,
                validated: true,
                width,
                height,
            },
            asset: BannerAsset {
                cover_url,
                banner_url,
            },
            scratch,
        })
    }
}
