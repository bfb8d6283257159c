//! The filter chain: parse a specification string into typed filters and
//! run them over a page image, left to right.
//!
//! ```
//! use pdf_optimizer::filters::{Filter, FilterChain};
//!
//! let chain = FilterChain::parse("enhance_text, sharpen(kernel=3), no_such_filter").unwrap();
//! assert_eq!(chain.len(), 2); // unknown names are skipped
//! assert_eq!(chain.filters()[1], Filter::Sharpen { kernel: 3 });
//! assert_eq!(chain.to_string(), "enhance_text(factor=2.0), sharpen(kernel=3)");
//! ```

pub mod literal;
pub mod ops;
pub mod spec;
pub mod upscale;

pub use literal::Literal;
pub use spec::{parse_steps, FilterStep};
pub use upscale::{
    resolve_super_resolver, CommandUpscaler, SuperResolveError, SuperResolver, UPSCALE_FACTOR,
};

use crate::error::OptimizerError;
use image::{DynamicImage, RgbImage};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Names accepted in a specification string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    EnhanceText,
    MedianFilt,
    BilateralFilt,
    GaussianBlur,
    Sharpen,
    ConvFilt,
    SuperResolve,
}

impl FilterKind {
    pub const ALL: [FilterKind; 7] = [
        FilterKind::EnhanceText,
        FilterKind::MedianFilt,
        FilterKind::BilateralFilt,
        FilterKind::GaussianBlur,
        FilterKind::Sharpen,
        FilterKind::ConvFilt,
        FilterKind::SuperResolve,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::EnhanceText => "enhance_text",
            FilterKind::MedianFilt => "median_filt",
            FilterKind::BilateralFilt => "bilateral_filt",
            FilterKind::GaussianBlur => "gaussian_blur",
            FilterKind::Sharpen => "sharpen",
            FilterKind::ConvFilt => "conv_filt",
            FilterKind::SuperResolve => "super_resolve",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// One filter with its parameters resolved and validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Contrast boost around the mean luminance.
    EnhanceText { factor: f32 },
    /// Median blur; `ksize` is odd.
    MedianBlur { ksize: u32 },
    /// Edge-preserving denoise.
    Bilateral {
        d: u32,
        sigma_color: f32,
        sigma_space: f32,
    },
    /// `sigma <= 0` derives sigma from `ksize`.
    GaussianBlur { ksize: u32, sigma: f32 },
    /// One of [`ops::SHARPEN_KERNELS`], 1-based.
    Sharpen { kernel: u8 },
    /// Fixed speckle-removal convolution.
    ConvFilter,
    /// 4× upscale through a [`SuperResolver`].
    SuperResolve,
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::EnhanceText { .. } => FilterKind::EnhanceText,
            Filter::MedianBlur { .. } => FilterKind::MedianFilt,
            Filter::Bilateral { .. } => FilterKind::BilateralFilt,
            Filter::GaussianBlur { .. } => FilterKind::GaussianBlur,
            Filter::Sharpen { .. } => FilterKind::Sharpen,
            Filter::ConvFilter => FilterKind::ConvFilt,
            Filter::SuperResolve => FilterKind::SuperResolve,
        }
    }

    /// Type-check a parsed step. `Ok(None)` for an unrecognised name.
    pub fn from_step(step: &FilterStep) -> Result<Option<Self>, OptimizerError> {
        let Some(kind) = FilterKind::from_name(&step.name) else {
            return Ok(None);
        };
        let mut p = Params::new(kind, &step.params);

        let filter = match kind {
            FilterKind::EnhanceText => Filter::EnhanceText {
                factor: p.float("factor", 2.0)?,
            },
            FilterKind::MedianFilt => Filter::MedianBlur {
                ksize: p.odd("ksize", 5)?,
            },
            FilterKind::BilateralFilt => Filter::Bilateral {
                d: p.positive("d", 9)?,
                sigma_color: p.non_negative("sigmaColor", 75.0)?,
                sigma_space: p.non_negative("sigmaSpace", 75.0)?,
            },
            FilterKind::GaussianBlur => Filter::GaussianBlur {
                ksize: p.odd("ksize", 3)?,
                sigma: p.non_negative("sigma", 0.0)?,
            },
            FilterKind::Sharpen => {
                let kernel = p.int("kernel", 1)?;
                if !(1..=ops::SHARPEN_KERNELS.len() as i64).contains(&kernel) {
                    return Err(OptimizerError::invalid_param(
                        kind.name(),
                        "kernel",
                        format!("must be 1-{}, got {kernel}", ops::SHARPEN_KERNELS.len()),
                    ));
                }
                Filter::Sharpen {
                    kernel: kernel as u8,
                }
            }
            FilterKind::ConvFilt => Filter::ConvFilter,
            FilterKind::SuperResolve => Filter::SuperResolve,
        };

        p.finish()?;
        Ok(Some(filter))
    }

    /// Apply this filter to one RGB page.
    pub fn apply(&self, img: RgbImage, upscaler: Option<&dyn SuperResolver>) -> RgbImage {
        match *self {
            Filter::EnhanceText { factor } => ops::enhance_contrast(&img, factor),
            Filter::MedianBlur { ksize } => ops::median_blur(&img, ksize),
            Filter::Bilateral {
                d,
                sigma_color,
                sigma_space,
            } => ops::bilateral(&img, d, sigma_color, sigma_space),
            Filter::GaussianBlur { ksize, sigma } => ops::gaussian_blur(&img, ksize, sigma),
            Filter::Sharpen { kernel } => {
                ops::convolve3x3(&img, &ops::SHARPEN_KERNELS[usize::from(kernel) - 1])
            }
            Filter::ConvFilter => ops::convolve3x3(&img, &ops::SPECKLE_KERNEL),
            Filter::SuperResolve => super_resolve(img, upscaler),
        }
    }
}

fn super_resolve(img: RgbImage, upscaler: Option<&dyn SuperResolver>) -> RgbImage {
    let Some(backend) = upscaler else {
        warn!("super_resolve: no backend configured, page passed through");
        return img;
    };
    match backend.upscale(&img) {
        Ok(upscaled) => {
            debug!(
                "super_resolve via {}: {}x{} -> {}x{}",
                backend.name(),
                img.width(),
                img.height(),
                upscaled.width(),
                upscaled.height()
            );
            upscaled
        }
        Err(e) => {
            warn!("super_resolve via {} failed, page passed through: {}", backend.name(), e);
            img
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind().name();
        match *self {
            Filter::EnhanceText { factor } => write!(f, "{name}(factor={})", Literal::Float(factor.into())),
            Filter::MedianBlur { ksize } => write!(f, "{name}(ksize={ksize})"),
            Filter::Bilateral {
                d,
                sigma_color,
                sigma_space,
            } => write!(
                f,
                "{name}(d={d}, sigmaColor={}, sigmaSpace={})",
                Literal::Float(sigma_color.into()),
                Literal::Float(sigma_space.into())
            ),
            Filter::GaussianBlur { ksize, sigma } => {
                write!(f, "{name}(ksize={ksize}, sigma={})", Literal::Float(sigma.into()))
            }
            Filter::Sharpen { kernel } => write!(f, "{name}(kernel={kernel})"),
            Filter::ConvFilter | Filter::SuperResolve => f.write_str(name),
        }
    }
}

/// Keyword arguments of one step, consumed as the filter reads them.
struct Params<'a> {
    kind: FilterKind,
    entries: Vec<&'a (String, Literal)>,
}

impl<'a> Params<'a> {
    fn new(kind: FilterKind, entries: &'a [(String, Literal)]) -> Self {
        Self {
            kind,
            entries: entries.iter().collect(),
        }
    }

    fn take(&mut self, key: &str) -> Option<&'a Literal> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(&self.entries.remove(pos).1)
    }

    fn err(&self, key: &str, reason: String) -> OptimizerError {
        OptimizerError::invalid_param(self.kind.name(), key, reason)
    }

    fn float(&mut self, key: &str, default: f32) -> Result<f32, OptimizerError> {
        match self.take(key) {
            None => Ok(default),
            Some(v) => {
                let f = v
                    .as_f64()
                    .ok_or_else(|| self.err(key, format!("expected a number, got {} {v}", v.type_name())))?
                    as f32;
                if !f.is_finite() {
                    return Err(self.err(key, format!("must be a finite f32, got {v}")));
                }
                Ok(f)
            }
        }
    }

    fn non_negative(&mut self, key: &str, default: f32) -> Result<f32, OptimizerError> {
        let v = self.float(key, default)?;
        if v < 0.0 {
            return Err(self.err(key, format!("must be >= 0, got {v}")));
        }
        Ok(v)
    }

    fn int(&mut self, key: &str, default: i64) -> Result<i64, OptimizerError> {
        match self.take(key) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .ok_or_else(|| self.err(key, format!("expected an integer, got {} {v}", v.type_name()))),
        }
    }

    fn positive(&mut self, key: &str, default: u32) -> Result<u32, OptimizerError> {
        let v = self.int(key, i64::from(default))?;
        u32::try_from(v)
            .ok()
            .filter(|&v| v >= 1)
            .ok_or_else(|| self.err(key, format!("must be a positive integer, got {v}")))
    }

    fn odd(&mut self, key: &str, default: u32) -> Result<u32, OptimizerError> {
        let v = self.positive(key, default)?;
        if v % 2 == 0 {
            return Err(self.err(key, format!("must be odd, got {v}")));
        }
        Ok(v)
    }

    fn finish(self) -> Result<(), OptimizerError> {
        match self.entries.first() {
            None => Ok(()),
            Some((key, _)) => Err(self.err(key, "unexpected parameter".into())),
        }
    }
}

/// An ordered list of filters, applied left to right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    /// Parse a specification, skipping unknown filter names with a warning.
    pub fn parse(spec: &str) -> Result<Self, OptimizerError> {
        Self::parse_with(spec, false)
    }

    /// Parse a specification, rejecting unknown filter names.
    pub fn parse_strict(spec: &str) -> Result<Self, OptimizerError> {
        Self::parse_with(spec, true)
    }

    pub fn parse_with(spec: &str, strict: bool) -> Result<Self, OptimizerError> {
        let mut filters = Vec::new();
        for step in parse_steps(spec)? {
            match Filter::from_step(&step)? {
                Some(filter) => filters.push(filter),
                None if strict => return Err(OptimizerError::UnknownFilter { name: step.name }),
                None => warn!("Skipping unknown filter '{}'", step.name),
            }
        }
        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// `true` when the chain will call a super-resolution backend.
    pub fn needs_upscaler(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, Filter::SuperResolve))
    }

    /// Run every filter in order. An empty chain returns the input as-is;
    /// otherwise the page is worked on (and returned) as 8-bit RGB.
    pub fn apply(&self, image: &DynamicImage, upscaler: Option<&dyn SuperResolver>) -> DynamicImage {
        if self.filters.is_empty() {
            return image.clone();
        }
        let rgb = self
            .filters
            .iter()
            .fold(image.to_rgb8(), |img, filter| filter.apply(img, upscaler));
        DynamicImage::ImageRgb8(rgb)
    }
}

impl FromStr for FilterChain {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{filter}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Checkerboard with single-pixel cells: as high-frequency as it gets.
    fn checker(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([40, 40, 40])
            } else {
                Rgb([200, 200, 200])
            }
        }))
    }

    /// Flat grey page with one slightly brighter dot.
    fn dot_page() -> DynamicImage {
        let mut img = RgbImage::from_pixel(9, 9, Rgb([100, 100, 100]));
        img.put_pixel(4, 4, Rgb([120, 120, 120]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn defaults_match_the_documented_vocabulary() {
        let chain = FilterChain::parse(
            "enhance_text, median_filt, bilateral_filt, gaussian_blur, sharpen, conv_filt, super_resolve",
        )
        .unwrap();
        assert_eq!(
            chain.filters(),
            &[
                Filter::EnhanceText { factor: 2.0 },
                Filter::MedianBlur { ksize: 5 },
                Filter::Bilateral {
                    d: 9,
                    sigma_color: 75.0,
                    sigma_space: 75.0
                },
                Filter::GaussianBlur { ksize: 3, sigma: 0.0 },
                Filter::Sharpen { kernel: 1 },
                Filter::ConvFilter,
                Filter::SuperResolve,
            ]
        );
    }

    #[test]
    fn keyword_overrides_and_coercion() {
        let chain =
            FilterChain::parse("enhance_text(factor=3), median_filt(ksize=3.0), gaussian_blur(sigma=1.5)")
                .unwrap();
        assert_eq!(chain.filters()[0], Filter::EnhanceText { factor: 3.0 });
        assert_eq!(chain.filters()[1], Filter::MedianBlur { ksize: 3 });
        assert_eq!(chain.filters()[2], Filter::GaussianBlur { ksize: 3, sigma: 1.5 });
    }

    #[test]
    fn unknown_names_are_skipped_unless_strict() {
        let chain = FilterChain::parse("enhance, sharpen(kernel=2), denoise").unwrap();
        assert_eq!(chain.filters(), &[Filter::Sharpen { kernel: 2 }]);

        let err = FilterChain::parse_strict("enhance, sharpen").unwrap_err();
        assert!(matches!(err, OptimizerError::UnknownFilter { ref name } if name == "enhance"));
    }

    #[test]
    fn bad_parameters_are_rejected() {
        for spec in [
            "sharpen(kernel=0)",
            "sharpen(kernel=6)",
            "sharpen(kernel=2.5)",
            "median_filt(ksize=4)",
            "median_filt(ksize=-1)",
            "enhance_text(factor='high')",
            "enhance_text(strength=2)",
            "bilateral_filt(sigmaColor=-1)",
            "conv_filt(size=3)",
            "enhance_text(factor=1e300)",
            "enhance_text(factor=-1e39)",
            "gaussian_blur(sigma=1e300)",
            "bilateral_filt(sigmaSpace=1e40)",
        ] {
            let err = FilterChain::parse(spec).unwrap_err();
            assert!(
                matches!(err, OptimizerError::InvalidFilterParam { .. }),
                "{spec}: {err:?}"
            );
        }
    }

    #[test]
    fn empty_and_unknown_chains_are_pixel_identical() {
        let img = checker(9, 7);
        for spec in ["", " , ", "nothing, at_all(x=1)"] {
            let chain = FilterChain::parse(spec).unwrap();
            assert!(chain.is_empty());
            assert_eq!(chain.apply(&img, None), img, "{spec:?}");
        }
    }

    #[test]
    fn order_follows_the_text() {
        let img = checker(12, 12);
        let a = FilterChain::parse("sharpen, gaussian_blur").unwrap().apply(&img, None);
        let b = FilterChain::parse("gaussian_blur, sharpen").unwrap().apply(&img, None);
        assert_ne!(a, b);
    }

    #[test]
    fn sharpen_kernel_selection_changes_output() {
        let img = dot_page();
        let k1 = FilterChain::parse("sharpen(kernel=1)").unwrap().apply(&img, None);
        let k3 = FilterChain::parse("sharpen(kernel=3)").unwrap().apply(&img, None);
        // 9*120 - 8*100 saturates; 6*120 - 0.5*400 - 0.75*400 = 220
        assert_eq!(k1.to_rgb8().get_pixel(4, 4).0, [255, 255, 255]);
        assert_eq!(k3.to_rgb8().get_pixel(4, 4).0, [220, 220, 220]);
    }

    #[test]
    fn enhance_text_raises_contrast() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgb([90, 90, 90])
            } else {
                Rgb([160, 160, 160])
            }
        }));
        let out = FilterChain::parse("enhance_text").unwrap().apply(&img, None).to_rgb8();
        let spread = |im: &RgbImage| i32::from(im.get_pixel(7, 0).0[0]) - i32::from(im.get_pixel(0, 0).0[0]);
        assert!(spread(&out) > spread(&img.to_rgb8()));
    }

    #[test]
    fn output_is_rgb8_for_non_rgb_input() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([128])));
        let out = FilterChain::parse("conv_filt").unwrap().apply(&gray, None);
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
    }

    struct Failing(AtomicUsize);
    impl SuperResolver for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn upscale(&self, _: &RgbImage) -> Result<RgbImage, SuperResolveError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(SuperResolveError::Backend("no GPU".into()))
        }
    }

    struct Nearest;
    impl SuperResolver for Nearest {
        fn name(&self) -> &str {
            "nearest"
        }
        fn upscale(&self, img: &RgbImage) -> Result<RgbImage, SuperResolveError> {
            Ok(image::imageops::resize(
                img,
                img.width() * UPSCALE_FACTOR,
                img.height() * UPSCALE_FACTOR,
                image::imageops::FilterType::Nearest,
            ))
        }
    }

    #[test]
    fn super_resolve_failure_passes_page_through() {
        let img = checker(5, 5);
        let backend = Failing(AtomicUsize::new(0));
        let out = FilterChain::parse("super_resolve").unwrap().apply(&img, Some(&backend));
        assert_eq!(out, img);
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);

        let out = FilterChain::parse("super_resolve").unwrap().apply(&img, None);
        assert_eq!(out, img);
    }

    #[test]
    fn super_resolve_upscales_by_four() {
        let img = checker(5, 3);
        let chain = FilterChain::parse("super_resolve").unwrap();
        assert!(chain.needs_upscaler());
        let out = chain.apply(&img, Some(&Nearest));
        assert_eq!((out.width(), out.height()), (20, 12));
    }

    #[test]
    fn display_round_trips() {
        let spec = "bilateral_filt(d=5, sigmaColor=20, sigmaSpace=30), sharpen(kernel=4), conv_filt";
        let chain: FilterChain = spec.parse().unwrap();
        let again = FilterChain::parse(&chain.to_string()).unwrap();
        assert_eq!(chain, again);
    }
}
