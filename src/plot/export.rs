use crate::core::settings::PlotFormat;
use anyhow::{Context, Result, anyhow};
use flate2::Compression;
use flate2::write::GzEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::tiny_skia;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use svg2pdf::usvg;
use svg2pdf::{ConversionOptions, PageOptions};

/// Writes an SVG document as `<base>.<ext>` in the requested format.
///
/// Raster formats are rendered at the document's own pixel size, which the
/// canvas already derives from the requested dpi.
pub fn save(svg: &str, base: &Path, format: PlotFormat) -> Result<PathBuf> {
    let path = with_extension(base, format.extension());
    match format {
        PlotFormat::Svg => fs::write(&path, svg)
            .with_context(|| format!("failed to write {}", path.display()))?,
        PlotFormat::Svgz => {
            let file = fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut gz = GzEncoder::new(file, Compression::default());
            gz.write_all(svg.as_bytes())?;
            gz.finish()
                .with_context(|| format!("failed to finish {}", path.display()))?;
        }
        PlotFormat::Pdf => {
            let pdf = svg_to_pdf(svg)
                .with_context(|| format!("failed to convert {} to PDF", path.display()))?;
            fs::write(&path, pdf).with_context(|| format!("failed to write {}", path.display()))?;
        }
        PlotFormat::Png => rasterize(svg)?
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))?,
        PlotFormat::Jpeg | PlotFormat::Jpg => DynamicImage::ImageRgba8(rasterize(svg)?)
            .to_rgb8()
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write {}", path.display()))?,
        PlotFormat::Tiff | PlotFormat::Tif => rasterize(svg)?
            .save_with_format(&path, ImageFormat::Tiff)
            .with_context(|| format!("failed to write {}", path.display()))?,
        PlotFormat::Raw | PlotFormat::Rgba => fs::write(&path, rasterize(svg)?.as_raw())
            .with_context(|| format!("failed to write {}", path.display()))?,
    }
    Ok(path)
}

// Stems may contain dots (e.g. barcode labels), so the extension is appended.
fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn svg_to_pdf(svg: &str) -> Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    let tree =
        usvg::Tree::from_str(svg, &opt).map_err(|e| anyhow!("usvg parse failed: {e}"))?;
    let pdf = svg2pdf::to_pdf(&tree, ConversionOptions::default(), PageOptions::default())
        .map_err(|e| anyhow!("svg2pdf conversion failed: {e}"))?;
    Ok(pdf)
}

/// Renders onto a white background; the result is fully opaque.
fn rasterize(svg: &str) -> Result<RgbaImage> {
    let mut opt = resvg::usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    let tree = resvg::usvg::Tree::from_str(svg, &opt)
        .map_err(|e| anyhow!("usvg parse failed: {e}"))?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow!("cannot rasterize an empty {}x{} plot", size.width(), size.height()))?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let data: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(size.width(), size.height(), data)
        .ok_or_else(|| anyhow!("rendered pixel buffer does not match the plot size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::svg::Canvas;
    use flate2::read::GzDecoder;
    use std::io::Read;

    const SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"10\"><rect width=\"10\" height=\"10\" fill=\"#4CB391\"/></svg>\n";

    #[test]
    fn svg_and_svgz_keep_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let plain = save(SVG, &dir.path().join("BC01.1_Plot"), PlotFormat::Svg).unwrap();
        assert_eq!(plain.file_name().unwrap(), "BC01.1_Plot.svg");
        assert_eq!(fs::read_to_string(&plain).unwrap(), SVG);

        let packed = save(SVG, &dir.path().join("Plot"), PlotFormat::Svgz).unwrap();
        let mut text = String::new();
        GzDecoder::new(fs::File::open(&packed).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, SVG);
    }

    #[test]
    fn pdf_output_has_a_pdf_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = save(SVG, &dir.path().join("Plot"), PlotFormat::Pdf).unwrap();
        let bytes = fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn png_is_rendered_with_the_fill_color() {
        let dir = tempfile::tempdir().unwrap();
        let path = save(SVG, &dir.path().join("Plot"), PlotFormat::Png).unwrap();
        assert_eq!(path.file_name().unwrap(), "Plot.png");
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (10, 10));
        assert_eq!(img.get_pixel(5, 5).0, [0x4C, 0xB3, 0x91, 0xFF]);
    }

    #[test]
    fn raster_size_follows_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let svg = Canvas::new(1.0, 200).unwrap().finish().unwrap();
        let path = save(&svg, &dir.path().join("Plot"), PlotFormat::Png).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (1440, 960));
    }

    #[test]
    fn jpeg_tiff_and_raw_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let jpg = save(SVG, &dir.path().join("Plot"), PlotFormat::Jpg).unwrap();
        assert_eq!(jpg.file_name().unwrap(), "Plot.jpg");
        assert!(fs::read(&jpg).unwrap().starts_with(&[0xFF, 0xD8, 0xFF]));

        let tif = save(SVG, &dir.path().join("Plot"), PlotFormat::Tiff).unwrap();
        let head = fs::read(&tif).unwrap();
        assert!(head.starts_with(b"II*\0") || head.starts_with(b"MM\0*"));

        let raw = save(SVG, &dir.path().join("Plot"), PlotFormat::Rgba).unwrap();
        let px = fs::read(&raw).unwrap();
        assert_eq!(px.len(), 10 * 10 * 4);
        assert_eq!(&px[..4], &[0x4C, 0xB3, 0x91, 0xFF]);
    }
}
