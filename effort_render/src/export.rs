//! Composite export: raster PNG at physical size, overlay SVG, and an HTML host that
//! stacks both in one positioning context at logical size.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::info;

use crate::session::RenderSession;
use crate::RenderError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeFiles {
    pub png: PathBuf,
    pub svg: PathBuf,
    pub html: PathBuf,
}

pub fn write_composite(
    session: &RenderSession,
    out_dir: &Path,
    stem: &str,
) -> Result<CompositeFiles, RenderError> {
    fs::create_dir_all(out_dir)?;
    let files = CompositeFiles {
        png: out_dir.join(format!("{stem}.png")),
        svg: out_dir.join(format!("{stem}.svg")),
        html: out_dir.join(format!("{stem}.html")),
    };

    let raster = session.raster();
    let (pw, ph) = raster.physical_size();
    {
        let mut backend = BitMapBackend::new(&files.png, (pw, ph));
        backend
            .blit_bitmap((0, 0), (pw, ph), raster.pixels())
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        backend
            .present()
            .map_err(|e| RenderError::Backend(e.to_string()))?;
    }

    fs::write(&files.svg, session.overlay().svg())?;
    fs::write(&files.html, host_document(session, stem))?;

    info!(
        png = %files.png.display(),
        physical_width = pw,
        physical_height = ph,
        "wrote composite"
    );
    Ok(files)
}

fn host_document(session: &RenderSession, stem: &str) -> String {
    let geometry = session.geometry();
    let (w, h) = (geometry.logical_width, geometry.logical_height);
    let layer = format!("position:absolute;left:0;top:0;width:{w}px;height:{h}px;");
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n</head>\n<body>\n", escape(stem)));
    html.push_str(&format!(
        "<div class=\"effort-chart\" data-dpr=\"{}\" style=\"position:relative;width:{w}px;height:{h}px;\">\n",
        geometry.device_pixel_ratio
    ));
    html.push_str(&format!(
        "  <img class=\"raster\" src=\"{}.png\" width=\"{w}\" height=\"{h}\" style=\"{layer}\" alt=\"\">\n",
        escape(stem)
    ));
    html.push_str(&format!(
        "  <img class=\"overlay\" src=\"{}.svg\" width=\"{w}\" height=\"{h}\" style=\"{layer}\" alt=\"\">\n",
        escape(stem)
    ));
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RenderConfig, StreamPoint};

    #[test]
    fn writes_all_three_layers() {
        let points: Vec<StreamPoint> = (0..600)
            .map(|i| StreamPoint::new(i, 140.0, 300.0, 3.3, 80.0, 0.0, 170.0, (i % 100) as f64 / 100.0))
            .collect();
        let session =
            RenderSession::new(points, RenderConfig::default(), 640.0, 200.0, Some(2.0)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let files = write_composite(&session, dir.path(), "run").unwrap();

        let png = fs::read(&files.png).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        // IHDR carries the physical size.
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 1280);
        assert_eq!(u32::from_be_bytes([png[20], png[21], png[22], png[23]]), 400);

        let html = fs::read_to_string(&files.html).unwrap();
        assert_eq!(html.matches("position:absolute;left:0;top:0;width:640px;height:200px;").count(), 2);
        assert!(html.contains("run.svg"));
        assert!(fs::read_to_string(&files.svg).unwrap().starts_with("<svg"));
    }
}
