//! Lowers a `VectorScene` to an SVG document for resvg.
//!
//! Text is emitted as `<text>` when a font family is available. Without
//! any installed font, glyphs come from the built-in 8x8 bitmap font and
//! are lowered to filled paths, so the words are still legible.

use std::fmt::Write as _;

use font8x8::UnicodeFonts;

use crate::rendering::{Color, PaintCommand, Point, VectorScene};

/// How text commands are lowered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMode {
    /// Real text, shaped by resvg with this `font-family`
    Font(String),
    /// Outlines from the built-in bitmap font
    Bitmap,
}

const LINE_HEIGHT: f64 = 1.2;
const BASELINE: f64 = 0.8;
/// Bitmap font cell as a fraction of the font size
const CELL: f64 = 0.075;

/// Render `scene` as a standalone SVG document in scene units.
pub fn to_svg(scene: &VectorScene, text: &TextMode) -> String {
    let mut out = String::with_capacity(256 + scene.commands.len() * 96);
    let _ = write!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = scene.width,
        h = scene.height,
    );
    for cmd in &scene.commands {
        write_command(&mut out, cmd, text);
    }
    out.push_str("</svg>");
    out
}

fn write_command(out: &mut String, cmd: &PaintCommand, text: &TextMode) {
    match cmd {
        PaintCommand::FillRect { x, y, w, h, color } => {
            if *w > 0.0 && *h > 0.0 {
                let _ = write!(
                    out,
                    r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" {}/>"#,
                    fill(*color)
                );
            }
        }
        PaintCommand::StrokeRect { x, y, w, h, width, color } => {
            let _ = write!(
                out,
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" {}/>"#,
                stroke(*color, *width)
            );
        }
        PaintCommand::Polyline { points, width, color } => match points.as_slice() {
            [] => {}
            [only] => {
                let _ = write!(
                    out,
                    r#"<circle cx="{}" cy="{}" r="{}" {}/>"#,
                    only.x,
                    only.y,
                    width / 2.0,
                    fill(*color)
                );
            }
            _ => {
                let _ = write!(
                    out,
                    r#"<polyline points="{}" fill="none" stroke-linecap="round" stroke-linejoin="round" {}/>"#,
                    point_list(points),
                    stroke(*color, *width)
                );
            }
        },
        PaintCommand::Text { x, y, text: body, size, color } => match text {
            TextMode::Font(family) => write_text(out, *x, *y, body, *size, *color, family),
            TextMode::Bitmap => write_bitmap_text(out, *x, *y, body, *size, *color),
        },
        PaintCommand::Image { x, y, w, h, data_uri } => {
            let _ = write!(
                out,
                r#"<image x="{x}" y="{y}" width="{w}" height="{h}" preserveAspectRatio="none" xlink:href="{}"/>"#,
                escape(data_uri)
            );
        }
    }
}

fn write_text(out: &mut String, x: f64, y: f64, body: &str, size: f64, color: Color, family: &str) {
    for (row, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let baseline = y + (row as f64 * LINE_HEIGHT + BASELINE) * size;
        let _ = write!(
            out,
            r#"<text x="{x}" y="{baseline}" font-family="{}" font-size="{size}" xml:space="preserve" {}>{}</text>"#,
            escape(family),
            fill(color),
            escape(line)
        );
    }
}

fn write_bitmap_text(out: &mut String, x: f64, y: f64, body: &str, size: f64, color: Color) {
    let cell = size * CELL;
    let mut d = String::new();
    for (row, line) in body.lines().enumerate() {
        let top = y + row as f64 * LINE_HEIGHT * size + (1.0 - 8.0 * CELL) * size / 2.0;
        for (col, ch) in line.chars().enumerate() {
            let Some(rows) = font8x8::BASIC_FONTS.get(ch).or_else(|| font8x8::BASIC_FONTS.get('?')) else {
                continue;
            };
            let left = x + col as f64 * 8.0 * cell;
            for (gy, bits) in rows.into_iter().enumerate() {
                for gx in 0..8 {
                    if bits & (1 << gx) != 0 {
                        let _ = write!(
                            d,
                            "M{} {}h{cell}v{cell}h-{cell}z",
                            left + gx as f64 * cell,
                            top + gy as f64 * cell
                        );
                    }
                }
            }
        }
    }
    if !d.is_empty() {
        let _ = write!(out, r#"<path d="{d}" {}/>"#, fill(color));
    }
}

fn fill(color: Color) -> String {
    if color.alpha() == 0 {
        return r#"fill="none""#.to_string();
    }
    format!(r#"fill="{}" fill-opacity="{}""#, rgb(color), opacity(color))
}

fn stroke(color: Color, width: f64) -> String {
    if color.alpha() == 0 {
        return r#"stroke="none""#.to_string();
    }
    format!(
        r#"stroke="{}" stroke-opacity="{}" stroke-width="{width}""#,
        rgb(color),
        opacity(color)
    )
}

fn rgb(color: Color) -> String {
    let [r, g, b, _] = color.0;
    format!("rgb({r},{g},{b})")
}

fn opacity(color: Color) -> f64 {
    f64::from(color.alpha()) / 255.0
}

fn point_list(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(text: &str) -> VectorScene {
        let mut scene = VectorScene::new(Point::new(0.0, 0.0), 200.0, 40.0);
        scene.push(PaintCommand::Text { x: 0.0, y: 0.0, text: text.into(), size: 24.0, color: Color::RED });
        scene
    }

    #[test]
    fn text_is_emitted_as_escaped_text_element() {
        let svg = to_svg(&note("a < b & \"c\""), &TextMode::Font("DejaVu Sans".into()));
        assert!(svg.starts_with("<svg "));
        assert!(svg.contains(r#"font-family="DejaVu Sans""#));
        assert!(svg.contains("a &lt; b &amp; &quot;c&quot;</text>"));
        assert!(svg.contains(r#"fill="rgb(224,49,49)""#));
    }

    #[test]
    fn bitmap_text_depends_on_the_letters() {
        let a = to_svg(&note("make this blue"), &TextMode::Bitmap);
        let b = to_svg(&note("drop that menu"), &TextMode::Bitmap);
        assert!(a.contains("<path d=\"M"));
        assert_ne!(a, b);
    }

    #[test]
    fn transparent_fill_is_none() {
        let mut scene = VectorScene::new(Point::new(0.0, 0.0), 10.0, 10.0);
        scene.push(PaintCommand::FillRect { x: 0.0, y: 0.0, w: 5.0, h: 5.0, color: Color::TRANSPARENT });
        assert!(to_svg(&scene, &TextMode::Bitmap).contains(r#"fill="none""#));
    }

    #[test]
    fn single_point_polyline_becomes_dot() {
        let mut scene = VectorScene::new(Point::new(0.0, 0.0), 10.0, 10.0);
        scene.push(PaintCommand::Polyline { points: vec![Point::new(3.0, 4.0)], width: 2.0, color: Color::BLUE });
        assert!(to_svg(&scene, &TextMode::Bitmap).contains(r#"<circle cx="3" cy="4" r="1""#));
    }
}
