//! Static SVG rendering of the live windows, used as the session's visualization snapshot.

use crate::recorder::{VisualSnapshot, Visualizer};
use std::fmt::Write;

/// Draws every channel window as a white polyline on a dark panel, panels laid out in a grid.
#[derive(Debug, Clone)]
pub struct SvgVisualizer {
    /// Panels per row
    pub columns: usize,
    /// Panel width in pixels
    pub panel_width: u32,
    /// Panel height in pixels
    pub panel_height: u32,
    /// Title drawn in each panel, by channel index
    pub channel_labels: Vec<String>,
    /// Fixed y range; `None` scales each panel to its own data
    pub y_range: Option<(i64, i64)>,
    /// File name of the snapshot inside the session directory
    pub file_name: String,
}

impl Default for SvgVisualizer {
    fn default() -> Self {
        Self {
            columns: 2,
            panel_width: 480,
            panel_height: 120,
            channel_labels: Vec::new(),
            y_range: None,
            file_name: "plot.svg".to_string(),
        }
    }
}

impl SvgVisualizer {
    /// Default layout with the given panel titles.
    pub fn new(channel_labels: Vec<String>) -> Self {
        Self {
            channel_labels,
            ..Default::default()
        }
    }

    /// Set the number of panels per row (at least 1).
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns.max(1);
        self
    }

    /// Fix the y range of every panel; the bounds may be given in either order.
    pub fn with_y_range(mut self, min: i64, max: i64) -> Self {
        self.y_range = Some((min.min(max), min.max(max)));
        self
    }

    /// Render the SVG document text.
    pub fn render(&self, windows: &[Vec<i64>]) -> String {
        let columns = self.columns.max(1);
        let rows = windows.len().div_ceil(columns).max(1);
        let (pw, ph) = (self.panel_width as f64, self.panel_height as f64);
        let width = pw * columns as f64;
        let height = ph * rows as f64;

        let mut svg = String::new();
        // writing into a String cannot fail
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="black"/>"#);

        for (channel, window) in windows.iter().enumerate() {
            let x0 = (channel % columns) as f64 * pw;
            let y0 = (channel / columns) as f64 * ph;
            let title = self
                .channel_labels
                .get(channel)
                .cloned()
                .unwrap_or_else(|| channel.to_string());

            let _ = writeln!(
                svg,
                r##"<rect x="{x0}" y="{y0}" width="{pw}" height="{ph}" fill="none" stroke="#444"/>"##
            );
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" fill="white" font-size="12" text-anchor="middle">{}</text>"#,
                x0 + pw / 2.0,
                y0 + 14.0,
                escape(&title)
            );

            if window.is_empty() {
                continue;
            }
            let (lo, hi) = self.y_range.unwrap_or_else(|| {
                let lo = window.iter().copied().min().unwrap_or(0);
                let hi = window.iter().copied().max().unwrap_or(0);
                (lo, hi)
            });
            let span = (hi - lo).max(1) as f64;
            let step = if window.len() > 1 {
                pw / (window.len() - 1) as f64
            } else {
                0.0
            };

            let points: Vec<String> = window
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let clamped = v.clamp(lo, hi);
                    let x = x0 + i as f64 * step;
                    let y = y0 + ph - 4.0 - (clamped - lo) as f64 / span * (ph - 24.0);
                    format!("{x:.1},{y:.1}")
                })
                .collect();
            let _ = writeln!(
                svg,
                r#"<polyline fill="none" stroke="white" stroke-width="0.5" points="{}"/>"#,
                points.join(" ")
            );
        }

        svg.push_str("</svg>\n");
        svg
    }
}

impl Visualizer for SvgVisualizer {
    fn snapshot(&self, windows: &[Vec<i64>]) -> VisualSnapshot {
        VisualSnapshot {
            file_name: self.file_name.clone(),
            bytes: self.render(windows).into_bytes(),
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_polyline_per_non_empty_channel() {
        let vis = SvgVisualizer::new(vec!["a".into(), "b".into(), "c".into()]);
        let svg = vis.render(&[vec![1, 2, 3], vec![], vec![5]]);

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains(">a</text>"));
        assert!(svg.contains(">c</text>"));
    }

    #[test]
    fn test_snapshot_uses_configured_file_name() {
        let vis = SvgVisualizer::default().with_columns(1).with_y_range(750, 0);
        assert_eq!(vis.y_range, Some((0, 750)));

        let snapshot = vis.snapshot(&[vec![0, 750]]);
        assert_eq!(snapshot.file_name, "plot.svg");
        assert!(String::from_utf8(snapshot.bytes).unwrap().contains("<polyline"));
    }

    #[test]
    fn test_titles_are_escaped() {
        let vis = SvgVisualizer::new(vec!["<ch&1>".into()]);
        let svg = vis.render(&[vec![1]]);
        assert!(svg.contains("&lt;ch&amp;1&gt;"));
    }
}
