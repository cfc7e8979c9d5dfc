//! CPU raster compositor backed by a tiny-skia pixmap.

use crate::renderer::{PresentStyle, RenderResult, Renderer, RendererError};
use inkboard_core::camera::ViewState;
use inkboard_core::config::BoardConfig;
use inkboard_core::segment::{StrokeMode, StrokeSegment};
use kurbo::Size;
use tiny_skia::{
    BlendMode, Color, FillRule, FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap,
    PixmapPaint, Rect, Stroke, Transform,
};

/// Segments shorter than this are drawn as a dot.
const DOT_THRESHOLD: f64 = 1e-6;

fn to_skia_color(color: peniko::Color) -> Color {
    let rgba = color.to_rgba8();
    Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}

fn skia_transform(view: &ViewState) -> Transform {
    let [a, b, c, d, e, f] = view.transform().as_coeffs();
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

/// Allocate a screen surface, at least one pixel on each side.
pub fn screen_surface(size: Size) -> RenderResult<Pixmap> {
    let width = size.width.ceil().max(1.0) as u32;
    let height = size.height.ceil().max(1.0) as u32;
    Pixmap::new(width, height).ok_or(RendererError::Surface { width, height })
}

/// World-space raster of one board.
///
/// Pixel (x, y) covers world units [x, x+1) x [y, y+1). Starts fully
/// transparent.
pub struct Compositor {
    surface: Pixmap,
    style: PresentStyle,
}

impl Compositor {
    /// Create a transparent surface covering `world`.
    pub fn new(world: Size) -> RenderResult<Self> {
        Ok(Self {
            surface: screen_surface(world)?,
            style: PresentStyle::default(),
        })
    }

    pub fn from_config(config: &BoardConfig) -> RenderResult<Self> {
        Self::new(config.world_size())
    }

    /// The world surface.
    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Premultiplied RGBA of one world pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let p = self.surface.pixel(x, y)?;
        Some([p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// Encode the world surface as PNG.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        self.surface
            .encode_png()
            .map_err(|e| RendererError::Encode(e.to_string()))
    }

    fn paint_for(segment: &StrokeSegment) -> Paint<'static> {
        let mut paint = Paint {
            anti_alias: true,
            ..Default::default()
        };
        match segment.style.mode {
            StrokeMode::Paint => {
                let c = segment.style.color;
                paint.set_color_rgba8(c.r, c.g, c.b, c.a);
            }
            StrokeMode::Erase => {
                paint.blend_mode = BlendMode::Clear;
            }
        }
        paint
    }
}

impl Renderer for Compositor {
    type Target = Pixmap;

    fn apply_segment(&mut self, segment: &StrokeSegment) {
        let paint = Self::paint_for(segment);
        let width = segment.style.width as f32;

        if segment.length() < DOT_THRESHOLD {
            // A round-capped zero-length line is a disc.
            let Some(dot) =
                PathBuilder::from_circle(segment.x0 as f32, segment.y0 as f32, width / 2.0)
            else {
                log::debug!("Skipping degenerate segment {}", segment.id);
                return;
            };
            self.surface
                .fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
            return;
        }

        let mut pb = PathBuilder::new();
        pb.move_to(segment.x0 as f32, segment.y0 as f32);
        pb.line_to(segment.x1 as f32, segment.y1 as f32);
        let Some(path) = pb.finish() else {
            log::debug!("Skipping degenerate segment {}", segment.id);
            return;
        };

        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };
        self.surface
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    fn clear(&mut self) {
        self.surface.fill(Color::TRANSPARENT);
    }

    fn present(&self, target: &mut Pixmap, view: &ViewState) {
        target.fill(to_skia_color(self.style.backdrop));

        let transform = skia_transform(view);
        if let Some(board) =
            Rect::from_xywh(0.0, 0.0, self.surface.width() as f32, self.surface.height() as f32)
        {
            let mut paper = Paint::default();
            paper.set_color(to_skia_color(self.style.paper));
            target.fill_rect(board, &paper, transform, None);
        }

        let quality = if view.zoom >= 1.0 {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bilinear
        };
        let paint = PixmapPaint {
            quality,
            ..Default::default()
        };
        target.draw_pixmap(0, 0, self.surface.as_ref(), &paint, transform, None);
    }
}
