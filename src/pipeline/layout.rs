//! Document layout: positions every element, then sizes the document from
//! the union of what was placed.
//!
//! Planning never touches pixels. Subject canvases all share one
//! [`CanvasGeometry`], so a subject is placed as a sized slot and only
//! assembled when [`DocumentLayout::render`] draws it; at most one subject
//! canvas is alive at a time.
//!
//! ```text
//!  Title
//!  Subtitle
//!
//!  Group A
//!  BAF        ┌──────┐ ┌──────┐ ┌──────┐
//!  Horizontal │  1   │ │  2   │ │  3   │   ← labels at the start of
//!             └──────┘ └──────┘ └──────┘     every grid row
//!  BAF        ┌──────┐
//!  Horizontal │  4   │
//!             └──────┘
//! ```

use crate::config::{CompilationConfig, LayoutStyle, SubjectRecord};
use crate::pipeline::canvas::CanvasGeometry;
use crate::pipeline::modality::ModalitySpec;
use crate::pipeline::text::Typesetter;
use image::{imageops, RgbImage};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Rows and columns for `n` subjects: as square as possible, but never
/// square, and wider than tall.
///
/// `grid_size(4) == (2, 3)`, `grid_size(9) == (3, 4)`, `grid_size(1) == (1, 2)`.
pub fn grid_size(n: usize) -> (usize, usize) {
    let root = (n as f64).sqrt();
    let mut rows = root.floor() as usize;
    let mut cols = root.ceil() as usize;

    if rows == cols {
        rows = rows.saturating_sub(1);
        cols += 1;
    }
    while rows * cols < n {
        rows += 1;
    }
    if rows == cols {
        rows = rows.saturating_sub(1);
        cols += 1;
    }
    (rows, cols)
}

/// What a [`LayoutElement`] draws.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Text { text: String, size: f32 },
    /// A subject canvas, assembled when the document is rendered.
    Subject { subject_id: String },
}

/// A positioned rectangle. `(x, y)` is the top-left corner; for text it is
/// the top-left of the ink box.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutElement {
    pub kind: ElementKind,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl LayoutElement {
    /// Measure `text` and place it at `(x, y)`.
    pub fn text(typesetter: &dyn Typesetter, text: &str, size: f32, x: i32, y: i32) -> Self {
        let extent = typesetter.measure(text, size);
        Self {
            kind: ElementKind::Text {
                text: text.to_string(),
                size,
            },
            x,
            y,
            width: extent.width,
            height: extent.height,
        }
    }

    pub fn subject(subject_id: &str, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            kind: ElementKind::Subject {
                subject_id: subject_id.to_string(),
            },
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn center_x(&self) -> i32 {
        self.x + self.width as i32 / 2
    }

    pub fn center_y(&self) -> i32 {
        self.y + self.height as i32 / 2
    }
}

/// The planned document: every element and the document size.
#[derive(Debug, Clone)]
pub struct DocumentLayout {
    pub elements: Vec<LayoutElement>,
    pub width: u32,
    pub height: u32,
    /// Columns used for every grid.
    pub columns: usize,
}

impl DocumentLayout {
    /// Place title, subtitle, group headers, modality labels and subject
    /// slots, then compute the document extent.
    pub fn plan(
        config: &CompilationConfig,
        specs: &[ModalitySpec],
        geometry: &CanvasGeometry,
        typesetter: &dyn Typesetter,
    ) -> Self {
        let style = &config.style;
        let sizes = &style.font_sizes;
        let outer = style.outer_margin as i32;
        let row_margin = style.row_margin as i32;

        let grouped = !config.group_order.is_empty();
        let columns = config
            .columns
            .unwrap_or_else(|| default_columns(config))
            .max(1);

        let title = LayoutElement::text(typesetter, &config.title, sizes.title, outer, outer);
        let subtitle = LayoutElement::text(
            typesetter,
            &config.subtitle,
            sizes.subtitle,
            outer,
            title.bottom() + title.height as i32 / 5,
        );
        let mut y = subtitle.bottom() + row_margin;

        let label_width = specs
            .iter()
            .map(|s| typesetter.measure(&s.display_name, sizes.heading).width)
            .max()
            .unwrap_or(0);

        let mut grid = GridPlacer {
            style,
            specs,
            geometry,
            typesetter,
            columns,
            column_one_x: outer + label_width as i32 + outer.min(40),
            elements: vec![title, subtitle],
        };

        if grouped {
            for group in &config.group_order {
                let header = LayoutElement::text(typesetter, group, sizes.group, outer, y);
                let header_bottom = header.bottom();
                y += header.height as i32 + row_margin / 2;
                grid.elements.push(header);

                let members: Vec<&SubjectRecord> = config.subjects.in_group(group).collect();
                let bottom = grid.place(&members, y).unwrap_or(header_bottom);
                y = bottom + 2 * row_margin;
            }

            let known: HashSet<&str> = config.group_order.iter().map(String::as_str).collect();
            for r in config.subjects.active() {
                if !known.contains(r.group.as_str()) {
                    warn!(
                        "Subject {} is in group '{}', which is not in the group order; not placed",
                        r.subject_id, r.group
                    );
                }
            }
        } else {
            let all: Vec<&SubjectRecord> = config.subjects.active().collect();
            grid.place(&all, y);
        }

        let elements = grid.elements;
        let right = elements.iter().map(LayoutElement::right).fold(outer, i32::max);
        let bottom = elements.iter().map(LayoutElement::bottom).fold(outer, i32::max);
        let layout = DocumentLayout {
            width: (right + outer) as u32,
            height: (bottom + outer) as u32,
            columns,
            elements,
        };
        debug!(
            "Planned {} elements ({} subjects) on {}x{}",
            layout.elements.len(),
            layout.subject_count(),
            layout.width,
            layout.height
        );
        layout
    }

    /// Subject ids in placement order (left to right, top to bottom, group by group).
    pub fn subject_ids(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|e| match &e.kind {
            ElementKind::Subject { subject_id } => Some(subject_id.as_str()),
            ElementKind::Text { .. } => None,
        })
    }

    pub fn subject_count(&self) -> usize {
        self.subject_ids().count()
    }

    /// Draw the document. `subject_canvas` is called once per subject slot,
    /// in placement order.
    pub fn render<F>(&self, style: &LayoutStyle, typesetter: &dyn Typesetter, mut subject_canvas: F) -> RgbImage
    where
        F: FnMut(&str) -> RgbImage,
    {
        let mut canvas = RgbImage::from_pixel(self.width, self.height, style.background_rgb());
        let color = style.text_rgb();

        for element in &self.elements {
            match &element.kind {
                ElementKind::Text { text, size } => {
                    typesetter.draw(&mut canvas, text, *size, element.x, element.y, color);
                }
                ElementKind::Subject { subject_id } => {
                    let image = subject_canvas(subject_id);
                    imageops::replace(&mut canvas, &image, element.x as i64, element.y as i64);
                }
            }
        }
        canvas
    }
}

/// Columns when none are configured: from the size of the largest grid.
fn default_columns(config: &CompilationConfig) -> usize {
    let largest = if config.group_order.is_empty() {
        config.subjects.active().count()
    } else {
        config
            .group_order
            .iter()
            .map(|g| config.subjects.in_group(g).count())
            .max()
            .unwrap_or(0)
    };
    grid_size(largest).1
}

/// Row-major grid placement shared by the grouped and ungrouped paths.
struct GridPlacer<'a> {
    style: &'a LayoutStyle,
    specs: &'a [ModalitySpec],
    geometry: &'a CanvasGeometry,
    typesetter: &'a dyn Typesetter,
    columns: usize,
    column_one_x: i32,
    elements: Vec<LayoutElement>,
}

impl GridPlacer<'_> {
    /// Place `subjects` starting at row `y`. Returns the bottom of the last
    /// row, or `None` when there was nothing to place.
    fn place(&mut self, subjects: &[&SubjectRecord], mut y: i32) -> Option<i32> {
        let (width, height) = (self.geometry.width(), self.geometry.height());
        let mut x = self.column_one_x;
        let mut column = 0;
        let mut bottom = None;

        for subject in subjects {
            if column == 0 {
                self.place_labels(y);
            }

            let slot = LayoutElement::subject(&subject.subject_id, x, y, width, height);
            bottom = Some(slot.bottom());

            column += 1;
            if column == self.columns {
                x = self.column_one_x;
                y = slot.bottom() + self.style.row_margin as i32;
                column = 0;
            } else {
                x = slot.right() + self.style.column_margin as i32;
            }
            self.elements.push(slot);
        }
        bottom
    }

    /// Modality labels in the left column, each centred on its slot band.
    fn place_labels(&mut self, row_y: i32) {
        let size = self.style.font_sizes.heading;
        let x = self.style.outer_margin as i32;
        let mut band_top = row_y + self.geometry.heading.total_height as i32;

        for (spec, &slot_height) in self.specs.iter().zip(&self.geometry.slot_heights) {
            let text_height = self.typesetter.measure(&spec.display_name, size).height as i32;
            let y = band_top + (slot_height as i32 - text_height) / 2;
            self.elements
                .push(LayoutElement::text(self.typesetter, &spec.display_name, size, x, y));
            band_top += slot_height as i32;
        }
    }
}
