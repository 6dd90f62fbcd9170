use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use scribex::feedback::surface::{ContentNode, EditableSurface, LeafId, Marker, Overlay, Point, Rect};
use scribex::model::FeedbackKind;

/// Text buffer laid out one line per terminal row, no wrapping.
pub struct Editor {
    buffer: Vec<Vec<char>>, // Lines of chars, so a column is a char index
    cursor_x: usize,        // Cursor column in the buffer
    cursor_y: usize,        // Cursor line in the buffer
    offset_x: usize,        // First visible column
    offset_y: usize,        // First visible line
    width: u16,
    height: u16,
}

impl Editor {
    pub fn new(width: u16, height: u16) -> Self {
        Editor {
            buffer: vec![Vec::new()],
            cursor_x: 0,
            cursor_y: 0,
            offset_x: 0,
            offset_y: 0,
            width,
            height,
        }
    }

    /// Replace the buffer and put the cursor at the end of the text.
    pub fn load(&mut self, content: &str) {
        // split always yields at least one line, even for ""
        self.buffer = content.split('\n').map(|line| line.chars().collect()).collect();
        self.cursor_y = self.buffer.len() - 1;
        self.cursor_x = self.buffer[self.cursor_y].len();
        self.offset_x = 0;
        self.offset_y = 0;
        self.scroll_to_cursor();
    }

    pub fn resize(&mut self, width: u16, height: u16) -> bool {
        if (width, height) == (self.width, self.height) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.scroll_to_cursor();
        true
    }

    /// Rows available for text; the last row is the status bar.
    fn text_rows(&self) -> usize {
        self.height.saturating_sub(1).max(1) as usize
    }

    fn current_line(&self) -> &Vec<char> {
        &self.buffer[self.cursor_y]
    }

    pub fn insert_char(&mut self, c: char) {
        let x = self.cursor_x;
        self.buffer[self.cursor_y].insert(x, c);
        self.cursor_x += 1;
        self.scroll_to_cursor();
    }

    pub fn insert_newline(&mut self) {
        // Everything right of the cursor moves down to the new line
        let rest = self.buffer[self.cursor_y].split_off(self.cursor_x);
        self.buffer.insert(self.cursor_y + 1, rest);
        self.cursor_y += 1;
        self.cursor_x = 0;
        self.scroll_to_cursor();
    }

    pub fn backspace(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
            let x = self.cursor_x;
            self.buffer[self.cursor_y].remove(x);
        } else if self.cursor_y > 0 {
            // At column 0: join this line onto the one above
            let line = self.buffer.remove(self.cursor_y);
            self.cursor_y -= 1;
            self.cursor_x = self.buffer[self.cursor_y].len();
            self.buffer[self.cursor_y].extend(line);
        }
        self.scroll_to_cursor();
    }

    pub fn delete(&mut self) {
        if self.cursor_x < self.current_line().len() {
            let x = self.cursor_x;
            self.buffer[self.cursor_y].remove(x);
        } else if self.cursor_y + 1 < self.buffer.len() {
            let next = self.buffer.remove(self.cursor_y + 1);
            self.buffer[self.cursor_y].extend(next);
        }
    }

    pub fn move_left(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.current_line().len();
        }
        self.scroll_to_cursor();
    }

    pub fn move_right(&mut self) {
        if self.cursor_x < self.current_line().len() {
            self.cursor_x += 1;
        } else if self.cursor_y + 1 < self.buffer.len() {
            self.cursor_y += 1;
            self.cursor_x = 0;
        }
        self.scroll_to_cursor();
    }

    pub fn move_up(&mut self) {
        self.move_rows(-1);
    }

    pub fn move_down(&mut self) {
        self.move_rows(1);
    }

    pub fn page_up(&mut self) {
        self.move_rows(-(self.text_rows() as isize));
    }

    pub fn page_down(&mut self) {
        self.move_rows(self.text_rows() as isize);
    }

    fn move_rows(&mut self, delta: isize) {
        let last = self.buffer.len() - 1;
        self.cursor_y = self.cursor_y.saturating_add_signed(delta).min(last);
        // Clamp the column when the new line is shorter
        self.cursor_x = self.cursor_x.min(self.current_line().len());
        self.scroll_to_cursor();
    }

    pub fn move_home(&mut self) {
        self.cursor_x = 0;
        self.scroll_to_cursor();
    }

    pub fn move_end(&mut self) {
        self.cursor_x = self.current_line().len();
        self.scroll_to_cursor();
    }

    /// Move the viewport just far enough to keep the cursor on screen.
    fn scroll_to_cursor(&mut self) {
        let rows = self.text_rows();
        if self.cursor_y < self.offset_y {
            self.offset_y = self.cursor_y;
        } else if self.cursor_y >= self.offset_y + rows {
            self.offset_y = self.cursor_y + 1 - rows;
        }

        let cols = self.width.max(1) as usize;
        if self.cursor_x < self.offset_x {
            self.offset_x = self.cursor_x;
        } else if self.cursor_x >= self.offset_x + cols {
            self.offset_x = self.cursor_x + 1 - cols;
        }
    }

    /// Content-space cell of the cursor.
    pub fn cursor_cell(&self) -> (usize, usize) {
        (self.cursor_x, self.cursor_y)
    }

    pub fn render<W: Write>(&self, out: &mut W, overlay: &TerminalOverlay) -> io::Result<()> {
        let rows = self.text_rows();
        let cols = self.width as usize;

        for row in 0..rows {
            queue!(out, MoveTo(0, row as u16), Clear(ClearType::CurrentLine))?;
            if let Some(line) = self.buffer.get(self.offset_y + row) {
                let visible: String = line.iter().skip(self.offset_x).take(cols).collect();
                queue!(out, Print(visible))?;
            }
        }

        // Markers are in content cells; skip the ones scrolled out of view
        for marker in &overlay.markers {
            let (x, y) = (marker.position.x as usize, marker.position.y as usize);
            if y < self.offset_y || y >= self.offset_y + rows {
                continue;
            }
            if x < self.offset_x || x >= self.offset_x + cols {
                continue;
            }
            let cell = self
                .buffer
                .get(y)
                .and_then(|line| line.get(x))
                .copied()
                .unwrap_or(' ');
            queue!(
                out,
                MoveTo((x - self.offset_x) as u16, (y - self.offset_y) as u16),
                SetBackgroundColor(marker_color(marker.kind)),
                SetForegroundColor(Color::Black),
                Print(cell),
                ResetColor
            )?;
        }
        Ok(())
    }

    /// Terminal cell of the cursor.
    pub fn screen_cursor(&self) -> (u16, u16) {
        (
            (self.cursor_x - self.offset_x) as u16,
            (self.cursor_y - self.offset_y) as u16,
        )
    }

    pub fn status_row(&self) -> u16 {
        self.height.saturating_sub(1)
    }
}

fn marker_color(kind: FeedbackKind) -> Color {
    match kind {
        FeedbackKind::Grammar => Color::Red,
        FeedbackKind::Clarity => Color::Yellow,
        FeedbackKind::Flow => Color::Blue,
        FeedbackKind::Tone => Color::Magenta,
        FeedbackKind::Praise => Color::Green,
    }
}

impl EditableSurface for Editor {
    /// One text leaf per line; every line but the last keeps its newline so
    /// offsets match the plain text.
    fn content(&self) -> ContentNode {
        let last = self.buffer.len() - 1;
        ContentNode::Element(
            self.buffer
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let mut text: String = line.iter().collect();
                    if i < last {
                        text.push('\n');
                    }
                    ContentNode::Text(text)
                })
                .collect(),
        )
    }

    fn caret_rect(&self, leaf: LeafId, offset: usize) -> Option<Rect> {
        let line = self.buffer.get(leaf.0)?;
        // The caret after a trailing newline sits at the end of that line.
        let col = offset.min(line.len());
        Some(Rect::new(
            col as f64 - self.offset_x as f64,
            leaf.0 as f64 - self.offset_y as f64,
            1.0,
            1.0,
        ))
    }

    fn bounding_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.text_rows() as f64)
    }

    fn scroll_offset(&self) -> Point {
        Point::new(self.offset_x as f64, self.offset_y as f64)
    }

    fn caret_offset(&self) -> usize {
        // Every line before the cursor counts its newline too
        let before: usize = self.buffer[..self.cursor_y].iter().map(|l| l.len() + 1).sum();
        before + self.cursor_x
    }

    fn set_caret_offset(&mut self, offset: usize) {
        let mut remaining = offset;
        for (y, line) in self.buffer.iter().enumerate() {
            if remaining <= line.len() {
                self.cursor_y = y;
                self.cursor_x = remaining;
                self.scroll_to_cursor();
                return;
            }
            remaining -= line.len() + 1;
        }
        self.cursor_y = self.buffer.len() - 1;
        self.cursor_x = self.current_line().len();
        self.scroll_to_cursor();
    }

    fn text(&self) -> String {
        self.buffer
            .iter()
            .map(|line| line.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Markers as terminal cells, in content coordinates.
#[derive(Default)]
pub struct TerminalOverlay {
    markers: Vec<Marker>,
}

impl TerminalOverlay {
    /// The marker at or closest before the cursor on the cursor's line.
    pub fn marker_near(&self, (x, y): (usize, usize)) -> Option<&Marker> {
        self.markers
            .iter()
            .filter(|m| m.position.y as usize == y && m.position.x as usize <= x)
            .max_by_key(|m| m.position.x as usize)
    }
}

impl Overlay for TerminalOverlay {
    fn clear(&mut self) {
        self.markers.clear();
    }

    fn append_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }
}
