use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::device::DeviceFactory;
use crate::feed::{FeedItem, ItemId};
use crate::geometry::FeedLayout;
use crate::playback::PlaybackState;
use crate::tracker::Tracker;

const SEEK_STEP_PERCENT: f64 = 5.0;
const MIN_CARD_WIDTH: u16 = 24;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_IDLE: Color = Color::Rgb(69, 71, 90);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_LIKE: Color = Color::Rgb(243, 139, 168);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitKind {
    Card,
    Mute,
    Progress,
}

#[derive(Debug, Clone, Copy)]
struct HitRegion {
    id: ItemId,
    kind: HitKind,
    rect: Rect,
}

impl HitRegion {
    fn contains(&self, column: u16, row: u16) -> bool {
        column >= self.rect.x
            && column < self.rect.x.saturating_add(self.rect.width)
            && row >= self.rect.y
            && row < self.rect.y.saturating_add(self.rect.height)
    }
}

/// Clickable span inside a card, in card-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CardTarget {
    row: usize,
    column: u16,
    width: u16,
    kind: HitKind,
}

struct CardView {
    lines: Vec<Line<'static>>,
    targets: Vec<CardTarget>,
}

pub struct Options {
    pub tracker: Tracker,
    pub factory: Box<dyn DeviceFactory>,
    pub status_message: String,
    pub scroll_step: usize,
    pub snap_delay: Duration,
    pub tick_rate: Duration,
}

pub struct Model {
    tracker: Tracker,
    factory: Box<dyn DeviceFactory>,
    status_message: String,
    scroll: usize,
    viewport_height: usize,
    scroll_step: usize,
    snap_delay: Duration,
    tick_rate: Duration,
    last_scroll: Option<Instant>,
    hit_regions: Vec<HitRegion>,
    dragging: Option<ItemId>,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let mut model = Self {
            tracker: opts.tracker,
            factory: opts.factory,
            status_message: opts.status_message,
            scroll: 0,
            viewport_height: 0,
            scroll_step: opts.scroll_step.max(1),
            snap_delay: opts.snap_delay,
            tick_rate: opts.tick_rate.max(Duration::from_millis(16)),
            last_scroll: None,
            hit_regions: Vec::new(),
            dragging: None,
            needs_redraw: true,
        };
        model.remount();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);
        self.tracker.shutdown();

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            let (_, feed_area, _) = split_screen(terminal.size()?);
            self.resize_viewport(usize::from(feed_area.height));

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            let elapsed = last_tick.elapsed();
            if elapsed >= self.tick_rate {
                last_tick = Instant::now();
                if self.tracker.tick(elapsed) {
                    self.mark_dirty();
                }
                if self.snap_if_idle() {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn layout(&self) -> FeedLayout {
        FeedLayout::new(self.viewport_height, self.tracker.items().len())
    }

    fn resize_viewport(&mut self, height: usize) {
        if height == 0 || height == self.viewport_height {
            return;
        }
        let index = self.tracker.active_index();
        self.viewport_height = height;
        self.scroll = self.layout().item_top(index);
        self.last_scroll = None;
        self.mark_dirty();
    }

    fn on_scroll(&mut self) {
        let layout = self.layout();
        let offsets = layout.offsets(self.tracker.items().iter().map(|item| item.id));
        if self.tracker.on_scroll(
            self.scroll as f64,
            layout.viewport_height as f64,
            &offsets,
        ) {
            self.status_message.clear();
            self.remount();
        }
    }

    fn remount(&mut self) {
        let failed = self.tracker.retain_window(self.factory.as_ref());
        if let Some(id) = failed.first() {
            let author = self
                .item(*id)
                .map(|item| item.author.clone())
                .unwrap_or_default();
            self.status_message = format!("Player unavailable for @{author}.");
        }
    }

    fn item(&self, id: ItemId) -> Option<&FeedItem> {
        self.tracker.items().iter().find(|item| item.id == id)
    }

    fn scroll_by(&mut self, delta: isize) {
        let target = self.scroll.saturating_add_signed(delta);
        let target = self.layout().clamp(target);
        if target == self.scroll {
            return;
        }
        self.scroll = target;
        self.last_scroll = Some(Instant::now());
        self.on_scroll();
    }

    fn jump_to(&mut self, index: usize) {
        let layout = self.layout();
        let target = layout.clamp(layout.item_top(index));
        self.last_scroll = None;
        if target == self.scroll {
            return;
        }
        self.scroll = target;
        self.on_scroll();
    }

    fn jump_relative(&mut self, delta: isize) {
        let last = self.tracker.items().len().saturating_sub(1);
        let index = self.tracker.active_index().saturating_add_signed(delta).min(last);
        self.jump_to(index);
    }

    fn snap_if_idle(&mut self) -> bool {
        let Some(at) = self.last_scroll else {
            return false;
        };
        if at.elapsed() < self.snap_delay {
            return false;
        }
        self.last_scroll = None;
        let target = self.layout().snap_offset(self.scroll);
        if target == self.scroll {
            return false;
        }
        self.scroll = target;
        self.on_scroll();
        true
    }

    fn toggle_video(&mut self, id: ItemId) {
        if self.tracker.toggle_video(id) {
            self.status_message.clear();
            return;
        }
        self.status_message = match self.item(id) {
            Some(item) if !item.is_video() => "Images have nothing to play.".to_string(),
            _ => "Player is not ready yet.".to_string(),
        };
    }

    fn toggle_mute(&mut self, id: ItemId) {
        if self.tracker.toggle_mute(id) {
            self.status_message.clear();
            return;
        }
        self.status_message = match self.item(id) {
            Some(item) if !item.is_video() => "Images have no sound.".to_string(),
            _ => "Player is not ready yet.".to_string(),
        };
    }

    fn seek(&mut self, id: ItemId, percent: f64) {
        if !self.tracker.on_seek(id, percent) {
            self.status_message = "Nothing to seek yet.".to_string();
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let active = self.tracker.active();
        let step = self.scroll_step as isize;
        let mut dirty = true;

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.scroll_by(step),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_by(-step),
            KeyCode::Char('n') | KeyCode::PageDown => self.jump_relative(1),
            KeyCode::Char('p') | KeyCode::PageUp => self.jump_relative(-1),
            KeyCode::Char('g') | KeyCode::Home => self.jump_to(0),
            KeyCode::Char('G') | KeyCode::End => {
                self.jump_to(self.tracker.items().len().saturating_sub(1))
            }
            KeyCode::Char(' ') => self.toggle_video(active),
            KeyCode::Char('m') | KeyCode::Char('M') => self.toggle_mute(active),
            KeyCode::Left => {
                if !self.tracker.seek_by(active, -SEEK_STEP_PERCENT) {
                    self.status_message = "Nothing to seek yet.".to_string();
                }
            }
            KeyCode::Right => {
                if !self.tracker.seek_by(active, SEEK_STEP_PERCENT) {
                    self.status_message = "Nothing to seek yet.".to_string();
                }
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                let tenth = ch.to_digit(10).unwrap_or(0);
                self.seek(active, f64::from(tenth) * 10.0);
            }
            _ => dirty = false,
        }

        if dirty {
            self.mark_dirty();
        }
        Ok(false)
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        let step = self.scroll_step as isize;
        match event.kind {
            MouseEventKind::ScrollDown => self.scroll_by(step),
            MouseEventKind::ScrollUp => self.scroll_by(-step),
            MouseEventKind::Down(MouseButton::Left) => {
                let Some(hit) = self.hit_test(event.column, event.row) else {
                    return Ok(());
                };
                match hit.kind {
                    HitKind::Progress => {
                        self.dragging = Some(hit.id);
                        self.seek(hit.id, percent_at(hit.rect, event.column));
                    }
                    HitKind::Mute => self.toggle_mute(hit.id),
                    HitKind::Card => {
                        if self.tracker.active() == hit.id {
                            self.toggle_video(hit.id);
                        }
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(id) = self.dragging else {
                    return Ok(());
                };
                let bar = self
                    .hit_regions
                    .iter()
                    .find(|region| region.id == id && region.kind == HitKind::Progress)
                    .map(|region| region.rect);
                if let Some(rect) = bar {
                    self.seek(id, percent_at(rect, event.column));
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.dragging = None,
            _ => return Ok(()),
        }
        self.mark_dirty();
        Ok(())
    }

    fn hit_test(&self, column: u16, row: u16) -> Option<HitRegion> {
        let mut card = None;
        for region in &self.hit_regions {
            if !region.contains(column, row) {
                continue;
            }
            if region.kind != HitKind::Card {
                return Some(*region);
            }
            card = Some(*region);
        }
        card
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let (status_area, feed_area, footer_area) = split_screen(full);

        let status_line = Paragraph::new(self.status_text()).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, status_area);

        self.draw_feed(frame, feed_area);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, footer_area);
    }

    fn draw_feed(&mut self, frame: &mut Frame<'_>, area: Rect) {
        self.hit_regions.clear();
        let height = usize::from(area.height);
        if height == 0 || area.width == 0 {
            return;
        }
        let width = card_width(area);
        let card_x = area.x + (area.width - width) / 2;
        let scroll = self.scroll as i64;
        let height_i = height as i64;

        let mut regions = Vec::new();
        for (index, item) in self.tracker.items().iter().enumerate() {
            let top = index as i64 * height_i - scroll;
            let visible_top = top.max(0);
            let visible_bottom = (top + height_i).min(height_i);
            if visible_bottom <= visible_top {
                continue;
            }

            let state = self.tracker.state(item.id);
            let mounted = self.tracker.is_mounted(item.id);
            let card = build_card(item, &state, mounted, width, height);
            let rect = Rect::new(
                card_x,
                area.y + visible_top as u16,
                width,
                (visible_bottom - visible_top) as u16,
            );
            let background = if state.active {
                COLOR_PANEL_BG
            } else {
                COLOR_BG
            };
            let paragraph = Paragraph::new(Text::from(card.lines))
                .style(Style::default().fg(COLOR_TEXT_PRIMARY).bg(background))
                .scroll(((visible_top - top) as u16, 0));
            frame.render_widget(paragraph, rect);

            regions.push(HitRegion {
                id: item.id,
                kind: HitKind::Card,
                rect,
            });
            for target in card.targets {
                let y = top + target.row as i64;
                if y < visible_top || y >= visible_bottom {
                    continue;
                }
                regions.push(HitRegion {
                    id: item.id,
                    kind: target.kind,
                    rect: Rect::new(card_x + target.column, area.y + y as u16, target.width, 1),
                });
            }
        }
        self.hit_regions = regions;
    }

    fn status_text(&self) -> String {
        let active = self.tracker.active();
        let index = self.tracker.active_index();
        let total = self.tracker.items().len();
        let mut parts = Vec::new();
        if let Some(item) = self.item(active) {
            parts.push(format!("@{}", item.author));
            parts.push(format!("{}/{}", index + 1, total));
            if item.is_video() {
                let state = self.tracker.state(active);
                let playing = self
                    .tracker
                    .device(active)
                    .map(|device| !device.paused())
                    .unwrap_or(false);
                parts.push(if playing { "playing" } else { "paused" }.to_string());
                parts.push(format!("{:.0}%", state.progress_percent));
            } else {
                parts.push("image".to_string());
            }
        }
        if !self.status_message.is_empty() {
            parts.push(self.status_message.clone());
        }
        parts.join(" · ")
    }

    fn footer_text(&self) -> String {
        let parts = [
            "j/k scroll",
            "n/p next/prev",
            "Space play/pause",
            "m mute",
            "←/→ seek",
            "0-9 jump",
            "click bar to seek",
            "q quit",
        ];
        parts.join(" · ")
    }
}

fn split_screen(area: Rect) -> (Rect, Rect, Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);
    (layout[0], layout[1], layout[2])
}

/// Cells are roughly twice as tall as they are wide, so a 9:16 card is about
/// `height * 9 / 8` columns wide.
fn card_width(area: Rect) -> u16 {
    let ideal = (u32::from(area.height) * 9 / 8).max(u32::from(MIN_CARD_WIDTH));
    ideal.min(u32::from(area.width)) as u16
}

fn percent_at(bar: Rect, column: u16) -> f64 {
    let span = f64::from(bar.width.saturating_sub(1).max(1));
    let offset = f64::from(column.saturating_sub(bar.x));
    (offset / span * 100.0).clamp(0.0, 100.0)
}

fn build_card(
    item: &FeedItem,
    state: &PlaybackState,
    mounted: bool,
    width: u16,
    height: usize,
) -> CardView {
    let inner = usize::from(width.saturating_sub(2));
    let mut rows: Vec<Line<'static>> = vec![Line::default(); height];
    let mut targets = Vec::new();
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);

    let mut place = |row: usize, line: Line<'static>| {
        if let Some(slot) = rows.get_mut(row) {
            *slot = line;
        }
    };

    if item.is_video() {
        let label = if state.effective_muted() {
            "🔇 muted"
        } else {
            "🔊 sound"
        };
        let (line, column) = right_aligned(label, Style::default().fg(COLOR_TEXT_PRIMARY), inner);
        place(1, line);
        targets.push(CardTarget {
            row: 1,
            column,
            width: UnicodeWidthStr::width(label) as u16,
            kind: HitKind::Mute,
        });
    }

    let middle = height / 2;
    if item.is_video() {
        let glyph = if !mounted {
            Some(Span::styled("◌ loading", secondary))
        } else if state.user_paused {
            Some(Span::styled(
                "▶ paused",
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ))
        } else {
            None
        };
        if let Some(glyph) = glyph {
            place(middle.saturating_sub(2), centered(glyph, inner));
        }
    }
    let media = format!(
        "[{}] {}",
        item.kind.label(),
        display_url(&item.media_url)
    );
    place(
        middle,
        centered(Span::styled(truncate_to_width(&media, inner), secondary), inner),
    );

    let like_style = Style::default().fg(COLOR_LIKE);
    place(height.saturating_sub(13), right_aligned("♥", like_style, inner).0);
    place(
        height.saturating_sub(12),
        right_aligned(&item.likes, secondary, inner).0,
    );
    place(
        height.saturating_sub(10),
        right_aligned("💬", Style::default().fg(COLOR_TEXT_PRIMARY), inner).0,
    );
    place(
        height.saturating_sub(8),
        right_aligned("➤", Style::default().fg(COLOR_TEXT_PRIMARY), inner).0,
    );

    let author_style = if state.active {
        Style::default()
            .fg(COLOR_ACCENT)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .fg(COLOR_TEXT_PRIMARY)
            .add_modifier(Modifier::BOLD)
    };
    place(
        height.saturating_sub(6),
        Line::from(vec![
            Span::raw(" "),
            Span::styled("● ", Style::default().fg(COLOR_TEXT_PRIMARY)),
            Span::styled(
                truncate_to_width(&format!("@{}", item.author), inner.saturating_sub(14)),
                author_style,
            ),
            Span::raw("  "),
            Span::styled(
                "[ Follow ]",
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_BORDER_IDLE),
            ),
        ]),
    );

    let caption = wrap(item.caption.trim(), WrapOptions::new(inner.max(1)));
    for (offset, line) in caption.iter().take(2).enumerate() {
        place(
            height.saturating_sub(5) + offset,
            Line::from(vec![Span::raw(" "), Span::raw(line.to_string())]),
        );
    }

    if item.is_video() {
        place(
            height.saturating_sub(2),
            progress_line(state.progress_percent, inner),
        );
        targets.push(CardTarget {
            row: height.saturating_sub(2),
            column: 1,
            width: inner as u16,
            kind: HitKind::Progress,
        });
    }

    CardView {
        lines: rows,
        targets,
    }
}

fn progress_line(percent: f64, width: usize) -> Line<'static> {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(COLOR_ACCENT)),
        Span::styled(
            "─".repeat(width - filled),
            Style::default().fg(COLOR_BORDER_IDLE),
        ),
    ])
}

/// Right-aligns `text` inside a card with one column of padding on each side.
/// Returns the line and the card-local column the text starts at.
fn right_aligned(text: &str, style: Style, width: usize) -> (Line<'static>, u16) {
    let text = truncate_to_width(text, width);
    let pad = width.saturating_sub(UnicodeWidthStr::width(text.as_str()));
    let line = Line::from(vec![
        Span::raw(" ".repeat(pad + 1)),
        Span::styled(text, style),
    ]);
    (line, (pad + 1) as u16)
}

fn centered(span: Span<'static>, width: usize) -> Line<'static> {
    let used = UnicodeWidthStr::width(span.content.as_ref());
    let pad = width.saturating_sub(used) / 2;
    Line::from(vec![Span::raw(" ".repeat(pad + 1)), span])
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    if width > 0 {
        out.push('…');
    }
    out
}

fn display_url(url: &str) -> &str {
    url.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;

    use crate::device::SimulatedFactory;
    use crate::feed::builtin_reels;

    const VIEWPORT: u16 = 40;

    fn model(snap_delay: Duration) -> Model {
        let tracker = Tracker::new(builtin_reels()).unwrap();
        let mut model = Model::new(Options {
            tracker,
            factory: Box::new(SimulatedFactory {
                duration: Duration::from_secs(100),
                progress_interval: Duration::from_millis(250),
            }),
            status_message: String::new(),
            scroll_step: 10,
            snap_delay,
            tick_rate: Duration::from_millis(120),
        });
        model.resize_viewport(usize::from(VIEWPORT));
        model
    }

    fn press(model: &mut Model, code: KeyCode) {
        assert!(!model.handle_key(code).unwrap());
    }

    fn mouse(model: &mut Model, kind: MouseEventKind, column: u16, row: u16) {
        model
            .handle_mouse(MouseEvent {
                kind,
                column,
                row,
                modifiers: KeyModifiers::NONE,
            })
            .unwrap();
    }

    fn region(id: ItemId, kind: HitKind, rect: Rect) -> HitRegion {
        HitRegion { id, kind, rect }
    }

    #[test]
    fn key_scrolling_moves_active_item() {
        let mut model = model(Duration::from_secs(60));
        assert_eq!(model.tracker.active(), 1);
        press(&mut model, KeyCode::Char('j'));
        assert_eq!(model.scroll, 10);
        assert_eq!(model.tracker.active(), 1);
        press(&mut model, KeyCode::Char('j'));
        assert_eq!(model.scroll, 20);
        assert_eq!(model.tracker.active(), 2);
        assert!(!model.tracker.device(2).unwrap().paused());
        assert!(!model.tracker.device(2).unwrap().muted());

        press(&mut model, KeyCode::Char('n'));
        assert_eq!(model.scroll, 80);
        assert_eq!(model.tracker.active(), 3);
        press(&mut model, KeyCode::Char('G'));
        assert_eq!(model.tracker.active(), 5);
        press(&mut model, KeyCode::Char('g'));
        assert_eq!(model.scroll, 0);
        assert_eq!(model.tracker.active(), 1);
    }

    #[test]
    fn quit_keys_end_the_loop() {
        let mut model = model(Duration::from_secs(60));
        assert!(model.handle_key(KeyCode::Char('q')).unwrap());
        assert!(model.handle_key(KeyCode::Esc).unwrap());
    }

    #[test]
    fn space_toggles_the_active_card_only() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        assert_eq!(model.tracker.active(), 2);

        press(&mut model, KeyCode::Char(' '));
        assert!(model.tracker.device(2).unwrap().paused());
        assert!(model.tracker.state(2).user_paused);
        assert!(!model.tracker.state(3).user_paused);

        press(&mut model, KeyCode::Char(' '));
        assert!(!model.tracker.device(2).unwrap().paused());
        assert!(!model.tracker.state(2).user_paused);
    }

    #[test]
    fn digit_and_arrow_keys_seek_the_active_card() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        press(&mut model, KeyCode::Char('4'));
        assert_eq!(model.tracker.state(2).progress_percent, 40.0);
        press(&mut model, KeyCode::Right);
        assert_eq!(model.tracker.state(2).progress_percent, 45.0);
        press(&mut model, KeyCode::Left);
        press(&mut model, KeyCode::Left);
        assert_eq!(model.tracker.state(2).progress_percent, 35.0);
        press(&mut model, KeyCode::Char('0'));
        assert_eq!(model.tracker.state(2).progress_percent, 0.0);
        assert_eq!(model.tracker.state(3).progress_percent, 0.0);
    }

    #[test]
    fn seeking_an_image_reports_in_status() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('5'));
        assert_eq!(model.tracker.state(1).progress_percent, 0.0);
        assert_eq!(model.status_message, "Nothing to seek yet.");
    }

    #[test]
    fn click_on_inactive_card_is_ignored() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        let before = model.tracker.state(3);
        model.hit_regions = vec![
            region(2, HitKind::Card, Rect::new(0, 0, 30, 20)),
            region(3, HitKind::Card, Rect::new(0, 20, 30, 20)),
        ];
        mouse(&mut model, MouseEventKind::Down(MouseButton::Left), 5, 25);
        assert_eq!(model.tracker.state(3), before);
        assert_eq!(model.tracker.active(), 2);
        assert!(model.tracker.device(3).unwrap().paused());
        assert!(!model.tracker.device(2).unwrap().paused());

        mouse(&mut model, MouseEventKind::Down(MouseButton::Left), 5, 5);
        assert!(model.tracker.state(2).user_paused);
    }

    #[test]
    fn click_on_mute_indicator_toggles_mute() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        model.hit_regions = vec![
            region(2, HitKind::Card, Rect::new(0, 0, 30, 40)),
            region(2, HitKind::Mute, Rect::new(20, 1, 8, 1)),
        ];
        mouse(&mut model, MouseEventKind::Down(MouseButton::Left), 22, 1);
        assert_eq!(model.tracker.state(2).user_muted, Some(true));
        assert!(model.tracker.device(2).unwrap().muted());
        assert!(!model.tracker.state(2).user_paused);
    }

    #[test]
    fn click_and_drag_on_progress_bar_seek() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        model.hit_regions = vec![
            region(2, HitKind::Card, Rect::new(0, 0, 30, 40)),
            region(2, HitKind::Progress, Rect::new(10, 38, 11, 1)),
        ];
        mouse(&mut model, MouseEventKind::Down(MouseButton::Left), 15, 38);
        assert_eq!(model.tracker.state(2).progress_percent, 50.0);
        assert_eq!(model.dragging, Some(2));

        mouse(&mut model, MouseEventKind::Drag(MouseButton::Left), 20, 12);
        assert_eq!(model.tracker.state(2).progress_percent, 100.0);

        mouse(&mut model, MouseEventKind::Up(MouseButton::Left), 20, 12);
        assert_eq!(model.dragging, None);
        mouse(&mut model, MouseEventKind::Drag(MouseButton::Left), 10, 38);
        assert_eq!(model.tracker.state(2).progress_percent, 100.0);
    }

    #[test]
    fn drawn_progress_bar_is_clickable() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        let mut terminal = Terminal::new(TestBackend::new(80, VIEWPORT + 2)).unwrap();
        terminal.draw(|frame| model.draw(frame)).unwrap();

        let bar = model
            .hit_regions
            .iter()
            .find(|region| region.id == 2 && region.kind == HitKind::Progress)
            .copied()
            .unwrap();
        mouse(
            &mut model,
            MouseEventKind::Down(MouseButton::Left),
            bar.rect.x + bar.rect.width - 1,
            bar.rect.y,
        );
        assert_eq!(model.tracker.state(2).progress_percent, 100.0);
    }

    #[test]
    fn idle_scroll_snaps_to_nearest_card() {
        let mut model = model(Duration::ZERO);
        press(&mut model, KeyCode::Char('j'));
        press(&mut model, KeyCode::Char('j'));
        press(&mut model, KeyCode::Char('j'));
        assert_eq!(model.scroll, 30);
        assert!(model.snap_if_idle());
        assert_eq!(model.scroll, 40);
        assert_eq!(model.tracker.active(), 2);
        assert!(!model.snap_if_idle());

        press(&mut model, KeyCode::Char('k'));
        assert_eq!(model.scroll, 30);
        assert!(model.snap_if_idle());
        assert_eq!(model.scroll, 40);
    }

    #[test]
    fn snap_waits_for_the_delay() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('j'));
        assert!(!model.snap_if_idle());
        assert_eq!(model.scroll, 10);
    }

    #[test]
    fn resize_keeps_active_card_aligned() {
        let mut model = model(Duration::from_secs(60));
        press(&mut model, KeyCode::Char('n'));
        press(&mut model, KeyCode::Char('n'));
        assert_eq!(model.tracker.active(), 3);
        model.resize_viewport(25);
        assert_eq!(model.scroll, 50);
        assert_eq!(model.tracker.active(), 3);
    }

    fn line_text(line: &Line<'_>) -> String {
        line.spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect()
    }

    fn total_width(line: &Line<'_>) -> usize {
        line.spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum()
    }

    fn video_item() -> FeedItem {
        FeedItem::new(2, "https://i.imgur.com/Wr0K3RI.mp4", "forest.walks", "Nature heals", "964")
    }

    #[test]
    fn card_fills_its_height() {
        let state = PlaybackState {
            active: true,
            ..PlaybackState::default()
        };
        let card = build_card(&video_item(), &state, true, 30, 24);
        assert_eq!(card.lines.len(), 24);
        assert!(card
            .lines
            .iter()
            .any(|line| line_text(line).contains("@forest.walks")));
        assert!(card.lines.iter().any(|line| line_text(line).contains("964")));
    }

    #[test]
    fn video_cards_expose_mute_and_progress_targets() {
        let card = build_card(&video_item(), &PlaybackState::default(), true, 30, 24);
        let kinds: Vec<HitKind> = card.targets.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![HitKind::Mute, HitKind::Progress]);
        let progress = card.targets[1];
        assert_eq!(progress.row, 22);
        assert_eq!(progress.width, 28);
    }

    #[test]
    fn image_cards_have_no_controls() {
        let item = FeedItem::new(1, "https://i.imgur.com/jg6HwrR.gif", "a", "b", "1");
        let card = build_card(&item, &PlaybackState::default(), true, 30, 24);
        assert!(card.targets.is_empty());
    }

    #[test]
    fn inactive_cards_show_muted() {
        let state = PlaybackState {
            active: false,
            user_muted: Some(false),
            ..PlaybackState::default()
        };
        let card = build_card(&video_item(), &state, true, 30, 24);
        assert!(line_text(&card.lines[1]).contains("muted"));
    }

    #[test]
    fn user_paused_card_shows_play_glyph() {
        let state = PlaybackState {
            active: true,
            user_paused: true,
            ..PlaybackState::default()
        };
        let card = build_card(&video_item(), &state, true, 30, 24);
        assert!(card.lines.iter().any(|line| line_text(line).contains("▶")));
    }

    #[test]
    fn progress_bar_matches_percent() {
        let line = progress_line(50.0, 20);
        assert_eq!(line.spans[1].content.chars().count(), 10);
        assert_eq!(total_width(&line), 21);
    }

    #[test]
    fn percent_at_maps_bar_columns() {
        let bar = Rect::new(10, 5, 11, 1);
        assert_eq!(percent_at(bar, 10), 0.0);
        assert_eq!(percent_at(bar, 15), 50.0);
        assert_eq!(percent_at(bar, 20), 100.0);
        assert_eq!(percent_at(bar, 40), 100.0);
        assert_eq!(percent_at(bar, 2), 0.0);
    }

    #[test]
    fn right_aligned_reaches_card_edge() {
        let (line, column) = right_aligned("♥", Style::default(), 20);
        assert_eq!(total_width(&line), 21);
        assert_eq!(column, 20);
    }

    #[test]
    fn truncation_respects_wide_glyphs() {
        assert_eq!(truncate_to_width("short", 10), "short");
        let cut = truncate_to_width("🌃🌃🌃🌃", 5);
        assert!(UnicodeWidthStr::width(cut.as_str()) <= 5);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn card_width_keeps_portrait_aspect() {
        assert_eq!(card_width(Rect::new(0, 0, 200, 40)), 45);
        assert_eq!(card_width(Rect::new(0, 0, 30, 40)), 30);
        assert_eq!(card_width(Rect::new(0, 0, 200, 8)), MIN_CARD_WIDTH);
    }
}
