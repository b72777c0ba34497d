//! Layout and drawing: playfield, pieces, clearance flash, sidebar, overlays.

use crate::game::Snapshot;
use crate::grid::{BLOCK_SIZE, Cell};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use std::collections::HashSet;
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

const SIDEBAR_WIDTH: u16 = 22;

/// Largest playfield offered regardless of terminal size.
const MAX_COLS: u16 = 12;
const MAX_ROWS: u16 = 24;

/// Flash duration for marked cells; just under the removal delay so the fade
/// completes before the cells vanish.
const REMOVAL_FLASH_MS: u32 = 900;

/// Terminal cells needed for a cols x rows block field: one column per grain,
/// half-blocks give two grain rows per terminal row, plus the border.
fn playfield_pixel_size(cols: u16, rows: u16) -> (u16, u16) {
    let s = BLOCK_SIZE as u16;
    (cols * s + 2, rows * s / 2 + 2)
}

/// Playfield size in blocks that fits the given terminal, capped at
/// MAX_COLS x MAX_ROWS and floored at 1x1.
pub fn playfield_size_for_terminal(term_cols: u16, term_rows: u16) -> (u16, u16) {
    let s = BLOCK_SIZE as u16;
    let max_w = term_cols.saturating_sub(2 + SIDEBAR_WIDTH);
    let max_h = term_rows.saturating_sub(2);
    let cols = (max_w / s).min(MAX_COLS).max(1);
    let rows = (max_h / (s / 2)).min(MAX_ROWS).max(1);
    (cols, rows)
}

/// Dim a colour towards black (ghost piece).
fn dim(color: Color) -> Color {
    match color {
        Color::Rgb(r, g, b) => Color::Rgb(
            (f32::from(r) * 0.4) as u8,
            (f32::from(g) * 0.4) as u8,
            (f32::from(b) * 0.4) as u8,
        ),
        other => other,
    }
}

fn in_blocks(blocks: &[(i32, i32)], gx: i32, gy: i32) -> bool {
    let s = BLOCK_SIZE as i32;
    blocks
        .iter()
        .any(|&(bx, by)| gx >= bx && gx < bx + s && gy >= by && gy < by + s)
}

/// Board-only rect (inside the border) for the current snapshot.
fn board_rect(area: Rect, snap: &Snapshot) -> Rect {
    let cols = (snap.grid.width() / BLOCK_SIZE) as u16;
    let rows = (snap.grid.height() / BLOCK_SIZE) as u16;
    let (pw, ph) = playfield_pixel_size(cols, rows);
    let total_w = pw + SIDEBAR_WIDTH;
    let x = area.x + area.width.saturating_sub(total_w) / 2;
    let y = area.y + area.height.saturating_sub(ph) / 2;
    let outer = Rect {
        x,
        y,
        width: pw.min(area.width),
        height: ph.min(area.height),
    };
    Rect {
        x: outer.x + 1,
        y: outer.y + 1,
        width: outer.width.saturating_sub(2),
        height: outer.height.saturating_sub(2),
    }
}

/// Buffer positions covered by marked cells (for the flash filter).
fn marked_buffer_positions(board: Rect, snap: &Snapshot) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for gy in 0..snap.grid.height() {
        for gx in 0..snap.grid.width() {
            if snap.grid.get(gx, gy) == Some(Cell::Marked) {
                let bx = board.x + gx as u16;
                let by = board.y + (gy / 2) as u16;
                if bx < board.x + board.width && by < board.y + board.height {
                    set.insert((bx, by));
                }
            }
        }
    }
    set
}

/// Create or advance the flash effect while marked cells wait on the removal
/// delay.
fn apply_removal_flash(
    frame: &mut Frame,
    snap: &Snapshot,
    theme: &Theme,
    board: Rect,
    effect: &mut Option<Effect>,
    process_time: &mut Option<Instant>,
    now: Instant,
) {
    let delta = process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u128::from(u32::MAX)) as u32;
    *process_time = Some(now);

    if effect.is_none() {
        let marked = marked_buffer_positions(board, snap);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            marked.contains(&(pos.x, pos.y))
        }));
        let bg = theme.bg;
        let fade = fx::fade_to(bg, bg, (REMOVAL_FLASH_MS, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board);
        *effect = Some(fade);
    }
    if let Some(effect) = effect {
        frame.render_effect(effect, board, TfxDuration::from_millis(delta_ms));
    }
}

/// Draw one frame: playfield with pieces and sand, sidebar, overlays.
pub fn draw(
    frame: &mut Frame,
    snap: &Snapshot,
    theme: &Theme,
    paused: bool,
    high_score: u32,
    area: Rect,
    removal_effect: &mut Option<Effect>,
    removal_effect_time: &mut Option<Instant>,
    now: Instant,
    no_animation: bool,
) {
    let board = board_rect(area, snap);
    let outer = Rect {
        x: board.x.saturating_sub(1),
        y: board.y.saturating_sub(1),
        width: board.width + 2,
        height: board.height + 2,
    }
    .intersection(area);
    frame.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line)),
        outer,
    );

    draw_board(frame, snap, theme, board);

    let has_marked = snap.grid.has_marked();
    if has_marked && !no_animation {
        apply_removal_flash(
            frame,
            snap,
            theme,
            board,
            removal_effect,
            removal_effect_time,
            now,
        );
    } else if !has_marked {
        *removal_effect = None;
        *removal_effect_time = None;
    }

    draw_sidebar(frame, snap, theme, paused, high_score, outer, area);

    if snap.game_over {
        draw_game_over(frame, snap, theme, board);
    } else if paused {
        draw_centered_overlay(frame, theme, board, vec!["PAUSED".into()]);
    }
}

fn draw_board(frame: &mut Frame, snap: &Snapshot, theme: &Theme, board: Rect) {
    let grid = snap.grid;
    let current_blocks: Vec<(i32, i32)> = snap.current.blocks().collect();
    let ghost_blocks: Vec<(i32, i32)> = snap.ghost.blocks().collect();
    let piece_color = theme.sand_color(snap.current.color);
    let ghost_color = dim(piece_color);

    let grain_color = |gx: usize, gy: usize| -> Color {
        let (gxi, gyi) = (gx as i32, gy as i32);
        if !snap.game_over && in_blocks(&current_blocks, gxi, gyi) {
            return piece_color;
        }
        match grid.get(gx, gy) {
            Some(Cell::Sand(c)) => theme.sand_color(c),
            Some(Cell::Marked) => theme.marked,
            _ => {
                if !snap.game_over && in_blocks(&ghost_blocks, gxi, gyi) {
                    ghost_color
                } else {
                    theme.bg
                }
            }
        }
    };

    let term_rows = (grid.height() / 2).min(board.height as usize);
    let term_cols = grid.width().min(board.width as usize);
    let mut lines = Vec::with_capacity(term_rows);
    for ty in 0..term_rows {
        let mut spans = Vec::with_capacity(term_cols);
        for gx in 0..term_cols {
            let top = grain_color(gx, ty * 2);
            let bottom = grain_color(gx, ty * 2 + 1);
            spans.push(Span::styled("▀", Style::default().fg(top).bg(bottom)));
        }
        lines.push(Line::from(spans));
    }
    frame.render_widget(Paragraph::new(lines), board);
}

fn draw_sidebar(
    frame: &mut Frame,
    snap: &Snapshot,
    theme: &Theme,
    paused: bool,
    high_score: u32,
    playfield_outer: Rect,
    area: Rect,
) {
    let x = playfield_outer.x + playfield_outer.width;
    if x >= area.x + area.width {
        return;
    }
    let sidebar = Rect {
        x,
        y: playfield_outer.y,
        width: SIDEBAR_WIDTH.min(area.x + area.width - x),
        height: playfield_outer.height,
    };

    let label = Style::default().fg(theme.main_fg);
    let value = Style::default().fg(theme.title);
    let mut lines = vec![Line::from(Span::styled(
        format!("Next: {}", snap.next.shape.name),
        label,
    ))];
    let next_color = theme.sand_color(snap.next.color);
    for row in 0..4 {
        let mut spans = vec![Span::raw(" ")];
        for col in 0..4 {
            if snap.next.shape.occupied(snap.next.rotation, row, col) {
                spans.push(Span::styled("██", Style::default().fg(next_color)));
            } else {
                spans.push(Span::raw("  "));
            }
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::default());
    lines.push(Line::from(vec![
        Span::styled("Score ", label),
        Span::styled(format!("{:>8}", snap.score), value),
    ]));
    lines.push(Line::from(vec![
        Span::styled("Level ", label),
        Span::styled(format!("{:>8}", snap.level), value),
    ]));
    lines.push(Line::from(vec![
        Span::styled("Best  ", label),
        Span::styled(format!("{:>8}", high_score), value),
    ]));
    lines.push(Line::default());
    lines.push(Line::from(Span::styled("←/→ move  ↑/↓ rotate", label)));
    lines.push(Line::from(Span::styled("Space drop  P pause", label)));
    lines.push(Line::from(Span::styled("Q quit", label)));
    if paused {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "PAUSED",
            Style::default().fg(theme.title),
        )));
    }

    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line))
                .title(Span::styled(" sandfall ", Style::default().fg(theme.title))),
        ),
        sidebar,
    );
}

fn draw_game_over(frame: &mut Frame, snap: &Snapshot, theme: &Theme, board: Rect) {
    draw_centered_overlay(
        frame,
        theme,
        board,
        vec![
            "GAME OVER".into(),
            format!("Score: {}", snap.score),
            String::new(),
            "Press R to restart".into(),
        ],
    );
}

fn draw_centered_overlay(frame: &mut Frame, theme: &Theme, board: Rect, text: Vec<String>) {
    let height = text.len() as u16;
    let rect = Rect {
        x: board.x,
        y: board.y + board.height.saturating_sub(height) / 2,
        width: board.width,
        height: height.min(board.height),
    };
    let lines: Vec<Line> = text
        .into_iter()
        .map(|s| Line::from(Span::styled(s, Style::default().fg(theme.title))))
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .style(Style::default().bg(theme.bg)),
        rect,
    );
}
