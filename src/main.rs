use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::{
    io::{self, stdout},
    time::{Duration, Instant},
};

use mirrotris::game::{Cell, Game, Position, Shape, ARENA_HEIGHT, ARENA_WIDTH};

// ============================================================================
// Visual Constants
// ============================================================================

const CELL_WIDTH: u16 = 2;
const BLOCK_CHAR: &str = "██";
const GHOST_CHAR: &str = "░░";
const EMPTY_CHAR: &str = "  ";

// ============================================================================
// Color Mapping
// ============================================================================

fn cell_color(value: Cell) -> Color {
    match value {
        1 => Color::Red,
        2 => Color::Blue,
        3 => Color::Magenta,
        4 => Color::Green,
        5 => Color::Rgb(128, 0, 128),
        6 => Color::Rgb(255, 165, 0),
        _ => Color::Rgb(255, 192, 203),
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Shape cell covering arena coordinate (x, y) when the shape is drawn at
/// `pos`, or 0. The piece is always drawn at its raw position; the mirrored
/// row remap only applies when it merges.
fn shape_cell_at(shape: &Shape, pos: Position, x: i16, y: i16) -> Cell {
    let lx = x - pos.x;
    let ly = y - pos.y;
    if lx < 0 || ly < 0 || lx as usize >= shape.width() || ly as usize >= shape.height() {
        return 0;
    }
    shape.cell(lx as usize, ly as usize)
}

fn render(frame: &mut Frame, game: &Game) {
    let area = frame.size();

    let grid_display_width = (ARENA_WIDTH as u16 * CELL_WIDTH) + 2;
    let grid_display_height = ARENA_HEIGHT as u16 + 2;
    let info_width = 14;
    let total_width = grid_display_width + info_width + 2;
    let total_height = grid_display_height + 3;

    let main_area = centered_rect(total_width, total_height, area);

    let vertical = Layout::vertical([
        Constraint::Length(grid_display_height),
        Constraint::Fill(1),
    ])
    .split(main_area);

    let game_row = vertical[0];

    let horizontal = Layout::horizontal([
        Constraint::Length(grid_display_width),
        Constraint::Length(info_width),
    ])
    .split(game_row);

    render_arena(frame, game, horizontal[0]);
    render_info(frame, game, horizontal[1]);

    let controls_area = Rect {
        x: area.x,
        y: game_row.y + game_row.height,
        width: area.width,
        height: 2,
    };

    if controls_area.y + 1 < area.height {
        let controls = Paragraph::new(vec![Line::from(
            "←→: Move | ↓: Drop | ↑: Rotate | Space: Hard Drop | U/Ctrl-Z: Undo | Q/ESC: Quit",
        )])
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(controls, controls_area);
    }
}

fn render_arena(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Mirrotris ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let ghost_pos = game.ghost_position();
    let arena_rows: Vec<&[Cell]> = game.arena.rows().collect();

    let mut lines: Vec<Line> = Vec::new();

    for y in 0..ARENA_HEIGHT as i16 {
        let mut spans: Vec<Span> = Vec::new();

        for x in 0..ARENA_WIDTH as i16 {
            let piece = shape_cell_at(&game.player.shape, game.player.pos, x, y);
            let ghost = shape_cell_at(&game.player.shape, ghost_pos, x, y);
            let settled = arena_rows[y as usize][x as usize];

            let (symbol, style) = if piece != 0 {
                (BLOCK_CHAR, Style::default().fg(cell_color(piece)))
            } else if ghost != 0 {
                (GHOST_CHAR, Style::default().fg(Color::DarkGray))
            } else if settled != 0 {
                (BLOCK_CHAR, Style::default().fg(cell_color(settled)))
            } else {
                (EMPTY_CHAR, Style::default())
            };

            spans.push(Span::styled(symbol, style));
        }

        lines.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn render_info(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Info ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let gravity = if game.mirror { "Mirror" } else { "Normal" };
    let gravity_color = if game.mirror { Color::Red } else { Color::Green };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("Score", Style::default().fg(Color::Yellow))),
        Line::from(format!("{}", game.player.score)),
        Line::from(""),
        Line::from(Span::styled("Lines", Style::default().fg(Color::Cyan))),
        Line::from(format!("{}", game.lines_cleared)),
        Line::from(""),
        Line::from(Span::styled("Gravity", Style::default().fg(Color::Green))),
        Line::from(Span::styled(gravity, Style::default().fg(gravity_color))),
    ];

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let horizontal = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(width.min(area.width)),
        Constraint::Fill(1),
    ])
    .split(area);

    let vertical = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height.min(area.height)),
        Constraint::Fill(1),
    ])
    .split(horizontal[1]);

    vertical[1]
}

// ============================================================================
// Main Loop
// ============================================================================

fn main() -> io::Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut game = Game::new();
    let mut last_frame = Instant::now();

    loop {
        terminal.draw(|frame| render(frame, &game))?;

        // Sleep at most until the next gravity drop is due
        let timeout = Duration::from_millis(game.until_next_drop_ms() + 1);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => break,
                        KeyCode::Char('z') | KeyCode::Char('Z')
                            if key.modifiers.contains(KeyModifiers::CONTROL) =>
                        {
                            game.undo();
                        }
                        KeyCode::Char('u') | KeyCode::Char('U') => {
                            game.undo();
                        }
                        KeyCode::Left => {
                            game.move_piece(-1);
                        }
                        KeyCode::Right => {
                            game.move_piece(1);
                        }
                        KeyCode::Down => {
                            game.soft_drop();
                        }
                        KeyCode::Up => {
                            game.rotate_piece(true);
                        }
                        KeyCode::Char(' ') => {
                            game.hard_drop();
                        }
                        _ => {}
                    }
                }
            }
        }

        // Feed elapsed wall time to the drop clock
        let now = Instant::now();
        let delta = now.duration_since(last_frame);
        last_frame = now;
        game.advance(delta.as_millis() as u64);
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
