use rand::Rng;
use std::rc::Rc;

// ============================================================================
// Configuration
// ============================================================================

pub const ARENA_WIDTH: usize = 12;
pub const ARENA_HEIGHT: usize = 20;

// Timing (in milliseconds)
pub const DROP_INTERVAL_MS: u64 = 1000;

// Scoring: first cleared row in a sweep is worth ROW_SCORE, and the reward
// doubles for every further row cleared in the same sweep (10, 20, 40, ...).
pub const ROW_SCORE: u32 = 10;
// Gravity flips every LINES_PER_FLIP cumulative line clears.
pub const LINES_PER_FLIP: u32 = 10;

// ============================================================================
// Types
// ============================================================================

/// 0 = empty, 1..=7 = filled, identifying the piece kind that left the cell.
/// The engine only distinguishes zero from nonzero; the id exists for the
/// renderer's color lookup.
pub type Cell = u8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    /// Canonical shape matrix. Every kind is stored as a square matrix so the
    /// in-place transpose-and-reverse rotation is well defined.
    pub fn shape(&self) -> Shape {
        let cells: Vec<Vec<Cell>> = match self {
            PieceKind::T => vec![
                vec![0, 0, 0],
                vec![1, 1, 1],
                vec![0, 1, 0],
            ],
            PieceKind::O => vec![
                vec![2, 2],
                vec![2, 2],
            ],
            PieceKind::L => vec![
                vec![0, 3, 0],
                vec![0, 3, 0],
                vec![0, 3, 3],
            ],
            PieceKind::J => vec![
                vec![0, 4, 0],
                vec![0, 4, 0],
                vec![4, 4, 0],
            ],
            PieceKind::I => vec![
                vec![0, 5, 0, 0],
                vec![0, 5, 0, 0],
                vec![0, 5, 0, 0],
                vec![0, 5, 0, 0],
            ],
            PieceKind::S => vec![
                vec![0, 6, 6],
                vec![6, 6, 0],
                vec![0, 0, 0],
            ],
            PieceKind::Z => vec![
                vec![7, 7, 0],
                vec![0, 7, 7],
                vec![0, 0, 0],
            ],
        };
        Shape { cells }
    }

    fn random() -> Self {
        let mut rng = rand::thread_rng();
        match rng.gen_range(0..7) {
            0 => PieceKind::I,
            1 => PieceKind::O,
            2 => PieceKind::T,
            3 => PieceKind::S,
            4 => PieceKind::Z,
            5 => PieceKind::J,
            _ => PieceKind::L,
        }
    }
}

// ============================================================================
// Shape
// ============================================================================

/// The small square grid of the currently controlled piece.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Shape {
    cells: Vec<Vec<Cell>>,
}

impl Shape {
    pub fn width(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.cells[y][x]
    }

    /// Rotate 90 degrees in place: transpose, then reverse each row for
    /// clockwise or reverse the row order for counter-clockwise.
    pub fn rotate(&mut self, clockwise: bool) {
        let n = self.cells.len();
        for y in 0..n {
            for x in 0..y {
                let tmp = self.cells[y][x];
                self.cells[y][x] = self.cells[x][y];
                self.cells[x][y] = tmp;
            }
        }
        if clockwise {
            for row in &mut self.cells {
                row.reverse();
            }
        } else {
            self.cells.reverse();
        }
    }
}

// ============================================================================
// Arena
// ============================================================================

/// The persistent grid of settled cells. Rows are copy-on-write: cloning an
/// arena for a history snapshot only copies row handles, and `set` breaks the
/// sharing before writing, so a snapshot never aliases live state.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Arena {
    rows: Vec<Rc<Vec<Cell>>>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            rows: (0..ARENA_HEIGHT)
                .map(|_| Rc::new(vec![0; ARENA_WIDTH]))
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// `None` for coordinates outside the stored grid. The collision rule
    /// treats that as a filled cell, which is what bounds the piece at the
    /// walls and the floor; there is no separate bounds check anywhere.
    pub fn cell(&self, x: i16, y: i16) -> Option<Cell> {
        if x < 0 || y < 0 {
            return None;
        }
        self.rows.get(y as usize)?.get(x as usize).copied()
    }

    /// Out-of-range writes are dropped.
    pub fn set(&mut self, x: i16, y: i16, value: Cell) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if y < self.rows.len() && x < ARENA_WIDTH {
            Rc::make_mut(&mut self.rows[y])[x] = value;
        }
    }

    pub fn collides(&self, shape: &Shape, pos: Position) -> bool {
        for y in 0..shape.height() {
            for x in 0..shape.width() {
                if shape.cell(x, y) != 0
                    && self.cell(pos.x + x as i16, pos.y + y as i16) != Some(0)
                {
                    return true;
                }
            }
        }
        false
    }

    pub fn row_full(&self, y: usize) -> bool {
        self.rows[y].iter().all(|&cell| cell != 0)
    }

    /// Remove row `y` and refill with a fresh empty row at the end opposite
    /// the displacement direction: top under normal gravity, bottom when
    /// mirrored.
    pub fn remove_row(&mut self, y: usize, refill_at_bottom: bool) {
        self.rows.remove(y);
        let fresh = Rc::new(vec![0; ARENA_WIDTH]);
        if refill_at_bottom {
            self.rows.push(fresh);
        } else {
            self.rows.insert(0, fresh);
        }
    }

    pub fn clear(&mut self) {
        self.rows = (0..ARENA_HEIGHT)
            .map(|_| Rc::new(vec![0; ARENA_WIDTH]))
            .collect();
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|row| row.as_slice())
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Player
// ============================================================================

/// The currently falling piece plus the running score.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Player {
    pub shape: Shape,
    pub pos: Position,
    pub score: u32,
}

impl Player {
    pub fn new(kind: PieceKind) -> Self {
        let shape = kind.shape();
        let x = (ARENA_WIDTH / 2) as i16 - (shape.width() / 2) as i16;
        Self {
            shape,
            pos: Position { x, y: 0 },
            score: 0,
        }
    }

    pub fn new_at(kind: PieceKind, x: i16, y: i16) -> Self {
        Self {
            shape: kind.shape(),
            pos: Position { x, y },
            score: 0,
        }
    }
}

// ============================================================================
// Piece Provider Trait
// ============================================================================

pub trait PieceProvider {
    fn next_piece(&mut self) -> PieceKind;
}

struct RandomPieceProvider;

impl PieceProvider for RandomPieceProvider {
    fn next_piece(&mut self) -> PieceKind {
        PieceKind::random()
    }
}

pub struct SequencePieceProvider {
    pieces: Vec<PieceKind>,
    index: usize,
}

impl SequencePieceProvider {
    pub fn new(pieces: Vec<PieceKind>) -> Self {
        Self { pieces, index: 0 }
    }
}

impl PieceProvider for SequencePieceProvider {
    fn next_piece(&mut self) -> PieceKind {
        let piece = self.pieces[self.index % self.pieces.len()];
        self.index += 1;
        piece
    }
}

// ============================================================================
// History
// ============================================================================

/// One entry of the undo stack: the whole mutable game state at one instant.
/// The arena clone is cheap thanks to the copy-on-write rows.
#[derive(Clone)]
struct Snapshot {
    arena: Arena,
    shape: Shape,
    pos: Position,
    score: u32,
    lines_cleared: u32,
    mirror: bool,
}

// ============================================================================
// Game
// ============================================================================

pub struct Game {
    pub arena: Arena,
    pub player: Player,
    pub lines_cleared: u32,
    /// Gravity direction: false = pieces fall down, true = mirrored (pieces
    /// fall up and cleared rows are displaced toward the bottom).
    pub mirror: bool,
    history: Vec<Snapshot>,
    drop_timer_ms: u64,
    piece_provider: Box<dyn PieceProvider>,
}

impl Game {
    pub fn new() -> Self {
        Self::with_provider(Box::new(RandomPieceProvider))
    }

    pub fn with_provider(mut provider: Box<dyn PieceProvider>) -> Self {
        let kind = provider.next_piece();
        Self {
            arena: Arena::new(),
            player: Player::new(kind),
            lines_cleared: 0,
            mirror: false,
            history: Vec::new(),
            drop_timer_ms: 0,
            piece_provider: provider,
        }
    }

    pub fn with_arena(arena: Arena, player: Player) -> Self {
        Self {
            arena,
            player,
            lines_cleared: 0,
            mirror: false,
            history: Vec::new(),
            drop_timer_ms: 0,
            piece_provider: Box::new(RandomPieceProvider),
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    fn save_state(&mut self) {
        self.history.push(Snapshot {
            arena: self.arena.clone(),
            shape: self.player.shape.clone(),
            pos: self.player.pos,
            score: self.player.score,
            lines_cleared: self.lines_cleared,
            mirror: self.mirror,
        });
    }

    /// Restore the most recent snapshot; no-op when the stack is empty.
    /// There is no redo: a popped snapshot is discarded.
    pub fn undo(&mut self) {
        if let Some(snapshot) = self.history.pop() {
            self.arena = snapshot.arena;
            self.player.shape = snapshot.shape;
            self.player.pos = snapshot.pos;
            self.player.score = snapshot.score;
            self.lines_cleared = snapshot.lines_cleared;
            self.mirror = snapshot.mirror;
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    // ------------------------------------------------------------------
    // Player operations
    // ------------------------------------------------------------------

    /// Shift the piece horizontally; reverted silently on collision. The
    /// snapshot is pushed unconditionally, so even a blocked move is undoable.
    pub fn move_piece(&mut self, dx: i16) {
        self.save_state();
        self.player.pos.x += dx;
        if self.arena.collides(&self.player.shape, self.player.pos) {
            self.player.pos.x -= dx;
        }
    }

    /// Rotate in place, then search for a wall kick: alternating x-offsets
    /// +1, -2, +3, -4, ... (net displacements +1, -1, +2, -2, ...). When the
    /// offset magnitude exceeds the shape width, the rotation is undone and
    /// x restored; the caller sees a silent no-op.
    pub fn rotate_piece(&mut self, clockwise: bool) {
        self.save_state();
        let original_x = self.player.pos.x;
        let mut offset: i16 = 1;
        self.player.shape.rotate(clockwise);
        while self.arena.collides(&self.player.shape, self.player.pos) {
            if offset.abs() > self.player.shape.width() as i16 {
                self.player.shape.rotate(!clockwise);
                self.player.pos.x = original_x;
                return;
            }
            self.player.pos.x += offset;
            offset = -(offset + offset.signum());
        }
    }

    /// One gravity step. On collision the step is reverted and the piece
    /// locks: merge, spawn the next piece, sweep. Resets the drop timer
    /// whether or not the piece locked.
    pub fn soft_drop(&mut self) {
        self.save_state();
        let dy = self.gravity_step();
        self.player.pos.y += dy;
        if self.arena.collides(&self.player.shape, self.player.pos) {
            self.player.pos.y -= dy;
            self.lock_piece();
        }
        self.drop_timer_ms = 0;
    }

    /// Fall to the first colliding position, back off one step, then lock.
    pub fn hard_drop(&mut self) {
        self.save_state();
        let dy = self.gravity_step();
        while !self.arena.collides(&self.player.shape, self.player.pos) {
            self.player.pos.y += dy;
        }
        self.player.pos.y -= dy;
        self.lock_piece();
        self.drop_timer_ms = 0;
    }

    fn gravity_step(&self) -> i16 {
        if self.mirror {
            -1
        } else {
            1
        }
    }

    // Spawn happens before the sweep so that a gravity flip triggered by the
    // sweep relocates the fresh piece to the new spawn edge.
    fn lock_piece(&mut self) {
        self.merge();
        self.spawn_next();
        self.sweep();
    }

    /// Pick the next piece, horizontally centered at the spawn row for the
    /// current gravity direction. A spawn that collides immediately means the
    /// board topped out: the whole game silently resets (arena, score, lines,
    /// gravity) instead of entering a terminal state.
    pub fn spawn_next(&mut self) {
        let kind = self.piece_provider.next_piece();
        self.player.shape = kind.shape();
        self.player.pos.y = if self.mirror {
            ARENA_HEIGHT as i16 - 1
        } else {
            0
        };
        self.player.pos.x =
            (ARENA_WIDTH / 2) as i16 - (self.player.shape.width() / 2) as i16;
        if self.arena.collides(&self.player.shape, self.player.pos) {
            self.arena.clear();
            self.player.score = 0;
            self.lines_cleared = 0;
            self.mirror = false;
        }
    }

    // ------------------------------------------------------------------
    // Merge and sweep
    // ------------------------------------------------------------------

    /// Bake the piece into the arena. Under mirrored gravity the row index is
    /// remapped so the same shape matrices serve both directions.
    fn merge(&mut self) {
        let pos = self.player.pos;
        for y in 0..self.player.shape.height() {
            for x in 0..self.player.shape.width() {
                let value = self.player.shape.cell(x, y);
                if value != 0 {
                    let row = if self.mirror {
                        (ARENA_HEIGHT as i16 - 1) - (pos.y - y as i16)
                    } else {
                        pos.y + y as i16
                    };
                    self.arena.set(pos.x + x as i16, row, value);
                }
            }
        }
    }

    /// Scan physical rows last-index-first; every full row is removed, with
    /// the fresh empty row displaced to the gravity-dependent end. The same
    /// index is re-examined after a removal because a neighboring row shifted
    /// into it. Scoring doubles per row within one sweep; the line counter
    /// advances by one per row, and every multiple of LINES_PER_FLIP toggles
    /// gravity on the spot.
    pub fn sweep(&mut self) {
        let mut row_score = ROW_SCORE;
        let mut y = self.arena.height();
        while y > 0 {
            let row = y - 1;
            if !self.arena.row_full(row) {
                y -= 1;
                continue;
            }
            self.arena.remove_row(row, self.mirror);
            self.player.score += row_score;
            row_score *= 2;
            self.lines_cleared += 1;
            if self.lines_cleared % LINES_PER_FLIP == 0 {
                self.toggle_mirror();
            }
        }
    }

    /// Flipping gravity immediately relocates the current piece to the new
    /// spawn edge.
    fn toggle_mirror(&mut self) {
        self.mirror = !self.mirror;
        self.player.pos.y = if self.mirror {
            ARENA_HEIGHT as i16 - 1
        } else {
            0
        };
    }

    // ------------------------------------------------------------------
    // Game loop
    // ------------------------------------------------------------------

    /// Accumulate elapsed time from the host's frame source; once the drop
    /// interval is exceeded, issue an automatic soft drop (which zeroes the
    /// accumulator).
    pub fn advance(&mut self, delta_ms: u64) {
        self.drop_timer_ms += delta_ms;
        if self.drop_timer_ms > DROP_INTERVAL_MS {
            self.soft_drop();
        }
    }

    pub fn until_next_drop_ms(&self) -> u64 {
        DROP_INTERVAL_MS.saturating_sub(self.drop_timer_ms)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Where a hard drop would land the piece right now. Non-mutating; used
    /// by the renderer for the ghost piece.
    pub fn ghost_position(&self) -> Position {
        let dy = self.gravity_step();
        let mut pos = self.player.pos;
        while !self.arena.collides(&self.player.shape, pos) {
            pos.y += dy;
        }
        pos.y -= dy;
        pos
    }

    pub fn is_row_complete(&self, y: usize) -> bool {
        self.arena.row_full(y)
    }

    pub fn filled_count_in_row(&self, y: usize) -> usize {
        self.arena
            .rows()
            .nth(y)
            .map_or(0, |row| row.iter().filter(|&&cell| cell != 0).count())
    }

    pub fn total_filled_cells(&self) -> usize {
        self.arena
            .rows()
            .flatten()
            .filter(|&&cell| cell != 0)
            .count()
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub mod test_helpers {
    use super::*;

    pub fn empty_arena() -> Arena {
        Arena::new()
    }

    pub fn fill_row(arena: &mut Arena, y: usize) {
        for x in 0..ARENA_WIDTH {
            arena.set(x as i16, y as i16, 1);
        }
    }

    pub fn fill_row_with_gap(arena: &mut Arena, y: usize, gap_x: usize) {
        for x in 0..ARENA_WIDTH {
            if x != gap_x {
                arena.set(x as i16, y as i16, 1);
            }
        }
    }
}
