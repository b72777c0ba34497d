//! Game state: falling piece, settling accumulator, clearance timing, score.

use crate::catalog::{Shape, ShapeCatalog};
use crate::grid::{BLOCK_SIZE, Cell, Grid, SandColor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Base downward acceleration, grains per second squared.
pub const GRAVITY: f32 = 9.8;

/// Base interval between automaton passes.
const SAND_STEP_SECS: f32 = 1.0 / 30.0;

/// Delay between a span being marked and its removal.
pub const CLEAR_DELAY_SECS: f32 = 1.0;

/// Score needed per difficulty level.
const LEVEL_SCORE_STEP: u32 = 1500;

/// Fall-velocity multiplier applied to the current piece when a span clears.
const CLEAR_REWARD_FACTOR: f32 = 0.5;

/// How long the post-game timer runs after game over.
pub const GAME_OVER_LINGER_SECS: f32 = 3.0;

/// Horizontal distance per move event: one block width.
const MOVE_STEP: f32 = BLOCK_SIZE as f32;

/// Abstracted input consumed by the core. Events that make no sense in the
/// current state (rotating after game over, restarting mid-game) are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    MoveLeft,
    MoveRight,
    RotateCw,
    RotateCcw,
    HardDrop,
    Restart,
}

/// Notifications for the shell (effects, persistence). Each fires at most
/// once per triggering occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    PieceLocked,
    ClearanceRemoved(u32),
    GameOver(u32),
}

/// A piece instance: shape reference, rotation, continuous grain-space
/// position (y grows downward, negative while above the field) and vertical
/// velocity. Current, next and ghost are independent copies of this.
#[derive(Debug, Clone)]
pub struct Piece {
    pub shape: &'static Shape,
    pub rotation: u8,
    pub x: f32,
    pub y: f32,
    pub vel_y: f32,
    pub color: SandColor,
}

impl Piece {
    /// Top-left grain coordinate of every occupied block in the active
    /// rotation.
    pub fn blocks(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let px = self.x.floor() as i32;
        let py = self.y.floor() as i32;
        let rotation = self.rotation;
        (0..4).flat_map(move |row| {
            (0..4).filter_map(move |col| {
                self.shape.occupied(rotation, row, col).then(|| {
                    (
                        px + col as i32 * BLOCK_SIZE as i32,
                        py + row as i32 * BLOCK_SIZE as i32,
                    )
                })
            })
        })
    }
}

/// Read-only view of one frame, handed to the renderer.
#[derive(Debug)]
pub struct Snapshot<'a> {
    pub grid: &'a Grid,
    pub score: u32,
    pub level: u32,
    pub current: &'a Piece,
    pub ghost: &'a Piece,
    pub next: &'a Piece,
    pub game_over: bool,
}

/// The whole simulation. Owns the grid and all three piece instances;
/// collaborators only ever see [`Snapshot`] borrows and drained events.
#[derive(Debug)]
pub struct GameState {
    catalog: ShapeCatalog,
    grid: Grid,
    current: Piece,
    next: Piece,
    ghost: Piece,
    score: u32,
    game_over: bool,
    game_over_elapsed: f32,
    sand_acc: f32,
    removal_timer: f32,
    rng: StdRng,
    events: Vec<GameEvent>,
}

impl GameState {
    /// New game on a `cols` x `rows` block field (grain grid is scaled by
    /// [`BLOCK_SIZE`]). The seed fixes every random draw: shapes, colours,
    /// rotations and the automaton tie break.
    pub fn new(cols: usize, rows: usize, seed: u64) -> Self {
        let catalog = ShapeCatalog::new();
        let grid = Grid::new(cols * BLOCK_SIZE, rows * BLOCK_SIZE);
        let mut rng = StdRng::seed_from_u64(seed);
        let current = Self::spawn(&catalog, &grid, &mut rng);
        let next = Self::spawn(&catalog, &grid, &mut rng);
        let ghost = current.clone();
        let mut state = Self {
            catalog,
            grid,
            current,
            next,
            ghost,
            score: 0,
            game_over: false,
            game_over_elapsed: 0.0,
            sand_acc: 0.0,
            removal_timer: 0.0,
            rng,
            events: Vec::new(),
        };
        state.update_ghost();
        state
    }

    /// Fresh piece, centred above the field with its occupied bounds resting
    /// just over grain row 0. Rotation and colour are uniform random.
    fn spawn(catalog: &ShapeCatalog, grid: &Grid, rng: &mut StdRng) -> Piece {
        let shape = catalog.pick(rng);
        let rotation = rng.gen_range(0..4u8);
        let color = SandColor::pick(rng);
        let (min_col, max_col, _, max_row) = shape.bounds(rotation);
        let span_w = ((max_col - min_col + 1) * BLOCK_SIZE) as f32;
        let x = (grid.width() as f32 - span_w) / 2.0 - (min_col * BLOCK_SIZE) as f32;
        let y = -(((max_row + 1) * BLOCK_SIZE) as f32);
        Piece {
            shape,
            rotation,
            x,
            y,
            vel_y: GRAVITY,
            color,
        }
    }

    /// Difficulty level, derived from score (never stored).
    #[inline]
    pub fn level(&self) -> u32 {
        self.score / LEVEL_SCORE_STEP + 1
    }

    #[inline]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[inline]
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Seconds the post-game timer has run, capped at
    /// [`GAME_OVER_LINGER_SECS`].
    #[inline]
    pub fn game_over_elapsed(&self) -> f32 {
        self.game_over_elapsed
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            grid: &self.grid,
            score: self.score,
            level: self.level(),
            current: &self.current,
            ghost: &self.ghost,
            next: &self.next,
            game_over: self.game_over,
        }
    }

    /// Drain pending notifications, oldest first.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        if self.game_over {
            if event == InputEvent::Restart {
                self.restart();
            }
            return;
        }
        match event {
            InputEvent::MoveLeft => self.move_piece(-MOVE_STEP),
            InputEvent::MoveRight => self.move_piece(MOVE_STEP),
            InputEvent::RotateCw => self.current.rotation = (self.current.rotation + 1) % 4,
            InputEvent::RotateCcw => self.current.rotation = (self.current.rotation + 3) % 4,
            InputEvent::HardDrop => self.hard_drop(),
            InputEvent::Restart => {}
        }
    }

    /// Advance one frame. Order: automaton step(s), removal timer, piece
    /// integration (locking on contact), ghost refresh, clearance detection,
    /// game-over check. Returns the game-over event on the frame the game
    /// ends.
    pub fn update(&mut self, dt: f32) -> Option<GameEvent> {
        if self.game_over {
            self.game_over_elapsed = (self.game_over_elapsed + dt).min(GAME_OVER_LINGER_SECS);
            return None;
        }

        let pending = self.run_automaton(dt);

        if pending {
            self.removal_timer += dt;
            if self.removal_timer >= CLEAR_DELAY_SECS {
                self.remove_marked();
            }
        } else {
            self.removal_timer = 0.0;
        }

        self.integrate(dt);
        self.update_ghost();
        self.grid.detect_spans();

        if self.grid.reached_top() {
            self.game_over = true;
            self.game_over_elapsed = 0.0;
            let event = GameEvent::GameOver(self.score);
            self.events.push(event);
            return Some(event);
        }
        None
    }

    /// Fixed-step accumulator driving the automaton. Each iteration consumes
    /// a level-shrunk interval (bounded below at 0.4x the base step), so
    /// higher levels squeeze more passes out of the same wall time. Returns
    /// whether marked cells are pending after the last pass.
    fn run_automaton(&mut self, dt: f32) -> bool {
        self.sand_acc += dt;
        let mut pending = self.grid.has_marked();
        let level = self.level() as f32;
        let consume = (SAND_STEP_SECS / (level / 10.0 + 1.0)).max(SAND_STEP_SECS * 0.4);
        while self.sand_acc >= SAND_STEP_SECS {
            self.sand_acc -= consume;
            pending = self.grid.settle_pass(&mut self.rng);
        }
        pending
    }

    /// Removal phase: empty every marked cell, credit one point per grain,
    /// halve the falling piece's speed as a reward, restart the delay window.
    fn remove_marked(&mut self) {
        let removed = self.grid.clear_marked();
        if removed > 0 {
            self.score += removed;
            self.current.vel_y *= CLEAR_REWARD_FACTOR;
            self.events.push(GameEvent::ClearanceRemoved(removed));
        }
        self.removal_timer = 0.0;
    }

    /// Horizontal move with wall clamping: the occupied column span always
    /// stays inside the field, so side walls never reject a move.
    fn move_piece(&mut self, dx: f32) {
        self.current.x += dx;
        self.clamp_x();
    }

    fn clamp_x(&mut self) {
        let (min_col, max_col, _, _) = self.current.shape.bounds(self.current.rotation);
        let min_x = -((min_col * BLOCK_SIZE) as f32);
        let span = ((max_col + 1) * BLOCK_SIZE) as f32;
        // On a field narrower than the piece span the left wall wins.
        let max_x = (self.grid.width() as f32 - span).max(min_x);
        self.current.x = self.current.x.clamp(min_x, max_x);
    }

    /// Collision test against walls, floor and settled grains.
    ///
    /// Only the lower contact surface of the mask is expanded: an occupied
    /// mask cell with another occupied cell directly below it inside the mask
    /// can never touch first, so it is skipped. Grain rows above the field
    /// never collide.
    pub fn collides(&self, piece: &Piece) -> bool {
        let px = piece.x.floor() as i32;
        let py = piece.y.floor() as i32;
        let width = self.grid.width() as i32;
        let height = self.grid.height() as i32;
        for row in 0..4 {
            for col in 0..4 {
                if !piece.shape.occupied(piece.rotation, row, col)
                    || (row < 3 && piece.shape.occupied(piece.rotation, row + 1, col))
                {
                    continue;
                }
                let base_x = px + col as i32 * BLOCK_SIZE as i32;
                let base_y = py + row as i32 * BLOCK_SIZE as i32;
                for dy in 0..BLOCK_SIZE as i32 {
                    let gy = base_y + dy;
                    if gy < 0 {
                        continue;
                    }
                    for dx in 0..BLOCK_SIZE as i32 {
                        let gx = base_x + dx;
                        if gx < 0 || gx >= width || gy >= height {
                            return true;
                        }
                        if self.grid.get(gx as usize, gy as usize) != Some(Cell::Empty) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Gravity integration. On contact the move is reverted, velocity zeroed
    /// and the piece locks. Fall acceleration scales with level.
    fn integrate(&mut self, dt: f32) {
        self.clamp_x();
        let fall_accel = GRAVITY * (1.0 + self.level() as f32 * 0.3);
        self.current.vel_y += fall_accel * dt;
        let old_y = self.current.y;
        self.current.y += self.current.vel_y * dt;
        if self.collides(&self.current) {
            self.current.y = old_y;
            self.current.vel_y = 0.0;
            self.lock();
        }
    }

    /// Write the piece's grains into the grid (out-of-bounds grains are
    /// skipped), promote next to current and draw a new next piece.
    fn lock(&mut self) {
        let color = self.current.color;
        let blocks: Vec<(i32, i32)> = self.current.blocks().collect();
        for (bx, by) in blocks {
            for dy in 0..BLOCK_SIZE as i32 {
                for dx in 0..BLOCK_SIZE as i32 {
                    let gx = bx + dx;
                    let gy = by + dy;
                    if gx >= 0 && gy >= 0 {
                        self.grid.set(gx as usize, gy as usize, Cell::Sand(color));
                    }
                }
            }
        }
        self.events.push(GameEvent::PieceLocked);

        let mut promoted = self.next.clone();
        let (min_col, max_col, _, max_row) = promoted.shape.bounds(promoted.rotation);
        let span_w = ((max_col - min_col + 1) * BLOCK_SIZE) as f32;
        promoted.x = (self.grid.width() as f32 - span_w) / 2.0 - (min_col * BLOCK_SIZE) as f32;
        promoted.y = -(((max_row + 1) * BLOCK_SIZE) as f32);
        promoted.vel_y = 0.0;
        self.current = promoted;
        self.next = Self::spawn(&self.catalog, &self.grid, &mut self.rng);
    }

    /// Deepest non-colliding y directly below the piece's current columns.
    fn drop_y(&self) -> f32 {
        let mut probe = self.current.clone();
        while !self.collides(&probe) {
            probe.y += 1.0;
        }
        probe.y - 1.0
    }

    /// Ghost = current teleported to its resting depth. Only ever tested with
    /// the read-only [`Self::collides`]; it is never locked into the grid.
    fn update_ghost(&mut self) {
        self.ghost = self.current.clone();
        self.ghost.y = self.drop_y();
        self.ghost.vel_y = 0.0;
    }

    /// Teleport to the resting position and lock. Ignored while any part of
    /// the piece's occupied bounds is still above the field.
    fn hard_drop(&mut self) {
        let (_, _, min_row, _) = self.current.shape.bounds(self.current.rotation);
        let top = self.current.y.floor() as i32 + (min_row * BLOCK_SIZE) as i32;
        if top < 0 {
            return;
        }
        self.current.y = self.drop_y();
        self.lock();
    }

    /// Reset every entity to its initial value. The rng stream continues, so
    /// a restarted game is not a replay of the last one.
    fn restart(&mut self) {
        self.grid = Grid::new(self.grid.width(), self.grid.height());
        self.current = Self::spawn(&self.catalog, &self.grid, &mut self.rng);
        self.next = Self::spawn(&self.catalog, &self.grid, &mut self.rng);
        self.score = 0;
        self.game_over = false;
        self.game_over_elapsed = 0.0;
        self.sand_acc = 0.0;
        self.removal_timer = 0.0;
        self.update_ghost();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SENTINEL_ROW;

    const COLS: usize = 8;
    const ROWS: usize = 12;

    fn state() -> GameState {
        GameState::new(COLS, ROWS, 1)
    }

    fn occupied_cols(piece: &Piece) -> (usize, usize) {
        let (min_col, max_col, _, _) = piece.shape.bounds(piece.rotation);
        (min_col, max_col)
    }

    #[test]
    fn spawns_above_field_and_centred() {
        let s = state();
        let snap = s.snapshot();
        assert!(snap.current.y < 0.0);
        let px = snap.current.x.floor() as i32;
        let (min_col, max_col) = occupied_cols(snap.current);
        let left = px + (min_col * BLOCK_SIZE) as i32;
        let right = px + ((max_col + 1) * BLOCK_SIZE) as i32;
        assert!(left >= 0);
        assert!(right <= (COLS * BLOCK_SIZE) as i32);
    }

    #[test]
    fn moves_clamp_at_walls() {
        let mut s = state();
        for _ in 0..COLS * 3 {
            s.handle_input(InputEvent::MoveLeft);
        }
        let (min_col, _) = occupied_cols(&s.current);
        let left = s.current.x.floor() as i32 + (min_col * BLOCK_SIZE) as i32;
        assert_eq!(left, 0);

        for _ in 0..COLS * 3 {
            s.handle_input(InputEvent::MoveRight);
        }
        let (_, max_col) = occupied_cols(&s.current);
        let right = s.current.x.floor() as i32 + ((max_col + 1) * BLOCK_SIZE) as i32;
        assert_eq!(right, (COLS * BLOCK_SIZE) as i32);
    }

    #[test]
    fn rotation_cycles_modulo_four() {
        let mut s = state();
        let start = s.current.rotation;
        for _ in 0..4 {
            s.handle_input(InputEvent::RotateCw);
        }
        assert_eq!(s.current.rotation, start);
        s.handle_input(InputEvent::RotateCcw);
        assert_eq!(s.current.rotation, (start + 3) % 4);
    }

    #[test]
    fn integrate_never_leaves_piece_overlapping() {
        let mut s = state();
        for _ in 0..600 {
            s.update(1.0 / 60.0);
            assert!(!s.collides(&s.current));
        }
    }

    #[test]
    fn ghost_is_deepest_free_position() {
        let mut s = state();
        s.update(1.0 / 60.0);
        let snap = s.snapshot();
        assert!(snap.ghost.y >= snap.current.y);
        assert!(!s.collides(snap.ghost));
        let mut below = snap.ghost.clone();
        below.y += 1.0;
        assert!(s.collides(&below));
    }

    #[test]
    fn straight_fall_locks_piece_and_promotes_next() {
        let mut s = state();
        let expected_color = s.current.color;
        let next_shape = s.next.shape.name;
        let next_color = s.next.color;

        let mut locked = false;
        for _ in 0..3000 {
            s.update(1.0 / 60.0);
            if s.drain_events().contains(&GameEvent::PieceLocked) {
                locked = true;
                break;
            }
        }
        assert!(locked, "piece should lock on the floor");
        assert_eq!(s.grid.occupied_count(), 4 * BLOCK_SIZE * BLOCK_SIZE);
        let found_color = (0..s.grid.width())
            .flat_map(|x| (0..s.grid.height()).map(move |y| (x, y)))
            .find_map(|(x, y)| match s.grid.get(x, y) {
                Some(Cell::Sand(c)) => Some(c),
                _ => None,
            });
        assert_eq!(found_color, Some(expected_color));
        assert_eq!(s.current.shape.name, next_shape);
        assert_eq!(s.current.color, next_color);
        assert_eq!(s.current.vel_y, 0.0);
    }

    #[test]
    fn completed_strip_marks_then_clears_with_score() {
        let mut s = state();
        let width = s.grid.width();
        let bottom = s.grid.height() - 1;
        for x in 0..width {
            s.grid.set(x, bottom, Cell::Sand(SandColor::Blue));
        }

        s.update(1.0 / 60.0);
        assert!(s.grid.has_marked(), "full strip should be marked");
        assert_eq!(s.score(), 0, "no score before the removal delay");

        let mut removed = None;
        for _ in 0..120 {
            s.update(1.0 / 60.0);
            if let Some(GameEvent::ClearanceRemoved(n)) = s
                .drain_events()
                .into_iter()
                .find(|e| matches!(e, GameEvent::ClearanceRemoved(_)))
            {
                removed = Some(n);
                break;
            }
        }
        assert_eq!(removed, Some(width as u32));
        assert_eq!(s.score(), width as u32);
        assert!(!s.grid.has_marked());
    }

    #[test]
    fn removal_waits_for_the_delay_window() {
        let mut s = state();
        let bottom = s.grid.height() - 1;
        for x in 0..s.grid.width() {
            s.grid.set(x, bottom, Cell::Sand(SandColor::Red));
        }
        s.update(1.0 / 60.0);
        let mut elapsed = 0.0;
        while elapsed + 1.0 / 60.0 < CLEAR_DELAY_SECS * 0.9 {
            s.update(1.0 / 60.0);
            elapsed += 1.0 / 60.0;
            assert_eq!(s.score(), 0, "removal fired before the delay");
        }
    }

    #[test]
    fn score_never_decreases() {
        let mut s = state();
        let bottom = s.grid.height() - 1;
        for x in 0..s.grid.width() {
            s.grid.set(x, bottom, Cell::Sand(SandColor::Green));
        }
        let mut last = 0;
        for _ in 0..400 {
            s.update(1.0 / 60.0);
            assert!(s.score() >= last);
            last = s.score();
        }
    }

    #[test]
    fn sand_on_sentinel_row_ends_the_game_once() {
        let mut s = state();
        for x in 0..s.grid.width() {
            for y in SENTINEL_ROW..s.grid.height() {
                s.grid.set(x, y, Cell::Sand(SandColor::Red));
            }
        }
        let ended = s.update(1.0 / 60.0);
        assert!(matches!(ended, Some(GameEvent::GameOver(_))));
        assert!(s.is_game_over());
        // Terminal state: only the post-game timer advances.
        assert_eq!(s.update(0.5), None);
        assert!(s.game_over_elapsed() > 0.0);
        let over_events: Vec<_> = s
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, GameEvent::GameOver(_)))
            .collect();
        assert_eq!(over_events.len(), 1);
    }

    #[test]
    fn inputs_are_noops_after_game_over_except_restart() {
        let mut s = state();
        for x in 0..s.grid.width() {
            s.grid.set(x, SENTINEL_ROW, Cell::Sand(SandColor::Red));
        }
        s.update(1.0 / 60.0);
        let rotation = s.current.rotation;
        let x = s.current.x;
        s.handle_input(InputEvent::RotateCw);
        s.handle_input(InputEvent::MoveLeft);
        s.handle_input(InputEvent::HardDrop);
        assert_eq!(s.current.rotation, rotation);
        assert_eq!(s.current.x, x);

        s.handle_input(InputEvent::Restart);
        assert!(!s.is_game_over());
        assert_eq!(s.score(), 0);
        assert_eq!(s.grid.occupied_count(), 0);
    }

    #[test]
    fn hard_drop_ignored_while_above_field() {
        let mut s = state();
        assert!(s.current.y < 0.0);
        s.handle_input(InputEvent::HardDrop);
        assert_eq!(s.grid.occupied_count(), 0, "piece above the field stays");
    }
}
