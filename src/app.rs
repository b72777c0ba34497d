//! App: terminal init, main loop, input repeat and event handling.

use crate::game::{GameEvent, GameState, InputEvent};
use crate::highscores;
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use crate::{Args, GameConfig};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// DAS (Delayed Auto-Shift): delay before movement starts repeating when you hold a key.
const REPEAT_DELAY_MS: u64 = 170;
/// ARR (Auto-Repeat Rate): time between repeated moves while holding. 50 ms ≈ 20 moves/sec.
const REPEAT_INTERVAL_MS: u64 = 50;

/// Cap on the per-frame delta fed to the simulation, so a stalled terminal
/// doesn't turn into one giant catch-up step.
const MAX_FRAME_DT: f32 = 0.25;

pub struct App {
    args: Args,
    config: GameConfig,
    theme: Theme,
    state: GameState,
    seed: u64,
    paused: bool,
    last_update: Instant,
    repeat_state: Option<(Action, Instant)>,
    last_repeat_fire: Option<Instant>,
    high_score: u32,
    /// TachyonFX flash for cells waiting on the removal delay.
    removal_effect: Option<Effect>,
    removal_effect_time: Option<Instant>,
}

impl App {
    pub fn new(args: Args, config: GameConfig, theme: Theme) -> Result<Self> {
        let seed = config.seed.unwrap_or_else(rand::random);
        let state = GameState::new(config.cols, config.rows, seed);
        Ok(Self {
            args,
            config,
            theme,
            state,
            seed,
            paused: false,
            last_update: Instant::now(),
            repeat_state: None,
            last_repeat_fire: None,
            high_score: highscores::load_best(),
            removal_effect: None,
            removal_effect_time: None,
        })
    }

    fn apply_action(&mut self, action: Action) {
        let event = match action {
            Action::MoveLeft => InputEvent::MoveLeft,
            Action::MoveRight => InputEvent::MoveRight,
            Action::RotateCw => InputEvent::RotateCw,
            Action::RotateCcw => InputEvent::RotateCcw,
            Action::HardDrop => {
                self.repeat_state = None;
                InputEvent::HardDrop
            }
            Action::Restart => InputEvent::Restart,
            Action::Pause | Action::Quit | Action::None => return,
        };
        self.state.handle_input(event);
    }

    fn tick_repeat(&mut self) {
        let now = Instant::now();
        let (action, first) = match self.repeat_state {
            Some(s) => s,
            None => return,
        };
        if !matches!(action, Action::MoveLeft | Action::MoveRight) {
            return;
        }
        if first.elapsed() < Duration::from_millis(REPEAT_DELAY_MS) {
            return;
        }
        let next = self.last_repeat_fire.unwrap_or(first) + Duration::from_millis(REPEAT_INTERVAL_MS);
        if now >= next {
            self.apply_action(action);
            self.last_repeat_fire = Some(now);
        }
    }

    /// Drain core notifications: persist the best score once per game over,
    /// drop the flash effect once the marked cells are gone.
    fn consume_events(&mut self) {
        for event in self.state.drain_events() {
            match event {
                GameEvent::GameOver(score) => {
                    if score > self.high_score {
                        self.high_score = score;
                        let _ = highscores::save_best(self.high_score);
                    }
                }
                GameEvent::ClearanceRemoved(_) => {
                    self.removal_effect = None;
                    self.removal_effect_time = None;
                }
                GameEvent::PieceLocked => {}
            }
        }
        if self.state.score() > self.high_score {
            self.high_score = self.state.score();
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{
                EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
                size,
            },
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Attempt to enable enhanced keyboard for Release events
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        // Size playfield to fit terminal; respect --width/--height when they fit
        let (term_cols, term_rows) = size()?;
        let (fit_cols, fit_rows) = crate::ui::playfield_size_for_terminal(term_cols, term_rows);
        let cols = self.config.cols.min(fit_cols as usize).max(1);
        let rows = self.config.rows.min(fit_rows as usize).max(1);
        if (cols, rows) != (self.config.cols, self.config.rows) {
            self.config.cols = cols;
            self.config.rows = rows;
            self.state = GameState::new(cols, rows, self.seed);
        }
        self.last_update = Instant::now();

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let frame_start = Instant::now();
            terminal.draw(|f| {
                crate::ui::draw(
                    f,
                    &self.state.snapshot(),
                    &self.theme,
                    self.paused,
                    self.high_score,
                    f.area(),
                    &mut self.removal_effect,
                    &mut self.removal_effect_time,
                    frame_start,
                    self.config.no_animation,
                )
            })?;

            let frame_duration = Duration::from_secs_f64(1.0 / self.args.frame_rate.max(1.0));
            let timeout = frame_duration.saturating_sub(frame_start.elapsed());

            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        let action = key_to_action(key);

                        // Ignore OS repeats and only process first Press.
                        if key.kind != KeyEventKind::Press {
                            if key.kind == KeyEventKind::Release
                                && self.repeat_state.map(|(a, _)| a) == Some(action)
                            {
                                self.repeat_state = None;
                                self.last_repeat_fire = None;
                            }
                            continue;
                        }
                        if self.repeat_state.map(|(a, _)| a) == Some(action) {
                            continue;
                        }

                        match action {
                            Action::Quit => return Ok(()),
                            Action::Pause => self.paused = !self.paused,
                            Action::None => {}
                            _ => {
                                if self.paused {
                                    continue;
                                }
                                self.apply_action(action);
                                if matches!(action, Action::MoveLeft | Action::MoveRight) {
                                    self.repeat_state = Some((action, Instant::now()));
                                    self.last_repeat_fire = None;
                                }
                            }
                        }
                    }
                }
            }

            let now = Instant::now();
            let dt = now
                .duration_since(self.last_update)
                .as_secs_f32()
                .min(MAX_FRAME_DT);
            self.last_update = now;

            if !self.paused {
                self.tick_repeat();
                self.state.update(dt);
                self.consume_events();
            }
        }
    }
}
