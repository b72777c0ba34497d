//! Sandfall — falling-sand block puzzle in the terminal.

mod app;
mod catalog;
mod game;
mod grid;
mod highscores;
mod input;
mod theme;
mod ui;

use anyhow::Result;
use app::App;
use clap::{Parser, ValueEnum};

/// Options derived from CLI that affect game behaviour.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub cols: usize,
    pub rows: usize,
    pub seed: Option<u64>,
    pub no_animation: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_default();
    let config = GameConfig {
        cols: args.width as usize,
        rows: args.height as usize,
        seed: args.seed,
        no_animation: args.no_animation,
    };
    let mut app = App::new(args, config, theme)?;
    app.run()?;
    Ok(())
}

/// Falling-sand block puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "sandfall",
    version,
    about = "Falling-sand block puzzle in the terminal. Pieces crumble into sand; connect one colour from the left wall to the right wall to clear it.",
    long_about = "Sandfall is a terminal puzzle game in the sand-tetris family.\n\n\
        Steer falling pieces. When a piece lands it turns into sand grains that keep settling. \
        Any region of one colour that connects the left edge to the right edge (diagonals count) \
        flashes, then clears for one point per grain. Sand reaching the top of the field ends the game.\n\n\
        CONTROLS (normal):\n  Left/Right  Move    Up         Rotate CW   Down       Rotate CCW\n  Enter/Space Hard drop   P          Pause      R          Restart    Q / Esc  Quit\n\n\
        CONTROLS (vim):\n  h/l         Move    k or i     Rotate CW   j or u     Rotate CCW\n  Space       Hard drop   p          Pause      q          Quit\n\n\
        Hold a movement key to keep the piece moving. Use --theme to load a btop-style theme (e.g. onedark.theme)."
)]
pub struct Args {
    /// Playfield width in blocks (each block is 6x6 sand grains).
    #[arg(long, default_value = "10", value_name = "COLS")]
    pub width: u16,

    /// Playfield height in blocks.
    #[arg(long, default_value = "20", value_name = "ROWS")]
    pub height: u16,

    /// Seed for the random generator (pieces, colours, sand tie-breaks).
    /// Random when not given.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<std::path::PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Disable the clearance flash effect (cells still pause before removal).
    #[arg(long)]
    pub no_animation: bool,

    /// Target render frames per second.
    #[arg(long, default_value = "60.0", value_name = "RATE")]
    pub frame_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}
