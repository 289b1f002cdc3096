pub mod plain;
pub mod results_table;

use std::io;
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};

use crate::runtime::{AppEvent, EventSource, Runner};
use crate::view::{ResultsView, ViewAction};

pub const TICK_RATE_MS: u64 = 250;

/// Puts the terminal into raw/alternate-screen mode and restores it on drop,
/// also when the event loop bails out with an error.
pub struct TerminalGuard {
    pub terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Drive the results screen until the user quits or asks for a reload.
/// Returns the action that ended the loop (`Quit` or `Reload`).
pub fn run_results<B: Backend, E: EventSource>(
    terminal: &mut Terminal<B>,
    view: &mut ResultsView,
    runner: &Runner<E>,
    max_steps: Option<usize>,
) -> io::Result<ViewAction> {
    terminal.draw(|f| results_table::render_results(view, f))?;
    let mut steps = 0usize;
    loop {
        if max_steps.is_some_and(|max| steps >= max) {
            return Ok(ViewAction::Quit);
        }
        steps += 1;
        match runner.step() {
            AppEvent::Tick => {}
            AppEvent::Resize => {
                terminal.draw(|f| results_table::render_results(view, f))?;
            }
            AppEvent::Key(key) => match view.on_key(key) {
                ViewAction::Ignore => {}
                ViewAction::Redraw => {
                    terminal.draw(|f| results_table::render_results(view, f))?;
                }
                action @ (ViewAction::Quit | ViewAction::Reload) => return Ok(action),
            },
        }
    }
}

pub fn tick_rate() -> Duration {
    Duration::from_millis(TICK_RATE_MS)
}
