use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::models::Racer;
use crate::results::{rank_results, Filter, FilterOptions, RankedRacer, SortKey, SortSpec};

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    Ignore,
    Redraw,
    /// Fetch the racer list again.
    Reload,
    Quit,
}

/// State of the results screen. Holds the fetched racers; sorting and
/// filtering only touch the derived rows.
#[derive(Debug)]
pub struct ResultsView {
    racers: Vec<Racer>,
    options: FilterOptions,
    pub filter: Filter,
    pub sort: SortSpec,
    pub scroll_offset: usize,
    pub status: Option<String>,
}

impl ResultsView {
    pub fn new(racers: Vec<Racer>, sort: SortSpec) -> Self {
        let options = FilterOptions::from_racers(&racers);
        Self {
            racers,
            options,
            filter: Filter::default(),
            sort,
            scroll_offset: 0,
            status: None,
        }
    }

    /// Swap in freshly fetched data, keeping sort and filters.
    pub fn replace_racers(&mut self, racers: Vec<Racer>) {
        self.options = FilterOptions::from_racers(&racers);
        self.racers = racers;
        self.scroll_offset = 0;
    }

    pub fn racers(&self) -> &[Racer] {
        &self.racers
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn rows(&self) -> Vec<RankedRacer<'_>> {
        rank_results(&self.racers, &self.filter, &self.sort)
    }

    pub fn filter_label(&self) -> String {
        let class = self
            .filter
            .class
            .map(|c| c.label().to_string())
            .unwrap_or_else(|| "all classes".to_string());
        format!("{class}, {}", self.options.team_label(self.filter.team))
    }

    pub fn on_key(&mut self, key: KeyEvent) -> ViewAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return ViewAction::Quit;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => ViewAction::Quit,
            KeyCode::Char('r') => ViewAction::Reload,
            KeyCode::Char(d @ '1'..='8') => {
                let idx = d as usize - '1' as usize;
                self.select_sort(SortKey::COLUMNS[idx]);
                ViewAction::Redraw
            }
            KeyCode::Char('c') => {
                self.filter.class = self.options.next_class(self.filter.class);
                self.scroll_offset = 0;
                ViewAction::Redraw
            }
            KeyCode::Char('t') => {
                self.filter.team = self.options.next_team(self.filter.team);
                self.scroll_offset = 0;
                ViewAction::Redraw
            }
            KeyCode::Char('x') => {
                self.filter = Filter::default();
                self.scroll_offset = 0;
                ViewAction::Redraw
            }
            KeyCode::Up => {
                self.scroll_offset = self.scroll_offset.saturating_sub(1);
                ViewAction::Redraw
            }
            KeyCode::Down => {
                // clamped when rendering
                self.scroll_offset += 1;
                ViewAction::Redraw
            }
            KeyCode::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_sub(10);
                ViewAction::Redraw
            }
            KeyCode::PageDown => {
                self.scroll_offset += 10;
                ViewAction::Redraw
            }
            KeyCode::Home => {
                self.scroll_offset = 0;
                ViewAction::Redraw
            }
            _ => ViewAction::Ignore,
        }
    }

    pub fn select_sort(&mut self, key: SortKey) {
        self.sort.select(key);
        self.scroll_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunType, SoapboxClass};
    use crate::results::TeamFilter;
    use serde_json::json;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn sample() -> Vec<Racer> {
        serde_json::from_value(json!([
            {"id": 1, "first_name": "Max", "last_name": "Raser", "soapbox_class": "LJ", "team": 1, "team_name": "Blitz",
             "race_runs": [{"id": 1, "run_type": "H1", "time_in_seconds": "45.123"}]},
            {"id": 2, "first_name": "Lisa", "last_name": "Schnell", "soapbox_class": "LS", "team": null,
             "race_runs": [{"id": 2, "run_type": "H1", "time_in_seconds": "44.000"}]},
            {"id": 3, "first_name": "Tim", "last_name": "Turbo", "soapbox_class": "LJ", "team": 1, "team_name": "Blitz",
             "race_runs": [{"id": 3, "run_type": "H1", "time_in_seconds": "46.500"}]}
        ]))
        .unwrap()
    }

    #[test]
    fn number_keys_select_columns() {
        let mut view = ResultsView::new(sample(), SortSpec::default());
        assert_eq!(view.on_key(key('6')), ViewAction::Redraw);
        assert_eq!(view.sort, SortSpec::new(SortKey::RunTime(RunType::Heat1), true));
        view.on_key(key('6'));
        assert!(!view.sort.ascending);
        view.on_key(key('2'));
        assert_eq!(view.sort, SortSpec::new(SortKey::Name, true));
    }

    #[test]
    fn class_filter_reranks_visible_subset() {
        let mut view = ResultsView::new(sample(), SortSpec::default());
        assert_eq!(view.rows()[0].racer.id, 2);

        view.on_key(key('c'));
        assert_eq!(view.filter.class, Some(SoapboxClass::LuftreifenJunior));
        let rows = view.rows();
        assert_eq!(
            rows.iter().map(|r| (r.racer.id, r.rank)).collect::<Vec<_>>(),
            vec![(1, Some(1)), (3, Some(2))]
        );
        // underlying data untouched
        assert_eq!(view.racers().len(), 3);
    }

    #[test]
    fn team_filter_cycles_through_solo() {
        let mut view = ResultsView::new(sample(), SortSpec::default());
        view.on_key(key('t'));
        assert_eq!(view.filter.team, Some(TeamFilter::Team(1)));
        view.on_key(key('t'));
        assert_eq!(view.filter.team, Some(TeamFilter::Solo));
        assert_eq!(view.rows().len(), 1);
        assert_eq!(view.filter_label(), "all classes, solo");
        view.on_key(key('t'));
        assert_eq!(view.filter.team, None);
    }

    #[test]
    fn quit_and_reload_keys() {
        let mut view = ResultsView::new(vec![], SortSpec::default());
        assert_eq!(view.on_key(key('r')), ViewAction::Reload);
        assert_eq!(view.on_key(key('q')), ViewAction::Quit);
        assert_eq!(
            view.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            ViewAction::Quit
        );
        assert_eq!(view.on_key(key('z')), ViewAction::Ignore);
    }
}
