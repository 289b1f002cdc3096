//! Ranking, filtering and sorting of the results table.
//!
//! Everything here is a pure function of an already fetched racer list: no
//! I/O, and the input is never mutated. Ranks are computed over the filtered
//! subset, so they are relative to what is visible.

use std::cmp::Ordering;
use std::fmt;

use itertools::Itertools;

use crate::models::{Racer, RunType, SoapboxClass, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamFilter {
    Team(TeamId),
    /// Racers without a team.
    Solo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Filter {
    pub class: Option<SoapboxClass>,
    pub team: Option<TeamFilter>,
}

impl Filter {
    pub fn matches(&self, racer: &Racer) -> bool {
        let class_ok = self.class.map_or(true, |c| racer.soapbox_class == c);
        let team_ok = match self.team {
            None => true,
            Some(TeamFilter::Solo) => racer.team.is_none(),
            Some(TeamFilter::Team(id)) => racer.team == Some(id),
        };
        class_ok && team_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Rank,
    Name,
    Team,
    Class,
    RunTime(RunType),
    BestTime,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Rank => write!(f, "Rank"),
            SortKey::Name => write!(f, "Name"),
            SortKey::Team => write!(f, "Team"),
            SortKey::Class => write!(f, "Class"),
            SortKey::RunTime(run_type) => write!(f, "{} time", run_type.label()),
            SortKey::BestTime => write!(f, "Best time"),
        }
    }
}

impl SortKey {
    /// Column order of the results table.
    pub const COLUMNS: [SortKey; 8] = [
        SortKey::Rank,
        SortKey::Name,
        SortKey::Team,
        SortKey::Class,
        SortKey::RunTime(RunType::Practice),
        SortKey::RunTime(RunType::Heat1),
        SortKey::RunTime(RunType::Heat2),
        SortKey::BestTime,
    ];

    /// Accepts `rank`, `name`, `team`, `class`, `best`, and `time_PR` /
    /// `time_H1` / `time_H2` (or just the run type code).
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        match key.as_str() {
            "rank" => Some(SortKey::Rank),
            "name" => Some(SortKey::Name),
            "team" => Some(SortKey::Team),
            "class" => Some(SortKey::Class),
            "best" | "best_time" | "time" => Some(SortKey::BestTime),
            other => {
                let code = other.strip_prefix("time_").unwrap_or(other);
                RunType::from_code(code).map(SortKey::RunTime)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Rank,
            ascending: true,
        }
    }
}

impl SortSpec {
    pub fn new(key: SortKey, ascending: bool) -> Self {
        Self { key, ascending }
    }

    /// Same column flips the direction, a new column starts ascending.
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.ascending = !self.ascending;
        } else {
            self.key = key;
            self.ascending = true;
        }
    }
}

/// A racer with its derived standing.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRacer<'a> {
    pub racer: &'a Racer,
    pub best_time: Option<f64>,
    pub rank: Option<usize>,
}

impl RankedRacer<'_> {
    pub fn run_time(&self, run_type: RunType) -> Option<f64> {
        run_time(self.racer, run_type)
    }
}

/// Minimum time over runs that are timed and not disqualified.
pub fn best_time(racer: &Racer) -> Option<f64> {
    racer
        .race_runs
        .iter()
        .filter_map(|run| run.qualifying_time())
        .min_by(|a, b| a.total_cmp(b))
}

/// Time of the racer's first (lowest sequence number) qualifying run of
/// `run_type`.
pub fn run_time(racer: &Racer, run_type: RunType) -> Option<f64> {
    racer
        .race_runs
        .iter()
        .filter(|run| run.run_type == run_type)
        .filter_map(|run| run.qualifying_time().map(|t| (run.run_identifier, t)))
        .min_by_key(|(seq, _)| *seq)
        .map(|(_, t)| t)
}

/// Assign dense 1-based ranks by ascending best time. Unranked rows follow
/// in their incoming order.
pub fn assign_ranks(rows: Vec<RankedRacer<'_>>) -> Vec<RankedRacer<'_>> {
    let (mut timed, untimed): (Vec<_>, Vec<_>) =
        rows.into_iter().partition(|row| row.best_time.is_some());
    timed.sort_by(|a, b| cmp_time(a.best_time, b.best_time));
    for (position, row) in timed.iter_mut().enumerate() {
        row.rank = Some(position + 1);
    }
    timed.extend(untimed.into_iter().map(|row| RankedRacer { rank: None, ..row }));
    timed
}

/// Filter, rank, then order by `sort`.
pub fn rank_results<'a>(racers: &'a [Racer], filter: &Filter, sort: &SortSpec) -> Vec<RankedRacer<'a>> {
    let rows = racers
        .iter()
        .filter(|racer| filter.matches(racer))
        .map(|racer| RankedRacer {
            racer,
            best_time: best_time(racer),
            rank: None,
        })
        .collect();
    let mut rows = assign_ranks(rows);
    sort_rows(&mut rows, sort);
    rows
}

/// Stable sort; rows without a value for the key always go last.
pub fn sort_rows(rows: &mut [RankedRacer<'_>], sort: &SortSpec) {
    let asc = sort.ascending;
    match sort.key {
        SortKey::Rank => rows.sort_by(|a, b| nulls_last(a.rank, b.rank, asc, |x, y| x.cmp(y))),
        SortKey::Name => rows.sort_by(|a, b| {
            nulls_last(
                Some(a.racer.display_name()),
                Some(b.racer.display_name()),
                asc,
                |x, y| collate(x, y),
            )
        }),
        SortKey::Team => rows.sort_by(|a, b| {
            nulls_last(
                team_name(a.racer),
                team_name(b.racer),
                asc,
                |x, y| collate(x, y),
            )
        }),
        SortKey::Class => rows.sort_by(|a, b| {
            nulls_last(
                Some(a.racer.class_label()),
                Some(b.racer.class_label()),
                asc,
                |x, y| collate(x, y),
            )
        }),
        SortKey::RunTime(run_type) => rows.sort_by(|a, b| {
            nulls_last(a.run_time(run_type), b.run_time(run_type), asc, |x, y| x.total_cmp(y))
        }),
        SortKey::BestTime => rows.sort_by(|a, b| {
            nulls_last(a.best_time, b.best_time, asc, |x, y| x.total_cmp(y))
        }),
    }
}

fn team_name(racer: &Racer) -> Option<String> {
    racer
        .team_name
        .as_ref()
        .filter(|name| !name.trim().is_empty())
        .cloned()
}

fn cmp_time(a: Option<f64>, b: Option<f64>) -> Ordering {
    nulls_last(a, b, true, |x, y| x.total_cmp(y))
}

fn nulls_last<T>(a: Option<T>, b: Option<T>, ascending: bool, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = cmp(&x, &y);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Dictionary order as German event lists expect it: accents and case are
/// folded first (Ä sorts with A, ß as ss), so "Ärne" lands next to "Arne"
/// instead of after "Zoe". Folded ties fall back to the case-folded text,
/// then to byte order.
pub fn collate(a: &str, b: &str) -> Ordering {
    fold(a)
        .cmp(&fold(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}

fn fold(s: &str) -> String {
    deunicode::deunicode(s).to_lowercase()
}

/// Filter values that make sense for `racers`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOptions {
    pub classes: Vec<SoapboxClass>,
    pub teams: Vec<(TeamId, String)>,
    pub has_solo: bool,
}

impl FilterOptions {
    pub fn from_racers(racers: &[Racer]) -> Self {
        let classes = racers
            .iter()
            .map(|r| r.soapbox_class)
            .unique()
            .sorted()
            .collect();
        let teams = racers
            .iter()
            .filter_map(|r| {
                r.team
                    .map(|id| (id, r.team_name.clone().unwrap_or_else(|| format!("Team {id}"))))
            })
            .unique_by(|(id, _)| *id)
            .sorted_by(|a, b| collate(&a.1, &b.1))
            .collect();
        let has_solo = racers.iter().any(|r| r.team.is_none());
        Self {
            classes,
            teams,
            has_solo,
        }
    }

    /// all → each class → all
    pub fn next_class(&self, current: Option<SoapboxClass>) -> Option<SoapboxClass> {
        match current {
            None => self.classes.first().copied(),
            Some(c) => {
                let idx = self.classes.iter().position(|x| *x == c);
                idx.and_then(|i| self.classes.get(i + 1).copied())
            }
        }
    }

    /// all → each team → solo → all
    pub fn next_team(&self, current: Option<TeamFilter>) -> Option<TeamFilter> {
        let mut cycle: Vec<TeamFilter> = self.teams.iter().map(|(id, _)| TeamFilter::Team(*id)).collect();
        if self.has_solo {
            cycle.push(TeamFilter::Solo);
        }
        match current {
            None => cycle.first().copied(),
            Some(f) => {
                let idx = cycle.iter().position(|x| *x == f);
                idx.and_then(|i| cycle.get(i + 1).copied())
            }
        }
    }

    pub fn team_label(&self, filter: Option<TeamFilter>) -> String {
        match filter {
            None => "all teams".to_string(),
            Some(TeamFilter::Solo) => "solo".to_string(),
            Some(TeamFilter::Team(id)) => self
                .teams
                .iter()
                .find(|(tid, _)| *tid == id)
                .map(|(_, name)| name.clone())
                .unwrap_or_else(|| format!("Team {id}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RaceRun;

    fn run(run_type: RunType, seq: u16, time: Option<&str>, dq: bool) -> RaceRun {
        RaceRun {
            id: 0,
            racer: None,
            run_type,
            run_type_display: None,
            run_identifier: seq,
            time_in_seconds: time.map(str::to_string),
            disqualified: dq,
            notes: None,
            recorded_at: None,
        }
    }

    fn racer(id: i64, name: &str, runs: Vec<RaceRun>) -> Racer {
        Racer {
            id,
            first_name: name.to_string(),
            last_name: String::new(),
            full_name: Some(name.to_string()),
            start_number: Some(id.to_string()),
            soapbox_class: SoapboxClass::LuftreifenJunior,
            soapbox_class_display: None,
            team: None,
            team_name: None,
            soapbox: None,
            race_runs: runs,
        }
    }

    #[test]
    fn best_time_ignores_dq_and_missing() {
        let r = racer(
            1,
            "A",
            vec![
                run(RunType::Heat1, 1, Some("45.123"), false),
                run(RunType::Heat2, 1, Some("40.000"), true),
                run(RunType::Practice, 1, None, false),
                run(RunType::Practice, 2, Some("bogus"), false),
            ],
        );
        assert_eq!(best_time(&r), Some(45.123));
    }

    #[test]
    fn best_time_none_when_nothing_qualifies() {
        let r = racer(1, "A", vec![run(RunType::Heat1, 1, Some("41.0"), true)]);
        assert_eq!(best_time(&r), None);
        assert_eq!(best_time(&racer(2, "B", vec![])), None);
    }

    #[test]
    fn run_time_picks_lowest_sequence() {
        let r = racer(
            1,
            "A",
            vec![
                run(RunType::Practice, 2, Some("50.0"), false),
                run(RunType::Practice, 1, Some("52.0"), false),
            ],
        );
        assert_eq!(run_time(&r, RunType::Practice), Some(52.0));
        assert_eq!(run_time(&r, RunType::Heat1), None);
    }

    #[test]
    fn ranks_are_dense_and_unranked_keep_order() {
        let racers = vec![
            racer(1, "C", vec![]),
            racer(2, "B", vec![run(RunType::Heat1, 1, Some("46.000"), false)]),
            racer(3, "D", vec![run(RunType::Heat1, 1, None, false)]),
            racer(4, "A", vec![run(RunType::Heat1, 1, Some("45.123"), false)]),
        ];
        let rows = rank_results(&racers, &Filter::default(), &SortSpec::default());
        let ids: Vec<_> = rows.iter().map(|r| (r.racer.id, r.rank)).collect();
        assert_eq!(ids, vec![(4, Some(1)), (2, Some(2)), (1, None), (3, None)]);
    }

    #[test]
    fn equal_times_get_consecutive_ranks() {
        let racers = vec![
            racer(1, "X", vec![run(RunType::Heat1, 1, Some("45.0"), false)]),
            racer(2, "Y", vec![run(RunType::Heat1, 1, Some("45.0"), false)]),
        ];
        let rows = rank_results(&racers, &Filter::default(), &SortSpec::default());
        assert_eq!(rows[0].racer.id, 1);
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[1].rank, Some(2));
    }

    #[test]
    fn nulls_last_in_both_directions() {
        let racers = vec![
            racer(1, "none", vec![]),
            racer(2, "slow", vec![run(RunType::Heat1, 1, Some("50.0"), false)]),
            racer(3, "fast", vec![run(RunType::Heat1, 1, Some("40.0"), false)]),
        ];
        let asc = rank_results(&racers, &Filter::default(), &SortSpec::new(SortKey::BestTime, true));
        assert_eq!(asc.iter().map(|r| r.racer.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        let desc = rank_results(&racers, &Filter::default(), &SortSpec::new(SortKey::BestTime, false));
        assert_eq!(desc.iter().map(|r| r.racer.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        let rank_desc = rank_results(&racers, &Filter::default(), &SortSpec::new(SortKey::Rank, false));
        assert_eq!(rank_desc.iter().map(|r| r.racer.id).collect::<Vec<_>>(), vec![2, 3, 1]);
    }

    #[test]
    fn name_sort_is_case_insensitive() {
        let racers = vec![racer(1, "bert", vec![]), racer(2, "Anna", vec![]), racer(3, "Carl", vec![])];
        let rows = rank_results(&racers, &Filter::default(), &SortSpec::new(SortKey::Name, true));
        assert_eq!(rows.iter().map(|r| r.racer.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[test]
    fn umlaut_names_sort_with_their_base_letter() {
        let racers = vec![
            racer(1, "Zoe Zimmer", vec![]),
            racer(2, "Özil Öztürk", vec![]),
            racer(3, "Peter Pan", vec![]),
            racer(4, "Ärne Ahrens", vec![]),
        ];
        let rows = rank_results(&racers, &Filter::default(), &SortSpec::new(SortKey::Name, true));
        let names: Vec<_> = rows.iter().map(|r| r.racer.display_name()).collect();
        assert_eq!(names, ["Ärne Ahrens", "Özil Öztürk", "Peter Pan", "Zoe Zimmer"]);

        let rows = rank_results(&racers, &Filter::default(), &SortSpec::new(SortKey::Name, false));
        assert_eq!(rows.iter().map(|r| r.racer.id).collect::<Vec<_>>(), vec![1, 3, 2, 4]);
    }

    #[test]
    fn collation_folds_accents_and_sharp_s() {
        assert_eq!(collate("Äpfel", "Apfelbaum"), Ordering::Less);
        assert_eq!(collate("Straße", "Strasse"), Ordering::Greater);
        assert_eq!(collate("Straße", "Strasser"), Ordering::Less);
        assert_eq!(collate("Düsenjäger", "Dusenjager"), Ordering::Greater);
        assert_eq!(collate("Düsenjäger", "Eber"), Ordering::Less);
        assert_eq!(collate("anna", "Anna"), Ordering::Greater);
    }

    #[test]
    fn select_toggles_and_resets() {
        let mut sort = SortSpec::default();
        sort.select(SortKey::Name);
        assert_eq!(sort, SortSpec::new(SortKey::Name, true));
        sort.select(SortKey::Name);
        assert_eq!(sort, SortSpec::new(SortKey::Name, false));
        sort.select(SortKey::Name);
        assert_eq!(sort, SortSpec::new(SortKey::Name, true));
        sort.select(SortKey::Name);
        sort.select(SortKey::BestTime);
        assert_eq!(sort, SortSpec::new(SortKey::BestTime, true));
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!(SortKey::parse("time_H1"), Some(SortKey::RunTime(RunType::Heat1)));
        assert_eq!(SortKey::parse("pr"), Some(SortKey::RunTime(RunType::Practice)));
        assert_eq!(SortKey::parse("best"), Some(SortKey::BestTime));
        assert_eq!(SortKey::parse("Rank"), Some(SortKey::Rank));
        assert_eq!(SortKey::parse("speed"), None);
    }

    #[test]
    fn sort_key_display() {
        assert_eq!(SortKey::BestTime.to_string(), "Best time");
        assert_eq!(SortKey::RunTime(RunType::Heat1).to_string(), "Heat 1 time");
        assert_eq!(SortKey::Rank.to_string(), "Rank");
    }

    #[test]
    fn team_cycle_walks_teams_then_solo() {
        let mut a = racer(1, "A", vec![]);
        a.team = Some(5);
        a.team_name = Some("Zebras".into());
        let mut b = racer(2, "B", vec![]);
        b.team = Some(9);
        b.team_name = Some("Ants".into());
        let c = racer(3, "C", vec![]);
        let opts = FilterOptions::from_racers(&[a, b, c]);
        assert_eq!(opts.teams, vec![(9, "Ants".to_string()), (5, "Zebras".to_string())]);

        let mut cur = None;
        let mut seen = Vec::new();
        for _ in 0..4 {
            cur = opts.next_team(cur);
            seen.push(cur);
        }
        assert_eq!(
            seen,
            vec![
                Some(TeamFilter::Team(9)),
                Some(TeamFilter::Team(5)),
                Some(TeamFilter::Solo),
                None
            ]
        );
        assert_eq!(opts.team_label(Some(TeamFilter::Team(5))), "Zebras");
    }

    #[test]
    fn class_cycle_returns_to_all() {
        let mut a = racer(1, "A", vec![]);
        a.soapbox_class = SoapboxClass::Veteranen;
        let b = racer(2, "B", vec![]);
        let opts = FilterOptions::from_racers(&[a, b]);
        assert_eq!(
            opts.classes,
            vec![SoapboxClass::LuftreifenJunior, SoapboxClass::Veteranen]
        );
        let first = opts.next_class(None);
        assert_eq!(first, Some(SoapboxClass::LuftreifenJunior));
        let second = opts.next_class(first);
        assert_eq!(second, Some(SoapboxClass::Veteranen));
        assert_eq!(opts.next_class(second), None);
    }
}
