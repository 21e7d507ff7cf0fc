//! Views over the cached solve history.

use crate::model::{RecordMap, SolveEntry};

/// How many solves the summary panel lists.
pub const RECENT_COUNT: usize = 10;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Fastest,
    Slowest,
}

impl SortOrder {
    pub fn next(self) -> Self {
        match self {
            SortOrder::Newest => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Fastest,
            SortOrder::Fastest => SortOrder::Slowest,
            SortOrder::Slowest => SortOrder::Newest,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SortOrder::Newest => "sort-newest",
            SortOrder::Oldest => "sort-oldest",
            SortOrder::Fastest => "sort-fastest",
            SortOrder::Slowest => "sort-slowest",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CubeFilter {
    #[default]
    All,
    Cube(String),
}

impl CubeFilter {
    pub fn matches(&self, entry: &SolveEntry) -> bool {
        match self {
            CubeFilter::All => true,
            CubeFilter::Cube(cube) => &entry.cube == cube,
        }
    }
}

/// `All` followed by each cube type that appears in `times`, in order of
/// first appearance.
pub fn filter_options(times: &[SolveEntry]) -> Vec<CubeFilter> {
    let mut options = vec![CubeFilter::All];
    for entry in times {
        let option = CubeFilter::Cube(entry.cube.clone());
        if !options.contains(&option) {
            options.push(option);
        }
    }
    options
}

/// One row of the history list.
#[derive(Clone, Debug, PartialEq)]
pub struct Row<'a> {
    /// 1-based position in chronological order.
    pub number: usize,
    pub entry: &'a SolveEntry,
}

/// Filtered and sorted history. Ids grow with insertion, so id order is
/// chronological; solves without an id keep their cache position.
pub fn view<'a>(times: &'a [SolveEntry], filter: &CubeFilter, order: SortOrder) -> Vec<Row<'a>> {
    let mut rows: Vec<Row<'a>> = times
        .iter()
        .enumerate()
        .filter(|(_, entry)| filter.matches(entry))
        .map(|(i, entry)| Row { number: i + 1, entry })
        .collect();

    let chrono_key = |row: &Row| (row.entry.id.unwrap_or(0), row.number);
    match order {
        SortOrder::Newest => rows.sort_by(|a, b| chrono_key(b).cmp(&chrono_key(a))),
        SortOrder::Oldest => rows.sort_by_key(chrono_key),
        SortOrder::Fastest => rows.sort_by_key(|row| row.entry.ms),
        SortOrder::Slowest => rows.sort_by(|a, b| b.entry.ms.cmp(&a.entry.ms)),
    }
    rows
}

/// The last `count` solves, newest first.
pub fn recent(times: &[SolveEntry], count: usize) -> Vec<Row<'_>> {
    times
        .iter()
        .enumerate()
        .rev()
        .take(count)
        .map(|(i, entry)| Row { number: i + 1, entry })
        .collect()
}

/// True when the solve's duration is the current best for its cube.
pub fn is_current_record(entry: &SolveEntry, records: &RecordMap) -> bool {
    records.get(&entry.cube) == Some(entry.ms)
}
