use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;

use timer_core::{format_countdown, format_solve_time, PhaseKind, TimerMachine};

use crate::alerts::{Notice, NoticeKind};
use crate::cubes::CubeTypeList;
use crate::editor::SettingsField;
use crate::history::{self, CubeFilter, Row, SortOrder};
use crate::i18n::Translator;
use crate::model::{RecordMap, Settings, SolveEntry, UNKNOWN_CUBE};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GlyphStyle {
    Bold,
    Regular,
    Small,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tone {
    Idle,
    Inspecting,
    Running,
    Result,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Idle => Color::Reset,
            Tone::Inspecting => Color::Yellow,
            Tone::Running => Color::Green,
            Tone::Result => Color::Cyan,
        }
    }
}

/// Text and style of the timer area for the current phase.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerView {
    pub headline: String,
    pub display: String,
    pub tone: Tone,
    pub show_cancel: bool,
}

pub fn timer_view(machine: &TimerMachine, now_ms: u64, last_ms: Option<u64>, tr: &Translator) -> TimerView {
    let (headline, display, tone) = match machine.kind() {
        PhaseKind::Idle => (
            tr.tr("tap-to-start").into_owned(),
            format_solve_time(last_ms.unwrap_or(0)),
            Tone::Idle,
        ),
        PhaseKind::Inspecting => (
            tr.tr("inspection-running").into_owned(),
            format_countdown(machine.inspection_remaining_s(now_ms).unwrap_or(0)),
            Tone::Inspecting,
        ),
        PhaseKind::Running => (
            String::new(),
            format_solve_time(machine.elapsed_ms(now_ms).unwrap_or(0)),
            Tone::Running,
        ),
        PhaseKind::Cooldown => (
            tr.tr("time-label").into_owned(),
            format_solve_time(machine.elapsed_ms(now_ms).unwrap_or(0)),
            Tone::Result,
        ),
    };
    TimerView {
        headline,
        display,
        tone,
        show_cancel: machine.shows_cancel(),
    }
}

pub fn clear_screen<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, ResetColor, MoveTo(0, 0), Clear(ClearType::All))
}

fn text_line<W: Write>(out: &mut W, row: u16, style: GlyphStyle, text: &str) -> io::Result<()> {
    let attribute = match style {
        GlyphStyle::Bold => Attribute::Bold,
        GlyphStyle::Regular => Attribute::Reset,
        GlyphStyle::Small => Attribute::Dim,
    };
    queue!(
        out,
        MoveTo(1, row),
        SetAttribute(attribute),
        Print(text),
        SetAttribute(Attribute::Reset)
    )
}

fn colored_line<W: Write>(out: &mut W, row: u16, color: Color, text: &str) -> io::Result<()> {
    queue!(
        out,
        MoveTo(1, row),
        SetForegroundColor(color),
        SetAttribute(Attribute::Bold),
        Print(text),
        SetAttribute(Attribute::Reset),
        ResetColor
    )
}

fn footer<W: Write>(out: &mut W, size: (u16, u16), text: &str) -> io::Result<()> {
    text_line(out, size.1.saturating_sub(1), GlyphStyle::Small, text)
}

fn marker(selected: bool) -> &'static str {
    if selected {
        "> "
    } else {
        "  "
    }
}

/// Index of the first row to show so `cursor` stays visible.
fn scroll_top(cursor: usize, visible: usize) -> usize {
    if visible == 0 || cursor < visible {
        0
    } else {
        cursor + 1 - visible
    }
}

pub fn draw_notice<W: Write>(out: &mut W, size: (u16, u16), notice: Option<&Notice>, tr: &Translator) -> io::Result<()> {
    let notice = match notice {
        Some(notice) => notice,
        None => return Ok(()),
    };
    let color = match notice.kind {
        NoticeKind::Info => Color::Reset,
        NoticeKind::Success => Color::Green,
        NoticeKind::Error => Color::Red,
        NoticeKind::Record => Color::Magenta,
    };
    colored_line(out, size.1.saturating_sub(3), color, &notice.text(tr))
}

fn solve_line(row: &Row, records: &RecordMap, tr: &Translator) -> String {
    let star = if history::is_current_record(row.entry, records) { " *" } else { "" };
    format!(
        "#{:<4} {:>12}  {}{}",
        row.number,
        format_solve_time(row.entry.ms),
        tr.cube_name(&row.entry.cube),
        star
    )
}

#[allow(clippy::too_many_arguments)]
pub fn draw_timer<W: Write>(
    out: &mut W,
    size: (u16, u16),
    view: &TimerView,
    cube: &str,
    pending_ms: Option<u64>,
    times: &[SolveEntry],
    records: &RecordMap,
    tr: &Translator,
) -> io::Result<()> {
    clear_screen(out)?;

    let mut title = format!("{}: {}", tr.tr("cube-type"), tr.cube_name(cube));
    if let Some(ms) = pending_ms {
        title.push_str(&format!("  ({} {})", UNKNOWN_CUBE, format_solve_time(ms)));
    }
    text_line(out, 0, GlyphStyle::Bold, &title)?;
    text_line(out, 2, GlyphStyle::Regular, &view.headline)?;
    colored_line(out, 4, view.tone.color(), &format!("    {}", view.display))?;
    if view.show_cancel {
        text_line(out, 6, GlyphStyle::Small, &tr.tr("cancel-hint"))?;
    }

    // Summary: records, then the latest solves.
    let mut row = 8u16;
    let bottom = size.1.saturating_sub(4);
    text_line(out, row, GlyphStyle::Bold, &tr.tr("records"))?;
    row += 1;
    if records.is_empty() {
        text_line(out, row, GlyphStyle::Small, &tr.tr("no-records"))?;
        row += 1;
    }
    for (cube, ms) in records.iter() {
        if row >= bottom {
            break;
        }
        text_line(out, row, GlyphStyle::Regular, &format!("  {:<12} {}", tr.cube_name(cube), format_solve_time(ms)))?;
        row += 1;
    }

    row += 1;
    if row < bottom {
        text_line(out, row, GlyphStyle::Bold, &tr.tr("recent-solves"))?;
        row += 1;
    }
    let recent = history::recent(times, history::RECENT_COUNT);
    if recent.is_empty() && row < bottom {
        text_line(out, row, GlyphStyle::Small, &tr.tr("no-solves"))?;
    }
    for solve in &recent {
        if row >= bottom {
            break;
        }
        text_line(out, row, GlyphStyle::Regular, &format!("  {}", solve_line(solve, records, tr)))?;
        row += 1;
    }

    footer(out, size, &tr.tr("footer-timer"))
}

pub fn draw_cube_select<W: Write>(
    out: &mut W,
    size: (u16, u16),
    cubes: &CubeTypeList,
    cursor: usize,
    current: &str,
    tr: &Translator,
) -> io::Result<()> {
    clear_screen(out)?;
    text_line(out, 0, GlyphStyle::Bold, &tr.tr("select-cube"))?;

    let list_top = 2u16;
    let visible = usize::from(size.1.saturating_sub(list_top + 4));
    let names = std::iter::once(UNKNOWN_CUBE).chain(cubes.names().iter().map(String::as_str));
    let top = scroll_top(cursor, visible);
    for (i, name) in names.enumerate().skip(top).take(visible) {
        let active = if name == current { " *" } else { "" };
        let line = format!("{}{}{}", marker(i == cursor), tr.cube_name(name), active);
        text_line(out, list_top + (i - top) as u16, GlyphStyle::Regular, &line)?;
    }

    footer(out, size, &tr.tr("footer-cube-select"))
}

#[allow(clippy::too_many_arguments)]
pub fn draw_history<W: Write>(
    out: &mut W,
    size: (u16, u16),
    rows: &[Row],
    cursor: usize,
    filter: &CubeFilter,
    order: SortOrder,
    records: &RecordMap,
    tr: &Translator,
) -> io::Result<()> {
    clear_screen(out)?;

    let filter_label = match filter {
        CubeFilter::All => tr.tr("all").into_owned(),
        CubeFilter::Cube(cube) => tr.cube_name(cube).into_owned(),
    };
    text_line(
        out,
        0,
        GlyphStyle::Bold,
        &format!(
            "{}  [{}: {}]  [{}: {}]",
            tr.tr("times"),
            tr.tr("filter"),
            filter_label,
            tr.tr("sort"),
            tr.tr(order.key())
        ),
    )?;

    let list_top = 2u16;
    if rows.is_empty() {
        text_line(out, list_top, GlyphStyle::Small, &tr.tr("no-solves"))?;
    }
    let visible = usize::from(size.1.saturating_sub(list_top + 4));
    let top = scroll_top(cursor, visible);
    for (i, row) in rows.iter().enumerate().skip(top).take(visible) {
        let line = format!("{}{}", marker(i == cursor), solve_line(row, records, tr));
        text_line(out, list_top + (i - top) as u16, GlyphStyle::Regular, &line)?;
    }

    footer(out, size, &tr.tr("footer-history"))
}

pub fn draw_settings<W: Write>(
    out: &mut W,
    size: (u16, u16),
    draft: &Settings,
    cursor: usize,
    dirty: bool,
    tr: &Translator,
) -> io::Result<()> {
    clear_screen(out)?;
    let title = if dirty {
        format!("{} *", tr.tr("settings"))
    } else {
        tr.tr("settings").into_owned()
    };
    text_line(out, 0, GlyphStyle::Bold, &title)?;

    for (i, field) in SettingsField::ALL.iter().enumerate() {
        let line = format!(
            "{}{:<24} {}",
            marker(i == cursor),
            tr.tr(field.label_key()),
            field.value_text(draft, tr)
        );
        text_line(out, 2 + i as u16, GlyphStyle::Regular, &line)?;
    }

    footer(out, size, &tr.tr("footer-settings"))
}

pub fn draw_help<W: Write>(out: &mut W, size: (u16, u16), tr: &Translator) -> io::Result<()> {
    clear_screen(out)?;

    let limit = size.1.saturating_sub(2);
    for (i, line) in tr.tr("help-text").lines().enumerate() {
        let row = i as u16;
        if row >= limit {
            break;
        }
        let style = if i == 0 { GlyphStyle::Bold } else { GlyphStyle::Small };
        text_line(out, row, style, line)?;
    }

    footer(out, size, &tr.tr("footer-help"))
}

pub fn draw_confirm<W: Write>(
    out: &mut W,
    size: (u16, u16),
    title: &str,
    message: &str,
    tr: &Translator,
) -> io::Result<()> {
    clear_screen(out)?;
    text_line(out, 2, GlyphStyle::Bold, title)?;
    for (i, line) in message.lines().enumerate() {
        text_line(out, 4 + i as u16, GlyphStyle::Regular, line)?;
    }
    footer(out, size, &tr.tr("footer-confirm"))
}

pub fn draw_prompt<W: Write>(
    out: &mut W,
    size: (u16, u16),
    label: &str,
    buffer: &str,
    error: Option<&str>,
    tr: &Translator,
) -> io::Result<()> {
    clear_screen(out)?;
    text_line(out, 2, GlyphStyle::Bold, label)?;
    text_line(out, 4, GlyphStyle::Regular, &format!("> {}_", buffer))?;
    if let Some(error) = error {
        colored_line(out, 6, Color::Red, error)?;
    }
    footer(out, size, &tr.tr("footer-prompt"))
}
