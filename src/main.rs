mod alerts;
mod config;
mod cubes;
mod editor;
mod history;
mod i18n;
mod model;
mod session;
mod storage;
mod transfer;
mod ui;

use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossterm::cursor::{Hide, Show};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use timer_core::{format_solve_time, Ignored, InputEvent, InputSource, Outcome, PhaseKind, TimerMachine, Transition};

use crate::alerts::{fire_alert, Notice, NoticeKind};
use crate::editor::SettingsField;
use crate::history::{CubeFilter, SortOrder};
use crate::i18n::Translator;
use crate::model::{RecordMap, Settings, SolveEntry, UNKNOWN_CUBE};
use crate::session::{timestamp_now, RecordDecision, SaveOutcome, SaveTicket, Session};
use crate::storage::{ApiRequest, Snapshot, StorageError, TimerStorage};
use crate::transfer::TransferError;

/// Pump cadence while only a notice needs to expire.
const NOTICE_REFRESH_MS: u64 = 250;

/// Without release events, OS auto-repeat arrives as fresh presses. A press
/// of the same key this soon after the previous one is a repeat.
const KEY_REPEAT_WINDOW_MS: u64 = 600;

enum AppOp {
    Term(Event),
    Pump(u64),
    Api(ApiReply),
    Quit,
}

enum PumpCtl {
    Start { interval_ms: u64, generation: u64 },
    Stop,
    Quit,
}

/// Completion of a backend call, handed back to the controller loop.
enum ApiReply {
    Snapshot(Snapshot),
    TimesLoaded(Result<Vec<SolveEntry>, StorageError>),
    RecordsLoaded(Result<RecordMap, StorageError>),
    SolveSaved { ticket: SaveTicket, result: Result<SolveEntry, StorageError> },
    RecordsSaved(Result<(), StorageError>),
    TimesCleared(Result<(), StorageError>),
    RecordsCleared(Result<(), StorageError>),
    TimeDeleted { id: u64, result: Result<(), StorageError> },
    TimeRetyped { id: u64, cube: String, result: Result<(), StorageError> },
    CubeAdded { name: String, result: Result<(), StorageError> },
    CubeRemoved { name: String, result: Result<(), StorageError> },
    CubeRenamed { old: String, new: String, result: Result<(), StorageError> },
    SettingsSaved { settings: Settings, reset: bool, result: Result<(), StorageError> },
    Exported { path: PathBuf, result: Result<(), TransferError> },
    Imported(Result<usize, TransferError>),
}

#[derive(Clone, Copy, PartialEq)]
pub enum AppMode {
    Timer,
    CubeSelect,
    History,
    Settings,
}

/// What the cube list is open for.
#[derive(Clone, Copy, PartialEq)]
enum PickFor {
    Selection,
    Retype(u64),
}

#[derive(Clone, PartialEq)]
enum Confirm {
    Exit,
    RemoveCube(String),
    DeleteTime(u64),
    ClearTimes,
    ClearRecords,
    ResetSettings,
}

#[derive(Clone, PartialEq)]
enum PromptKind {
    AddCube,
    RenameCube(String),
    ExportPath,
    ImportPath,
}

struct Prompt {
    kind: PromptKind,
    buffer: String,
    error: Option<&'static str>,
}

impl Prompt {
    fn new(kind: PromptKind, buffer: &str) -> Self {
        Self {
            kind,
            buffer: buffer.to_string(),
            error: None,
        }
    }
}

struct TimerApp {
    out: Box<dyn Write>,
    size: (u16, u16),
    clock: Instant,
    rt: tokio::runtime::Runtime,
    tx: Sender<AppOp>,
    storage: TimerStorage,

    pump: Sender<PumpCtl>,
    pump_generation: u64,
    pump_interval: Option<u64>,
    pump_phase: PhaseKind,

    release_events: bool,
    held_key: Option<KeyCode>,
    last_press: Option<(KeyCode, u64)>,

    machine: TimerMachine,
    session: Session,
    tr: Translator,
    last_ms: Option<u64>,
    notice: Option<Notice>,

    mode: AppMode,
    cube_cursor: usize,
    pick_for: PickFor,
    history_cursor: usize,
    history_filter: CubeFilter,
    history_order: SortOrder,
    settings_cursor: usize,
    settings_draft: Settings,

    help_visible: bool,
    confirm: Option<Confirm>,
    prompt: Option<Prompt>,
    quit: bool,
}

impl TimerApp {
    fn new(
        storage: TimerStorage,
        rt: tokio::runtime::Runtime,
        tx: Sender<AppOp>,
        pump: Sender<PumpCtl>,
        release_events: bool,
        out: Box<dyn Write>,
    ) -> Self {
        let session = Session::new();
        let settings = session.settings().clone();
        let size = terminal::size().unwrap_or((80, 24));

        Self {
            out,
            size,
            clock: Instant::now(),
            rt,
            tx,
            storage,
            pump,
            pump_generation: 0,
            pump_interval: None,
            pump_phase: PhaseKind::Idle,
            release_events,
            held_key: None,
            last_press: None,
            machine: TimerMachine::new(settings.machine_config()),
            tr: Translator::new(settings.language()),
            session,
            last_ms: None,
            notice: None,
            mode: AppMode::Timer,
            cube_cursor: 0,
            pick_for: PickFor::Selection,
            history_cursor: 0,
            history_filter: CubeFilter::All,
            history_order: SortOrder::Newest,
            settings_cursor: 0,
            settings_draft: settings,
            help_visible: false,
            confirm: None,
            prompt: None,
            quit: false,
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn redraw(&mut self) {
        let result = self.draw().and_then(|_| self.out.flush());
        if let Err(e) = result {
            log::error!("Failed to draw: {:?}", e);
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        let tr = self.tr;
        let size = self.size;

        if self.help_visible {
            return ui::draw_help(&mut self.out, size, &tr);
        }
        if let Some(confirm) = &self.confirm {
            let (title, message) = confirm_text(confirm, &tr);
            return ui::draw_confirm(&mut self.out, size, &title, &message, &tr);
        }
        if let Some(prompt) = &self.prompt {
            let label = match &prompt.kind {
                PromptKind::AddCube => tr.tr("new-cube-name").into_owned(),
                PromptKind::RenameCube(old) => format!("{} ({})", tr.tr("rename-to"), old),
                PromptKind::ExportPath => tr.tr("export-path").into_owned(),
                PromptKind::ImportPath => tr.tr("import-path").into_owned(),
            };
            let error = prompt.error.map(|key| tr.tr(key).into_owned());
            return ui::draw_prompt(&mut self.out, size, &label, &prompt.buffer, error.as_deref(), &tr);
        }

        match self.mode {
            AppMode::Timer => {
                let view = ui::timer_view(&self.machine, self.now_ms(), self.last_ms, &tr);
                ui::draw_timer(
                    &mut self.out,
                    size,
                    &view,
                    self.session.current_cube(),
                    self.session.pending_unknown(),
                    self.session.times(),
                    self.session.records(),
                    &tr,
                )?;
            }
            AppMode::CubeSelect => {
                ui::draw_cube_select(
                    &mut self.out,
                    size,
                    self.session.cubes(),
                    self.cube_cursor,
                    self.session.current_cube(),
                    &tr,
                )?;
            }
            AppMode::History => {
                let rows = history::view(self.session.times(), &self.history_filter, self.history_order);
                ui::draw_history(
                    &mut self.out,
                    size,
                    &rows,
                    self.history_cursor,
                    &self.history_filter,
                    self.history_order,
                    self.session.records(),
                    &tr,
                )?;
            }
            AppMode::Settings => {
                let dirty = &self.settings_draft != self.session.settings();
                ui::draw_settings(&mut self.out, size, &self.settings_draft, self.settings_cursor, dirty, &tr)?;
            }
        }
        ui::draw_notice(&mut self.out, size, self.notice.as_ref(), &tr)
    }

    fn notify(&mut self, kind: NoticeKind, key: &'static str) {
        let notice = Notice::new(kind, key, self.now_ms());
        self.notice = Some(fire_alert(notice));
        self.sync_pump();
    }

    fn notify_detail(&mut self, kind: NoticeKind, key: &'static str, detail: impl Into<String>) {
        let notice = Notice::new(kind, key, self.now_ms()).with_detail(detail);
        self.notice = Some(fire_alert(notice));
        self.sync_pump();
    }

    /// Points the pump at the cadence the current phase needs. A new
    /// generation makes ticks already queued for the old one stale.
    fn sync_pump(&mut self) {
        let kind = self.machine.kind();
        let interval = self
            .machine
            .refresh_interval_ms()
            .or_else(|| self.notice.as_ref().map(|_| NOTICE_REFRESH_MS));
        if interval == self.pump_interval && kind == self.pump_phase {
            return;
        }
        self.pump_interval = interval;
        self.pump_phase = kind;
        self.pump_generation += 1;

        let ctl = match interval {
            Some(interval_ms) => PumpCtl::Start {
                interval_ms,
                generation: self.pump_generation,
            },
            None => PumpCtl::Stop,
        };
        if self.pump.send(ctl).is_err() {
            log::error!("Pump thread is gone");
        }
    }

    fn handle_pump(&mut self, generation: u64) {
        if generation != self.pump_generation {
            return;
        }
        let now = self.now_ms();
        if self.notice.as_ref().map_or(false, |n| n.expired(now)) {
            self.notice = None;
        }

        match self.machine.tick(now) {
            Some(transition) => self.on_transition(transition),
            None => self.redraw(),
        }
        // The state produced by the last action is on screen now.
        if let Some(seq) = self.machine.in_flight() {
            self.machine.settle(seq);
        }
        self.sync_pump();
    }

    fn spawn_api<F>(&self, job: F)
    where
        F: Future<Output = ApiReply> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.rt.spawn(async move {
            let reply = job.await;
            tx.send(AppOp::Api(reply)).ok();
        });
    }

    fn run_request<F>(&self, request: ApiRequest, reply: F)
    where
        F: FnOnce(Result<(), StorageError>) -> ApiReply + Send + 'static,
    {
        let storage = self.storage.clone();
        self.spawn_api(async move {
            let result = storage.run(&request).await;
            reply(result)
        });
    }

    fn reload(&self) {
        let storage = self.storage.clone();
        self.spawn_api(async move { ApiReply::Snapshot(storage.load_snapshot().await) });
    }

    fn load_times(&self) {
        let storage = self.storage.clone();
        self.spawn_api(async move { ApiReply::TimesLoaded(storage.load_times().await) });
    }

    fn load_records(&self) {
        let storage = self.storage.clone();
        self.spawn_api(async move { ApiReply::RecordsLoaded(storage.load_records().await) });
    }

    fn apply_settings(&mut self) {
        let settings = self.session.settings();
        self.machine.set_config(settings.machine_config());
        self.tr = Translator::new(settings.language());
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(width, height) => {
                self.size = (width, height);
                self.redraw();
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.mode != AppMode::Timer || self.help_visible || self.confirm.is_some() || self.prompt.is_some() {
            return;
        }
        let event = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => InputEvent::press(InputSource::Pointer),
            MouseEventKind::Up(MouseButton::Left) => InputEvent::release(InputSource::Pointer),
            _ => return,
        };
        let outcome = self.machine.input(event, self.now_ms());
        self.apply_outcome(outcome);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            self.handle_key_release(key.code);
            return;
        }
        let repeat = key.kind == KeyEventKind::Repeat;

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.request_quit();
            return;
        }

        // If help screen is showing, any key dismisses it
        if self.help_visible {
            if !repeat {
                self.help_visible = false;
                self.redraw();
            }
            return;
        }

        if let Some(confirm) = self.confirm.take() {
            self.handle_key_confirm(confirm, key.code);
            return;
        }

        if self.prompt.is_some() {
            self.handle_key_prompt(key.code);
            return;
        }

        match self.mode {
            AppMode::Timer => {
                if !repeat && !self.auto_repeat(key.code) {
                    self.handle_key_timer(key.code);
                }
            }
            AppMode::CubeSelect => self.handle_key_cube_select(key.code),
            AppMode::History => self.handle_key_history(key.code),
            AppMode::Settings => self.handle_key_settings(key.code),
        }
    }

    /// Only meaningful without release events; a held key keeps refreshing
    /// the window so the whole hold is swallowed.
    fn auto_repeat(&mut self, code: KeyCode) -> bool {
        if self.release_events {
            return false;
        }
        let now = self.now_ms();
        let repeat = matches!(
            self.last_press,
            Some((last, at)) if last == code && now.saturating_sub(at) <= KEY_REPEAT_WINDOW_MS
        );
        self.last_press = Some((code, now));
        if repeat {
            log::debug!("auto-repeat of {:?} dropped", code);
        }
        repeat
    }

    fn handle_key_release(&mut self, code: KeyCode) {
        if self.held_key != Some(code) {
            return;
        }
        self.held_key = None;
        let outcome = self
            .machine
            .input(InputEvent::release(InputSource::Keyboard), self.now_ms());
        self.apply_outcome(outcome);
    }

    fn handle_key_timer(&mut self, code: KeyCode) {
        if self.machine.gesture_down() {
            return;
        }
        let kind = self.machine.kind();
        let timing = matches!(kind, PhaseKind::Running | PhaseKind::Inspecting);

        match code {
            KeyCode::Esc => {
                if let Some(transition) = self.machine.cancel() {
                    self.on_transition(transition);
                }
            }
            KeyCode::Char(' ') => self.key_press(code),
            // Any key stops a running solve
            _ if timing => self.key_press(code),
            KeyCode::Char('i') if !self.release_events => self.simulate_hold(),
            KeyCode::Char('c') => {
                self.pick_for = PickFor::Selection;
                self.cube_cursor = self.cube_index(self.session.current_cube());
                self.mode = AppMode::CubeSelect;
                self.redraw();
            }
            KeyCode::Char('h') => {
                self.history_cursor = 0;
                self.mode = AppMode::History;
                self.redraw();
            }
            KeyCode::Char('s') => {
                self.settings_draft = self.session.settings().clone();
                self.settings_cursor = 0;
                self.mode = AppMode::Settings;
                self.redraw();
            }
            KeyCode::Char('e') => {
                self.prompt = Some(Prompt::new(PromptKind::ExportPath, transfer::DEFAULT_EXPORT_FILE));
                self.redraw();
            }
            KeyCode::Char('o') => {
                self.prompt = Some(Prompt::new(PromptKind::ImportPath, transfer::DEFAULT_EXPORT_FILE));
                self.redraw();
            }
            KeyCode::Char('?') => {
                self.help_visible = true;
                self.redraw();
            }
            KeyCode::Char('q') => self.request_quit(),
            _ => {}
        }
    }

    fn key_press(&mut self, code: KeyCode) {
        let outcome = self
            .machine
            .input(InputEvent::press(InputSource::Keyboard), self.now_ms());
        if self.release_events {
            if !matches!(outcome, Outcome::Ignored(Ignored::Duplicate | Ignored::InFlight)) {
                self.held_key = Some(code);
            }
            self.apply_outcome(outcome);
        } else {
            // No release events: every key press is a complete tap.
            self.apply_outcome(outcome);
            let outcome = self
                .machine
                .input(InputEvent::release(InputSource::Keyboard), self.now_ms());
            self.apply_outcome(outcome);
        }
    }

    /// Stand-in for holding the key on terminals that never report releases.
    fn simulate_hold(&mut self) {
        let now = self.now_ms();
        let held = self.machine.config().inspection_delay_ms + 1;
        let outcome = self
            .machine
            .input(InputEvent::press(InputSource::Keyboard), now.saturating_sub(held));
        self.apply_outcome(outcome);
        let outcome = self.machine.input(InputEvent::release(InputSource::Keyboard), now);
        self.apply_outcome(outcome);
    }

    fn apply_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Moved(step) => {
                log::debug!("action {}: {:?}", step.seq, step.transition);
                self.on_transition(step.transition);
            }
            Outcome::Pending => {}
            Outcome::Ignored(reason) => log::debug!("input ignored: {:?}", reason),
        }
    }

    fn on_transition(&mut self, transition: Transition) {
        match transition {
            Transition::InspectionStarted { seconds } => log::info!("Inspection started ({}s)", seconds),
            Transition::TimerStarted => log::info!("Timer started"),
            Transition::TimerStopped { elapsed_ms } => {
                log::info!("Timer stopped at {}", format_solve_time(elapsed_ms));
                self.last_ms = Some(elapsed_ms);
                self.record_solve(elapsed_ms);
            }
            Transition::Cancelled => log::info!("Timer cancelled"),
            Transition::CooldownFinished => {}
        }
        self.sync_pump();
        self.redraw();
    }

    fn record_solve(&mut self, ms: u64) {
        let cube = self.session.current_cube().to_string();
        match self.session.begin_record(&cube, ms, timestamp_now()) {
            RecordDecision::Save { ticket, solve } => self.save_solve(ticket, solve),
            RecordDecision::NotSaved => self.notify(NoticeKind::Info, "solve-not-saved-unknown"),
        }
    }

    fn save_solve(&self, ticket: SaveTicket, solve: model::NewSolve) {
        let storage = self.storage.clone();
        self.spawn_api(async move {
            let result = storage.add_time(solve).await;
            ApiReply::SolveSaved { ticket, result }
        });
    }

    fn select_cube(&mut self, cube: &str) {
        log::info!("Selected cube {}", cube);
        if let Some(ms) = self.session.select_cube(cube) {
            if let RecordDecision::Save { ticket, solve } =
                self.session.begin_pending_record(cube, ms, timestamp_now())
            {
                self.save_solve(ticket, solve);
            }
        }
    }

    fn request_quit(&mut self) {
        if self.machine.shows_cancel() {
            self.confirm = Some(Confirm::Exit);
            self.redraw();
        } else {
            self.quit = true;
        }
    }

    fn handle_key_confirm(&mut self, confirm: Confirm, code: KeyCode) {
        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => self.execute_confirm(confirm),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
            _ => {
                self.confirm = Some(confirm);
                return;
            }
        }
        self.redraw();
    }

    fn execute_confirm(&mut self, confirm: Confirm) {
        match confirm {
            Confirm::Exit => {
                self.machine.cancel();
                self.quit = true;
            }
            Confirm::RemoveCube(name) => {
                let request = ApiRequest::RemoveCube(name.clone());
                self.run_request(request, move |result| ApiReply::CubeRemoved { name, result });
            }
            Confirm::DeleteTime(id) => {
                self.run_request(ApiRequest::DeleteTime(id), move |result| ApiReply::TimeDeleted { id, result });
            }
            Confirm::ClearTimes => self.run_request(ApiRequest::ClearTimes, ApiReply::TimesCleared),
            Confirm::ClearRecords => self.run_request(ApiRequest::ClearRecords, ApiReply::RecordsCleared),
            Confirm::ResetSettings => {
                let settings = Settings::default();
                let request = ApiRequest::SaveSettings(settings.clone());
                self.run_request(request, move |result| ApiReply::SettingsSaved {
                    settings,
                    reset: true,
                    result,
                });
            }
        }
    }

    fn handle_key_prompt(&mut self, code: KeyCode) {
        let prompt = match self.prompt.as_mut() {
            Some(prompt) => prompt,
            None => return,
        };
        match code {
            KeyCode::Char(c) if !c.is_control() => {
                prompt.buffer.push(c);
                prompt.error = None;
            }
            KeyCode::Backspace => {
                prompt.buffer.pop();
                prompt.error = None;
            }
            KeyCode::Esc => self.prompt = None,
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    self.submit_prompt(prompt);
                }
            }
            _ => {}
        }
        self.redraw();
    }

    fn submit_prompt(&mut self, mut prompt: Prompt) {
        match prompt.kind.clone() {
            PromptKind::AddCube => match self.session.cubes().validate_new(&prompt.buffer) {
                Ok(name) => {
                    let request = ApiRequest::AddCube(name.clone());
                    self.run_request(request, move |result| ApiReply::CubeAdded { name, result });
                }
                Err(e) => {
                    prompt.error = Some(e.key());
                    self.prompt = Some(prompt);
                }
            },
            PromptKind::RenameCube(old) => match self.session.cubes().validate_rename(&old, &prompt.buffer) {
                Ok(new) => {
                    let request = ApiRequest::RenameCube {
                        old_name: old.clone(),
                        new_name: new.clone(),
                    };
                    self.run_request(request, move |result| ApiReply::CubeRenamed { old, new, result });
                }
                Err(e) => {
                    prompt.error = Some(e.key());
                    self.prompt = Some(prompt);
                }
            },
            PromptKind::ExportPath => {
                let path = prompt_path(&prompt.buffer);
                let storage = self.storage.clone();
                self.spawn_api(async move {
                    let result = match transfer::export(&storage).await {
                        Ok(doc) => transfer::write_export(&path, &doc),
                        Err(e) => Err(e),
                    };
                    ApiReply::Exported { path, result }
                });
            }
            PromptKind::ImportPath => {
                let path = prompt_path(&prompt.buffer);
                match transfer::read_import(&path) {
                    Ok(doc) => {
                        let plan = transfer::import_plan(&doc);
                        log::info!("Importing {} ({} steps)", path.display(), plan.len());
                        self.session.invalidate();
                        let storage = self.storage.clone();
                        self.spawn_api(async move {
                            ApiReply::Imported(transfer::run_import(&storage, &plan).await)
                        });
                    }
                    Err(e) => {
                        log::error!("Failed to read import: {}", e);
                        self.notify_detail(NoticeKind::Error, "import-failed", e.to_string());
                    }
                }
            }
        }
    }

    fn cube_index(&self, cube: &str) -> usize {
        self.session.cubes().position(cube).map_or(0, |i| i + 1)
    }

    /// Row 0 of the cube list is the unknown cube.
    fn cube_at(&self, index: usize) -> Option<String> {
        match index {
            0 => Some(UNKNOWN_CUBE.to_string()),
            i => self.session.cubes().get(i - 1).map(str::to_string),
        }
    }

    fn leave_cube_select(&mut self) {
        self.mode = match self.pick_for {
            PickFor::Selection => AppMode::Timer,
            PickFor::Retype(_) => AppMode::History,
        };
        self.pick_for = PickFor::Selection;
    }

    fn handle_key_cube_select(&mut self, code: KeyCode) {
        let count = self.session.cubes().len() + 1;
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cube_cursor = self.cube_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cube_cursor + 1 < count {
                    self.cube_cursor += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(cube) = self.cube_at(self.cube_cursor) {
                    match self.pick_for {
                        PickFor::Selection => self.select_cube(&cube),
                        PickFor::Retype(id) => {
                            let request = ApiRequest::RetypeTime { id, cube: cube.clone() };
                            self.run_request(request, move |result| ApiReply::TimeRetyped { id, cube, result });
                        }
                    }
                }
                self.leave_cube_select();
            }
            KeyCode::Char('a') if self.pick_for == PickFor::Selection => {
                self.prompt = Some(Prompt::new(PromptKind::AddCube, ""));
            }
            KeyCode::Char('r') if self.pick_for == PickFor::Selection && self.cube_cursor > 0 => {
                if let Some(old) = self.cube_at(self.cube_cursor) {
                    let prompt = Prompt::new(PromptKind::RenameCube(old.clone()), &old);
                    self.prompt = Some(prompt);
                }
            }
            KeyCode::Char('d') if self.pick_for == PickFor::Selection && self.cube_cursor > 0 => {
                if let Some(name) = self.cube_at(self.cube_cursor) {
                    self.confirm = Some(Confirm::RemoveCube(name));
                }
            }
            KeyCode::Char('q') | KeyCode::Esc => self.leave_cube_select(),
            _ => {}
        }
        self.redraw();
    }

    fn selected_solve_id(&self) -> Option<u64> {
        let rows = history::view(self.session.times(), &self.history_filter, self.history_order);
        rows.get(self.history_cursor).and_then(|row| row.entry.id)
    }

    fn handle_key_history(&mut self, code: KeyCode) {
        let count = history::view(self.session.times(), &self.history_filter, self.history_order).len();
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.history_cursor = self.history_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.history_cursor + 1 < count {
                    self.history_cursor += 1;
                }
            }
            KeyCode::Char('f') => {
                let options = history::filter_options(self.session.times());
                let next = options
                    .iter()
                    .position(|f| f == &self.history_filter)
                    .map_or(0, |i| (i + 1) % options.len());
                self.history_filter = options.get(next).cloned().unwrap_or_default();
                self.history_cursor = 0;
            }
            KeyCode::Char('o') => {
                self.history_order = self.history_order.next();
                self.history_cursor = 0;
            }
            KeyCode::Char('t') => {
                if let Some(id) = self.selected_solve_id() {
                    let cube = self
                        .session
                        .times()
                        .iter()
                        .find(|t| t.id == Some(id))
                        .map(|t| t.cube.clone())
                        .unwrap_or_default();
                    self.cube_cursor = self.cube_index(&cube);
                    self.pick_for = PickFor::Retype(id);
                    self.mode = AppMode::CubeSelect;
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.selected_solve_id() {
                    self.confirm = Some(Confirm::DeleteTime(id));
                }
            }
            KeyCode::Char('X') => self.confirm = Some(Confirm::ClearTimes),
            KeyCode::Char('R') => self.confirm = Some(Confirm::ClearRecords),
            KeyCode::Char('q') | KeyCode::Esc => self.mode = AppMode::Timer,
            _ => {}
        }
        self.redraw();
    }

    fn handle_key_settings(&mut self, code: KeyCode) {
        let field = SettingsField::ALL[self.settings_cursor.min(SettingsField::ALL.len() - 1)];
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.settings_cursor = self.settings_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.settings_cursor + 1 < SettingsField::ALL.len() {
                    self.settings_cursor += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Char('+') | KeyCode::Right => {
                field.adjust(&mut self.settings_draft, true);
            }
            KeyCode::Char('-') | KeyCode::Left => field.adjust(&mut self.settings_draft, false),
            KeyCode::Char('w') => {
                let settings = self.settings_draft.clone().normalized();
                let request = ApiRequest::SaveSettings(settings.clone());
                self.run_request(request, move |result| ApiReply::SettingsSaved {
                    settings,
                    reset: false,
                    result,
                });
            }
            KeyCode::Char('D') => self.confirm = Some(Confirm::ResetSettings),
            KeyCode::Char('q') | KeyCode::Esc => self.mode = AppMode::Timer,
            _ => {}
        }
        self.redraw();
    }

    fn handle_reply(&mut self, reply: ApiReply) {
        match reply {
            ApiReply::Snapshot(snapshot) => {
                let complete = snapshot.settings.is_some()
                    && snapshot.cubes.is_some()
                    && snapshot.times.is_some()
                    && snapshot.records.is_some();
                self.session.apply_snapshot(snapshot);
                self.apply_settings();
                self.settings_draft = self.session.settings().clone();
                if !complete {
                    self.notify(NoticeKind::Error, "error-loading-data");
                }
            }
            ApiReply::TimesLoaded(result) => match result {
                Ok(times) => self.session.replace_times(times),
                Err(e) => {
                    log::error!("Failed to load times: {}", e);
                    self.notify(NoticeKind::Error, "error-loading-data");
                }
            },
            ApiReply::RecordsLoaded(result) => match result {
                Ok(records) => self.session.replace_records(records),
                Err(e) => {
                    log::error!("Failed to load records: {}", e);
                    self.notify(NoticeKind::Error, "error-loading-data");
                }
            },
            ApiReply::SolveSaved { ticket, result } => self.handle_solve_saved(ticket, result),
            ApiReply::RecordsSaved(result) => {
                if let Err(e) = result {
                    log::error!("Failed to save records: {}", e);
                    self.notify(NoticeKind::Error, "error-saving-solve");
                }
            }
            ApiReply::TimesCleared(result) => match result {
                Ok(()) => {
                    self.session.times_cleared();
                    self.notify(NoticeKind::Success, "times-cleared");
                }
                Err(e) => {
                    log::error!("Failed to clear times: {}", e);
                    self.notify(NoticeKind::Error, "error-clearing-times");
                }
            },
            ApiReply::RecordsCleared(result) => match result {
                Ok(()) => {
                    self.session.records_cleared();
                    self.notify(NoticeKind::Success, "records-cleared");
                }
                Err(e) => {
                    log::error!("Failed to clear records: {}", e);
                    self.notify(NoticeKind::Error, "error-clearing-records");
                }
            },
            ApiReply::TimeDeleted { id, result } => match result {
                Ok(()) => self.session.time_deleted(id),
                Err(e) => {
                    log::error!("Failed to delete time {}: {}", id, e);
                    self.notify(NoticeKind::Error, "error-deleting-time");
                }
            },
            ApiReply::TimeRetyped { id, cube, result } => match result {
                Ok(()) => self.session.time_retyped(id, &cube),
                Err(e) => {
                    log::error!("Failed to change type of time {}: {}", id, e);
                    self.notify(NoticeKind::Error, "error-updating-time");
                }
            },
            ApiReply::CubeAdded { name, result } => match result {
                Ok(()) => {
                    self.session.cube_added(&name);
                    self.notify(NoticeKind::Success, "cube-added-successfully");
                }
                Err(e) => {
                    log::error!("Failed to add cube {}: {}", name, e);
                    self.notify(NoticeKind::Error, "error-adding-cube");
                }
            },
            ApiReply::CubeRemoved { name, result } => match result {
                Ok(()) => {
                    self.session.cube_removed(&name);
                    self.notify_detail(NoticeKind::Success, "cube-removed", name);
                    self.load_times();
                }
                Err(e) => {
                    log::error!("Failed to remove cube {}: {}", name, e);
                    self.notify(NoticeKind::Error, "error-removing-cube");
                }
            },
            ApiReply::CubeRenamed { old, new, result } => match result {
                Ok(()) => {
                    self.session.cube_renamed(&old, &new);
                    self.notify_detail(NoticeKind::Success, "cube-renamed", format!("{} -> {}", old, new));
                    self.load_times();
                    self.load_records();
                }
                Err(e) => {
                    log::error!("Failed to rename cube {}: {}", old, e);
                    self.notify(NoticeKind::Error, "error-renaming-cube");
                }
            },
            ApiReply::SettingsSaved { settings, reset, result } => match result {
                Ok(()) => {
                    self.session.settings_saved(settings);
                    self.apply_settings();
                    self.settings_draft = self.session.settings().clone();
                    let key = if reset { "settings-reset" } else { "settings-saved" };
                    self.notify(NoticeKind::Success, key);
                }
                Err(e) => {
                    log::error!("Failed to save settings: {}", e);
                    self.notify(NoticeKind::Error, "error-saving-settings");
                }
            },
            ApiReply::Exported { path, result } => match result {
                Ok(()) => self.notify_detail(NoticeKind::Success, "export-success", path.display().to_string()),
                Err(e) => {
                    log::error!("Failed to export: {}", e);
                    self.notify(NoticeKind::Error, "error-exporting");
                }
            },
            ApiReply::Imported(result) => {
                match result {
                    Ok(_) => self.notify(NoticeKind::Success, "import-success"),
                    Err(e) => self.notify_detail(NoticeKind::Error, "import-failed", e.to_string()),
                }
                // Steps sent before a failure stay applied either way.
                self.reload();
            }
        }
        self.clamp_cursors();
        self.redraw();
    }

    fn handle_solve_saved(&mut self, ticket: SaveTicket, result: Result<SolveEntry, StorageError>) {
        match self.session.finish_record(&ticket, result) {
            SaveOutcome::Saved { new_record, records_to_save, resync_times } => {
                if let Some(records) = records_to_save {
                    self.run_request(ApiRequest::SaveRecords(records), ApiReply::RecordsSaved);
                }
                if resync_times {
                    log::info!("History changed while saving; reloading times");
                    self.load_times();
                }
                if new_record {
                    self.notify_detail(NoticeKind::Record, "new-record", format_solve_time(ticket.ms));
                } else if ticket.from_pending {
                    let cube = self.tr.cube_name(&ticket.cube).into_owned();
                    self.notify_detail(NoticeKind::Success, "pending-solve-saved", cube);
                } else {
                    self.notify(NoticeKind::Success, "solve-saved");
                }
            }
            SaveOutcome::Failed(e) => {
                log::error!("Failed to save solve: {}", e);
                self.notify(NoticeKind::Error, "error-saving-solve");
            }
        }
    }

    fn clamp_cursors(&mut self) {
        let cubes = self.session.cubes().len() + 1;
        self.cube_cursor = self.cube_cursor.min(cubes - 1);
        let rows = history::view(self.session.times(), &self.history_filter, self.history_order).len();
        self.history_cursor = self.history_cursor.min(rows.saturating_sub(1));
    }

    fn shutdown(&mut self) {
        self.pump.send(PumpCtl::Stop).ok();
        self.pump.send(PumpCtl::Quit).ok();
    }
}

fn confirm_text(confirm: &Confirm, tr: &Translator) -> (String, String) {
    let cannot_undo = tr.tr("cannot-undone").into_owned();
    match confirm {
        Confirm::Exit => (tr.tr("confirm-exit").into_owned(), String::new()),
        Confirm::RemoveCube(name) => (
            format!("{} {}?", tr.tr("confirm-remove"), tr.cube_name(name)),
            cannot_undo,
        ),
        Confirm::DeleteTime(_) => (format!("{}?", tr.tr("delete")), cannot_undo),
        Confirm::ClearTimes => (tr.tr("delete-all-times").into_owned(), cannot_undo),
        Confirm::ClearRecords => (tr.tr("clear-all-records").into_owned(), cannot_undo),
        Confirm::ResetSettings => (tr.tr("confirm-reset-settings").into_owned(), String::new()),
    }
}

fn prompt_path(buffer: &str) -> PathBuf {
    match buffer.trim() {
        "" => PathBuf::from(transfer::DEFAULT_EXPORT_FILE),
        path => PathBuf::from(path),
    }
}

fn pump_thread(ctl: Receiver<PumpCtl>, main: Sender<AppOp>) {
    let mut interval = Duration::from_millis(100);
    let mut generation = 0u64;
    let mut running = false;

    loop {
        // Block when stopped; wake every interval when running
        let msg = if running {
            match ctl.recv_timeout(interval) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => {
                    if main.send(AppOp::Pump(generation)).is_err() {
                        break;
                    }
                    None
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match ctl.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            }
        };

        match msg {
            Some(PumpCtl::Start { interval_ms, generation: next }) => {
                interval = Duration::from_millis(interval_ms.max(1));
                generation = next;
                running = true;
            }
            Some(PumpCtl::Stop) => running = false,
            Some(PumpCtl::Quit) => break,
            None => {}
        }
    }
}

fn input_thread(main: Sender<AppOp>) {
    loop {
        match event::read() {
            Ok(event) => {
                if main.send(AppOp::Term(event)).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::error!("Terminal input failed: {:?}", e);
                main.send(AppOp::Quit).ok();
                break;
            }
        }
    }
}

/// Raw mode, alternate screen and mouse capture for the lifetime of the app.
struct TerminalGuard {
    enhanced: bool,
}

impl TerminalGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("can't enable raw mode")?;
        let mut guard = Self { enhanced: false };
        let mut out = io::stdout();
        execute!(out, EnterAlternateScreen, EnableMouseCapture, Hide).context("can't set up terminal")?;

        if matches!(terminal::supports_keyboard_enhancement(), Ok(true)) {
            execute!(
                out,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .context("can't enable key release events")?;
            guard.enhanced = true;
        }
        Ok(guard)
    }

    fn release_events(&self) -> bool {
        self.enhanced || cfg!(windows)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut out = io::stdout();
        if self.enhanced {
            execute!(out, PopKeyboardEnhancementFlags).ok();
        }
        execute!(out, Show, DisableMouseCapture, LeaveAlternateScreen).ok();
        terminal::disable_raw_mode().ok();
    }
}

fn main() -> anyhow::Result<()> {
    let args = config::Args::parse();
    config::init_logging(&args)?;
    log::info!("cubetimer {} using {}", env!("CARGO_PKG_VERSION"), args.api);

    let storage = TimerStorage::new(&args.api)?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("can't start async runtime")?;

    let (tx, rx) = mpsc::channel();

    // Create pump thread
    let (pump_tx, pump_rx) = mpsc::channel();
    let pump_main = tx.clone();
    let pump = thread::spawn(move || pump_thread(pump_rx, pump_main));

    let guard = TerminalGuard::new()?;
    log::info!("key release events: {}", guard.release_events());
    let input_tx = tx.clone();
    thread::spawn(move || input_thread(input_tx));

    let mut app = TimerApp::new(storage, rt, tx, pump_tx, guard.release_events(), Box::new(io::stdout()));
    if let Some(cube) = &args.cube {
        app.select_cube(cube);
    }
    app.reload();
    app.redraw();

    while !app.quit {
        match rx.recv() {
            Ok(AppOp::Term(event)) => app.handle_event(event),
            Ok(AppOp::Pump(generation)) => app.handle_pump(generation),
            Ok(AppOp::Api(reply)) => app.handle_reply(reply),
            Ok(AppOp::Quit) | Err(_) => break,
        }
    }

    // Clean up
    app.shutdown();
    if pump.join().is_err() {
        log::error!("Pump thread panicked");
    }
    drop(app);
    drop(guard);
    log::info!("Exit");
    Ok(())
}
