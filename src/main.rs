use std::cell::RefCell;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scribex::analysis::{AnalysisService, AnthropicAnalyzer, Unconfigured};
use scribex::autosave::{SaveOutcome, SaveStatus, SaveTrigger};
use scribex::config::Config;
use scribex::feedback::surface::EditableSurface;
use scribex::metrics::{count_words, estimate_reading_time};
use scribex::storage::{FileStore, Storage};
use scribex::workspace::Workspace;

mod editor;
use editor::{Editor, TerminalOverlay};

struct App {
    editor: Editor,
    overlay: TerminalOverlay,
    workspace: Workspace,
    /// Set by the marker click observer.
    activated: Rc<RefCell<Option<String>>>,
    shown_feedback: Option<String>,
    last_dismissed: Option<String>,
    message: Option<String>,
    markers_stale: bool,
}

impl App {
    fn new(mut workspace: Workspace) -> io::Result<Self> {
        let (width, height) = terminal::size()?;
        let mut editor = Editor::new(width, height);
        editor.load(&workspace.current().content);

        let activated = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&activated);
        workspace
            .feedback_mut()
            .on_marker_click(move |id| *sink.borrow_mut() = Some(id.to_string()));

        Ok(App {
            editor,
            overlay: TerminalOverlay::default(),
            workspace,
            activated,
            shown_feedback: None,
            last_dismissed: None,
            message: None,
            markers_stale: true,
        })
    }

    async fn run(&mut self) -> io::Result<()> {
        enter_raw_mode()?;

        // One pass per frame: timers, finished analyses, markers, draw, then
        // wait up to 16ms for input.
        loop {
            let now = Instant::now();
            let text = self.editor.text();
            if let Some(outcome) = self.workspace.tick(&text, now) {
                self.report_save(outcome);
            }

            let report = self.workspace.apply_completed_analyses();
            if report.applied > 0 {
                self.message = Some(format!("{} new feedback (Ctrl+F to read)", report.applied));
                self.markers_stale = true;
            }
            if let Some(e) = report.errors.first() {
                self.message = Some(format!("Analysis failed: {}", e));
            }

            if self.markers_stale {
                self.workspace
                    .feedback_mut()
                    .update_markers(&self.editor, &mut self.overlay);
                self.markers_stale = false;
            }
            self.render()?;

            if event::poll(Duration::from_millis(16))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key).await? {
                            break;
                        }
                    }
                    // The terminal window losing focus is our blur.
                    Event::FocusLost => self.save(SaveTrigger::Blur),
                    Event::Resize(width, height) => {
                        self.markers_stale |= self.editor.resize(width, height);
                    }
                    _ => {}
                }
            }
        }

        // Leaving the loop is the unload: flush and close out the session.
        self.save(SaveTrigger::Unload);
        let text = self.editor.text();
        if let Err(e) = self.workspace.end_session(&text, Utc::now()) {
            warn!(error = %e, "could not record writing session");
        }
        leave_raw_mode()
    }

    /// Returns true when the app should exit.
    async fn handle_key(&mut self, key: KeyEvent) -> io::Result<bool> {
        // Ctrl combinations are commands; everything else edits or moves
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('s') => self.save(SaveTrigger::Manual),
                KeyCode::Char('a') => {
                    let text = self.editor.text();
                    self.message = Some(if self.workspace.analyze_now(&text) {
                        "Analyzing...".to_string()
                    } else {
                        "Nothing new to analyze".to_string()
                    });
                }
                KeyCode::Char('r') => self.process_text().await?,
                KeyCode::Char('f') => self.show_feedback_at_cursor(),
                KeyCode::Char('d') => self.dismiss_at_cursor(),
                KeyCode::Char('u') => self.undo_dismiss(),
                KeyCode::Char('n') => self.new_project(),
                KeyCode::Char('p') => self.next_project(),
                _ => {}
            }
            self.markers_stale = true;
            return Ok(false);
        }

        let edited = match key.code {
            KeyCode::Left => {
                self.editor.move_left();
                false
            }
            KeyCode::Right => {
                self.editor.move_right();
                false
            }
            KeyCode::Up => {
                self.editor.move_up();
                false
            }
            KeyCode::Down => {
                self.editor.move_down();
                false
            }
            KeyCode::Home => {
                self.editor.move_home();
                false
            }
            KeyCode::End => {
                self.editor.move_end();
                false
            }
            KeyCode::PageUp => {
                self.editor.page_up();
                false
            }
            KeyCode::PageDown => {
                self.editor.page_down();
                false
            }
            KeyCode::Backspace => {
                self.editor.backspace();
                true
            }
            KeyCode::Delete => {
                self.editor.delete();
                true
            }
            KeyCode::Enter => {
                self.editor.insert_newline();
                true
            }
            KeyCode::Tab => {
                for _ in 0..4 {
                    self.editor.insert_char(' ');
                }
                true
            }
            KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::ALT) => {
                self.editor.insert_char(c);
                true
            }
            _ => false,
        };

        // Only real edits restart the debounce and may queue an analysis
        if edited {
            let text = self.editor.text();
            self.workspace.on_input(&text, Instant::now());
            self.workspace.maybe_request_analysis(&text);
        }
        self.markers_stale = true;
        Ok(false)
    }

    fn save(&mut self, trigger: SaveTrigger) {
        let text = self.editor.text();
        let outcome = self.workspace.save(trigger, &text, Instant::now());
        self.report_save(outcome);
    }

    fn report_save(&mut self, outcome: SaveOutcome) {
        if let SaveOutcome::Failed(e) = outcome {
            self.message = Some(format!("Save failed: {}", e));
        }
    }

    async fn process_text(&mut self) -> io::Result<()> {
        self.message = Some("Processing full text...".to_string());
        self.render()?;
        let text = self.editor.text();
        self.message = Some(match self.workspace.process_text(&text).await {
            Ok(reply) => reply.lines().next().unwrap_or_default().to_string(),
            Err(e) => format!("Processing failed: {}", e),
        });
        Ok(())
    }

    fn show_feedback_at_cursor(&mut self) {
        let Some(id) = feedback_under_cursor(&self.editor, &self.overlay) else {
            self.message = Some("No feedback here".to_string());
            return;
        };
        self.workspace.feedback_mut().activate_marker(&id);

        // The click observer registered in App::new fills this in
        let activated = self.activated.borrow_mut().take();
        if let Some(item) = activated.and_then(|id| self.workspace.feedback().get(&id).cloned()) {
            self.message = Some(format!("[{}] {} (Ctrl+D dismiss)", item.kind.as_str(), item.message));
            self.shown_feedback = Some(item.id);
        }
    }

    /// Dismiss the marker under the cursor, or the feedback last shown
    /// with Ctrl+F when the cursor has moved off it.
    fn dismiss_at_cursor(&mut self) {
        let under_cursor = feedback_under_cursor(&self.editor, &self.overlay);
        let shown = self.shown_feedback.take();
        let Some(id) = under_cursor.or(shown) else {
            self.message = Some("No feedback here".to_string());
            return;
        };
        match self.workspace.dismiss_feedback(&id) {
            Ok(_) => {
                self.message = Some("Feedback dismissed (Ctrl+U undo)".to_string());
                self.last_dismissed = Some(id);
            }
            Err(e) => self.message = Some(format!("Save failed: {}", e)),
        }
    }

    fn undo_dismiss(&mut self) {
        let Some(id) = self.last_dismissed.take() else {
            return;
        };
        if let Err(e) = self.workspace.restore_feedback(&id) {
            self.message = Some(format!("Save failed: {}", e));
        }
    }

    fn new_project(&mut self) {
        let text = self.editor.text();
        match self.workspace.create_project(None, &text, Instant::now()) {
            Ok(()) => self.reload_editor(),
            Err(e) => self.message = Some(format!("Could not create project: {}", e)),
        }
    }

    fn next_project(&mut self) {
        let projects = self.workspace.projects().all();
        let current = projects
            .iter()
            .position(|p| p.id == self.workspace.current().id)
            .unwrap_or(0);
        let next = projects[(current + 1) % projects.len()].id.clone();

        let text = self.editor.text();
        match self.workspace.switch_project(&next, &text, Instant::now()) {
            Ok(_) => self.reload_editor(),
            Err(e) => self.message = Some(format!("Could not switch project: {}", e)),
        }
    }

    fn reload_editor(&mut self) {
        self.editor.load(&self.workspace.current().content);
        self.shown_feedback = None;
        self.message = Some(format!("Opened '{}'", self.workspace.current().title));
    }

    fn render(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout();
        self.editor.render(&mut stdout, &self.overlay)?;
        self.render_status_bar(&mut stdout)?;

        let (x, y) = self.editor.screen_cursor();
        queue!(stdout, MoveTo(x, y), Show)?;
        stdout.flush()
    }

    fn render_status_bar<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let text = self.editor.text();
        let stats = self.workspace.stats(&text);
        let status = self.workspace.save_status();

        let mut line = format!(
            " {} | {} words | {} chars | {} min read | {:+} this session",
            self.workspace.current().title,
            stats.words,
            stats.characters,
            stats.reading_minutes,
            stats.session_words,
        );
        if status != SaveStatus::Hidden {
            line.push_str(&format!(" | {}", status.label()));
        }
        if let Some(message) = &self.message {
            line.push_str(&format!(" | {}", message));
        }
        // Truncate by chars so multi-byte titles never split
        let line: String = line.chars().take(self.editor_width()).collect();

        let color = match status {
            SaveStatus::Error => Color::Red,
            SaveStatus::Unsaved => Color::Yellow,
            _ => Color::DarkGrey,
        };
        queue!(
            out,
            Hide,
            MoveTo(0, self.editor.status_row()),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(color),
            Print(line),
            ResetColor
        )
    }

    fn editor_width(&self) -> usize {
        terminal::size().map(|(w, _)| w as usize).unwrap_or(80)
    }
}

/// Id of the feedback whose marker sits at or just before the cursor.
fn feedback_under_cursor(editor: &Editor, overlay: &TerminalOverlay) -> Option<String> {
    overlay
        .marker_near(editor.cursor_cell())
        .map(|m| m.feedback_id.clone())
}

fn enter_raw_mode() -> io::Result<()> {
    terminal::enable_raw_mode()?;
    execute!(
        io::stdout(),
        EnterAlternateScreen,
        EnableFocusChange,
        DisableLineWrap,
        Clear(ClearType::All)
    )
}

fn leave_raw_mode() -> io::Result<()> {
    execute!(
        io::stdout(),
        Show,
        EnableLineWrap,
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal::disable_raw_mode()
}

fn show_stats(workspace: &Workspace) -> io::Result<()> {
    let sessions = workspace.sessions();
    let current = workspace.current();
    let total_words: usize = workspace.projects().all().iter().map(|p| p.word_count).sum();
    let current_words = count_words(&current.content);

    let rows = [
        ("Today:", format!("{} words", sessions.todays_words()), Color::Green),
        ("Current Streak:", format!("{} days", sessions.calculate_streak()), Color::Yellow),
        ("Sessions (30d):", sessions.total_sessions().to_string(), Color::Blue),
        ("Projects:", workspace.projects().all().len().to_string(), Color::Magenta),
        ("Total Words:", total_words.to_string(), Color::Cyan),
        (
            "Current:",
            format!(
                "{} ({} words, {} min read)",
                current.title,
                current_words,
                estimate_reading_time(current_words)
            ),
            Color::White,
        ),
    ];

    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("Scribex Writing Statistics\n\n"),
        ResetColor
    )?;
    for (label, value, color) in rows {
        execute!(
            stdout,
            Print(format!("{:<18}", label)),
            SetForegroundColor(color),
            Print(value),
            ResetColor,
            Print("\n")
        )?;
    }
    Ok(())
}

/// Send tracing output to `<data_dir>/scribex.log`; the terminal belongs to the editor.
fn init_logging(config: &Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let dir = config.data_dir();
    fs::create_dir_all(&dir)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("scribex.log"))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = Config::load();
    if let Err(e) = init_logging(&config) {
        eprintln!("Logging disabled: {}", e);
    }

    let service: Arc<dyn AnalysisService> = match AnthropicAnalyzer::new(&config) {
        Ok(analyzer) => Arc::new(analyzer),
        Err(e) => {
            warn!(error = %e, "inline feedback unavailable");
            Arc::new(Unconfigured)
        }
    };
    let storage = Storage::new(Arc::new(FileStore::new(config.data_dir())));
    let mut workspace = Workspace::open(storage, service, &config, Instant::now());

    // Either `scribex --stats` or `scribex [project title]`
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--stats" {
        return show_stats(&workspace);
    }

    if let Some(title) = args.get(1) {
        // Open the project with this title, creating it when missing.
        let existing = workspace
            .projects()
            .all()
            .iter()
            .find(|p| &p.title == title)
            .map(|p| p.id.clone());
        let content = workspace.current().content.clone();
        let opened = match existing {
            Some(id) => workspace.switch_project(&id, &content, Instant::now()).map(|_| ()),
            None => workspace.create_project(Some(title), &content, Instant::now()),
        };
        if let Err(e) = opened {
            eprintln!("Could not open '{}': {}", title, e);
        }
    }

    info!(project = %workspace.current().id, "starting editor");
    let mut app = App::new(workspace)?;
    app.run().await
}
