//! OptiMonkey Desktop: egui app state and UI.

use eframe::egui;
use optimonkey::api::{BackendClient, StartAgentsResponse};
use optimonkey::config::Config;
use optimonkey::connection::{ConnectOptions, ConnectionEvent, ConnectionHandle, ConnectionState};
use optimonkey::conversation::ClearScope;
use optimonkey::dashboard::{Dashboard, SubmitOutcome};
use optimonkey::message::{ConfidenceReport, ConfidenceTier, CsvTable, MessageBody, NormalizedMessage, Role};
use optimonkey::prompts;
use optimonkey::settings::{self, Settings};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const CHAT_INPUT_HEIGHT: f32 = 70.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const RECOMMENDATIONS_MAX_HEIGHT: f32 = 220.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;
/// Socket events arrive on another thread; poll at least this often.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long closing the socket may hold up app exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        // Dependencies (hyper, tungstenite) are noisy below info.
        metadata.level() <= log::Level::Info || metadata.target().starts_with("optimonkey")
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Dashboard,
    Templates,
    Settings,
    Logs,
}

fn status_color(state: ConnectionState) -> egui::Color32 {
    match state {
        ConnectionState::Connected => egui::Color32::from_rgb(60, 179, 113),
        ConnectionState::Connecting => egui::Color32::from_rgb(230, 180, 40),
        ConnectionState::Disconnected => egui::Color32::GRAY,
        ConnectionState::Error => egui::Color32::from_rgb(220, 70, 70),
    }
}

fn tier_color(tier: ConfidenceTier) -> egui::Color32 {
    match tier {
        ConfidenceTier::Excellent | ConfidenceTier::High => egui::Color32::from_rgb(60, 179, 113),
        ConfidenceTier::Medium => egui::Color32::from_rgb(230, 180, 40),
        ConfidenceTier::Low => egui::Color32::from_rgb(220, 70, 70),
    }
}

pub struct OptiMonkeyApp {
    /// Conversation socket. Closed on the runtime when the app is dropped.
    connection: Option<ConnectionHandle>,
    /// Events from the connection task, drained every frame.
    events: Option<UnboundedReceiver<ConnectionEvent>>,
    runtime: tokio::runtime::Runtime,
    config: Config,
    client: BackendClient,
    dashboard: Dashboard,
    /// Current input text for the chat box.
    chat_input: String,
    /// When Some, a start-agents request is in flight.
    start_receiver: Option<mpsc::Receiver<Result<StartAgentsResponse, String>>>,
    /// When Some, a recommendations download is in flight.
    recommendations_receiver: Option<mpsc::Receiver<Result<String, String>>>,
    /// Last downloaded recommendations table.
    recommendations: Option<CsvTable>,
    show_recommendations: bool,
    /// Last error from a REST call, if any.
    request_error: Option<String>,
    settings_path: PathBuf,
    settings: Settings,
    settings_key_input: String,
    settings_other_input: String,
    /// Result of the last settings save.
    settings_status: Option<Result<String, String>>,
    current_screen: Screen,
}

impl OptiMonkeyApp {
    /// Space between the main screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(_cc: &eframe::CreationContext<'_>, runtime: tokio::runtime::Runtime) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let (config, config_path) = match optimonkey::config::load_config(None) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!("{:#}; using defaults", e);
                (Config::default(), optimonkey::config::default_config_path())
            }
        };
        let settings_path = settings::settings_path(&config_path);
        let settings = Settings::load(&settings_path).unwrap_or_else(|e| {
            log::warn!("{:#}", e);
            Settings::default()
        });

        let mut app = Self {
            connection: None,
            events: None,
            client: BackendClient::from_config(&config),
            dashboard: Dashboard::new(&config),
            config,
            runtime,
            chat_input: String::new(),
            start_receiver: None,
            recommendations_receiver: None,
            recommendations: None,
            show_recommendations: false,
            request_error: None,
            settings_key_input: settings.openai_key.clone(),
            settings_other_input: settings.other_variable.clone(),
            settings_path,
            settings,
            settings_status: None,
            current_screen: Screen::default(),
        };
        app.connect();
        app
    }

    fn connect(&mut self) {
        let options = ConnectOptions::from_config(&self.config);
        log::info!("connecting to {}", options.url);
        let _guard = self.runtime.enter();
        let (handle, events) = ConnectionHandle::spawn(options);
        self.connection = Some(handle);
        self.events = Some(events);
    }

    /// Drain connection events into the dashboard and sync the status indicator.
    fn poll_connection(&mut self) {
        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.try_recv() {
                self.dashboard.handle_event(event);
            }
        }
        if let Some(ref handle) = self.connection {
            self.dashboard.set_status(handle.state());
        }
    }

    fn poll_start(&mut self) {
        let Some(ref rx) = self.start_receiver else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(response)) => {
                let added = self.dashboard.ingest_conversation(&response.conversation);
                log::info!(
                    "agents started ({}), {} message(s) returned",
                    response.status.as_deref().unwrap_or("ok"),
                    added
                );
                self.start_receiver = None;
            }
            Ok(Err(e)) => {
                self.request_error = Some(e);
                self.start_receiver = None;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {
                self.start_receiver = None;
            }
        }
    }

    fn poll_recommendations(&mut self) {
        let Some(ref rx) = self.recommendations_receiver else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(csv)) => {
                self.recommendations = optimonkey::classify::parse_table(&csv);
                if self.recommendations.is_none() {
                    self.request_error = Some("recommendations file is empty".to_string());
                }
                self.recommendations_receiver = None;
            }
            Ok(Err(e)) => {
                self.request_error = Some(e);
                self.show_recommendations = false;
                self.recommendations_receiver = None;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {
                self.recommendations_receiver = None;
            }
        }
    }

    /// Start the agents in the background; `prompt` None uses the backend's default.
    fn start_agents(&mut self, prompt: Option<String>) {
        if self.start_receiver.is_some() {
            return;
        }
        self.request_error = None;
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel();
        self.runtime.spawn(async move {
            let result = match prompt {
                Some(p) => client.start_agents_with_prompt(&p).await,
                None => client.start_agents().await,
            };
            let _ = tx.send(result.map_err(|e| e.to_string()));
        });
        self.start_receiver = Some(rx);
    }

    fn fetch_recommendations(&mut self) {
        if self.recommendations_receiver.is_some() {
            return;
        }
        self.request_error = None;
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel();
        self.runtime.spawn(async move {
            let result = client.download_recommendations().await;
            let _ = tx.send(result.map_err(|e| e.to_string()));
        });
        self.recommendations_receiver = Some(rx);
    }

    fn send_chat_input(&mut self) {
        let Some(ref handle) = self.connection else {
            return;
        };
        match self.dashboard.submit(&self.chat_input, handle) {
            SubmitOutcome::Sent => self.chat_input.clear(),
            // Keep the text so the user can resend after reconnecting.
            SubmitOutcome::NotDelivered | SubmitOutcome::Ignored => {}
        }
    }

    fn save_settings(&mut self) {
        self.settings.openai_key = self.settings_key_input.trim().to_string();
        self.settings.other_variable = self.settings_other_input.trim().to_string();
        self.settings_status = Some(
            self.settings
                .save(&self.settings_path)
                .map(|_| format!("Saved to {}", self.settings_path.display()))
                .map_err(|e| format!("{:#}", e)),
        );
    }

    fn render_message(ui: &mut egui::Ui, index: usize, m: &NormalizedMessage) {
        let is_user = m.role == Role::User;
        let frame = egui::Frame::none()
            .fill(if is_user {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style().visuals.widgets.noninteractive.bg_stroke.color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        frame.show(ui, |ui| {
            ui.horizontal(|ui| {
                let sender = egui::RichText::new(&m.sender).strong();
                if m.role == Role::System {
                    ui.label(sender.color(egui::Color32::from_rgb(220, 70, 70)));
                } else {
                    ui.label(sender);
                }
                ui.label(egui::RichText::new(&m.timestamp).weak().small());
            });
            match &m.body {
                MessageBody::Text(text) => {
                    ui.label(text.as_str());
                }
                MessageBody::Csv(table) => {
                    egui::ScrollArea::horizontal()
                        .id_source(("csv_scroll", index))
                        .show(ui, |ui| {
                            Self::render_table(ui, ("csv", index), table);
                        });
                }
                MessageBody::ConfidenceScore(report) => Self::render_confidence(ui, report),
                MessageBody::Recommendations(items) => {
                    ui.label(egui::RichText::new("Recommendations").strong());
                    for (i, item) in items.iter().enumerate() {
                        ui.label(format!("{}. {}", i + 1, item));
                    }
                    if items.is_empty() {
                        ui.label(egui::RichText::new("(none)").weak());
                    }
                }
                MessageBody::Control(_) => {}
            }
        });
    }

    fn render_confidence(ui: &mut egui::Ui, report: &ConfidenceReport) {
        ui.colored_label(
            tier_color(report.tier),
            egui::RichText::new(format!(
                "{} Confidence Score: {}/4 ({})",
                report.tier.icon(),
                report.score(),
                report.tier
            ))
            .strong(),
        );
        if !report.explanation.is_empty() {
            ui.label(report.explanation.as_str());
        }
        if let Some(ref decision) = report.decision {
            ui.label(format!("Board Decision: {}", decision));
        }
    }

    fn render_table(ui: &mut egui::Ui, id: impl std::hash::Hash, table: &CsvTable) {
        egui::Grid::new(id)
            .striped(true)
            .spacing([16.0, 4.0])
            .show(ui, |ui| {
                for h in &table.header {
                    ui.label(egui::RichText::new(h).strong());
                }
                ui.end_row();
                for row in &table.rows {
                    for cell in row {
                        ui.label(cell.as_str());
                    }
                    ui.end_row();
                }
            });
    }

    fn ui_dashboard(&mut self, ui: &mut egui::Ui) {
        let connected = self.dashboard.status() == ConnectionState::Connected;

        ui.horizontal(|ui| {
            let starting = self.start_receiver.is_some();
            let label = if starting { "Starting…" } else { "Start Agents" };
            if ui.add_enabled(!starting, egui::Button::new(label)).clicked() {
                self.start_agents(None);
            }
            let toggle = if self.show_recommendations {
                "Hide Recommendations"
            } else {
                "Show Recommendations"
            };
            if ui.button(toggle).clicked() {
                self.show_recommendations = !self.show_recommendations;
                if self.show_recommendations {
                    self.fetch_recommendations();
                }
            }
            if ui.button("Clear Chat").clicked() {
                self.dashboard.clear(ClearScope::All);
            }
            if ui.button("Clear heartbeats").clicked() {
                self.dashboard.clear(ClearScope::ControlOnly);
            }
        });

        if let Some(ref err) = self.request_error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, err.as_str());
        }

        if self.show_recommendations {
            ui.add_space(8.0);
            if self.recommendations_receiver.is_some() {
                ui.spinner();
            } else if let Some(ref table) = self.recommendations {
                egui::ScrollArea::both()
                    .id_source("recommendations_scroll")
                    .max_height(RECOMMENDATIONS_MAX_HEIGHT)
                    .show(ui, |ui| {
                        Self::render_table(ui, "recommendations", table);
                    });
            }
        }

        ui.add_space(8.0);
        ui.separator();
        ui.add_space(8.0);

        let row_height = ui.spacing().interact_size.y + 8.0;
        let bottom_section_height =
            CHAT_INPUT_HEIGHT + 8.0 + row_height + Self::SCREEN_FOOTER_SPACING;
        let messages_height =
            (ui.available_height() - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);

        egui::ScrollArea::vertical()
            .id_source("messages_scroll")
            .max_height(messages_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                // Keep the scrollbar on the right edge.
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                for (i, m) in self.dashboard.log().visible().enumerate() {
                    Self::render_message(ui, i, m);
                    ui.add_space(8.0);
                }
                if self.dashboard.log().visible().next().is_none() {
                    ui.label("No messages yet. Start the agents or send a message.");
                }
            });

        ui.add_space(8.0);
        let response = ui.add_sized(
            [ui.available_width(), CHAT_INPUT_HEIGHT],
            egui::TextEdit::multiline(&mut self.chat_input).hint_text("Message the agents"),
        );
        ui.add_space(8.0);
        let mut send_now = false;
        ui.horizontal(|ui| {
            if ui.button("Send").clicked() {
                send_now = true;
            }
            if !connected {
                ui.label(
                    egui::RichText::new("Not connected; messages will not be delivered.").weak(),
                );
            }
        });
        if response.has_focus() {
            let modifiers = ui.input(|i| i.modifiers);
            if (modifiers.command || modifiers.ctrl) && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send_now = true;
            }
        }
        if send_now {
            self.send_chat_input();
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_templates_screen(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Templates");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let mut chosen = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for (i, template) in prompts::templates().iter().enumerate() {
                egui::Frame::none()
                    .stroke(egui::Stroke::new(
                        1.0,
                        ui.style().visuals.widgets.noninteractive.bg_stroke.color,
                    ))
                    .rounding(egui::Rounding::same(8.0))
                    .inner_margin(egui::Margin::same(12.0))
                    .show(ui, |ui| {
                        ui.label(egui::RichText::new(template.title).strong());
                        ui.label(template.description);
                        egui::CollapsingHeader::new("Prompt")
                            .id_source(("template_prompt", i))
                            .default_open(false)
                            .show(ui, |ui| {
                                ui.label(egui::RichText::new(template.prompt).weak());
                            });
                        if ui.button("Use this prompt").clicked() {
                            chosen = Some(template.full_prompt());
                        }
                    });
                ui.add_space(12.0);
            }
        });

        if let Some(prompt) = chosen {
            self.start_agents(Some(prompt));
            self.current_screen = Screen::Dashboard;
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_settings_screen(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Settings");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([16.0, 8.0])
            .show(ui, |ui| {
                ui.label("OpenAI API key");
                ui.add(egui::TextEdit::singleline(&mut self.settings_key_input).password(true));
                ui.end_row();
                ui.label("Stored key");
                ui.label(egui::RichText::new(self.settings.masked_openai_key()).monospace());
                ui.end_row();
                ui.label("Other variable");
                ui.text_edit_singleline(&mut self.settings_other_input);
                ui.end_row();
            });

        ui.add_space(12.0);
        if ui.button("Save").clicked() {
            self.save_settings();
        }
        match self.settings_status {
            Some(Ok(ref msg)) => {
                ui.label(msg.as_str());
            }
            Some(Err(ref err)) => {
                ui.colored_label(egui::Color32::RED, err.as_str());
            }
            None => {}
        }

        ui.add_space(24.0);
        ui.label(egui::RichText::new("Backend").strong());
        ui.label(format!("REST: {}", self.client.base_url()));
        if let Some(ref handle) = self.connection {
            ui.label(format!(
                "WebSocket: {} ({})",
                optimonkey::config::resolve_ws_url(&self.config),
                handle.state().label()
            ));
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl Drop for OptiMonkeyApp {
    fn drop(&mut self) {
        if let Some(handle) = self.connection.take() {
            if !self.runtime.block_on(handle.close_within(SHUTDOWN_TIMEOUT)) {
                log::warn!("connection did not close within {:?}", SHUTDOWN_TIMEOUT);
            }
        }
    }
}

impl eframe::App for OptiMonkeyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_connection();
        self.poll_start();
        self.poll_recommendations();
        ctx.request_repaint_after(EVENT_POLL_INTERVAL);

        let status = self.dashboard.status();
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.horizontal(|ui| {
                        ui.heading("OptiMonkey");
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            let can_retry = matches!(
                                status,
                                ConnectionState::Disconnected | ConnectionState::Error
                            );
                            if ui.add_enabled(can_retry, egui::Button::new("Retry")).clicked() {
                                if let Some(ref handle) = self.connection {
                                    handle.retry_now();
                                }
                            }
                            ui.colored_label(status_color(status), format!("● {}", status.label()));
                            if let Some(notice) = self.dashboard.notice() {
                                ui.label(egui::RichText::new(notice).weak());
                            }
                        });
                    });
                    ui.add_space(16.0);
                });
        });

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(140.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        for (screen, label) in [
                            (Screen::Dashboard, "Dashboard"),
                            (Screen::Templates, "Templates"),
                            (Screen::Settings, "Settings"),
                            (Screen::Logs, "Logs"),
                        ] {
                            if ui.selectable_label(*current_screen == screen, label).clicked() {
                                *current_screen = screen;
                            }
                            ui.add_space(12.0);
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Dashboard => {
                        ui.add_space(24.0);
                        ui.heading("Dashboard");
                        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
                        self.ui_dashboard(ui);
                    }
                    Screen::Templates => self.ui_templates_screen(ui),
                    Screen::Settings => self.ui_settings_screen(ui),
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });
    }
}
