use std::time::Duration;

use iced::widget::{button, column, container, image, row, text, text_input, Space};
use iced::{window, Element, Length, Subscription, Task};

use facegate_core::{Config, Frame, Session, SessionEvent, SessionState};

use crate::dialog::Notice;

const PREVIEW_WIDTH: f32 = 640.0;
const PREVIEW_HEIGHT: f32 = 480.0;
const BUTTON_WIDTH: f32 = 200.0;

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    Login,
    Register,
    NameChanged(String),
    Accept,
    TryAgain,
    DialogClosed,
    CloseRequested,
}

pub struct App {
    session: Session,
    refresh: Duration,
    preview: Option<image::Handle>,
    last_sequence: u64,
    /// Frozen frame shown while registering
    capture: Option<image::Handle>,
    name: String,
    status: String,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let config = Config::load().unwrap_or_else(|e| {
            log::warn!("Falling back to default configuration: {}", e);
            Config::default()
        });
        let session = Session::start(&config);
        let status = match session.camera_error() {
            Some(e) => format!("Camera unavailable: {}", e),
            None => "Ready".to_string(),
        };

        (
            Self {
                session,
                refresh: Duration::from_millis(config.preview.refresh_ms),
                preview: None,
                last_sequence: 0,
                capture: None,
                name: String::new(),
                status,
            },
            Task::none(),
        )
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                if let Some(frame) = self.session.refresh() {
                    if frame.sequence() != self.last_sequence {
                        self.last_sequence = frame.sequence();
                        self.preview = Some(to_handle(&frame));
                    }
                }
                if let Some(event) = self.session.poll() {
                    return self.finish(event);
                }
            }
            Message::Login => match self.session.begin_login() {
                Ok(_) => self.status = "Looking for a match...".to_string(),
                Err(e) => return notify(Notice::session_failure(&e)),
            },
            Message::Register => match self.session.begin_registration() {
                Ok(frame) => {
                    self.capture = Some(to_handle(&frame));
                    self.name.clear();
                    self.status = "Registering".to_string();
                }
                Err(e) => return notify(Notice::session_failure(&e)),
            },
            Message::NameChanged(name) => {
                self.name = name;
            }
            Message::Accept => match self.session.accept_registration(&self.name) {
                Ok(_) => self.status = "Saving...".to_string(),
                Err(e) => return notify(Notice::session_failure(&e)),
            },
            Message::TryAgain => {
                self.session.cancel_registration();
                self.capture = None;
                self.status = "Ready".to_string();
            }
            Message::DialogClosed => {}
            Message::CloseRequested => {
                log::info!("Window closed, shutting down");
                self.session.shutdown();
                return iced::exit();
            }
        }
        Task::none()
    }

    fn finish(&mut self, event: SessionEvent) -> Task<Message> {
        self.status = "Ready".to_string();
        let notice = match event {
            SessionEvent::Login(Ok(outcome)) => Notice::login(&outcome),
            SessionEvent::Login(Err(e)) => Notice::flow_failure(&e),
            SessionEvent::Registration(Ok(_)) => {
                self.capture = None;
                self.name.clear();
                Notice::registered()
            }
            SessionEvent::Registration(Err(e)) => {
                // The session keeps the capture so the name can be corrected
                self.status = "Registering".to_string();
                Notice::flow_failure(&e)
            }
        };
        notify(notice)
    }

    pub fn view(&self) -> Element<'_, Message> {
        match self.session.state() {
            SessionState::Registering { .. } | SessionState::Saving { .. } => self.register_view(),
            _ => self.main_view(),
        }
    }

    fn main_view(&self) -> Element<'_, Message> {
        let busy = self.session.is_busy();

        let controls = column![
            button(text("Login"))
                .on_press_maybe((!busy).then_some(Message::Login))
                .width(BUTTON_WIDTH)
                .padding([12, 20]),
            button(text("Register"))
                .on_press_maybe((!busy).then_some(Message::Register))
                .width(BUTTON_WIDTH)
                .padding([12, 20])
                .style(button::secondary),
            Space::new().height(Length::Fill),
            text(&self.status).size(13),
        ]
        .spacing(12)
        .height(PREVIEW_HEIGHT);

        row![self.preview_pane(), controls]
            .spacing(24)
            .padding(16)
            .into()
    }

    fn register_view(&self) -> Element<'_, Message> {
        let saving = self.session.is_busy();

        let capture: Element<'_, Message> = match &self.capture {
            Some(handle) => image(handle.clone())
                .width(PREVIEW_WIDTH)
                .height(PREVIEW_HEIGHT)
                .into(),
            None => placeholder("No capture"),
        };

        let mut name_input = text_input("", &self.name).padding(8).width(BUTTON_WIDTH);
        if !saving {
            name_input = name_input
                .on_input(Message::NameChanged)
                .on_submit(Message::Accept);
        }

        let controls = column![
            text("Please input username:"),
            name_input,
            button(text("Accept"))
                .on_press_maybe((!saving).then_some(Message::Accept))
                .width(BUTTON_WIDTH)
                .padding([12, 20])
                .style(button::success),
            button(text("Try again"))
                .on_press_maybe((!saving).then_some(Message::TryAgain))
                .width(BUTTON_WIDTH)
                .padding([12, 20])
                .style(button::danger),
            Space::new().height(Length::Fill),
            text(&self.status).size(13),
        ]
        .spacing(12)
        .height(PREVIEW_HEIGHT);

        row![capture, controls].spacing(24).padding(16).into()
    }

    fn preview_pane(&self) -> Element<'_, Message> {
        match &self.preview {
            Some(handle) => image(handle.clone())
                .width(PREVIEW_WIDTH)
                .height(PREVIEW_HEIGHT)
                .into(),
            None => placeholder(
                self.session
                    .camera_error()
                    .unwrap_or("Waiting for camera..."),
            ),
        }
    }

    pub fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            iced::time::every(self.refresh).map(|_| Message::Tick),
            window::close_requests().map(|_| Message::CloseRequested),
        ])
    }
}

fn notify(notice: Notice) -> Task<Message> {
    log::debug!("{}: {}", notice.title, notice.body);
    Task::perform(notice.show(), |_| Message::DialogClosed)
}

fn placeholder<'a>(message: &str) -> Element<'a, Message> {
    container(text(message.to_owned()))
        .width(PREVIEW_WIDTH)
        .height(PREVIEW_HEIGHT)
        .center_x(PREVIEW_WIDTH)
        .center_y(PREVIEW_HEIGHT)
        .style(container::bordered_box)
        .into()
}

/// RGB camera frame to an RGBA image handle.
fn to_handle(frame: &Frame) -> image::Handle {
    let mut pixels = Vec::with_capacity(frame.width() as usize * frame.height() as usize * 4);
    for pixel in frame.image().pixels() {
        pixels.extend_from_slice(&pixel.0);
        pixels.push(u8::MAX);
    }
    image::Handle::from_rgba(frame.width(), frame.height(), pixels)
}
