mod app;
mod dialog;

use app::App;

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    iced::application(App::new, App::update, App::view)
        .title("FaceGate")
        .subscription(App::subscription)
        .window(iced::window::Settings {
            size: iced::Size::new(1000.0, 560.0),
            exit_on_close_request: false,
            ..Default::default()
        })
        .run()
}
