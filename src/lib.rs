pub mod avatar;
pub mod config;
pub mod session;
pub mod utils;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::avatar::{AvatarEngine, FaceSketchRenderer, SilentSpeechBackend};
use crate::config::AppConfig;
use crate::session::{AvatarSurface, HeadlessMedia, Sender, TherapyApiClient, UiEvent, VideoCall};

const SKETCH_WIDTH: f32 = 640.0;
const SKETCH_HEIGHT: f32 = 480.0;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
/// Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_event(event: &UiEvent) {
    match event {
        UiEvent::CallStarted => println!("--- call started ---"),
        UiEvent::CallEnded => println!("--- call ended ---"),
        UiEvent::Message {
            sender: Sender::User,
            text,
        } => println!("you: {}", text),
        UiEvent::Message {
            sender: Sender::Ai,
            text,
        } => println!("therapist: {}", text),
        UiEvent::SystemMessage(text) => println!("* {}", text),
        UiEvent::AvatarTalking(talking) => {
            tracing::debug!("[Call] Talking indicator {}", talking)
        }
        UiEvent::MicToggled { muted } => println!("(microphone {})", if *muted { "off" } else { "on" }),
        UiEvent::CameraToggled { off } => println!("(camera {})", if *off { "off" } else { "on" }),
        UiEvent::Error(message) => eprintln!("error: {}", message),
    }
}

/// Headless demo: one call driven by lines on stdin.
///
/// `/quit` or end of input ends the call. `/mic` and `/camera` flip the
/// placeholder tracks.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let path = config::default_config_path();
    let app: AppConfig = config::load_json_config(&path, "Config");

    let renderer = FaceSketchRenderer::new(
        SKETCH_WIDTH,
        SKETCH_HEIGHT,
        &app.avatar.background_color,
    )?;
    let mut sketches = renderer.subscribe();
    let engine = Arc::new(AvatarEngine::new(
        app.avatar.clone(),
        Arc::new(SilentSpeechBackend),
        Box::new(renderer),
    )?);
    engine.initialize().await?;

    let api = TherapyApiClient::new(&app.session)?;
    if let Err(e) = api.start_session().await {
        tracing::warn!("[API] Could not start session, continuing offline: {}", e);
    }

    let (call, mut events) = VideoCall::new(
        app.session.clone(),
        AvatarSurface::Animated(engine.clone()),
        api.clone(),
        Arc::new(HeadlessMedia),
    );
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });
    let sketch_log = tokio::spawn(async move {
        let mut last = None;
        while sketches.changed().await.is_ok() {
            let feature = sketches
                .borrow_and_update()
                .as_ref()
                .map(|sketch| sketch.feature.is_some());
            if feature != last {
                tracing::debug!("[Avatar] Emotion feature visible: {:?}", feature);
                last = feature;
            }
        }
    });

    call.start_call().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/mic" => {
                call.toggle_mic().await;
            }
            "/camera" => {
                call.toggle_camera().await;
            }
            text => {
                call.send_text_message(text).await?;
            }
        }
    }

    call.end_call().await?;
    call.wait_for_pending_saves().await;
    if let Err(e) = api.end_session().await {
        tracing::warn!("[API] Could not end session: {}", e);
    }
    engine.shutdown().await?;

    drop(call);
    let _ = printer.await;
    sketch_log.abort();
    Ok(())
}
