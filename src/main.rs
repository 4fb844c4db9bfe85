use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use relaybot::bot::gemini;
use relaybot::bot::images;
use relaybot::bot::openai;
use relaybot::bot::scratch::SCRATCH_MAX_AGE;
use relaybot::bot::Dispatcher as MentionDispatcher;
use relaybot::bot::{
    BotIdentity, GenerationStrategy, HistoryStore, ImageEdit, ImageGeneration,
    InboundMessage, PeriodicTask, ScratchDir, TelegramClient, TextCompletion,
};
use relaybot::config::{Config, Mode};
use relaybot::{ping, telegram_log};

const HISTORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const HISTORY_MAX_AGE: Duration = Duration::from_secs(60 * 60);
const SCRATCH_SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relaybot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().init();
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("relaybot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting relaybot...");
    info!("Loaded config from {config_path} (mode: {:?})", config.mode);

    let me = match bot.get_me().await {
        Ok(me) => me,
        Err(e) => {
            error!("Failed to log in: {e}");
            std::process::exit(1);
        }
    };
    let identity = BotIdentity::from_me(&me);
    info!("🤖 Online as @{} ({})", identity.username, identity.user_id);

    let http = match reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            error!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let scratch = match ScratchDir::open(&config.scratch_dir) {
        Ok(scratch) => Arc::new(scratch),
        Err(e) => {
            error!("Failed to open scratch directory {}: {e}", config.scratch_dir.display());
            std::process::exit(1);
        }
    };
    // Leftovers from a previous run.
    scratch.sweep(SCRATCH_MAX_AGE).await;

    let strategy = build_strategy(&config, http, scratch.clone());
    info!("Generation strategy: {}", strategy.name());

    let history = Arc::new(HistoryStore::new());

    let history_for_sweep = history.clone();
    let _history_sweep = PeriodicTask::spawn("history-sweep", HISTORY_SWEEP_INTERVAL, move || {
        let history = history_for_sweep.clone();
        async move {
            let removed = history.sweep(HISTORY_MAX_AGE);
            if removed > 0 {
                info!("🧹 Pruned {removed} history entries, {} chats active", history.chat_count());
            }
        }
    });

    let scratch_for_sweep = scratch.clone();
    let _scratch_sweep = PeriodicTask::spawn("scratch-sweep", SCRATCH_SWEEP_INTERVAL, move || {
        let scratch = scratch_for_sweep.clone();
        async move {
            scratch.sweep(SCRATCH_MAX_AGE).await;
        }
    });

    let listener = match ping::bind(config.port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind port {}: {e}", config.port);
            std::process::exit(1);
        }
    };
    tokio::spawn(async move {
        if let Err(e) = ping::serve(listener).await {
            warn!("Liveness server stopped: {e}");
        }
    });

    let dispatcher = Arc::new(MentionDispatcher::new(
        identity,
        Arc::new(TelegramClient::new(bot.clone())),
        strategy,
        history,
        config.personas.clone(),
    ));

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("👋 Shutting down");
}

fn build_strategy(
    config: &Config,
    http: reqwest::Client,
    scratch: Arc<ScratchDir>,
) -> Arc<dyn GenerationStrategy> {
    match config.mode {
        Mode::Text => Arc::new(TextCompletion::new(openai::Client::new(
            http,
            config.openai_api_key.clone(),
            config.base_url.clone(),
            config.chat_model.clone(),
        ))),
        Mode::Image => Arc::new(ImageGeneration::new(images::Client::new(
            http,
            config.image_api_key.clone(),
            config.image_base_url.clone(),
            config.image_model.clone(),
            config.image_params.clone(),
        ))),
        Mode::Edit => Arc::new(ImageEdit::new(
            gemini::Client::new(
                http,
                config.gemini_api_key.clone(),
                config.gemini_base_url.clone(),
                config.gemini_model.clone(),
            ),
            scratch,
        )),
    }
}

async fn handle_message(msg: Message, dispatcher: Arc<MentionDispatcher>) -> ResponseResult<()> {
    let Some(inbound) = InboundMessage::from_telegram(&msg) else {
        return Ok(());
    };

    // teloxide already runs different chats concurrently.
    dispatcher.handle(inbound).await;
    Ok(())
}
