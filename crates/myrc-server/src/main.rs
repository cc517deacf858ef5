//! MyRC Server
//!
//! Сервер группового чата с шифрованием.

use clap::Parser;
use myrc_core::KexAlgorithm;
use myrc_server::{ChatListener, ClientRegistry, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(name = "myrc-server")]
#[command(about = "MyRC secure group chat server", long_about = None)]
struct Args {
    /// Путь к конфигурационному файлу
    #[arg(short, long, default_value = "server.toml")]
    config: PathBuf,

    /// Генерация примера конфигурации
    #[arg(long)]
    generate_config: Option<PathBuf>,

    /// Порт (перекрывает конфигурацию)
    #[arg(short, long)]
    port: Option<u16>,

    /// Алгоритм обмена ключами: modp, ecdh, irrational
    #[arg(short, long)]
    kex: Option<KexAlgorithm>,

    /// Уровень логирования (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Генерация конфигурации, если запрошено
    if let Some(path) = args.generate_config {
        if let Err(e) = ServerConfig::default().to_file(&path) {
            eprintln!("Ошибка генерации конфигурации: {}", e);
            std::process::exit(1);
        }
        println!("Конфигурация сохранена в: {}", path.display());
        return;
    }

    // Загрузка конфигурации
    let config_missing = !args.config.exists();
    let mut config = if config_missing {
        ServerConfig::default()
    } else {
        match ServerConfig::from_file(&args.config) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Ошибка загрузки конфигурации: {}", e);
                eprintln!("Проверьте файл: {}", args.config.display());
                std::process::exit(1);
            }
        }
    };

    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(kex) = args.kex {
        config.security.key_exchange = kex;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    if let Err(e) = config.validate() {
        eprintln!("Некорректная конфигурация: {}", e);
        std::process::exit(1);
    }

    // Инициализация логирования
    let log_level = config.log_level().unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Не удалось установить global subscriber: {}", e);
        std::process::exit(1);
    }

    info!("MyRC Server v{}", env!("CARGO_PKG_VERSION"));
    if config_missing {
        warn!(
            "Конфигурационный файл не найден: {}, используются значения по умолчанию",
            args.config.display()
        );
    }

    // Вывод конфигурации
    info!("Конфигурация:");
    info!("  • Адрес: {}", config.bind_address());
    info!("  • Макс. подключений: {}", config.network.max_connections);
    info!(
        "  • Обмен ключами: {} ({})",
        config.security.key_exchange,
        config.security.key_exchange.wire_name()
    );

    if let Err(e) = run_server(config).await {
        error!("Критическая ошибка сервера: {}", e);
        std::process::exit(1);
    }
}

/// Запуск сервера
async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let registry = Arc::new(ClientRegistry::new());
    let listener = ChatListener::bind(&config, Arc::clone(&registry)).await?;

    // Обработка сигналов для graceful shutdown
    tokio::select! {
        result = listener.run() => {
            if let Err(e) = result {
                error!("Ошибка listener: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Получен сигнал Ctrl+C, остановка сервера...");
        }
    }

    let closed = registry.close_all().await;
    info!("Закрыто соединений: {}", closed);

    info!("Сервер остановлен");
    Ok(())
}
