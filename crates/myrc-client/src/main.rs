//! MyRC Client CLI
//!
//! Консольный клиент группового чата: строки из stdin уходят на сервер,
//! сообщения сервера печатаются в stdout.

use clap::Parser;
use myrc_client::{ChatConnection, ClientConfig};
use myrc_core::KexAlgorithm;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(name = "myrc-client")]
#[command(about = "MyRC secure group chat client", long_about = None)]
struct Args {
    /// Путь к конфигурационному файлу
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,

    /// Генерация примера конфигурации
    #[arg(long)]
    generate_config: Option<PathBuf>,

    /// Хост сервера (перекрывает конфигурацию)
    #[arg(long)]
    host: Option<String>,

    /// Порт сервера (перекрывает конфигурацию)
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

    if let Some(path) = args.generate_config {
        if let Err(e) = ClientConfig::default().to_file(&path) {
            eprintln!("Ошибка генерации конфигурации: {}", e);
            std::process::exit(1);
        }
        println!("Конфигурация сохранена в: {}", path.display());
        return;
    }

    // Без файла работаем на значениях по умолчанию
    let mut config = if args.config.exists() {
        match ClientConfig::from_file(&args.config) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Ошибка загрузки конфигурации: {}", e);
                eprintln!("Проверьте файл: {}", args.config.display());
                std::process::exit(1);
            }
        }
    } else {
        ClientConfig::default()
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
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
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level().unwrap_or(Level::WARN))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Не удалось установить global subscriber: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_client(config).await {
        error!("Ошибка клиента: {}", e);
        eprintln!("Ошибка: {}", e);
        std::process::exit(1);
    }
}

/// Основной цикл: stdin → сервер, сервер → stdout
async fn run_client(config: ClientConfig) -> anyhow::Result<()> {
    let address = config.server_address();
    info!("Подключение к {} ({})", address, config.security.key_exchange);

    let mut conn = ChatConnection::connect(
        address.as_str(),
        config.security.key_exchange,
        config.connection_timeout(),
    )
    .await?;
    info!("Защищённый канал установлен ({})", conn.algorithm().wire_name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            message = conn.recv() => {
                match message? {
                    Some(text) => print_message(&text)?,
                    None => {
                        println!("Соединение закрыто сервером");
                        return Ok(());
                    }
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let quit = line.starts_with('/') && line.trim() == "/quit";
                        conn.send(&line).await?;
                        if quit {
                            return Ok(());
                        }
                    }
                    None => {
                        info!("stdin закрыт, отключаемся");
                        conn.close().await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Приглашения вида "Enter username: " печатаются без перевода строки
fn print_message(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if text.ends_with(": ") {
        write!(stdout, "{}", text)?;
    } else {
        writeln!(stdout, "{}", text)?;
    }
    stdout.flush()
}
