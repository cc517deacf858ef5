//! Разбор и маршрутизация строк от активных клиентов
//!
//! Этот модуль отвечает за:
//! - Распознавание команд `/quit`, `/list`, `/help`
//! - Рассылку обычных сообщений остальным клиентам
//! - Отказ в сообщениях, которые не помещаются в кадр

use myrc_core::crypto::ciphertext_len;
use myrc_core::frame::{MAX_FRAME_SIZE, MAX_PLAINTEXT_SIZE};
use std::sync::Arc;
use tracing::debug;

use crate::registry::{ClientRegistry, ConnectionId};

/// Справка по командам
pub const HELP_TEXT: &str = "/quit - quit the chat\n/list - list usernames\n/help - show this help message";

/// Ответ на неизвестную команду
pub const INVALID_COMMAND: &str = "Invalid command. Type /help for help.";

/// Ответ на слишком длинное сообщение
pub const MESSAGE_TOO_LONG: &str = "Message too long.";

/// Разобранная строка клиента
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Строка нулевой длины
    Empty,
    /// `/quit`
    Quit,
    /// `/list`
    List,
    /// `/help`
    Help,
    /// Любая другая строка, начинающаяся с `/`
    Unknown(&'a str),
    /// Обычное сообщение
    Message(&'a str),
}

impl<'a> Command<'a> {
    /// Разобрать строку
    ///
    /// Командой считается только строка, первый символ которой `/`. Пробелы
    /// вокруг команды отбрасываются, обычные сообщения передаются как есть.
    pub fn parse(line: &'a str) -> Self {
        if line.is_empty() {
            return Command::Empty;
        }

        if line.starts_with('/') {
            return match line.trim() {
                "/quit" => Command::Quit,
                "/list" => Command::List,
                "/help" => Command::Help,
                other => Command::Unknown(other),
            };
        }

        Command::Message(line)
    }
}

/// Что сессия должна сделать после маршрутизации
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Ничего
    Ignore,
    /// Ответить только отправителю
    Reply(String),
    /// Сообщение разослано (число получателей)
    Broadcast(usize),
    /// Завершить сессию
    Quit,
}

/// Роутер сообщений
#[derive(Clone)]
pub struct Router {
    registry: Arc<ClientRegistry>,
}

impl Router {
    /// Создать роутер поверх реестра
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Обработать строку от активного клиента
    pub async fn route(&self, from: ConnectionId, username: &str, line: &str) -> RouteAction {
        match Command::parse(line) {
            Command::Empty => RouteAction::Ignore,
            Command::Quit => RouteAction::Quit,
            Command::List => {
                let names = self.registry.usernames().await;
                RouteAction::Reply(fit_to_frame(names.join("\n")))
            }
            Command::Help => RouteAction::Reply(HELP_TEXT.to_string()),
            Command::Unknown(command) => {
                debug!("[{}] Неизвестная команда: {}", username, command);
                RouteAction::Reply(INVALID_COMMAND.to_string())
            }
            Command::Message(text) => {
                let composed = format!("{}: {}", username, text);
                if ciphertext_len(composed.len()) > MAX_FRAME_SIZE {
                    debug!("[{}] Сообщение отклонено: {} байт", username, composed.len());
                    return RouteAction::Reply(MESSAGE_TOO_LONG.to_string());
                }

                let delivered = self.registry.broadcast(from, &composed).await;
                debug!("[{}] Сообщение разослано {} клиентам", username, delivered);
                RouteAction::Broadcast(delivered)
            }
        }
    }
}

/// Обрезать ответ до длины, помещающейся в один кадр
fn fit_to_frame(mut text: String) -> String {
    if text.len() <= MAX_PLAINTEXT_SIZE {
        return text;
    }

    let mut end = MAX_PLAINTEXT_SIZE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}
