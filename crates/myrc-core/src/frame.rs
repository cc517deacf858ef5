//! Кадрирование потока
//!
//! Формат кадра: `[length: u32 big-endian][payload]`, payload не длиннее
//! [`MAX_FRAME_SIZE`]. Кадр нулевой длины означает, что собеседник закончил
//! передачу.

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::error::{ChatError, ProtocolError, Result};

/// Максимальный размер payload одного кадра
pub const MAX_FRAME_SIZE: usize = 2048;

/// Максимальная длина открытого текста, чей шифртекст умещается в один кадр
///
/// PKCS#7 добавляет от 1 до 16 байт, а [`MAX_FRAME_SIZE`] кратен блоку.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_FRAME_SIZE - 1;

/// Транспорт с кадрированием
pub type FramedTransport<T> = Framed<T, LengthDelimitedCodec>;

/// Кодек с ограничением размера кадра
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_SIZE)
        .new_codec()
}

/// Обернуть поток в кадрированный транспорт
pub fn framed<T>(io: T) -> FramedTransport<T>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, codec())
}

/// Прочитать следующий кадр
///
/// Возвращает `Ok(None)`, если поток закрыт между кадрами.
pub async fn read_frame<T>(transport: &mut FramedTransport<T>) -> Result<Option<BytesMut>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match transport.next().await {
        Some(Ok(frame)) => Ok(Some(frame)),
        Some(Err(e)) => Err(map_codec_error(e)),
        None => Ok(None),
    }
}

/// Отправить кадр
pub async fn write_frame<T>(transport: &mut FramedTransport<T>, payload: Bytes) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            max: MAX_FRAME_SIZE,
        }
        .into());
    }

    transport.send(payload).await.map_err(map_codec_error)
}

/// Превышение размера кадра кодек сообщает как io::Error с вложенной ошибкой
pub fn map_codec_error(e: std::io::Error) -> ChatError {
    let too_large = e
        .get_ref()
        .map(|inner| inner.is::<LengthDelimitedCodecError>())
        .unwrap_or(false);

    if too_large {
        ProtocolError::FrameTooLarge {
            max: MAX_FRAME_SIZE,
        }
        .into()
    } else {
        ChatError::Transport(e)
    }
}
