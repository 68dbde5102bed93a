//! Channel transport: opening the authenticated WebSocket and the minimal
//! send/receive surface the Session Driver needs (C6's transport half).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{self, HeaderValue};
use uuid::Uuid;

use crate::error::{Result, SynthesisError};
use crate::options::Options;
use crate::token::TokenGenerator;

const WSS_URL_PREFIX: &str = "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";
const SEC_MS_GEC_VERSION: &str = "1-130.0.2849.68";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";
const ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";

/// One frame received from the channel.
#[derive(Debug)]
pub(crate) enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

/// The transport surface the Session Driver drives. Exists as a trait so
/// tests can substitute an in-memory fake instead of a real socket.
pub(crate) trait Channel: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn recv(&mut self) -> Result<WireMessage>;
    async fn close(&mut self) -> Result<()>;
}

pub(crate) struct WsChannel {
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    receive_timeout: Duration,
    closed: bool,
}

impl Channel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(SynthesisError::WebSocket)
    }

    async fn recv(&mut self) -> Result<WireMessage> {
        loop {
            let next = tokio::time::timeout(self.receive_timeout, self.stream.next());
            match next.await {
                Err(_) => return Err(SynthesisError::ReceiveTimeout(self.receive_timeout)),
                Ok(None) => return Ok(WireMessage::Closed),
                Ok(Some(Ok(Message::Text(text)))) => return Ok(WireMessage::Text(text)),
                Ok(Some(Ok(Message::Binary(bytes)))) => return Ok(WireMessage::Binary(bytes)),
                Ok(Some(Ok(Message::Close(_)))) => return Ok(WireMessage::Closed),
                Ok(Some(Ok(_))) => continue, // ping/pong/frame: not part of the protocol
                Ok(Some(Err(err))) => return Err(SynthesisError::WebSocket(err)),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.stream.close(None).await;
        Ok(())
    }
}

/// Open a fresh, authenticated channel for one chunk.
pub(crate) async fn open(token_gen: &TokenGenerator, options: &Options) -> Result<WsChannel> {
    let request = build_request(token_gen)?;
    let connect = tokio_tungstenite::connect_async(request);
    let (stream, _response) = tokio::time::timeout(options.connect_timeout, connect)
        .await
        .map_err(|_| SynthesisError::OpenTimeout(options.connect_timeout))?
        .map_err(classify_connect_error)?;

    Ok(WsChannel {
        stream,
        receive_timeout: options.receive_timeout,
        closed: false,
    })
}

fn build_request(token_gen: &TokenGenerator) -> Result<http::Request<()>> {
    let connection_id = Uuid::new_v4().simple().to_string();
    let url = format!(
        "{WSS_URL_PREFIX}?TrustedClientToken={}&Sec-MS-GEC={}&Sec-MS-GEC-Version={SEC_MS_GEC_VERSION}&ConnectionId={connection_id}",
        crate::token::TRUSTED_CLIENT_TOKEN,
        token_gen.generate(),
    );

    let mut request = url
        .into_client_request()
        .map_err(SynthesisError::WebSocket)?;
    let headers = request.headers_mut();
    headers.insert(http::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(http::header::ORIGIN, HeaderValue::from_static(ORIGIN));
    headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(http::header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
    headers.insert(http::header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(http::header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("Sec-WebSocket-Extensions", HeaderValue::from_static("permessage-deflate"));
    headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static("synthesize"));

    Ok(request)
}

/// Map a failed handshake into a [`SynthesisError`], recognizing a 403
/// response (with its `Date` header, if present) as a DRM/auth failure
/// rather than a generic transient transport error.
fn classify_connect_error(err: tokio_tungstenite::tungstenite::Error) -> SynthesisError {
    if let tokio_tungstenite::tungstenite::Error::Http(response) = &err {
        if response.status().as_u16() == 403 {
            let server_date = response
                .headers()
                .get(http::header::DATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return SynthesisError::Drm { server_date };
        }
    }
    SynthesisError::WebSocket(err)
}
