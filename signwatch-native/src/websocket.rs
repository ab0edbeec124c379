use std::future::Future;

use futures::{SinkExt, StreamExt};
use signwatch::{Connector, Error, Transport};
use tokio::net::TcpStream;
use tokio_tungstenite::{
	tungstenite::{
		self,
		client::IntoClientRequest,
		http::{header::AUTHORIZATION, HeaderValue},
		Message,
	},
	MaybeTlsStream, WebSocketStream,
};
use url::Url;

fn connection_error(err: tungstenite::Error) -> Error {
	Error::Connection(err.to_string())
}

/// Opens the detection link over a WebSocket.
#[derive(Clone, Default)]
pub struct WebSocketConnector {
	token: Option<String>,
}

impl WebSocketConnector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Present a bearer token during the handshake, so results are saved to the user's history.
	pub fn with_token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(token.into());
		self
	}
}

impl Connector for WebSocketConnector {
	type Transport = WebSocketTransport;

	fn connect(&self, url: &Url) -> impl Future<Output = signwatch::Result<Self::Transport>> + Send {
		let url = url.clone();
		let token = self.token.clone();

		async move {
			let mut request = url.as_str().into_client_request().map_err(connection_error)?;

			if let Some(token) = token {
				let value = HeaderValue::from_str(&format!("Bearer {token}"))
					.map_err(|err| Error::Connection(format!("invalid token: {err}")))?;
				request.headers_mut().insert(AUTHORIZATION, value);
			}

			let (stream, response) = tokio_tungstenite::connect_async(request)
				.await
				.map_err(connection_error)?;

			tracing::debug!(%url, status = %response.status(), "websocket established");

			Ok(WebSocketTransport { stream })
		}
	}
}

pub struct WebSocketTransport {
	stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WebSocketTransport {
	fn send(&mut self, text: String) -> impl Future<Output = signwatch::Result<()>> + Send {
		async move { self.stream.send(Message::text(text)).await.map_err(connection_error) }
	}

	fn recv(&mut self) -> impl Future<Output = Option<signwatch::Result<String>>> + Send {
		async move {
			loop {
				let msg = match self.stream.next().await? {
					Ok(msg) => msg,
					Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return None,
					Err(err) => return Some(Err(connection_error(err))),
				};

				match msg {
					Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
					Message::Close(frame) => {
						tracing::debug!(?frame, "websocket closed by remote");
						return None;
					}
					Message::Binary(data) => {
						tracing::warn!(size = data.len(), "ignoring binary message");
					}
					// Pongs are sent automatically.
					Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
				}
			}
		}
	}

	fn close(&mut self) -> impl Future<Output = ()> + Send {
		async move {
			if let Err(err) = self.stream.close(None).await {
				tracing::trace!(%err, "websocket already closed");
			}
		}
	}
}
