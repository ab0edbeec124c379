//! The duplex connection to the detection backend.
//!
//! A [SessionLink] owns one [Transport] at a time, driven by a background task.
//! Outgoing frames go through a channel to that task; everything the backend says comes
//! back as [LinkEvent]s, in order, from [SessionLink::next].
//!
//! The link does no correlation, acknowledgement or retry. It never reconnects on its own.
use std::{future::Future, time::Duration};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use url::Url;

use crate::{ClientMessage, DetectionBatch, Error, Result, ServerMessage};

/// A text-frame transport, ie. a WebSocket.
pub trait Transport: Send + 'static {
	fn send(&mut self, text: String) -> impl Future<Output = Result<()>> + Send;

	/// Wait for the next text frame, or `None` once the remote closed the connection.
	///
	/// This must be cancel-safe; it is raced against outgoing frames.
	fn recv(&mut self) -> impl Future<Output = Option<Result<String>>> + Send;

	fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens a [Transport] to the given endpoint.
pub trait Connector: Send {
	type Transport: Transport;

	fn connect(&self, url: &Url) -> impl Future<Output = Result<Self::Transport>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SessionState {
	#[display("disconnected")]
	Disconnected,
	#[display("connecting")]
	Connecting,
	#[display("connected")]
	Connected,
	/// Terminal until the next explicit connect.
	#[display("faulted")]
	Faulted,
}

/// Something the backend told us, or the end of the conversation.
#[derive(Debug, Clone)]
pub enum LinkEvent {
	/// The backend's greeting.
	Established {
		authenticated: bool,
		username: Option<String>,
	},

	Result(DetectionBatch),

	/// The backend failed to process a frame. The connection stays open.
	Error(String),

	/// The remote hung up (`None`) or the network failed (`Some`).
	Closed(Option<Error>),
}

/// A [LinkEvent] stamped with the generation of the link that produced it.
#[derive(Debug, Clone)]
pub struct Incoming {
	pub generation: u64,
	pub event: LinkEvent,
}

pub struct SessionLink {
	generation: u64,
	state: SessionState,
	outgoing: Option<mpsc::UnboundedSender<String>>,
	incoming: mpsc::UnboundedReceiver<LinkEvent>,
	task: Option<JoinHandle<()>>,
}

enum Exit {
	Local,
	Remote,
	Fault(Error),
}

impl SessionLink {
	/// How long [SessionLink::close] waits for a graceful shutdown.
	pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

	pub fn new(generation: u64) -> Self {
		Self {
			generation,
			state: SessionState::Disconnected,
			outgoing: None,
			incoming: Self::closed(),
			task: None,
		}
	}

	// A receiver that is already finished.
	fn closed() -> mpsc::UnboundedReceiver<LinkEvent> {
		let (_, rx) = mpsc::unbounded_channel();
		rx
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_connected(&self) -> bool {
		self.state == SessionState::Connected
	}

	/// Open the transport, moving through [SessionState::Connecting].
	///
	/// Any previous transport is torn down first.
	/// On failure the link is left [SessionState::Faulted].
	pub async fn connect<C: Connector>(&mut self, connector: &C, url: &Url) -> Result<()> {
		self.close().await;

		tracing::info!(%url, generation = self.generation, "connecting");
		self.state = SessionState::Connecting;

		let transport = match connector.connect(url).await {
			Ok(transport) => transport,
			Err(err) => {
				tracing::warn!(%err, "failed to connect");
				self.state = SessionState::Faulted;

				return Err(match err {
					Error::Connection(_) => err,
					err => Error::Connection(err.to_string()),
				});
			}
		};

		let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
		let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

		self.task = Some(tokio::spawn(Self::run(transport, outgoing_rx, incoming_tx)));
		self.outgoing = Some(outgoing_tx);
		self.incoming = incoming_rx;
		self.state = SessionState::Connected;

		tracing::info!(generation = self.generation, "connected");

		Ok(())
	}

	/// Queue a message. Fire-and-forget; only valid while connected.
	pub fn send(&mut self, msg: &ClientMessage) -> Result<()> {
		if self.state != SessionState::Connected {
			return Err(Error::NotConnected);
		}

		let text = msg.to_string()?;
		let outgoing = self.outgoing.as_ref().ok_or(Error::NotConnected)?;

		// The task is gone; its Closed event is already queued behind us.
		outgoing.send(text).map_err(|_| Error::NotConnected)
	}

	/// The next event from the backend, or `None` once the link is finished.
	///
	/// Cancel-safe.
	pub async fn next(&mut self) -> Option<Incoming> {
		let event = self.incoming.recv().await?;

		if let LinkEvent::Closed(err) = &event {
			match err {
				Some(err) => tracing::warn!(%err, "connection lost"),
				None => tracing::info!("connection closed by remote"),
			}

			self.state = SessionState::Disconnected;
			self.outgoing = None;
		}

		Some(Incoming {
			generation: self.generation,
			event,
		})
	}

	/// Tear down the transport. Sends nothing special; idempotent.
	///
	/// Events that were still queued are dropped. A transport that doesn't finish closing within
	/// [Self::CLOSE_TIMEOUT] is aborted, so this always returns.
	pub async fn close(&mut self) {
		// Dropping the sender tells the task to close the transport and exit.
		self.outgoing = None;

		if let Some(mut task) = self.task.take() {
			match time::timeout(Self::CLOSE_TIMEOUT, &mut task).await {
				Ok(Ok(())) => {}
				Ok(Err(err)) => tracing::warn!(%err, "link task failed"),
				Err(_) => {
					tracing::warn!(timeout = ?Self::CLOSE_TIMEOUT, "transport stuck; aborting");
					task.abort();
				}
			}
		}

		self.incoming = Self::closed();

		if self.state != SessionState::Faulted {
			self.state = SessionState::Disconnected;
		}
	}

	async fn run<T: Transport>(
		mut transport: T,
		mut outgoing: mpsc::UnboundedReceiver<String>,
		incoming: mpsc::UnboundedSender<LinkEvent>,
	) {
		let exit = Self::run_inner(&mut transport, &mut outgoing, &incoming).await;
		transport.close().await;

		let event = match exit {
			Exit::Local => return,
			Exit::Remote => LinkEvent::Closed(None),
			Exit::Fault(err) => LinkEvent::Closed(Some(err)),
		};

		incoming.send(event).ok();
	}

	async fn run_inner<T: Transport>(
		transport: &mut T,
		outgoing: &mut mpsc::UnboundedReceiver<String>,
		incoming: &mpsc::UnboundedSender<LinkEvent>,
	) -> Exit {
		loop {
			tokio::select! {
				biased;
				msg = outgoing.recv() => {
					let Some(text) = msg else {
						return Exit::Local;
					};

					if let Err(err) = transport.send(text).await {
						return Exit::Fault(err);
					}
				}
				msg = transport.recv() => {
					let text = match msg {
						Some(Ok(text)) => text,
						Some(Err(err)) => return Exit::Fault(err),
						None => return Exit::Remote,
					};

					let Some(event) = Self::decode(&text) else {
						continue;
					};

					if incoming.send(event).is_err() {
						// Nobody is listening anymore.
						return Exit::Local;
					}
				}
			}
		}
	}

	fn decode(text: &str) -> Option<LinkEvent> {
		let msg = match ServerMessage::from_str(text) {
			Ok(msg) => msg,
			Err(err) => {
				tracing::warn!(%err, "ignoring malformed message");
				return None;
			}
		};

		Some(match msg {
			ServerMessage::ConnectionEstablished {
				authenticated,
				username,
				..
			} => LinkEvent::Established {
				authenticated,
				username,
			},
			ServerMessage::DetectionResult(batch) => {
				if !batch.is_consistent() {
					tracing::warn!(count = batch.count, boxes = batch.boxes.len(), "detection count mismatch");
				}
				LinkEvent::Result(batch)
			}
			ServerMessage::Error { message } => LinkEvent::Error(message),
		})
	}
}

impl Drop for SessionLink {
	fn drop(&mut self) {
		// Can't await here; abort drops the transport with the task.
		if let Some(task) = self.task.take() {
			task.abort();
		}
	}
}
