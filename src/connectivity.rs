//! Online/offline tracking published through a [`tokio::sync::watch`] channel.

// crates.io
use tokio::sync::watch;
// self
use crate::{_prelude::*, obs};

/// Coarse classification of the active network path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
	/// Wi-Fi or other wireless LAN.
	Wifi,
	/// Mobile data.
	Cellular,
	/// Wired, VPN, or anything else that still carries traffic.
	Other,
	/// No usable network path.
	None,
}
impl TransportKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Wifi => "wifi",
			Self::Cellular => "cellular",
			Self::Other => "other",
			Self::None => "none",
		}
	}
}

/// Last known connectivity snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectivityState {
	/// Whether requests can reach the network.
	pub online: bool,
	/// Active transport classification.
	pub transport: TransportKind,
}
impl ConnectivityState {
	/// Snapshot used whenever the platform cannot be queried.
	pub const OFFLINE: Self = Self { online: false, transport: TransportKind::None };

	/// Derives the snapshot implied by a transport classification.
	pub const fn from_transport(transport: TransportKind) -> Self {
		Self { online: !matches!(transport, TransportKind::None), transport }
	}
}

/// Platform query failure; the monitor treats it as offline.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Network probe failed: {message}.")]
pub struct ProbeError {
	/// Platform-supplied failure message.
	pub message: String,
}
impl ProbeError {
	/// Wraps a platform failure message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Platform hook that reports the active transport on demand.
pub trait NetworkProbe
where
	Self: Send + Sync,
{
	/// Queries the platform for the active transport.
	fn query(&self) -> Result<TransportKind, ProbeError>;
}

/// Tracks online state and publishes transitions to every subscriber.
#[derive(Clone)]
pub struct ConnectivityMonitor {
	sender: Arc<watch::Sender<ConnectivityState>>,
	probe: Option<Arc<dyn NetworkProbe>>,
}
impl ConnectivityMonitor {
	/// Creates a monitor seeded with a known transport and fed by [`Self::report`].
	pub fn new(initial: TransportKind) -> Self {
		let (sender, _) = watch::channel(ConnectivityState::from_transport(initial));

		Self { sender: Arc::new(sender), probe: None }
	}

	/// Creates a monitor that queries `probe` immediately and on every [`Self::refresh`].
	pub fn with_probe(probe: Arc<dyn NetworkProbe>) -> Self {
		let initial = query_or_offline(probe.as_ref());
		let (sender, _) = watch::channel(initial);

		Self { sender: Arc::new(sender), probe: Some(probe) }
	}

	/// Returns the last known online flag without blocking.
	pub fn is_online(&self) -> bool {
		self.sender.borrow().online
	}

	/// Returns the last known transport classification.
	pub fn current_transport(&self) -> TransportKind {
		self.sender.borrow().transport
	}

	/// Returns the full snapshot.
	pub fn state(&self) -> ConnectivityState {
		*self.sender.borrow()
	}

	/// Hands out a receiver that observes every transition.
	pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
		self.sender.subscribe()
	}

	/// Ingests a platform network-change notification; returns `true` on a transition.
	pub fn report(&self, transport: TransportKind) -> bool {
		let next = ConnectivityState::from_transport(transport);

		self.publish(next)
	}

	/// Re-queries the probe (if any) and publishes the result; probe failures mean offline.
	pub fn refresh(&self) -> ConnectivityState {
		if let Some(probe) = &self.probe {
			self.publish(query_or_offline(probe.as_ref()));
		}

		self.state()
	}

	fn publish(&self, next: ConnectivityState) -> bool {
		let mut previous = None;
		let changed = self.sender.send_if_modified(|state| {
			if *state == next {
				return false;
			}

			previous = Some(*state);
			*state = next;

			true
		});

		if let Some(previous) = previous {
			obs::connectivity_changed(previous, next);
		}

		changed
	}
}
impl Debug for ConnectivityMonitor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConnectivityMonitor")
			.field("state", &self.state())
			.field("probe_set", &self.probe.is_some())
			.finish()
	}
}

fn query_or_offline(probe: &dyn NetworkProbe) -> ConnectivityState {
	match probe.query() {
		Ok(transport) => ConnectivityState::from_transport(transport),
		Err(e) => {
			obs::probe_failed(&e);

			ConnectivityState::OFFLINE
		},
	}
}
