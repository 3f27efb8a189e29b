use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Manager, Peripheral};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use voxlink_audio::PacketDecoder;
use voxlink_foundation::{DeviceError, DeviceSettings};
use voxlink_telemetry::PipelineMetrics;

/// Bound on the internal PCM queue. A reader that falls this far behind
/// loses chunks rather than backing memory up.
const PCM_QUEUE_DEPTH: usize = 256;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);
const SCAN_ATTEMPTS: u32 = 20;

#[derive(Debug, Default)]
pub struct LinkStats {
    pub packets_seen: AtomicU64,
    pub chunks_decoded: AtomicU64,
    pub chunks_dropped: AtomicU64,
}

/// One BLE session with the wearable.
///
/// Owns the codec state for the lifetime of the connection (never shared
/// across connections) and a bounded queue of decoded PCM chunks.
/// `connect` drains the device's notification stream and invokes the
/// audio callback once per decoded chunk, in arrival order.
pub struct DeviceLink {
    device_id: String,
    audio_char_uuid: Uuid,
    decoder: PacketDecoder,
    connected: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    audio_rx: Option<mpsc::Receiver<Vec<u8>>>,
    peripheral: Mutex<Option<Peripheral>>,
    frame_buffer: Mutex<Option<Vec<u8>>>,
    stats: Arc<LinkStats>,
}

impl DeviceLink {
    pub fn new(settings: &DeviceSettings) -> Result<Self, DeviceError> {
        let audio_char_uuid = Uuid::parse_str(&settings.audio_char_uuid).map_err(|e| {
            DeviceError::Fatal(format!(
                "Invalid audio characteristic UUID '{}': {}",
                settings.audio_char_uuid, e
            ))
        })?;
        let decoder =
            PacketDecoder::new().map_err(|e| DeviceError::Fatal(format!("Codec init: {}", e)))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (audio_tx, audio_rx) = mpsc::channel(PCM_QUEUE_DEPTH);

        Ok(Self {
            device_id: settings.mac.clone(),
            audio_char_uuid,
            decoder,
            connected: Arc::new(AtomicBool::new(false)),
            stop_tx,
            stop_rx,
            audio_tx,
            audio_rx: Some(audio_rx),
            peripheral: Mutex::new(None),
            frame_buffer: Mutex::new(None),
            stats: Arc::new(LinkStats::default()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.decoder.set_metrics(metrics);
        self
    }

    /// Queue of decoded PCM chunks, in arrival order. Can be taken once.
    pub fn take_audio_stream(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.audio_rx.take()
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect to the device and stream audio until disconnection, error,
    /// or an explicit `disconnect`. `on_audio` runs once per decoded PCM
    /// chunk, in the order packets arrived.
    pub async fn connect<F>(&mut self, mut on_audio: F) -> Result<(), DeviceError>
    where
        F: FnMut(Vec<u8>) + Send,
    {
        tracing::info!(device = %self.device_id, "Connecting to wearable");

        let peripheral = self.find_peripheral().await?;
        peripheral.connect().await.map_err(ble_error)?;
        peripheral.discover_services().await.map_err(ble_error)?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == self.audio_char_uuid)
            .ok_or_else(|| DeviceError::CharacteristicMissing {
                uuid: self.audio_char_uuid.to_string(),
            })?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(ble_error)?;
        let mut notifications = peripheral.notifications().await.map_err(ble_error)?;

        *self.peripheral.lock() = Some(peripheral);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(device = %self.device_id, "Audio notifications subscribed");

        let mut stop_rx = self.stop_rx.clone();
        let result = loop {
            tokio::select! {
                _ = stop_rx.wait_for(|stopped| *stopped) => {
                    tracing::info!(device = %self.device_id, "Device link stopping on request");
                    break Ok(());
                }
                maybe = notifications.next() => match maybe {
                    Some(notification) if notification.uuid == self.audio_char_uuid => {
                        self.process_packet(&notification.value, &mut on_audio);
                    }
                    Some(_) => {
                        // Notifications from other characteristics are not ours.
                    }
                    None => {
                        tracing::warn!(device = %self.device_id, "Notification stream ended");
                        break Err(DeviceError::Disconnected);
                    }
                },
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        let peripheral = self.peripheral.lock().take();
        if let Some(peripheral) = peripheral {
            let _ = peripheral.disconnect().await;
        }

        result
    }

    /// Decode one notification packet and fan the PCM chunk out to the
    /// queue and the callback. Malformed packets are counted and dropped.
    fn process_packet<F>(&mut self, data: &[u8], on_audio: &mut F)
    where
        F: FnMut(Vec<u8>) + Send,
    {
        self.stats.packets_seen.fetch_add(1, Ordering::Relaxed);

        let Some(pcm) = self.decoder.decode(data) else {
            return;
        };
        self.stats.chunks_decoded.fetch_add(1, Ordering::Relaxed);

        match self.audio_tx.try_send(pcm.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(device = %self.device_id, "PCM queue full, chunk dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Nobody reading the queue; the callback still runs.
            }
        }

        on_audio(pcm);
    }

    async fn find_peripheral(&self) -> Result<Peripheral, DeviceError> {
        let manager = Manager::new().await.map_err(ble_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(ble_error)?
            .into_iter()
            .next()
            .ok_or(DeviceError::NoAdapter)?;

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_error)?;

        for _ in 0..SCAN_ATTEMPTS {
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
            for peripheral in adapter.peripherals().await.map_err(ble_error)? {
                let Some(props) = peripheral.properties().await.map_err(ble_error)? else {
                    continue;
                };
                let address_matches = props
                    .address
                    .to_string()
                    .eq_ignore_ascii_case(&self.device_id);
                let name_matches = props
                    .local_name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.device_id));
                if address_matches || name_matches {
                    let _ = adapter.stop_scan().await;
                    return Ok(peripheral);
                }
            }
        }

        let _ = adapter.stop_scan().await;
        Err(DeviceError::NotFound {
            name: Some(self.device_id.clone()),
        })
    }

    /// Idempotent: stops the notification loop and drops the BLE session.
    pub async fn disconnect(&self) {
        let _ = self.stop_tx.send(true);
        let peripheral = self.peripheral.lock().take();
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!(device = %self.device_id, "Disconnected from wearable");
        }
        if let Some(peripheral) = peripheral {
            let _ = peripheral.disconnect().await;
        }
    }

    /// Camera capture is not exposed by the current device firmware; this
    /// returns whatever frame was last pushed via `set_frame`, if any.
    /// Frames are not covered by the audio ordering guarantee.
    pub fn capture_frame(&self) -> Result<Option<Vec<u8>>, DeviceError> {
        Ok(self.frame_buffer.lock().clone())
    }

    pub fn set_frame(&self, frame: Vec<u8>) {
        *self.frame_buffer.lock() = Some(frame);
    }
}

fn ble_error(e: btleplug::Error) -> DeviceError {
    match e {
        btleplug::Error::DeviceNotFound => DeviceError::NotFound { name: None },
        btleplug::Error::NotConnected => DeviceError::Disconnected,
        other => DeviceError::Fatal(other.to_string()),
    }
}
