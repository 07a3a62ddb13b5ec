//! Sound card output via cpal

use crate::emitter::{AudioOutput, Playback};
use crate::pattern::AlarmPattern;
use crate::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Plays alarms on the default (or a named) output device
pub struct DeviceOutput {
    device_name: Option<String>,
}

impl DeviceOutput {
    /// Use the host's default output device
    pub fn default_device() -> Self {
        Self { device_name: None }
    }

    /// Use the output device whose name contains `name`
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

fn open_device(wanted: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match wanted {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotAvailable("no default output device".into())),
        Some(wanted) => host
            .output_devices()
            .map_err(|e| AudioError::DeviceNotAvailable(e.to_string()))?
            .find(|d| d.name().map(|n| n.contains(wanted)).unwrap_or(false))
            .ok_or_else(|| {
                AudioError::DeviceNotAvailable(format!("no output device matching {}", wanted))
            }),
    }
}

/// Open the device and start the stream; runs on the output thread
fn start_stream(
    device_name: Option<&str>,
    pattern: &AlarmPattern,
) -> Result<cpal::Stream, AudioError> {
    let device = open_device(device_name)?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceNotAvailable(e.to_string()))?;

    let format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let samples = Arc::new(pattern.render(config.sample_rate.0));
    debug!(
        "Alarm on {:?}: {} Hz, {} ch, {:?}, {} samples",
        device.name().ok(),
        config.sample_rate.0,
        config.channels,
        format,
        samples.len()
    );

    let stream = build_stream(&device, &config, format, samples)?;
    stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
    Ok(stream)
}

impl AudioOutput for DeviceOutput {
    /// Returns at once; the device is opened on the output thread. If it
    /// cannot be opened the playback reports finished.
    fn play(&self, pattern: &AlarmPattern) -> Result<Arc<dyn Playback>, AudioError> {
        // cpal streams are not Send; the stream lives on its own thread
        // until the playback is stopped.
        let finished = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_finished = Arc::clone(&finished);
        let device_name = self.device_name.clone();
        let pattern = pattern.clone();

        thread::Builder::new()
            .name("alarm-output".into())
            .spawn(move || {
                match start_stream(device_name.as_deref(), &pattern) {
                    Ok(stream) => {
                        info!("Alarm output stream running");
                        // Returns on stop or when the playback handle is dropped
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => warn!("Alarm unavailable, continuing without sound: {}", e),
                }
                thread_finished.store(true, Ordering::SeqCst);
            })
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Arc::new(DevicePlayback {
            stop_tx: Mutex::new(Some(stop_tx)),
            finished,
        }))
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    samples: Arc<Vec<f32>>,
) -> Result<cpal::Stream, AudioError> {
    match format {
        SampleFormat::F32 => build_typed_stream::<f32>(device, config, samples),
        SampleFormat::I16 => build_typed_stream::<i16>(device, config, samples),
        SampleFormat::U16 => build_typed_stream::<u16>(device, config, samples),
        other => Err(AudioError::Stream(format!("unsupported sample format {:?}", other))),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: Arc<Vec<f32>>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let mut position = 0usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    // Silence past the end of the pattern
                    let value = samples.get(position).copied().unwrap_or(0.0);
                    position = position.saturating_add(1);
                    for slot in frame.iter_mut() {
                        *slot = T::from_sample(value);
                    }
                }
            },
            |err| warn!("Alarm output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}

struct DevicePlayback {
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    finished: Arc<AtomicBool>,
}

impl Playback for DevicePlayback {
    fn stop(&self) {
        let sender = match self.stop_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}
