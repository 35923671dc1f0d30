//! Audio output using cpal
//!
//! One output stream mixes every loaded stem. Each stem is a [`Voice`] with
//! its own playhead; the stream callback sums the playing voices through
//! their gain nodes.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! that takes resume and shutdown commands over a channel. The stream starts
//! suspended, like a browser audio context before the first user gesture.

use super::decoder::DecodedStem;
use super::{AudioContext, GainNode, StemOutput};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use stemdle_common::StemKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Marks "no seek pending"; a NaN bit pattern, never a real position
const NO_SEEK: u64 = u64::MAX;

/// One decoded stem inside the mixer
#[derive(Debug)]
pub struct Voice {
    stem: StemKind,
    samples: Vec<f32>,
    sample_rate: u32,
    first_frame: u64,
    /// Playhead in track frames (f64 bits)
    position: AtomicU64,
    /// Seek target not yet picked up by the callback (f64 bits)
    pending_seek: AtomicU64,
    playing: AtomicBool,
    ended: AtomicBool,
    gain: OnceLock<Arc<GainNode>>,
}

impl Voice {
    pub fn new(stem: StemKind, decoded: DecodedStem) -> Self {
        Self {
            stem,
            position: AtomicU64::new((decoded.first_frame as f64).to_bits()),
            pending_seek: AtomicU64::new(NO_SEEK),
            samples: decoded.samples,
            sample_rate: decoded.sample_rate,
            first_frame: decoded.first_frame,
            playing: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            gain: OnceLock::new(),
        }
    }

    pub fn stem(&self) -> StemKind {
        self.stem
    }

    pub fn current_time(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire)) / self.sample_rate as f64
    }

    pub fn seek(&self, seconds: f64) {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).to_bits();
        self.position.store(frame, Ordering::Release);
        self.pending_seek.store(frame, Ordering::Release);
        self.ended.store(false, Ordering::Release);
    }

    pub fn start(&self) {
        self.ended.store(false, Ordering::Release);
        self.playing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Add this voice into `out` (interleaved stereo at `device_rate`).
    ///
    /// Called on the audio thread.
    pub fn render(&self, out: &mut [f32], device_rate: u32) {
        if !self.playing.load(Ordering::Acquire) {
            return;
        }

        let seek = self.pending_seek.swap(NO_SEEK, Ordering::AcqRel);
        let mut position = if seek != NO_SEEK {
            f64::from_bits(seek)
        } else {
            f64::from_bits(self.position.load(Ordering::Acquire))
        };

        let step = self.sample_rate as f64 / device_rate as f64;
        // Unrouted stems stay silent
        let gain = self.gain.get().map_or(0.0, |g| g.amplification());
        let frames = self.samples.len() / 2;

        for frame in out.chunks_mut(2) {
            let index = position as u64;
            if index >= self.first_frame {
                let local = (index - self.first_frame) as usize;
                if local >= frames {
                    self.playing.store(false, Ordering::Release);
                    self.ended.store(true, Ordering::Release);
                    break;
                }
                frame[0] += self.samples[local * 2] * gain;
                if let Some(right) = frame.get_mut(1) {
                    *right += self.samples[local * 2 + 1] * gain;
                }
            }
            position += step;
        }

        self.position.store(position.to_bits(), Ordering::Release);
    }
}

/// Voices of the loaded song
#[derive(Debug, Default)]
pub struct Mixer {
    voices: Mutex<Vec<Arc<Voice>>>,
}

impl Mixer {
    pub fn add(&self, voice: Arc<Voice>) {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voice);
    }

    pub fn remove(&self, voice: &Arc<Voice>) {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|v| !Arc::ptr_eq(v, voice));
    }

    pub fn len(&self) -> usize {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `out` (interleaved stereo) with the sum of all playing voices.
    ///
    /// Never blocks: if the voice list is being changed, outputs silence.
    pub fn mix(&self, out: &mut [f32], device_rate: u32) {
        out.fill(0.0);
        let Ok(voices) = self.voices.try_lock() else {
            return;
        };
        for voice in voices.iter() {
            voice.render(out, device_rate);
        }
    }
}

/// [`StemOutput`] backed by a mixer voice
#[derive(Debug)]
pub struct DeviceStem {
    voice: Arc<Voice>,
    mixer: Weak<Mixer>,
}

impl DeviceStem {
    pub fn new(voice: Arc<Voice>, mixer: &Arc<Mixer>) -> Self {
        Self {
            voice,
            mixer: Arc::downgrade(mixer),
        }
    }
}

impl StemOutput for DeviceStem {
    fn current_time(&self) -> f64 {
        self.voice.current_time()
    }

    fn set_current_time(&self, seconds: f64) {
        self.voice.seek(seconds);
    }

    fn play(&self) -> Result<()> {
        self.voice.start();
        Ok(())
    }

    fn pause(&self) {
        self.voice.stop();
    }

    fn is_paused(&self) -> bool {
        !self.voice.is_playing()
    }

    fn has_ended(&self) -> bool {
        self.voice.has_ended()
    }

    fn route(&self, gain: Arc<GainNode>) -> Result<()> {
        self.voice
            .gain
            .set(gain)
            .map_err(|_| Error::AlreadyWired(self.voice.stem))
    }

    fn gain(&self) -> Option<Arc<GainNode>> {
        self.voice.gain.get().cloned()
    }

    fn release(&self) {
        self.voice.stop();
        if let Some(mixer) = self.mixer.upgrade() {
            mixer.remove(&self.voice);
        }
    }
}

enum DeviceCommand {
    Resume(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Output device running on its own thread
pub struct AudioOutput {
    commands: Mutex<mpsc::Sender<DeviceCommand>>,
    suspended: Arc<AtomicBool>,
    mixer: Arc<Mixer>,
    device_name: String,
    sample_rate: u32,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioOutput {
    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device (None = default) and start its thread.
    ///
    /// Falls back to the default device when the named one is missing.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(String, u32)>>();
        let mixer = Arc::new(Mixer::default());
        let suspended = Arc::new(AtomicBool::new(true));

        let thread_mixer = Arc::clone(&mixer);
        let thread_suspended = Arc::clone(&suspended);
        let handle = std::thread::Builder::new()
            .name("stemdle-audio".to_string())
            .spawn(move || {
                let (stream, name, rate) = match build_output(device_name.as_deref(), thread_mixer) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((name, rate)));
                run_device(stream, command_rx, thread_suspended);
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let (device_name, sample_rate) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        info!(
            "Audio output ready: device={}, sample_rate={}",
            device_name, sample_rate
        );

        Ok(Self {
            commands: Mutex::new(command_tx),
            suspended,
            mixer,
            device_name,
            sample_rate,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop the device thread; the output cannot be resumed afterwards
    pub fn shutdown(&self) {
        let _ = self.send(DeviceCommand::Shutdown);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }

    fn send(&self, command: DeviceCommand) -> Result<()> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(command)
            .map_err(|_| Error::AudioOutput("Audio thread is not running".to_string()))
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AudioContext for AudioOutput {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn resume(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.send(DeviceCommand::Resume(reply_tx))?;
            reply_rx
                .await
                .map_err(|_| Error::AudioOutput("Audio thread dropped resume request".to_string()))?
        }
        .boxed()
    }
}

fn run_device(stream: Stream, commands: mpsc::Receiver<DeviceCommand>, suspended: Arc<AtomicBool>) {
    for command in commands {
        match command {
            DeviceCommand::Resume(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)));
                if result.is_ok() {
                    suspended.store(false, Ordering::Release);
                    info!("Audio output resumed");
                }
                let _ = reply.send(result);
            }
            DeviceCommand::Shutdown => break,
        }
    }
    drop(stream);
    debug!("Audio thread stopped");
}

fn build_output(device_name: Option<&str>, mixer: Arc<Mixer>) -> Result<(Stream, String, u32)> {
    let device = select_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let (config, sample_format) = best_config(&device)?;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    // Some hosts start streams on creation
    if let Err(e) = stream.pause() {
        debug!("Could not pause new stream: {}", e);
    }

    Ok((stream, name, config.sample_rate.0))
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

/// Prefer 44.1kHz stereo f32, else the device default
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= 44100
            && config.max_sample_rate().0 >= 44100
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        return Ok((config.with_sample_rate(cpal::SampleRate(44100)).config(), sample_format));
    }

    let config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    Ok((config.config(), config.sample_format()))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, mixer: Arc<Mixer>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0;
    let mut stereo: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                stereo.resize(frames * 2, 0.0);
                mixer.mix(&mut stereo, device_rate);

                for (out, pair) in data.chunks_mut(channels.max(1)).zip(stereo.chunks(2)) {
                    for (ch, sample) in out.iter_mut().enumerate() {
                        let value = if ch % 2 == 0 { pair[0] } else { pair[1] };
                        *sample = T::from_sample(value.clamp(-1.0, 1.0));
                    }
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
