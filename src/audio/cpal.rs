// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fmt,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use thread_priority::ThreadPriority;
use tracing::{debug, error, info, span, warn, Level};

use super::mixer::Mixer;
use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::{Clock, ClockState, Output, OutputError, SampleFormat, TargetFormat, VoiceSender};
use crate::config;
use crate::synth::Voice;

/// How long resume() waits for the output thread to report whether the stream
/// could be built.
const STREAM_BUILD_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the output thread checks whether it should shut down.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A small wrapper around a cpal::Device that renders scheduled voices.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The number of channels rendered.
    channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The target format for this device.
    target_format: TargetFormat,
    /// The clock advanced by the output stream.
    clock: Arc<Clock>,
    /// Channel for handing new voices to the stream callback.
    voice_tx: VoiceSender,
    /// Receiving end, moved into the stream callback on resume.
    voice_rx: crossbeam_channel::Receiver<Voice>,
    /// Handle to the output thread that owns the stream.
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Everything the stream callback needs. Lives on the audio thread.
struct Renderer {
    mixer: Mixer,
    clock: Arc<Clock>,
    channels: usize,
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: bool,
    started: bool,
}

impl Renderer {
    fn render(&mut self, data: &mut [f32]) {
        configure_audio_thread_priority(self.priority, self.rt_audio, &mut self.priority_set);
        if !self.started {
            self.clock.mark_running();
            self.started = true;
        }
        let frames = data.len() / self.channels.max(1);
        self.mixer.process_into_output(data, frames);
    }
}

/// f32 callback: mix directly into the cpal buffer.
fn build_f32_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

/// Integer callback: mix into a scratch buffer and convert.
fn build_int_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            renderer.render(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl Device {
    /// Lists cpal devices and produces the Output trait.
    pub fn list() -> Result<Vec<Box<dyn Output>>, OutputError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn Output> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, OutputError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id)
                .map_err(|e| OutputError::Unsupported(e.to_string()))?;
            let host_devices = match host.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Some(device) = Device::from_cpal(host_id, device) {
                    devices.push(device);
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Wraps a cpal device if it has any output channels.
    fn from_cpal(host_id: cpal::HostId, device: cpal::Device) -> Option<Device> {
        let max_channels = device
            .supported_output_configs()
            .ok()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);
        if max_channels == 0 {
            return None;
        }
        let name = device.name().ok()?;
        let target_format = TargetFormat::default();
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();

        Some(Device {
            name,
            max_channels,
            channels: max_channels.min(2),
            host_id,
            device,
            clock: Arc::new(Clock::new(target_format.sample_rate)),
            target_format,
            voice_tx,
            voice_rx,
            output_thread: Mutex::new(None),
        })
    }

    /// Gets the cpal device named in the configuration. The name "default"
    /// picks the default host's default output.
    pub fn get(config: &config::Engine) -> Result<Device, OutputError> {
        let name = config.device();
        let device = if name == "default" {
            let host = cpal::default_host();
            host.default_output_device()
                .and_then(|device| Device::from_cpal(host.id(), device))
        } else {
            Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name)
        };
        let Some(mut device) = device else {
            return Err(OutputError::Unsupported(format!(
                "no device found with name {}",
                name
            )));
        };

        let channels = config.channels();
        if device.max_channels < channels {
            return Err(OutputError::Unsupported(format!(
                "{} channels requested, audio device {} only has {}",
                channels, device.name, device.max_channels
            )));
        }

        device.target_format = config
            .target_format()
            .map_err(|e| OutputError::Unsupported(e.to_string()))?;
        device.channels = channels;
        device.clock = Arc::new(Clock::new(device.target_format.sample_rate));
        Ok(device)
    }

    /// Starts the output thread, which builds the stream and keeps it alive
    /// until the clock is closed. Returns the thread handle if the thread may
    /// still be running.
    fn start_output_thread(&self) -> (Option<thread::JoinHandle<()>>, Result<(), OutputError>) {
        let device = self.device.clone();
        let target_format = self.target_format.clone();
        let channels = self.channels;
        let clock = self.clock.clone();
        let voice_rx = self.voice_rx.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let handle = thread::spawn(move || {
            let span = span!(Level::INFO, "output stream (cpal)");
            let _enter = span.enter();

            let config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(target_format.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let renderer = Renderer {
                mixer: Mixer::new(clock.clone(), channels, voice_rx),
                clock: clock.clone(),
                channels: channels as usize,
                priority: callback_thread_priority(),
                rt_audio: rt_audio_enabled(),
                priority_set: false,
                started: false,
            };

            let stream_result = match (target_format.sample_format, target_format.bits_per_sample) {
                (SampleFormat::Float, _) => build_f32_stream(&device, &config, renderer),
                (SampleFormat::Int, 16) => build_int_stream::<i16>(&device, &config, renderer),
                (SampleFormat::Int, _) => build_int_stream::<i32>(&device, &config, renderer),
            };
            let stream = match stream_result {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to create CPAL stream: {}", e);
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                error!("Failed to start CPAL stream: {}", e);
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            info!(
                channels,
                sample_rate = target_format.sample_rate,
                format = %target_format.sample_format,
                "CPAL output stream started successfully"
            );
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until teardown.
            while clock.state() != ClockState::Closed {
                thread::sleep(SHUTDOWN_POLL_INTERVAL);
            }
            debug!("CPAL output stream stopping");
        });

        await_stream_ready(handle, &ready_rx, STREAM_BUILD_TIMEOUT)
    }
}

/// Waits for the output thread to report whether its stream started. A thread
/// that has not reported yet is still handed back, since it owns a receiver
/// for the voice channel and may yet start its stream.
fn await_stream_ready(
    handle: thread::JoinHandle<()>,
    ready_rx: &mpsc::Receiver<Result<(), String>>,
    timeout: Duration,
) -> (Option<thread::JoinHandle<()>>, Result<(), OutputError>) {
    match ready_rx.recv_timeout(timeout) {
        Ok(Ok(())) => (Some(handle), Ok(())),
        Ok(Err(e)) => {
            let _ = handle.join();
            (None, Err(OutputError::Stream(e)))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(?timeout, "Output thread has not reported stream status");
            (
                Some(handle),
                Err(OutputError::Stream(
                    "output thread did not report stream status".to_string(),
                )),
            )
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            let _ = handle.join();
            (
                None,
                Err(OutputError::Stream(
                    "output thread exited without reporting stream status".to_string(),
                )),
            )
        }
    }
}

impl Output for Device {
    fn clock(&self) -> Arc<Clock> {
        self.clock.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.target_format.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn resume(&self) -> Result<(), OutputError> {
        if self.clock.state() == ClockState::Closed {
            return Err(OutputError::Closed);
        }
        let mut output_thread = self.output_thread.lock();
        match output_thread.as_ref().map(|thread| thread.is_finished()) {
            // Either streaming or still starting up.
            Some(false) => return Ok(()),
            Some(true) => {
                if let Some(thread) = output_thread.take() {
                    let _ = thread.join();
                }
            }
            None => {}
        }

        info!(device = self.name, "Starting output stream");
        let (thread, result) = self.start_output_thread();
        *output_thread = thread;
        result
    }

    fn submit(&self, voice: Voice) -> Result<(), OutputError> {
        if self.clock.state() == ClockState::Closed {
            return Err(OutputError::Closed);
        }
        self.voice_tx.send(voice).map_err(|_| OutputError::Closed)
    }

    fn teardown(&self) {
        self.clock.close();
        if let Some(thread) = self.output_thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.teardown();
    }
}
