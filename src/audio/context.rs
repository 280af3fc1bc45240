//! Process-wide audio processing context.
//!
//! The context owns the output clock and a bus of connected voices. Voices
//! and the monitor tap belong to one mode session and are removed from the
//! bus when their handles are disconnected or dropped; the context itself
//! lives for the whole session and is reused across mode switches.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use parking_lot::Mutex;
use ringbuf::{Consumer, HeapRb, Producer};
use std::sync::{Arc, Weak};

use crate::error::{AnalyzerError, Result};

pub type SampleConsumer = Consumer<f32, Arc<HeapRb<f32>>>;
pub type SampleProducer = Producer<f32, Arc<HeapRb<f32>>>;

/// Sample rate of a headless context when the caller has no preference.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Signal generator connected to the context bus.
pub trait Voice: Send {
    /// Adds the next `out.len()` mono samples into `out`.
    fn render(&mut self, out: &mut [f32]);
}

type NodeId = u64;

struct Bus {
    voices: Vec<(NodeId, Box<dyn Voice>)>,
    monitor: Option<(NodeId, SampleProducer)>,
    next_id: NodeId,
    frames_rendered: u64,
}

impl Bus {
    fn new() -> Self {
        Self {
            voices: Vec::new(),
            monitor: None,
            next_id: 1,
            frames_rendered: 0,
        }
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn render(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);

        for (_, voice) in self.voices.iter_mut() {
            voice.render(out);
        }

        //
        // Hard clip the mix before it reaches the device or the monitor.
        //
        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        if let Some((_, producer)) = self.monitor.as_mut() {
            let _ = producer.push_slice(out);
        }

        self.frames_rendered += out.len() as u64;
    }
}

/// Connection of a voice to the bus. Disconnects on drop.
pub struct NodeHandle {
    id: NodeId,
    bus: Weak<Mutex<Bus>>,
}

impl NodeHandle {
    /// Removes the voice from the bus; idempotent.
    pub fn disconnect(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut bus = bus.lock();
            bus.voices.retain(|(id, _)| *id != self.id);
        }
        self.bus = Weak::new();
    }

    pub fn is_connected(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.lock().voices.iter().any(|(id, _)| *id == self.id),
            None => false,
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Ring buffer receiving a copy of everything the bus renders.
pub struct MonitorTap {
    id: NodeId,
    bus: Weak<Mutex<Bus>>,
    consumer: SampleConsumer,
}

impl MonitorTap {
    #[inline]
    pub fn pop(&mut self) -> Option<f32> {
        self.consumer.pop()
    }

    pub fn detach(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut bus = bus.lock();
            if matches!(&bus.monitor, Some((id, _)) if *id == self.id) {
                bus.monitor = None;
            }
        }
        self.bus = Weak::new();
    }
}

impl Drop for MonitorTap {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Shared audio context: output clock plus the voice bus.
pub struct AudioContext {
    bus: Arc<Mutex<Bus>>,
    sample_rate: u32,
    device_name: Option<String>,
    stream: Option<cpal::Stream>,
}

impl AudioContext {
    /// Opens the default output device and starts pulling from the bus.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AnalyzerError::AudioOutput("no output device".into()))?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| AnalyzerError::AudioOutput(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "Audio output: {} | {:?} @ {}Hz, Channels: {}",
            name,
            sample_format,
            config.sample_rate.0,
            config.channels
        );

        let bus = Arc::new(Mutex::new(Bus::new()));

        let stream = match sample_format {
            SampleFormat::F32 => build_output::<f32>(&device, &config, bus.clone()),
            SampleFormat::I16 => build_output::<i16>(&device, &config, bus.clone()),
            SampleFormat::U16 => build_output::<u16>(&device, &config, bus.clone()),
            other => {
                return Err(AnalyzerError::AudioOutput(format!(
                    "unsupported output sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| AnalyzerError::AudioOutput(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AnalyzerError::AudioOutput(e.to_string()))?;

        Ok(Self {
            bus,
            sample_rate: config.sample_rate.0,
            device_name: Some(name),
            stream: Some(stream),
        })
    }

    /// Context without a device; the bus only advances through `render`.
    pub fn headless(sample_rate: u32) -> Self {
        Self {
            bus: Arc::new(Mutex::new(Bus::new())),
            sample_rate,
            device_name: None,
            stream: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn is_headless(&self) -> bool {
        self.stream.is_none()
    }

    /// Adds a voice to the mix.
    pub fn connect(&self, voice: Box<dyn Voice>) -> NodeHandle {
        let mut bus = self.bus.lock();
        let id = bus.allocate_id();
        bus.voices.push((id, voice));
        NodeHandle {
            id,
            bus: Arc::downgrade(&self.bus),
        }
    }

    /// Installs a monitor tap holding up to `capacity` samples, replacing any previous one.
    pub fn attach_monitor(&self, capacity: usize) -> MonitorTap {
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let mut bus = self.bus.lock();
        let id = bus.allocate_id();
        bus.monitor = Some((id, producer));
        MonitorTap {
            id,
            bus: Arc::downgrade(&self.bus),
            consumer,
        }
    }

    /// Renders one block of the mix, advancing the audio clock.
    ///
    /// The device stream calls this from its callback; headless contexts are
    /// pumped by the caller.
    pub fn render(&self, out: &mut [f32]) {
        self.bus.lock().render(out);
    }

    pub fn connected_voices(&self) -> usize {
        self.bus.lock().voices.len()
    }

    pub fn has_monitor(&self) -> bool {
        self.bus.lock().monitor.is_some()
    }

    /// Frames rendered since the context was created.
    pub fn frames_rendered(&self) -> u64 {
        self.bus.lock().frames_rendered
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bus: Arc<Mutex<Bus>>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);
            bus.lock().render(&mut mono);

            //
            // Same mono signal on every channel.
            //
            for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono.iter()) {
                let value = <T as FromSample<f32>>::from_sample_(sample);
                for out in frame.iter_mut() {
                    *out = value;
                }
            }
        },
        |err| log::error!("Audio output error: {}", err),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl Voice for Constant {
        fn render(&mut self, out: &mut [f32]) {
            for s in out.iter_mut() {
                *s += self.0;
            }
        }
    }

    #[test]
    fn test_voices_mix_and_clip() {
        let ctx = AudioContext::headless(DEFAULT_SAMPLE_RATE);
        let _a = ctx.connect(Box::new(Constant(0.75)));
        let _b = ctx.connect(Box::new(Constant(0.5)));

        let mut out = [0.0f32; 8];
        ctx.render(&mut out);
        assert!(out.iter().all(|&s| s == 1.0));
        assert_eq!(ctx.frames_rendered(), 8);
    }

    #[test]
    fn test_disconnect_removes_voice() {
        let ctx = AudioContext::headless(DEFAULT_SAMPLE_RATE);
        let mut handle = ctx.connect(Box::new(Constant(0.25)));
        assert!(handle.is_connected());
        assert_eq!(ctx.connected_voices(), 1);

        handle.disconnect();
        handle.disconnect();
        assert!(!handle.is_connected());
        assert_eq!(ctx.connected_voices(), 0);

        let mut out = [1.0f32; 4];
        ctx.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_dropping_handle_disconnects() {
        let ctx = AudioContext::headless(DEFAULT_SAMPLE_RATE);
        {
            let _handle = ctx.connect(Box::new(Constant(0.25)));
            assert_eq!(ctx.connected_voices(), 1);
        }
        assert_eq!(ctx.connected_voices(), 0);
    }

    #[test]
    fn test_monitor_receives_mix_until_detached() {
        let ctx = AudioContext::headless(DEFAULT_SAMPLE_RATE);
        let _voice = ctx.connect(Box::new(Constant(0.5)));
        let mut tap = ctx.attach_monitor(16);

        let mut out = [0.0f32; 4];
        ctx.render(&mut out);
        let mut seen = Vec::new();
        while let Some(s) = tap.pop() {
            seen.push(s);
        }
        assert_eq!(seen, vec![0.5; 4]);

        drop(tap);
        assert!(!ctx.has_monitor());
    }

    #[test]
    fn test_stale_tap_does_not_detach_newer_one() {
        let ctx = AudioContext::headless(DEFAULT_SAMPLE_RATE);
        let old = ctx.attach_monitor(16);
        let _new = ctx.attach_monitor(16);
        drop(old);
        assert!(ctx.has_monitor());
    }
}
