use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::warn;

use crate::error::EmuError;

const TONE_HZ: f32 = 440.0;
/// One frame's worth of tone.
const TONE_DURATION: Duration = Duration::from_millis(16);

pub trait Sound {
    /// Starts a short tone and returns immediately.
    fn beep(&mut self);
}

impl<S: Sound + ?Sized> Sound for Box<S> {
    fn beep(&mut self) {
        (**self).beep()
    }
}

/// Plays a sine tone on the default output device.
pub struct CpalSound {
    config: cpal::StreamConfig,
    format: cpal::SampleFormat,
}

impl CpalSound {
    pub fn new() -> Result<Self, EmuError> {
        let device = default_device()?;
        let supported_config = device
            .supported_output_configs()
            .map_err(backend)?
            .next()
            .ok_or_else(|| EmuError::Backend("no supported output config".into()))?
            .with_max_sample_rate();
        let format = supported_config.sample_format();
        Ok(Self {
            config: supported_config.into(),
            format,
        })
    }
}

impl Sound for CpalSound {
    fn beep(&mut self) {
        let config = self.config.clone();
        let format = self.format;
        // detached: the engine never waits on the tone
        let spawned = thread::Builder::new()
            .name("beep".into())
            .spawn(move || {
                if let Err(e) = play(&config, format) {
                    warn!("beep failed: {e}");
                }
            });
        if let Err(e) = spawned {
            warn!("could not start beep thread: {e}");
        }
    }
}

fn backend(err: impl std::fmt::Display) -> EmuError {
    EmuError::Backend(err.to_string())
}

fn default_device() -> Result<cpal::Device, EmuError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| EmuError::Backend("no output device available".into()))
}

fn play(config: &cpal::StreamConfig, format: cpal::SampleFormat) -> Result<(), EmuError> {
    let device = default_device()?;
    match format {
        cpal::SampleFormat::I8 => run::<i8>(&device, config),
        cpal::SampleFormat::I16 => run::<i16>(&device, config),
        cpal::SampleFormat::I32 => run::<i32>(&device, config),
        cpal::SampleFormat::I64 => run::<i64>(&device, config),
        cpal::SampleFormat::U8 => run::<u8>(&device, config),
        cpal::SampleFormat::U16 => run::<u16>(&device, config),
        cpal::SampleFormat::U32 => run::<u32>(&device, config),
        cpal::SampleFormat::U64 => run::<u64>(&device, config),
        cpal::SampleFormat::F32 => run::<f32>(&device, config),
        cpal::SampleFormat::F64 => run::<f64>(&device, config),
        sample_format => Err(backend(format!(
            "unsupported sample format '{sample_format}'"
        ))),
    }
}

fn run<T>(device: &cpal::Device, config: &cpal::StreamConfig) -> Result<(), EmuError>
where
    T: SizedSample + FromSample<f32>,
{
    let sample_rate = config.sample_rate.0 as f32;
    let channels = config.channels as usize;

    let mut sample_clock = 0f32;
    let mut next_value = move || {
        sample_clock = (sample_clock + 1.0) % sample_rate;
        (sample_clock * TONE_HZ * 2.0 * std::f32::consts::PI / sample_rate).sin()
    };

    let err_fn = |err| warn!("an error occurred on stream: {err}");

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                write_data(data, channels, &mut next_value)
            },
            err_fn,
            None,
        )
        .map_err(backend)?;

    stream.play().map_err(backend)?;
    thread::sleep(TONE_DURATION);
    Ok(())
}

fn write_data<T>(output: &mut [T], channels: usize, next_sample: &mut dyn FnMut() -> f32)
where
    T: Sample + FromSample<f32>,
{
    for frame in output.chunks_mut(channels) {
        let value: T = T::from_sample(next_sample());
        for sample in frame.iter_mut() {
            *sample = value;
        }
    }
}

/// Swallows every beep.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mute;

impl Sound for Mute {
    fn beep(&mut self) {}
}
