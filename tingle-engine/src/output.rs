//! Realtime output through `cpal`.
//!
//! Device and stream-config selection follow the usual pattern: honour an
//! explicit device name, otherwise the host default; if a sample rate or channel
//! count is requested, pick the supported range with the smallest mismatch.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::context::Backend;
use crate::error::{EngineError, Result};
use crate::graph::Renderer;

/// Initial interleaved scratch size for non-f32 devices; grows if a callback asks for more.
const SCRATCH_SAMPLES: usize = 8192;

fn unsupported(e: impl std::fmt::Display) -> EngineError {
    EngineError::Unsupported(e.to_string())
}

/// Names of every output device on the default host.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for dev in host.output_devices().map_err(unsupported)? {
        names.push(dev.name().map_err(unsupported)?);
    }
    Ok(names)
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices().map_err(unsupported)? {
            if d.name().map_err(unsupported)? == name {
                return Ok(d);
            }
        }
        return Err(EngineError::Unsupported(format!("requested device not found: {name}")));
    }
    host.default_output_device()
        .ok_or_else(|| EngineError::Unsupported("no default output device".into()))
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig> {
    if req_sr.is_none() && req_ch.is_none() {
        return device.default_output_config().map_err(unsupported);
    }

    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs().map_err(unsupported)? {
        let ch = range.channels();
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;

        let ch_pen = req_ch.map_or(0, |c| u64::from(ch.abs_diff(c)));
        let sr_pen = match req_sr {
            Some(sr) if (sr_min..=sr_max).contains(&sr) => 0,
            Some(sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
            None => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or_else(|| EngineError::Unsupported("no supported output configs".into()))?;
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(pick_sr))
}

/// Whole frames only, so chunks never split a frame.
fn scratch_for(channels: usize) -> Vec<f32> {
    vec![0.0; (SCRATCH_SAMPLES / channels).max(1) * channels]
}

/// Render a device buffer of any size through the fixed scratch, chunk by chunk.
fn render_into<T>(renderer: &mut Renderer, scratch: &mut [f32], output: &mut [T], channels: usize)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    for out in output.chunks_mut(scratch.len()) {
        let buf = &mut scratch[..out.len()];
        renderer.process(buf, channels);
        for (o, &s) in out.iter_mut().zip(buf.iter()) {
            *o = T::from_sample(s);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(cfg.channels).max(1);
    let mut scratch = scratch_for(channels);

    let stream = device
        .build_output_stream(
            cfg,
            move |output: &mut [T], _| render_into(&mut renderer, &mut scratch, output, channels),
            |e| error!("output stream error: {e}"),
            None,
        )
        .map_err(unsupported)?;
    Ok(stream)
}

/// Output on a `cpal` device.
///
/// The stream is built on [`Backend::attach`] and immediately paused; it only
/// plays after [`Backend::resume`].
pub struct CpalBackend {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: cpal::SampleFormat,
    stream: Option<cpal::Stream>,
    running: bool,
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("config", &self.config)
            .field("format", &self.format)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl CpalBackend {
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let device = pick_device(config.device_name.as_deref())?;
        let supported = choose_config(&device, config.sample_rate, config.channels)?;
        let format = supported.sample_format();
        let mut stream_cfg = supported.config();
        if let Some(sr) = config.sample_rate {
            stream_cfg.sample_rate = cpal::SampleRate(sr);
        }
        if let Some(ch) = config.channels {
            stream_cfg.channels = ch;
        }

        info!(
            device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
            sample_rate = stream_cfg.sample_rate.0,
            channels = stream_cfg.channels,
            ?format,
            "output selected"
        );
        Ok(Self { device, config: stream_cfg, format, stream: None, running: false })
    }
}

impl Backend for CpalBackend {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn attach(&mut self, renderer: Renderer) -> Result<()> {
        let stream = match self.format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &self.config, renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &self.config, renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &self.config, renderer)?,
            other => return Err(EngineError::Unsupported(format!("device sample format {other:?}"))),
        };
        // Some hosts start streams on creation.
        if let Err(e) = stream.pause() {
            debug!("pause after build not supported: {e}");
        }
        self.stream = Some(stream);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| EngineError::Backend("no stream attached".into()))?;
        stream.play().map_err(|e| EngineError::Backend(e.to_string()))?;
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn close(&mut self) -> Result<()> {
        self.running = false;
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| EngineError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}
