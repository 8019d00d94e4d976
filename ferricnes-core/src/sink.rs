use crate::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Receives one completed 256x240 RGBA8888 frame per call.
pub trait VideoSink {
    fn write_frame(&mut self, frame_buffer: &[u32]);
    fn frame_written(&self) -> bool;
}

impl<S: VideoSink + ?Sized> VideoSink for Box<S> {
    fn write_frame(&mut self, frame_buffer: &[u32]) {
        (**self).write_frame(frame_buffer);
    }

    fn frame_written(&self) -> bool {
        (**self).frame_written()
    }
}

/// Receives mixed mono samples in [-1, 1], one batch per call.
pub trait AudioSink {
    fn write_samples(&mut self, samples: &[f32]);
    fn samples_written(&self) -> usize;
}

impl<A: AudioSink + ?Sized> AudioSink for Box<A> {
    fn write_samples(&mut self, samples: &[f32]) {
        (**self).write_samples(samples);
    }

    fn samples_written(&self) -> usize {
        (**self).samples_written()
    }
}

/// Keeps the most recent frame, for hosts that copy it out between frames.
pub struct VideoFrameSink {
    frame: Vec<u32>,
    frame_written: bool,
}

impl VideoFrameSink {
    pub fn new() -> Self {
        VideoFrameSink {
            frame: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frame_written: false,
        }
    }

    pub fn frame(&self) -> &[u32] {
        &self.frame
    }
}

impl Default for VideoFrameSink {
    fn default() -> Self {
        VideoFrameSink::new()
    }
}

impl VideoSink for VideoFrameSink {
    fn write_frame(&mut self, frame_buffer: &[u32]) {
        self.frame.copy_from_slice(frame_buffer);
        self.frame_written = true;
    }

    fn frame_written(&self) -> bool {
        self.frame_written
    }
}

/// Accumulates every sample batch, for hosts that resample asynchronously.
pub struct AudioBufferSink {
    samples: Vec<f32>,
}

impl AudioBufferSink {
    pub fn new() -> Self {
        AudioBufferSink {
            samples: Vec::new(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn drain(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }
}

impl Default for AudioBufferSink {
    fn default() -> Self {
        AudioBufferSink::new()
    }
}

impl AudioSink for AudioBufferSink {
    fn write_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    fn samples_written(&self) -> usize {
        self.samples.len()
    }
}

pub struct NullVideoSink {
    frame_written: bool,
}

impl NullVideoSink {
    pub fn new() -> Self {
        NullVideoSink {
            frame_written: false,
        }
    }
}

impl Default for NullVideoSink {
    fn default() -> Self {
        NullVideoSink::new()
    }
}

impl VideoSink for NullVideoSink {
    fn write_frame(&mut self, _frame_buffer: &[u32]) {
        self.frame_written = true;
    }

    fn frame_written(&self) -> bool {
        self.frame_written
    }
}

pub struct NullAudioSink {
    samples_written: usize,
}

impl NullAudioSink {
    pub fn new() -> Self {
        NullAudioSink { samples_written: 0 }
    }
}

impl Default for NullAudioSink {
    fn default() -> Self {
        NullAudioSink::new()
    }
}

impl AudioSink for NullAudioSink {
    fn write_samples(&mut self, samples: &[f32]) {
        self.samples_written += samples.len();
    }

    fn samples_written(&self) -> usize {
        self.samples_written
    }
}
