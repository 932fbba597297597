// Sampled-audio channels over rodio. One sink per logical channel; fade
// envelopes are advanced from the VM's cooperative pump rather than a
// thread of our own, so channel state is only ever touched from the
// interpreter loop.

use std::io::Cursor;

use log::warn;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::asset::{AssetType, Assets};

pub const NR_SE_CHANNELS: usize = 3;
pub const NR_VOICE_CHANNELS: usize = 2;
pub const MAX_VOLUME: u8 = 31;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Channel {
    Bgm,
    Se(usize),
    Voice(usize),
    VoiceSub,
}

impl Channel {
    fn index(self) -> usize {
        match self {
            Channel::Bgm => 0,
            Channel::Se(n) => 1 + n.min(NR_SE_CHANNELS - 1),
            Channel::Voice(n) => 1 + NR_SE_CHANNELS + n.min(NR_VOICE_CHANNELS - 1),
            Channel::VoiceSub => 1 + NR_SE_CHANNELS + NR_VOICE_CHANNELS,
        }
    }

    fn asset_type(self) -> AssetType {
        match self {
            Channel::Bgm => AssetType::Bgm,
            Channel::Se(_) => AssetType::Effect,
            Channel::Voice(_) | Channel::VoiceSub => AssetType::Voice,
        }
    }
}

const NR_CHANNELS: usize = 2 + NR_SE_CHANNELS + NR_VOICE_CHANNELS;

struct Fade {
    start_t: u32,
    duration: u32,
    from_vol: u8,
    to_vol: u8,
    stop_when_done: bool,
}

struct ChannelState {
    sink: Option<Sink>,
    name: Option<String>,
    volume: u8,
    saved_volume: u8,
    muted: bool,
    fade: Option<Fade>,
}

struct Backend {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

pub struct Audio {
    backend: Option<Backend>,
    channels: Vec<ChannelState>,
}

fn gain(volume: u8) -> f32 {
    volume.min(MAX_VOLUME) as f32 / MAX_VOLUME as f32
}

impl Audio {
    pub fn new(enabled: bool) -> Audio {
        let backend = if enabled {
            match OutputStream::try_default() {
                Ok((stream, handle)) => Some(Backend { _stream: stream, handle }),
                Err(e) => {
                    warn!("Failed to open audio device: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let channels = (0..NR_CHANNELS)
            .map(|_| ChannelState {
                sink: None,
                name: None,
                volume: MAX_VOLUME,
                saved_volume: MAX_VOLUME,
                muted: false,
                fade: None,
            })
            .collect();
        Audio { backend, channels }
    }

    pub fn set_initial_volume(&mut self, ch: Channel, volume: u8, muted: bool) {
        let c = &mut self.channels[ch.index()];
        c.volume = volume.min(MAX_VOLUME);
        c.saved_volume = c.volume;
        c.muted = muted;
    }

    pub fn play(&mut self, ch: Channel, assets: &Assets, name: &str, check_playing: bool) {
        if check_playing && self.is_playing(ch) && self.channels[ch.index()].name.as_deref() == Some(name) {
            return;
        }
        let data = match assets.audio_load(ch.asset_type(), name) {
            Some(d) => d,
            None => {
                warn!("Failed to load audio \"{}\"", name);
                return;
            }
        };
        let i = ch.index();
        self.channels[i].fade = None;
        self.channels[i].name = Some(name.to_string());
        let backend = match &self.backend {
            Some(b) => b,
            None => return,
        };
        let sink = match Sink::try_new(&backend.handle) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to create audio sink: {}", e);
                return;
            }
        };
        match Decoder::new(Cursor::new(data)) {
            Ok(source) => sink.append(source),
            Err(e) => {
                warn!("Failed to decode audio \"{}\": {}", name, e);
                return;
            }
        }
        let c = &mut self.channels[i];
        sink.set_volume(if c.muted { 0.0 } else { gain(c.volume) });
        c.sink = Some(sink);
    }

    pub fn stop(&mut self, ch: Channel) {
        let c = &mut self.channels[ch.index()];
        if let Some(sink) = c.sink.take() {
            sink.stop();
        }
        c.fade = None;
        c.name = None;
    }

    pub fn set_volume(&mut self, ch: Channel, volume: u8) {
        let c = &mut self.channels[ch.index()];
        c.volume = volume.min(MAX_VOLUME);
        c.fade = None;
        if let Some(sink) = &c.sink {
            if !c.muted {
                sink.set_volume(gain(c.volume));
            }
        }
    }

    pub fn restore_volume(&mut self, ch: Channel) {
        let v = self.channels[ch.index()].saved_volume;
        self.set_volume(ch, v);
    }

    pub fn is_playing(&self, ch: Channel) -> bool {
        match &self.channels[ch.index()].sink {
            Some(sink) => !sink.empty(),
            None => false,
        }
    }

    pub fn is_fading(&self, ch: Channel) -> bool {
        self.channels[ch.index()].fade.is_some()
    }

    /// Begin a fade to `volume` over `ms`. `sync` waiting is done by the
    /// VM, which pumps `update` until `is_fading` clears.
    pub fn fade(&mut self, ch: Channel, volume: u8, ms: u32, stop: bool, now: u32) {
        let c = &mut self.channels[ch.index()];
        if c.sink.is_none() {
            return;
        }
        c.saved_volume = c.volume;
        c.fade = Some(Fade {
            start_t: now,
            duration: ms.max(1),
            from_vol: c.volume,
            to_vol: volume.min(MAX_VOLUME),
            stop_when_done: stop,
        });
    }

    pub fn fade_out(&mut self, ch: Channel, ms: u32, now: u32) {
        self.fade(ch, 0, ms, true, now);
    }

    /// Advance fade envelopes. Called from every pump.
    pub fn update(&mut self, now: u32) {
        for c in &mut self.channels {
            let finished = match &c.fade {
                Some(f) => {
                    let t = now.wrapping_sub(f.start_t);
                    let vol = if t >= f.duration {
                        f.to_vol as f32
                    } else {
                        let rate = t as f32 / f.duration as f32;
                        f.from_vol as f32 + (f.to_vol as f32 - f.from_vol as f32) * rate
                    };
                    if let Some(sink) = &c.sink {
                        if !c.muted {
                            sink.set_volume(vol / MAX_VOLUME as f32);
                        }
                    }
                    t >= f.duration
                }
                None => false,
            };
            if finished {
                let fade = c.fade.take().unwrap();
                c.volume = fade.to_vol;
                if fade.stop_when_done {
                    if let Some(sink) = c.sink.take() {
                        sink.stop();
                    }
                    c.name = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_indices_are_disjoint() {
        let mut seen = Vec::new();
        let channels = [
            Channel::Bgm,
            Channel::Se(0),
            Channel::Se(1),
            Channel::Se(2),
            Channel::Voice(0),
            Channel::Voice(1),
            Channel::VoiceSub,
        ];
        for ch in channels.iter() {
            let i = ch.index();
            assert!(!seen.contains(&i));
            seen.push(i);
        }
        assert!(seen.iter().all(|&i| i < NR_CHANNELS));
    }

    #[test]
    fn fade_envelope_completes() {
        let mut audio = Audio::new(false);
        // no sink in headless mode, so fade is a no-op
        audio.fade(Channel::Bgm, 0, 100, true, 0);
        assert!(!audio.is_fading(Channel::Bgm));
        audio.update(200);
        assert!(!audio.is_playing(Channel::Bgm));
    }
}
