// Windows-style INI configuration as shipped next to the game executable.
// Section and key names are matched case-insensitively; unknown keys get a
// warning and are otherwise ignored so that title-specific extras don't
// block startup.

use std::fs;
use std::path::Path;

use log::warn;

use crate::{Result, VmError};

#[derive(Debug, Clone, Default)]
pub struct FileEntry {
    pub arc: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    // [CONFIG]
    pub title: Option<String>,
    pub start_mes: String,
    pub voice: bool,
    pub sound: bool,
    pub music: bool,
    pub effect: bool,
    pub screen: bool,
    pub notify: bool,

    // [FILE]
    pub bg: FileEntry,
    pub mes: FileEntry,
    pub bgm: FileEntry,
    pub voice_file: FileEntry,
    pub effect_file: FileEntry,
    pub data: FileEntry,
    pub priv_file: FileEntry,
    pub cddrv: Option<String>,

    // [GRAPHICS] / [MES] / [DATA]
    pub bg_type: bool,
    pub mes_type: bool,
    pub data_type: bool,

    // [MONITOR]
    pub monitor: i32,

    // [VOLUME] / [VOLUMEINFO]
    pub volume_music: i32,
    pub volume_se: i32,
    pub volume_effect: i32,
    pub volume_voice: i32,

    // [SOUNDINFO]
    pub mute_music: bool,
    pub mute_effect: bool,
    pub mute_voice: bool,

    // runtime tunables, not stored in the INI
    pub msg_skip_delay: u32,
    pub transition_speed: f32,
    pub font_path: Option<String>,
    pub save_dir: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            title: None,
            start_mes: String::from("MAIN.MES"),
            voice: true,
            sound: true,
            music: true,
            effect: true,
            screen: false,
            notify: false,
            bg: FileEntry::default(),
            mes: FileEntry::default(),
            bgm: FileEntry::default(),
            voice_file: FileEntry::default(),
            effect_file: FileEntry::default(),
            data: FileEntry::default(),
            priv_file: FileEntry::default(),
            cddrv: None,
            bg_type: false,
            mes_type: false,
            data_type: false,
            monitor: 0,
            volume_music: 31,
            volume_se: 31,
            volume_effect: 31,
            volume_voice: 31,
            mute_music: false,
            mute_effect: false,
            mute_voice: false,
            msg_skip_delay: 16,
            transition_speed: 1.0,
            font_path: None,
            save_dir: std::path::PathBuf::from("."),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.trim().parse::<i64>().map(|v| v != 0).unwrap_or(false)
}

fn parse_int(value: &str) -> i32 {
    value.trim().parse::<i32>().unwrap_or(0)
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .map_err(|e| VmError::User(format!("couldn't read \"{}\": {}", path.display(), e)))?;
        let mut config = Config::default();
        config.parse(&text);
        Ok(config)
    }

    pub fn parse(&mut self, text: &str) {
        let mut section = String::new();
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                section = line.trim_matches(|c| c == '[' || c == ']').to_ascii_uppercase();
                continue;
            }
            let (name, value) = match line.split_once('=') {
                Some((n, v)) => (n.trim().to_ascii_uppercase(), v.trim()),
                None => {
                    warn!("Malformed INI line: {}", line);
                    continue;
                }
            };
            self.apply(&section, &name, value);
        }
    }

    fn apply(&mut self, section: &str, name: &str, value: &str) {
        match (section, name) {
            ("CONFIG", "TITLE") => self.title = Some(value.to_string()),
            ("CONFIG", "STARTMES") => self.start_mes = value.to_string(),
            ("CONFIG", "VOICE") => self.voice = parse_bool(value),
            ("CONFIG", "SOUND") => self.sound = parse_bool(value),
            ("CONFIG", "MUSIC") => self.music = parse_bool(value),
            ("CONFIG", "EFFECT") => self.effect = parse_bool(value),
            ("CONFIG", "SCREEN") => self.screen = parse_bool(value),
            ("CONFIG", "BNOTIFY") => self.notify = parse_bool(value),
            ("FILE", "BARCBG") => self.bg.arc = parse_bool(value),
            ("FILE", "BARCMES") => self.mes.arc = parse_bool(value),
            ("FILE", "BARCBGM") => self.bgm.arc = parse_bool(value),
            ("FILE", "BARCVOICE") => self.voice_file.arc = parse_bool(value),
            ("FILE", "BARCEFFECT") => self.effect_file.arc = parse_bool(value),
            ("FILE", "BARCDATA") => self.data.arc = parse_bool(value),
            ("FILE", "BARCPRIV") => self.priv_file.arc = parse_bool(value),
            ("FILE", "ARCBGNAME") => self.bg.name = Some(value.to_string()),
            ("FILE", "ARCMESNAME") => self.mes.name = Some(value.to_string()),
            ("FILE", "ARCBGMNAME") => self.bgm.name = Some(value.to_string()),
            ("FILE", "ARCVOICENAME") => self.voice_file.name = Some(value.to_string()),
            ("FILE", "ARCEFFECTNAME") => self.effect_file.name = Some(value.to_string()),
            ("FILE", "ARCDATANAME") => self.data.name = Some(value.to_string()),
            ("FILE", "ARCSPECIALNAME") => self.priv_file.name = Some(value.to_string()),
            ("FILE", "CDDRV") => self.cddrv = Some(value.to_string()),
            ("GRAPHICS", "BBGTYPE") => self.bg_type = parse_bool(value),
            ("MES", "BMESTYPE") => self.mes_type = parse_bool(value),
            ("DATA", "BDATATYPE") => self.data_type = parse_bool(value),
            ("MONITOR", "SCREEN") => self.monitor = parse_int(value),
            ("VOLUME", "MUSIC") | ("VOLUMEINFO", "MUSIC") => self.volume_music = parse_int(value),
            ("VOLUME", "SE") | ("VOLUMEINFO", "SE") => self.volume_se = parse_int(value),
            ("VOLUME", "EFFECT") | ("VOLUMEINFO", "EFFECT") => {
                self.volume_effect = parse_int(value)
            }
            ("VOLUME", "VOICE") | ("VOLUMEINFO", "VOICE") => self.volume_voice = parse_int(value),
            ("SOUNDINFO", "MUSIC") => self.mute_music = !parse_bool(value),
            ("SOUNDINFO", "EFFECT") => self.mute_effect = !parse_bool(value),
            ("SOUNDINFO", "VOICE") => self.mute_voice = !parse_bool(value),
            _ => warn!("Unknown INI value: {}.{}", section, name),
        }
    }

    /// Apply the default archive names the stock runtime assumes when the
    /// INI flags a type as archived without naming the archive.
    pub fn apply_default_names(&mut self) {
        fn default_name(e: &mut FileEntry, name: &str) {
            if e.arc && e.name.is_none() {
                e.name = Some(name.to_string());
            }
        }
        default_name(&mut self.bg, "BG.ARC");
        default_name(&mut self.mes, "MES.ARC");
        default_name(&mut self.bgm, "BGM.ARC");
        default_name(&mut self.voice_file, "VOICE.ARC");
        default_name(&mut self.effect_file, "BGM.ARC");
        default_name(&mut self.data, "DATA.ARC");
        default_name(&mut self.priv_file, "PRIV.ARC");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_sections() {
        let mut config = Config::default();
        config.parse(
            "[CONFIG]\n\
             TITLE=Test Title\n\
             STARTMES=START.MES\n\
             MUSIC=1\n\
             [FILE]\n\
             bARCMES=1\n\
             ARCMESNAME=SCRIPT.ARC\n\
             [VOLUME]\n\
             MUSIC=20\n\
             ; comment\n\
             [MONITOR]\n\
             SCREEN=1\n",
        );
        assert_eq!(config.title.as_deref(), Some("Test Title"));
        assert_eq!(config.start_mes, "START.MES");
        assert!(config.mes.arc);
        assert_eq!(config.mes.name.as_deref(), Some("SCRIPT.ARC"));
        assert_eq!(config.volume_music, 20);
        assert_eq!(config.monitor, 1);
    }

    #[test]
    fn default_archive_names() {
        let mut config = Config::default();
        config.parse("[FILE]\nbARCBG=1\n");
        config.apply_default_names();
        assert_eq!(config.bg.name.as_deref(), Some("BG.ARC"));
        assert_eq!(config.mes.name, None);
    }
}
