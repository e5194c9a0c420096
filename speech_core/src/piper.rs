//! Local Piper voices as a synthesis backend.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, RwLock},
    time::Instant,
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::{debug, info};

use crate::audio::AudioFormat;
use crate::backend::{SynthesisBackend, VoiceCatalog, VoiceInfo};
use crate::error::{PipelineError, SynthesisError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceEntry {
    pub config: String,
    /// Speaker of a multi-speaker model; `None` keeps the model default.
    pub speaker_id: Option<i64>,
}

impl VoiceEntry {
    // One loaded model per (config, speaker): the speaker is model state.
    fn cache_key(&self) -> String {
        match self.speaker_id {
            Some(sid) => format!("{}#speaker={sid}", self.config),
            None => self.config.clone(),
        }
    }
}

/// Voices available for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageVoices {
    pub default_voice: String,
    pub voices: HashMap<String, VoiceEntry>,
}

const LEGACY_VOICE_ID: &str = "default";

// Cached synthesizer and sample rate
struct CachedSynth {
    synth: Arc<RwLock<PiperSpeechSynthesizer>>,
    sample_rate: u32,
    last_accessed: Instant,
}

/// Catalog of Piper voices loaded from a `map.json` file.
pub struct PiperVoices {
    languages: HashMap<String, LanguageVoices>,
    default_language: String,
    format: AudioFormat,
    // VoiceEntry::cache_key -> loaded synthesizer
    cache: Arc<DashMap<String, CachedSynth>>,
    max_cached_models: usize,
}

impl PiperVoices {
    pub fn new(languages: HashMap<String, LanguageVoices>, default_language: &str, format: AudioFormat) -> Self {
        Self {
            languages,
            default_language: default_language.to_string(),
            format,
            cache: Arc::new(DashMap::new()),
            max_cached_models: 8,
        }
    }

    pub fn with_max_cached_models(mut self, max: usize) -> Self {
        self.max_cached_models = max.max(1);
        self
    }

    /// Load from a voice map file (usually `models/map.json`).
    pub fn from_mapfile<P: AsRef<Path>>(p: P, default_language: &str, format: AudioFormat) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to load {}", p.as_ref().display()))?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| "voice map is not valid JSON")?;
        let languages = parse_voice_map(&json)?;
        Ok(Self::new(languages, default_language, format))
    }

    fn entry_for(&self, language: &str, voice: Option<&str>) -> anyhow::Result<&VoiceEntry> {
        let voices = self
            .languages
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("Unknown language key: {language}"))?;
        let voice_id = voice.unwrap_or(voices.default_voice.as_str());
        voices.voices.get(voice_id).ok_or_else(|| {
            let mut known: Vec<&str> = voices.voices.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow::anyhow!(
                "Unknown voice '{voice_id}' for language '{language}'. Available voices: {}",
                known.join(", ")
            )
        })
    }

    /// Read sample rate from model config JSON
    fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<u32> {
        let text = fs::read_to_string(cfg_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| "Config file is not valid JSON")?;

        let sample_rate = json
            .get("audio")
            .and_then(|a| a.get("sample_rate"))
            .and_then(|sr| sr.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

        Ok(sample_rate as u32)
    }

    /// Load (or reuse) the model for `entry`. Blocks while a model loads.
    fn get_or_create_synth(&self, entry: &VoiceEntry) -> anyhow::Result<(Arc<RwLock<PiperSpeechSynthesizer>>, u32)> {
        let key = entry.cache_key();
        if let Some(mut cached) = self.cache.get_mut(&key) {
            cached.last_accessed = Instant::now();
            return Ok((cached.synth.clone(), cached.sample_rate));
        }

        let cfg_path = entry.config.as_str();
        let sample_rate = Self::read_sample_rate(cfg_path)?;
        let model = piper_rs::from_config_path(Path::new(cfg_path))
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        if let Some(sid) = entry.speaker_id {
            if let Some(e) = model.set_speaker(sid) {
                return Err(anyhow::anyhow!("speaker {sid} rejected by {cfg_path}: {e}"));
            }
        }
        let synth = Arc::new(RwLock::new(PiperSpeechSynthesizer::new(model)?));
        info!(config = cfg_path, speaker = ?entry.speaker_id, sample_rate, "Loaded Piper model");

        if self.cache.len() >= self.max_cached_models {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|cached| cached.last_accessed)
                .map(|cached| cached.key().clone());
            if let Some(evicted) = oldest {
                debug!(model = %evicted, "Evicting Piper model");
                self.cache.remove(&evicted);
            }
        }

        self.cache.insert(
            key,
            CachedSynth {
                synth: synth.clone(),
                sample_rate,
                last_accessed: Instant::now(),
            },
        );
        Ok((synth, sample_rate))
    }
}

impl VoiceCatalog for PiperVoices {
    fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.languages.keys().cloned().collect();
        langs.sort();
        langs
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        let mut out: Vec<VoiceInfo> = self
            .languages
            .iter()
            .flat_map(|(lang, voices)| {
                voices.voices.iter().map(move |(id, entry)| VoiceInfo {
                    language: lang.clone(),
                    voice: Some(id.clone()),
                    config: entry.config.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| (&a.language, &a.voice).cmp(&(&b.language, &b.voice)));
        out
    }

    fn resolve(
        &self,
        language: Option<&str>,
        voice: Option<&str>,
    ) -> Result<Arc<dyn SynthesisBackend>, PipelineError> {
        let language = language.unwrap_or(self.default_language.as_str());
        let unavailable = |e: anyhow::Error| PipelineError::BackendUnavailable(format!("{e:#}"));

        let entry = self.entry_for(language, voice).map_err(unavailable)?;
        let (synth, sample_rate) = self.get_or_create_synth(entry).map_err(unavailable)?;
        let header = self.format.stream_header(sample_rate).map_err(unavailable)?;

        Ok(Arc::new(PiperBackend {
            synth,
            sample_rate,
            format: self.format,
            header,
        }))
    }
}

/// One loaded Piper voice.
pub struct PiperBackend {
    synth: Arc<RwLock<PiperSpeechSynthesizer>>,
    sample_rate: u32,
    format: AudioFormat,
    header: Option<Bytes>,
}

#[async_trait]
impl SynthesisBackend for PiperBackend {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        let synth = self.synth.clone();
        let text = text.to_string();
        let format = self.format;

        // Piper inference is CPU bound, keep it off the async workers.
        tokio::task::spawn_blocking(move || -> anyhow::Result<Bytes> {
            let synth = synth
                .read()
                .map_err(|_| anyhow::anyhow!("Synthesizer lock poisoned"))?;
            let iter: PiperSpeechStreamParallel = synth
                .synthesize_parallel(text, None)
                .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

            let mut samples: Vec<f32> = Vec::new();
            for part in iter {
                samples.extend(part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?.into_vec());
            }
            Ok(format.encode(&samples))
        })
        .await
        .map_err(|e| SynthesisError::TaskFailed(e.to_string()))?
        .map_err(SynthesisError::from)
    }

    fn content_type(&self) -> String {
        self.format.content_type(self.sample_rate)
    }

    fn stream_header(&self) -> Option<Bytes> {
        self.header.clone()
    }
}

/// Parse a voice map.
///
/// Accepted entry shapes per language key:
/// - `"path/to/voice.onnx.json"`
/// - `{ "config": "...", "default_speaker": 3 }`
/// - `{ "default_voice": "a", "voices": { "a": { "config": "...", "speaker_id": 0 } } }`
pub fn parse_voice_map(json: &serde_json::Value) -> anyhow::Result<HashMap<String, LanguageVoices>> {
    let obj = json
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("voice map must be a JSON object"))?;

    let mut languages = HashMap::new();
    for (lang, v) in obj {
        let parsed = match v {
            serde_json::Value::String(path) => legacy(path.clone(), None),
            serde_json::Value::Object(o) if o.contains_key("voices") => {
                let default_voice = o
                    .get("default_voice")
                    .and_then(|x| x.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'default_voice' for language {lang}"))?
                    .to_string();
                let voices_obj = o
                    .get("voices")
                    .and_then(|x| x.as_object())
                    .ok_or_else(|| anyhow::anyhow!("missing 'voices' object for language {lang}"))?;

                let mut voices = HashMap::new();
                for (voice_id, voice_data) in voices_obj {
                    let config = voice_data
                        .get("config")
                        .and_then(|x| x.as_str())
                        .ok_or_else(|| anyhow::anyhow!("missing 'config' for voice {voice_id}"))?
                        .to_string();
                    let speaker_id = voice_data.get("speaker_id").and_then(|x| x.as_i64());
                    voices.insert(voice_id.clone(), VoiceEntry { config, speaker_id });
                }
                if !voices.contains_key(&default_voice) {
                    return Err(anyhow::anyhow!(
                        "default voice '{default_voice}' not listed for language {lang}"
                    ));
                }
                LanguageVoices { default_voice, voices }
            }
            serde_json::Value::Object(o) => {
                let config = o
                    .get("config")
                    .and_then(|x| x.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'config' for key {lang}"))?
                    .to_string();
                legacy(config, o.get("default_speaker").and_then(|x| x.as_i64()))
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "invalid entry for key {lang} (expected string or object)"
                ));
            }
        };
        languages.insert(lang.clone(), parsed);
    }
    Ok(languages)
}

fn legacy(config: String, speaker_id: Option<i64>) -> LanguageVoices {
    LanguageVoices {
        default_voice: LEGACY_VOICE_ID.to_string(),
        voices: HashMap::from([(LEGACY_VOICE_ID.to_string(), VoiceEntry { config, speaker_id })]),
    }
}
