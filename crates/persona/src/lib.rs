//! Declarative YAML persona loading and system-prompt hydration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// A single behavioral trait or cognitive bias entry. Persona authors may
/// write either a plain string or a one-key mapping (`trait_name: detail`);
/// both flatten to the same instructional line.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TraitEntry {
    Plain(String),
    KeyValue(HashMap<String, String>),
}

impl TraitEntry {
    fn render(&self) -> String {
        match self {
            TraitEntry::Plain(s) => s.clone(),
            TraitEntry::KeyValue(map) => map
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Demographics {
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default = "unknown")]
    pub age: String,
    #[serde(default = "unknown")]
    pub location: String,
    #[serde(default = "default_average")]
    pub socioeconomic: String,
    #[serde(default = "default_average")]
    pub technical_literacy: String,
}

fn unknown() -> String {
    "unknown".to_string()
}
fn default_average() -> String {
    "average".to_string()
}
fn default_calm() -> String {
    "calm".to_string()
}
fn default_anxious() -> String {
    "anxious".to_string()
}
fn default_casual() -> String {
    "casual".to_string()
}
fn default_jargon() -> String {
    "highly technical jargon".to_string()
}
fn default_moderate() -> String {
    "moderate".to_string()
}
fn default_bait() -> String {
    "ask natural questions".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmotionalModeling {
    #[serde(default = "default_calm")]
    pub baseline: String,
    #[serde(default = "default_anxious")]
    pub under_pressure: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Traits {
    #[serde(default)]
    pub behavioral: Vec<TraitEntry>,
    #[serde(default)]
    pub cognitive_biases: Vec<TraitEntry>,
    #[serde(default)]
    pub emotional_modeling: EmotionalModeling,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Linguistic {
    #[serde(default = "default_casual")]
    pub style: String,
    #[serde(default = "default_jargon")]
    pub vocabulary_limits: String,
}

impl Default for Linguistic {
    fn default() -> Self {
        Self {
            style: default_casual(),
            vocabulary_limits: default_jargon(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngagementRules {
    #[serde(default = "default_moderate")]
    pub risk_tolerance: String,
    #[serde(default = "default_bait")]
    pub extraction_bait: String,
}

impl Default for EngagementRules {
    fn default() -> Self {
        Self {
            risk_tolerance: default_moderate(),
            extraction_bait: default_bait(),
        }
    }
}

/// Static, loaded-at-startup, immutable after load. Unknown top-level or
/// nested keys in the source YAML are ignored, not rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub demographics: Demographics,
    #[serde(default)]
    pub traits: Traits,
    #[serde(default)]
    pub linguistic: Linguistic,
    #[serde(default)]
    pub engagement_rules: EngagementRules,
}

impl Persona {
    /// Hydrate into the system-prompt block the orchestrator prepends to
    /// every LLM call for this session.
    pub fn build_system_prompt_segment(&self) -> String {
        let demo = &self.demographics;
        let behavioral: Vec<String> = self.traits.behavioral.iter().map(TraitEntry::render).collect();
        let biases: Vec<String> = self
            .traits
            .cognitive_biases
            .iter()
            .map(TraitEntry::render)
            .collect();

        format!(
            "You are {name}, aged {age} from {location}.\n\
             Socioeconomic background: {socio}\n\
             Technical literacy: {tech}\n\n\
             # BEHAVIORAL TRAITS (CRITICAL)\n\
             - {behavioral}\n\n\
             # COGNITIVE BIASES\n\
             - {biases}\n\n\
             # EMOTIONAL STATE\n\
             - Baseline: {baseline}\n\
             - Under Pressure: {under_pressure}\n\n\
             # LINGUISTIC STYLE\n\
             - {style}\n\
             - DO NOT UNDERSTAND: {vocab_limits}\n\n\
             # CORE DIRECTIVES & RISK TOLERANCE\n\
             - {risk_tolerance}\n\
             - TACTIC: {extraction_bait}\n",
            name = demo.name,
            age = demo.age,
            location = demo.location,
            socio = demo.socioeconomic,
            tech = demo.technical_literacy,
            behavioral = behavioral.join("\n- "),
            biases = biases.join("\n- "),
            baseline = self.traits.emotional_modeling.baseline,
            under_pressure = self.traits.emotional_modeling.under_pressure,
            style = self.linguistic.style,
            vocab_limits = self.linguistic.vocabulary_limits,
            risk_tolerance = self.engagement_rules.risk_tolerance,
            extraction_bait = self.engagement_rules.extraction_bait,
        )
    }
}

/// Loads externalized YAML persona files and caches the hydrated result by
/// persona id.
pub struct PersonaEngine {
    template_dir: PathBuf,
    cache: RwLock<HashMap<String, Persona>>,
}

impl PersonaEngine {
    pub fn new(template_dir: impl AsRef<Path>) -> Self {
        Self {
            template_dir: template_dir.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn load_persona(&self, persona_id: &str) -> Result<Persona> {
        if let Some(cached) = self.cache.read().unwrap().get(persona_id) {
            return Ok(cached.clone());
        }

        let path = self.template_dir.join(format!("{persona_id}.yml"));
        if !path.exists() {
            bail!("persona template not found: {}", path.display());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading persona file {}", path.display()))?;
        let persona: Persona = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing persona file {}", path.display()))?;

        self.cache
            .write()
            .unwrap()
            .insert(persona_id.to_string(), persona.clone());
        Ok(persona)
    }

    pub fn build_system_prompt_segment(&self, persona_id: &str) -> Result<String> {
        Ok(self.load_persona(persona_id)?.build_system_prompt_segment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("personas")
    }

    #[test]
    fn loads_and_hydrates_bundled_personas() {
        let engine = PersonaEngine::new(fixture_dir());
        let segment = engine.build_system_prompt_segment("margaret_72").unwrap();
        assert!(segment.starts_with("You are Margaret"));
        assert!(segment.contains("BEHAVIORAL TRAITS"));
        assert!(segment.contains("TACTIC:"));
    }

    #[test]
    fn caches_after_first_load() {
        let engine = PersonaEngine::new(fixture_dir());
        let first = engine.load_persona("rajesh_45").unwrap();
        let second = engine.load_persona("rajesh_45").unwrap();
        assert_eq!(first.demographics.name, second.demographics.name);
    }

    #[test]
    fn missing_persona_errors() {
        let engine = PersonaEngine::new(fixture_dir());
        assert!(engine.load_persona("nonexistent").is_err());
    }
}
