//! Rule Store (§4.2): loads, validates, and atomically publishes the
//! active rule snapshot; persists mutations back to the YAML file.

use parking_lot::RwLock;
use sp_domain::{Error, Result, SecurityRule};
use sp_pattern::PatternEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(serde::Deserialize, serde::Serialize, Default)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<SecurityRule>,
}

/// A reload/mutation event, broadcast to subscribers (e.g. the Response
/// Cache, which flushes itself on any rule-set change).
#[derive(Debug, Clone)]
pub enum RuleStoreEvent {
    Reloaded,
    Mutated,
}

pub struct RuleStore {
    path: PathBuf,
    engine: Arc<PatternEngine>,
    snapshot: RwLock<Arc<Vec<SecurityRule>>>,
    events: broadcast::Sender<RuleStoreEvent>,
}

impl RuleStore {
    /// Load `path` if it exists; an absent file starts with zero rules
    /// (a conservative, fail-closed-by-omission default rule set).
    pub fn load(path: impl Into<PathBuf>, engine: Arc<PatternEngine>) -> Result<Self> {
        let path = path.into();
        let (tx, _rx) = broadcast::channel(64);
        let store = Self {
            path,
            engine,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            events: tx,
        };
        if store.path.exists() {
            store.load_from_disk()?;
        }
        Ok(store)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuleStoreEvent> {
        self.events.subscribe()
    }

    fn load_from_disk(&self) -> Result<()> {
        let text = std::fs::read_to_string(&self.path)?;
        let parsed: RuleFile = serde_yaml::from_str(&text)
            .map_err(|e| Error::InvalidConfiguration(format!("parsing {}: {e}", self.path.display())))?;

        for rule in &parsed.rules {
            self.validate_rule(rule)?;
        }

        let mut rules = parsed.rules;
        rules.sort_by_key(|r| r.priority);
        *self.snapshot.write() = Arc::new(rules);
        Ok(())
    }

    fn validate_rule(&self, rule: &SecurityRule) -> Result<()> {
        if rule.id.is_empty() {
            return Err(Error::InvalidConfiguration("rule id must not be empty".into()));
        }
        if !rule.conditions.has_recognized_key() {
            return Err(Error::InvalidConfiguration(format!(
                "rule {} has no recognized condition key",
                rule.id
            )));
        }
        validate_conditions(&self.engine, &rule.conditions)?;
        Ok(())
    }

    pub fn get_all(&self) -> Arc<Vec<SecurityRule>> {
        self.snapshot.read().clone()
    }

    /// Enabled rules only, in priority order (the Policy Engine's walk
    /// order).
    pub fn get_active(&self) -> Vec<SecurityRule> {
        self.snapshot.read().iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn get_by_id(&self, id: &str) -> Option<SecurityRule> {
        self.snapshot.read().iter().find(|r| r.id == id).cloned()
    }

    pub fn add(&self, rule: SecurityRule) -> Result<()> {
        self.validate_rule(&rule)?;
        {
            let mut guard = self.snapshot.write();
            let mut rules = (**guard).clone();
            if rules.iter().any(|r| r.id == rule.id) {
                return Err(Error::InvalidConfiguration(format!("rule {} already exists", rule.id)));
            }
            rules.push(rule);
            rules.sort_by_key(|r| r.priority);
            *guard = Arc::new(rules);
        }
        self.persist()?;
        let _ = self.events.send(RuleStoreEvent::Mutated);
        Ok(())
    }

    pub fn update(&self, rule: SecurityRule) -> Result<()> {
        self.validate_rule(&rule)?;
        {
            let mut guard = self.snapshot.write();
            let mut rules = (**guard).clone();
            let Some(slot) = rules.iter_mut().find(|r| r.id == rule.id) else {
                return Err(Error::InvalidConfiguration(format!("rule {} not found", rule.id)));
            };
            *slot = rule;
            rules.sort_by_key(|r| r.priority);
            *guard = Arc::new(rules);
        }
        self.persist()?;
        let _ = self.events.send(RuleStoreEvent::Mutated);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        {
            let mut guard = self.snapshot.write();
            let mut rules = (**guard).clone();
            let before = rules.len();
            rules.retain(|r| r.id != id);
            if rules.len() == before {
                return Err(Error::InvalidConfiguration(format!("rule {id} not found")));
            }
            *guard = Arc::new(rules);
        }
        self.persist()?;
        let _ = self.events.send(RuleStoreEvent::Mutated);
        Ok(())
    }

    /// Reparse the rule file from disk and atomically swap the snapshot.
    /// On failure the previous snapshot remains active (§4.2 step 4,
    /// §4.3 step 4).
    pub fn reload(&self) -> Result<()> {
        if !self.path.exists() {
            return Err(Error::InvalidConfiguration(format!(
                "rule file not found: {}",
                self.path.display()
            )));
        }
        self.load_from_disk()?;
        let _ = self.events.send(RuleStoreEvent::Reloaded);
        Ok(())
    }

    /// Write-to-temp-then-rename, to survive crashes mid-write (§4.2).
    fn persist(&self) -> Result<()> {
        let rules = (*self.snapshot.read()).clone();
        let doc = RuleFile { rules: (*rules).clone() };
        let yaml = serde_yaml::to_string(&doc)
            .map_err(|e| Error::InternalError(format!("serializing rules: {e}")))?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(yaml.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn validate_conditions(engine: &PatternEngine, conditions: &sp_domain::Conditions) -> Result<()> {
    for c in conditions.and.iter().chain(conditions.or.iter()).chain(std::iter::once(&conditions.direct)) {
        validate_condition(engine, c)?;
    }
    Ok(())
}

fn validate_condition(engine: &PatternEngine, c: &sp_domain::Condition) -> Result<()> {
    use sp_domain::{ParametersCondition, PatternConfig, Predicate, ToolNameCondition};

    let validate_pattern_config = |pc: &PatternConfig| -> Result<()> {
        match pc {
            PatternConfig::Bare(_) => Ok(()),
            PatternConfig::Typed(p) => engine.validate_predicate(p),
        }
    };

    if let Some(tn) = &c.tool_name {
        match tn {
            ToolNameCondition::List(_) => {}
            ToolNameCondition::Pattern(pc) => validate_pattern_config(pc)?,
        }
    }
    if let Some(params) = &c.parameters {
        match params {
            ParametersCondition::Whole(p) => engine.validate_predicate(p)?,
            ParametersCondition::PerKey(map) => {
                for pc in map.values() {
                    validate_pattern_config(pc)?;
                }
            }
        }
    }
    if let Some(pc) = &c.cwd {
        validate_pattern_config(pc)?;
    }
    if let Some(pattern) = &c.cwd_pattern {
        engine.validate_predicate(&Predicate::Regex { pattern: pattern.clone() })?;
    }
    Ok(())
}
